//! # Checkout Configuration
//!
//! Merchant labels, sandbox switch, simulated latency and retry policy for
//! the orchestrator and OTP flow. Loaded from the environment.

use crate::cart::AmountPolicy;
use crate::error::{PaymentError, PaymentResult};
use crate::retry::RetryConfig;
use std::env;
use std::time::Duration;

/// Fixed pauses shown to the shopper between checkout steps
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedLatency {
    /// "Redirecting to your bank" screen before OTP entry
    pub bank_redirect: Duration,
    /// Success screen after an accepted OTP
    pub otp_success: Duration,
    /// Sandbox UPI confirmation
    pub upi_sandbox: Duration,
}

impl Default for SimulatedLatency {
    fn default() -> Self {
        Self {
            bank_redirect: Duration::from_secs(4),
            otp_success: Duration::from_secs(2),
            upi_sandbox: Duration::from_millis(1500),
        }
    }
}

impl SimulatedLatency {
    pub fn none() -> Self {
        Self {
            bank_redirect: Duration::ZERO,
            otp_success: Duration::ZERO,
            upi_sandbox: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutConfig {
    /// Sent as `merchant_name` with the OTP dispatch
    pub merchant_name: String,
    /// `pn` of the UPI link
    pub payee_name: String,
    /// `tn` of the UPI link
    pub payment_note: String,
    /// Complete UPI payments locally instead of leaving them pending
    pub sandbox: bool,
    pub amount_policy: AmountPolicy,
    pub latency: SimulatedLatency,
    pub otp_window: Duration,
    /// Retry budget for `transactions/process`
    pub retry: RetryConfig,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            merchant_name: "ShopFusion".to_string(),
            payee_name: "Demo Merchant".to_string(),
            payment_note: "Demo Payment".to_string(),
            sandbox: true,
            amount_policy: AmountPolicy::Precise,
            latency: SimulatedLatency::default(),
            otp_window: Duration::from_secs(300),
            retry: RetryConfig::default(),
        }
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `SHOP_MERCHANT_NAME` (default `ShopFusion`)
    /// - `SHOP_SANDBOX_MODE` (`true`/`false`, default `true`)
    /// - `SHOP_AMOUNT_POLICY` (`precise`/`floored`, default `precise`)
    /// - `SHOP_OTP_WINDOW_SECS` (default `300`)
    /// - `SHOP_SIMULATED_LATENCY` (`true`/`false`, default `true`)
    pub fn from_env() -> PaymentResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PaymentResult<Self> {
        let mut config = Self::default();

        if let Some(name) = lookup("SHOP_MERCHANT_NAME").filter(|n| !n.trim().is_empty()) {
            config.merchant_name = name;
        }

        if let Some(raw) = lookup("SHOP_SANDBOX_MODE") {
            config.sandbox = parse_flag("SHOP_SANDBOX_MODE", &raw)?;
        }

        if let Some(raw) = lookup("SHOP_AMOUNT_POLICY") {
            config.amount_policy = match raw.trim().to_ascii_lowercase().as_str() {
                "precise" => AmountPolicy::Precise,
                "floored" => AmountPolicy::Floored,
                other => {
                    return Err(PaymentError::Configuration(format!(
                        "SHOP_AMOUNT_POLICY must be precise or floored, got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(raw) = lookup("SHOP_OTP_WINDOW_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                PaymentError::Configuration(format!(
                    "SHOP_OTP_WINDOW_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?;
            config.otp_window = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("SHOP_SIMULATED_LATENCY") {
            if !parse_flag("SHOP_SIMULATED_LATENCY", &raw)? {
                config.latency = SimulatedLatency::none();
            }
        }

        Ok(config)
    }

    /// No pauses, immediate retries (for tests)
    pub fn instant() -> Self {
        Self {
            latency: SimulatedLatency::none(),
            retry: RetryConfig::immediate(3),
            ..Self::default()
        }
    }

    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_amount_policy(mut self, policy: AmountPolicy) -> Self {
        self.amount_policy = policy;
        self
    }
}

fn parse_flag(key: &str, raw: &str) -> PaymentResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PaymentError::Configuration(format!(
            "{} must be true or false, got '{}'",
            key, other
        ))),
    }
}
