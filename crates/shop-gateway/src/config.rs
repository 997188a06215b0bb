//! # Gateway Configuration
//!
//! Where the payment backend lives and how to authenticate against it.
//! Values come from environment variables.

use shop_core::PaymentError;
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Payment backend connection settings
#[derive(Clone)]
pub struct GatewayConfig {
    /// Backend root, without trailing slash
    pub base_url: String,

    /// Bearer token for the authenticated endpoints
    pub api_token: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

// Token stays out of logs.
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `SHOP_API_BASE_URL` (default `http://127.0.0.1:8000`)
    /// - `SHOP_API_TOKEN`
    /// - `SHOP_HTTP_TIMEOUT_SECS` (default 30)
    pub fn from_env() -> Result<Self, PaymentError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PaymentError> {
        let base_url = lookup("SHOP_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(PaymentError::Configuration(
                "SHOP_API_BASE_URL must start with http:// or https://".to_string(),
            ));
        }

        let timeout = match lookup("SHOP_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                PaymentError::Configuration(format!(
                    "SHOP_HTTP_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let mut config = Self::new(base_url).with_timeout(Duration::from_secs(timeout));
        config.api_token = lookup("SHOP_API_TOKEN").filter(|t| !t.trim().is_empty());
        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Builder: set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Builder: set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL for an endpoint path such as `otp/send`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Get authorization header value, if a token is configured
    pub fn auth_header(&self) -> Option<String> {
        self.api_token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.auth_header().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("SHOP_API_BASE_URL", "https://pay.example.com/"),
            ("SHOP_API_TOKEN", "tok_123"),
            ("SHOP_HTTP_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.endpoint("otp/send"), "https://pay.example.com/otp/send");
        assert_eq!(config.auth_header().as_deref(), Some("Bearer tok_123"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!format!("{:?}", config).contains("tok_123"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(GatewayConfig::from_lookup(lookup(&[("SHOP_API_BASE_URL", "ftp://x")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("SHOP_HTTP_TIMEOUT_SECS", "soon")])).is_err());
    }
}
