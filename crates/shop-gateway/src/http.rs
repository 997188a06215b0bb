//! # HTTP Gateway
//!
//! `PaymentGateway` over the backend's JSON API.
//!
//! Non-2xx answers become `RemoteRejection` carrying the server's `detail`;
//! connection, timeout and decoding failures become `Transport`. Nothing is
//! retried here.

use crate::config::GatewayConfig;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use shop_core::{
    Bank, OtpDispatch, OtpSendRequest, OtpVerifyRequest, PaymentError, PaymentGateway,
    PaymentResult, ProcessPaymentRequest, ProcessedPayment,
};
use tracing::{debug, error, instrument};

const BANKS: &str = "banks/list";
const MOBILE: &str = "card/get-mobile-number";
const OTP_SEND: &str = "otp/send";
const OTP_VERIFY: &str = "otp/verify";
const PROCESS: &str = "transactions/process";

/// Payment backend client
pub struct HttpGateway {
    config: GatewayConfig,
    client: Client,
}

impl HttpGateway {
    /// Create a new gateway client
    pub fn new(config: GatewayConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        authorized: bool,
    ) -> RequestBuilder {
        let request = self.client.post(self.config.endpoint(path)).json(body);
        match self.config.auth_header() {
            Some(auth) if authorized => request.header(AUTHORIZATION, auth),
            _ => request,
        }
    }

    async fn send<R: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> PaymentResult<R> {
        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::Transport(format!("{}: {}", endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Transport(format!("{}: {}", endpoint, e)))?;

        if !status.is_success() {
            error!(
                "Payment backend error: endpoint={}, status={}, body={}",
                endpoint, status, body
            );

            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(ErrorBody::into_message)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(PaymentError::rejected(endpoint, message));
        }

        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| {
            PaymentError::Transport(format!("Failed to parse {} response: {}", endpoint, e))
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[instrument(skip(self))]
    async fn list_banks(&self) -> PaymentResult<Vec<Bank>> {
        let request = self.client.get(self.config.endpoint(BANKS));
        let banks = match self.send::<BankList>(BANKS, request).await? {
            BankList::Wrapped { banks } => banks,
            BankList::Bare(banks) => banks,
        };
        debug!("Fetched {} banks", banks.len());
        Ok(banks)
    }

    #[instrument(skip_all)]
    async fn lookup_mobile(&self, card_number: &str) -> PaymentResult<String> {
        let request = self.post(MOBILE, &CardNumberBody { card_number }, true);
        let response: MobileResponse = self.send(MOBILE, request).await?;
        Ok(response.mobile_number)
    }

    #[instrument(skip_all)]
    async fn send_otp(&self, body: &OtpSendRequest) -> PaymentResult<OtpDispatch> {
        let request = self.post(OTP_SEND, body, false);
        self.send(OTP_SEND, request).await
    }

    #[instrument(skip_all, fields(transaction_id = %body.transaction_id))]
    async fn verify_otp(&self, body: &OtpVerifyRequest) -> PaymentResult<()> {
        let request = self.post(OTP_VERIFY, body, false);
        let _: IgnoredAny = self.send(OTP_VERIFY, request).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(method = %body.payment_method))]
    async fn process_payment(
        &self,
        body: &ProcessPaymentRequest,
    ) -> PaymentResult<ProcessedPayment> {
        let request = self.post(PROCESS, body, true);
        self.send(PROCESS, request).await
    }

    fn gateway_name(&self) -> &'static str {
        "http"
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct CardNumberBody<'a> {
    card_number: &'a str,
}

#[derive(Debug, Deserialize)]
struct MobileResponse {
    #[serde(alias = "mobile")]
    mobile_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BankList {
    Wrapped { banks: Vec<Bank> },
    Bare(Vec<Bank>),
}

/// `{detail}` as a string, or a validation error list
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        match self.detail {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Null) | None => self.message,
            Some(other) => Some(other.to_string()),
        }
    }
}
