//! # Payment Gateway Trait
//!
//! Client-side contract of the payment backend. The checkout orchestrator and
//! the OTP flow talk only to this trait, so the HTTP implementation can be
//! swapped for a scripted one in tests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   PaymentGateway (trait)                    │
//! │  ├── list_banks()           GET  banks/list                 │
//! │  ├── lookup_mobile()        POST card/get-mobile-number     │
//! │  ├── send_otp()             POST otp/send                   │
//! │  ├── verify_otp()           POST otp/verify                 │
//! │  └── process_payment()      POST transactions/process       │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                 ┌──────────┴──────────┐
//!         ┌───────┴───────┐     ┌───────┴───────┐
//!         │  HttpGateway  │     │ scripted/mock │
//!         │ (shop-gateway)│     │   (tests)     │
//!         └───────────────┘     └───────────────┘
//! ```

use crate::error::PaymentResult;
use crate::order::{parse_delivery_date, PaymentMethod};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A bank offered for net-banking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    #[serde(alias = "id", alias = "_id")]
    pub code: String,
    pub name: String,
}

impl Bank {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Body of `POST otp/send`, one shape per call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OtpSendRequest {
    /// Full checkout: card, looked-up mobile, amount and merchant
    Checkout {
        card_number: String,
        mobile_number: String,
        transaction_amount: String,
        merchant_name: String,
    },
    /// Resend for an existing mobile/transaction pair
    Resend {
        mobile_number: String,
        transaction_id: String,
    },
    /// Simple form: backend resolves the mobile from the card
    CardOnly { card_number: String },
}

/// Result of an OTP dispatch
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct OtpDispatch {
    #[serde(default, alias = "mobile")]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default, rename = "deliveryDate")]
    pub delivery_date: Option<String>,
}

impl OtpDispatch {
    pub fn delivery_date(&self) -> Option<NaiveDate> {
        parse_delivery_date(self.delivery_date.as_deref())
    }
}

/// Body of `POST otp/verify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpVerifyRequest {
    pub transaction_id: String,
    pub mobile_number: String,
    pub otp: String,
}

/// Body of `POST transactions/process`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessPaymentRequest {
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub status: String,
    pub card_number: String,
    pub upi_id: String,
    pub bank_code: String,
}

impl ProcessPaymentRequest {
    /// A pending request for `method`; optional fields default to empty strings
    pub fn new(amount: f64, payment_method: PaymentMethod) -> Self {
        Self {
            amount,
            payment_method,
            status: "Pending".to_string(),
            card_number: String::new(),
            upi_id: String::new(),
            bank_code: String::new(),
        }
    }

    pub fn with_bank(mut self, bank_code: impl Into<String>) -> Self {
        self.bank_code = bank_code.into();
        self
    }

    pub fn with_card(mut self, card_number: impl Into<String>) -> Self {
        self.card_number = card_number.into();
        self
    }
}

/// Successful `transactions/process` response
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ProcessedPayment {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default, rename = "deliveryDate")]
    pub delivery_date: Option<String>,
}

impl ProcessedPayment {
    pub fn delivery_date(&self) -> Option<NaiveDate> {
        parse_delivery_date(self.delivery_date.as_deref())
    }
}

/// Remote payment backend.
///
/// Implementations report server refusals as `PaymentError::RemoteRejection`
/// carrying the server's `detail`, and network/parse failures as
/// `PaymentError::Transport`. They do not retry; retry policy belongs to the
/// callers.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `GET banks/list`
    async fn list_banks(&self) -> PaymentResult<Vec<Bank>>;

    /// `POST card/get-mobile-number`: registered mobile for a card
    async fn lookup_mobile(&self, card_number: &str) -> PaymentResult<String>;

    /// `POST otp/send`
    async fn send_otp(&self, request: &OtpSendRequest) -> PaymentResult<OtpDispatch>;

    /// `POST otp/verify`. `Ok(())` means the code was accepted.
    async fn verify_otp(&self, request: &OtpVerifyRequest) -> PaymentResult<()>;

    /// `POST transactions/process`
    async fn process_payment(&self, request: &ProcessPaymentRequest)
        -> PaymentResult<ProcessedPayment>;

    /// Gateway name (for logging)
    fn gateway_name(&self) -> &'static str;
}

/// Type alias for a shared gateway (dynamic dispatch)
pub type BoxedPaymentGateway = Arc<dyn PaymentGateway>;
