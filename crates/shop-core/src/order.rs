//! # Order Types
//!
//! Payment method selection, the pending OTP transaction and the finished
//! order record, plus the checkout session that carries them between steps.

use crate::cart::CartItem;
use crate::product::Price;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Days added to today when the backend gives no delivery date
pub const DEFAULT_DELIVERY_DAYS: u64 = 2;

/// Transaction id used for sandboxed UPI completions
pub const SIMULATED_TRANSACTION_ID: &str = "SIMULATED_TXN";

/// Payment method chosen for a checkout attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Upi,
    Netbanking,
    Wallet,
}

impl PaymentMethod {
    /// Wire name (`payment_method` field)
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction awaiting OTP confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub transaction_id: String,
    pub mobile_number: String,
    pub amount: Price,
    pub created_at: DateTime<Utc>,

    /// Backend order reference, when the OTP dispatch returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
}

impl PendingTransaction {
    pub fn new(
        transaction_id: impl Into<String>,
        mobile_number: impl Into<String>,
        amount: Price,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            mobile_number: mobile_number.into(),
            amount,
            created_at: Utc::now(),
            order_id: None,
            delivery_date: None,
        }
    }
}

/// Finalised, user-visible result of a checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub items: Vec<CartItem>,
    pub transaction_id: String,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
}

impl OrderRecord {
    pub fn new(items: Vec<CartItem>, transaction_id: impl Into<String>) -> Self {
        Self {
            items,
            transaction_id: transaction_id.into(),
            delivery_date: None,
        }
    }

    pub fn with_delivery_date(mut self, date: Option<NaiveDate>) -> Self {
        self.delivery_date = date;
        self
    }

    /// Delivery date to show: the backend's, else two days from `today`
    pub fn expected_delivery(&self, today: NaiveDate) -> NaiveDate {
        self.delivery_date
            .or_else(|| today.checked_add_days(Days::new(DEFAULT_DELIVERY_DAYS)))
            .unwrap_or(today)
    }

    /// Sum of the purchased line totals
    pub fn total(&self) -> Price {
        let currency = self.items.first().map(|i| i.price.currency).unwrap_or_default();
        Price::from_minor(self.items.iter().map(|i| i.total().amount).sum(), currency)
    }
}

/// Everything a checkout attempt carries from one screen to the next.
///
/// Each field maps to one stored record: `paymentDetails`, `purchasedItems`
/// and `orderDetails`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    #[serde(default)]
    pub pending: Option<PendingTransaction>,
    #[serde(default)]
    pub purchased_items: Vec<CartItem>,
    #[serde(default)]
    pub order: Option<OrderRecord>,
}

/// Parse a backend delivery date; unknown formats are ignored
pub fn parse_delivery_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
