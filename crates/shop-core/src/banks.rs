//! # Bank Directory
//!
//! Net-banking bank list with a static fallback. Callers always get a list.

use crate::gateway::{Bank, BoxedPaymentGateway};
use crate::retry::{with_retry, RetryConfig};
use tracing::{instrument, warn};

/// Banks offered when the backend list cannot be fetched
pub fn fallback_banks() -> Vec<Bank> {
    vec![
        Bank::new("hdfc", "HDFC Bank"),
        Bank::new("icici", "ICICI Bank"),
        Bank::new("sbi", "State Bank of India"),
        Bank::new("axis", "Axis Bank"),
        Bank::new("kotak", "Kotak Mahindra Bank"),
    ]
}

/// Fetches the supported banks through the gateway
#[derive(Clone)]
pub struct BankDirectory {
    gateway: BoxedPaymentGateway,
    retry: RetryConfig,
}

impl BankDirectory {
    pub fn new(gateway: BoxedPaymentGateway, retry: RetryConfig) -> Self {
        Self { gateway, retry }
    }

    /// Bank list from the backend, or the fallback after the retry budget
    /// is spent. Any failure counts, not just transport errors.
    #[instrument(skip(self), fields(gateway = self.gateway.gateway_name()))]
    pub async fn banks(&self) -> Vec<Bank> {
        match with_retry(&self.retry, |_| true, || self.gateway.list_banks()).await {
            Ok(banks) => banks,
            Err(e) => {
                warn!("Using fallback bank list due to API failure: {}", e);
                fallback_banks()
            }
        }
    }
}
