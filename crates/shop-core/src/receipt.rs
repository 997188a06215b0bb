//! # Receipts
//!
//! Receipt generation is the last side effect of a completed payment. It
//! consumes a transaction id and the amount paid; failures are logged by the
//! caller and never undo the order.

use crate::error::{PaymentError, PaymentResult};
use crate::product::Price;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_id: String,
    pub amount: Price,
    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    pub fn new(transaction_id: impl Into<String>, amount: Price) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            amount,
            issued_at: Utc::now(),
        }
    }

    /// Plain-text body
    pub fn render(&self) -> String {
        format!(
            "Payment Receipt\n\
             Transaction ID: {}\n\
             Amount Paid: {}\n\
             Date: {}\n\
             Thank you for your purchase!\n",
            self.transaction_id,
            self.amount.display(),
            self.issued_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

#[async_trait]
pub trait ReceiptGenerator: Send + Sync {
    async fn generate(&self, receipt: &Receipt) -> PaymentResult<()>;
}

pub type BoxedReceiptGenerator = Arc<dyn ReceiptGenerator>;

/// Discards receipts
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReceipts;

#[async_trait]
impl ReceiptGenerator for NoopReceipts {
    async fn generate(&self, _receipt: &Receipt) -> PaymentResult<()> {
        Ok(())
    }
}

/// Writes `receipt_<transaction id>.txt` into a directory
#[derive(Debug, Clone)]
pub struct TextReceiptWriter {
    dir: PathBuf,
}

impl TextReceiptWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, transaction_id: &str) -> PathBuf {
        let safe: String = transaction_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("receipt_{}.txt", safe))
    }
}

#[async_trait]
impl ReceiptGenerator for TextReceiptWriter {
    async fn generate(&self, receipt: &Receipt) -> PaymentResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PaymentError::Storage(e.to_string()))?;
        let path = self.path_for(&receipt.transaction_id);
        tokio::fs::write(&path, receipt.render())
            .await
            .map_err(|e| PaymentError::Storage(e.to_string()))?;
        info!("Receipt written to {}", path.display());
        Ok(())
    }
}
