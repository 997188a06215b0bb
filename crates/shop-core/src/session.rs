//! # Session Store
//!
//! Durable key-value records that carry a checkout across steps:
//!
//! | Key | Record |
//! |-----|--------|
//! | `paymentDetails` | pending transaction + ordered items |
//! | `purchasedItems` | cart snapshot |
//! | `orderDetails` | finished order |
//!
//! Writes are last-write-wins; there is no versioning or expiry.

use crate::cart::CartItem;
use crate::error::{PaymentError, PaymentResult};
use crate::order::{CheckoutSession, OrderRecord, PendingTransaction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Record keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    PaymentDetails,
    PurchasedItems,
    OrderDetails,
}

impl SessionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::PaymentDetails => "paymentDetails",
            SessionKey::PurchasedItems => "purchasedItems",
            SessionKey::OrderDetails => "orderDetails",
        }
    }
}

/// Shape stored under `paymentDetails`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PaymentDetailsRecord {
    #[serde(flatten)]
    pending: PendingTransaction,
    #[serde(default)]
    items: Vec<CartItem>,
}

/// Storage for checkout session records.
///
/// Implementors provide raw JSON get/put/remove; the typed accessors are
/// shared.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: SessionKey) -> PaymentResult<Option<Value>>;

    async fn put(&self, key: SessionKey, value: Value) -> PaymentResult<()>;

    async fn remove(&self, key: SessionKey) -> PaymentResult<()>;

    /// Persist a freshly dispatched OTP transaction and the items it pays for.
    /// Replaces any earlier pending transaction.
    async fn record_pending(
        &self,
        pending: &PendingTransaction,
        items: &[CartItem],
    ) -> PaymentResult<()> {
        let record = PaymentDetailsRecord {
            pending: pending.clone(),
            items: items.to_vec(),
        };
        self.put(SessionKey::PaymentDetails, serde_json::to_value(&record)?)
            .await?;
        self.put(SessionKey::PurchasedItems, serde_json::to_value(items)?)
            .await
    }

    async fn pending(&self) -> PaymentResult<Option<PendingTransaction>> {
        match self.get(SessionKey::PaymentDetails).await? {
            Some(value) => {
                let record: PaymentDetailsRecord = serde_json::from_value(value)?;
                Ok(Some(record.pending))
            }
            None => Ok(None),
        }
    }

    /// Drop the pending transaction and the items it was paying for
    async fn clear_pending(&self) -> PaymentResult<()> {
        self.remove(SessionKey::PaymentDetails).await?;
        self.remove(SessionKey::PurchasedItems).await
    }

    async fn purchased_items(&self) -> PaymentResult<Vec<CartItem>> {
        match self.get(SessionKey::PurchasedItems).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn record_order(&self, order: &OrderRecord) -> PaymentResult<()> {
        self.put(SessionKey::OrderDetails, serde_json::to_value(order)?)
            .await
    }

    async fn order(&self) -> PaymentResult<Option<OrderRecord>> {
        match self.get(SessionKey::OrderDetails).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// All three records at once
    async fn load(&self) -> PaymentResult<CheckoutSession> {
        Ok(CheckoutSession {
            pending: self.pending().await?,
            purchased_items: self.purchased_items().await?,
            order: self.order().await?,
        })
    }
}

/// Type alias for a shared session store
pub type BoxedSessionStore = Arc<dyn SessionStore>;

/// Process-local store
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    records: Arc<RwLock<HashMap<SessionKey, Value>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> PaymentError {
        PaymentError::Storage("session lock poisoned".to_string())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: SessionKey) -> PaymentResult<Option<Value>> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.get(&key).cloned())
    }

    async fn put(&self, key: SessionKey, value: Value) -> PaymentResult<()> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        records.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: SessionKey) -> PaymentResult<()> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        records.remove(&key);
        Ok(())
    }
}

/// One JSON file per key under a directory; survives restarts.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: SessionKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: SessionKey) -> PaymentResult<Option<Value>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PaymentError::Storage(e.to_string())),
        }
    }

    async fn put(&self, key: SessionKey, value: Value) -> PaymentResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PaymentError::Storage(e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(&value)?;
        tokio::fs::write(self.path(key), bytes)
            .await
            .map_err(|e| PaymentError::Storage(e.to_string()))?;
        debug!("Wrote session record {}", key.as_str());
        Ok(())
    }

    async fn remove(&self, key: SessionKey) -> PaymentResult<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PaymentError::Storage(e.to_string())),
        }
    }
}
