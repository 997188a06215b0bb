//! Payload encryption step shown during card checkout.
//!
//! The storefront advertises a "quantum-safe" handshake before the OTP is
//! sent. Nothing downstream depends on the ciphertext, so the shipped
//! provider passes payloads through unchanged.

use crate::error::PaymentResult;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait EncryptionProvider: Send + Sync {
    /// Establish a session key with the backend
    async fn handshake(&self) -> PaymentResult<()>;

    /// Encrypt a serialized payload
    async fn encrypt(&self, payload: &str) -> PaymentResult<String>;

    fn provider_name(&self) -> &'static str;
}

pub type BoxedEncryptionProvider = Arc<dyn EncryptionProvider>;

/// Pass-through provider
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEncryption;

#[async_trait]
impl EncryptionProvider for NoopEncryption {
    async fn handshake(&self) -> PaymentResult<()> {
        Ok(())
    }

    async fn encrypt(&self, payload: &str) -> PaymentResult<String> {
        Ok(payload.to_string())
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }
}
