//! # shop-core
//!
//! Core types and checkout engine for the shopfusion storefront.
//!
//! This crate provides:
//! - `ProductCatalog` and `CartStore` for browsing and the cart
//! - `PaymentGateway` trait describing the remote payment backend
//! - `CheckoutOrchestrator` for card, UPI and net-banking submissions
//! - `OtpVerification` for the card OTP step
//! - `BankDirectory` with its static fallback
//! - `SessionStore` for records carried between checkout steps
//! - `PaymentError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{CheckoutConfig, CheckoutOrchestrator, PaymentFields, SubmitOutcome};
//!
//! let config = CheckoutConfig::from_env()?;
//! let mut checkout = CheckoutOrchestrator::new(gateway, sessions.clone(), config);
//!
//! match checkout.submit(PaymentFields::Card(card), &mut cart).await? {
//!     SubmitOutcome::OtpRequired(pending) => {
//!         let mut otp = OtpVerification::resume(gateway, sessions, checkout.config()).await?;
//!         otp.set_code("123456");
//!         let order = otp.verify(&mut cart).await?;
//!     }
//!     other => { /* show the order or the UPI hand-off */ }
//! }
//! ```

#[cfg(feature = "runtime")]
pub mod banks;
pub mod card;
pub mod cart;
#[cfg(feature = "runtime")]
pub mod checkout;
#[cfg(feature = "runtime")]
pub mod config;
pub mod encryption;
pub mod error;
pub mod gateway;
pub mod order;
#[cfg(feature = "runtime")]
pub mod otp;
pub mod product;
#[cfg(feature = "runtime")]
pub mod receipt;
#[cfg(feature = "runtime")]
pub mod retry;
#[cfg(feature = "runtime")]
pub mod session;
pub mod upi;

#[cfg(all(test, feature = "runtime"))]
mod test_support;

// Re-exports for convenience
#[cfg(feature = "runtime")]
pub use banks::{fallback_banks, BankDirectory};
pub use card::{is_expiry_valid, mask_card_number, normalize_card_number, CardBrand, CardDetails};
pub use cart::{AmountPolicy, CartItem, CartStore, Coupon};
#[cfg(feature = "runtime")]
pub use checkout::{CheckoutOrchestrator, CheckoutStage, PaymentFields, SubmitOutcome};
#[cfg(feature = "runtime")]
pub use config::{CheckoutConfig, SimulatedLatency};
pub use encryption::{BoxedEncryptionProvider, EncryptionProvider, NoopEncryption};
pub use error::{PaymentError, PaymentResult};
pub use gateway::{
    Bank, BoxedPaymentGateway, OtpDispatch, OtpSendRequest, OtpVerifyRequest, PaymentGateway,
    ProcessPaymentRequest, ProcessedPayment,
};
pub use order::{
    CheckoutSession, OrderRecord, PaymentMethod, PendingTransaction, SIMULATED_TRANSACTION_ID,
};
#[cfg(feature = "runtime")]
pub use otp::{OtpState, OtpStatus, OtpVerification};
pub use product::{Currency, Price, Product, ProductCatalog};
#[cfg(feature = "runtime")]
pub use receipt::{
    BoxedReceiptGenerator, NoopReceipts, Receipt, ReceiptGenerator, TextReceiptWriter,
};
#[cfg(feature = "runtime")]
pub use retry::{with_retry, RetryConfig};
#[cfg(feature = "runtime")]
pub use session::{BoxedSessionStore, FileSessionStore, InMemorySessionStore, SessionStore};
pub use upi::{build_upi_url, is_mobile_user_agent, is_valid_upi_id, UpiHandoff};
