//! # shop-gateway
//!
//! HTTP client for the shopfusion payment backend.
//!
//! `HttpGateway` implements `shop_core::PaymentGateway` against five JSON
//! endpoints:
//!
//! | Call | Endpoint | Auth |
//! |------|----------|------|
//! | bank list | `GET banks/list` | none |
//! | registered mobile | `POST card/get-mobile-number` | bearer |
//! | OTP dispatch / resend | `POST otp/send` | none |
//! | OTP check | `POST otp/verify` | none |
//! | net-banking payment | `POST transactions/process` | bearer |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_gateway::HttpGateway;
//! use shop_core::{BankDirectory, RetryConfig};
//! use std::sync::Arc;
//!
//! let gateway = Arc::new(HttpGateway::from_env()?);
//! let banks = BankDirectory::new(gateway, RetryConfig::default()).banks().await;
//! ```

pub mod config;
pub mod http;

// Re-exports
pub use config::GatewayConfig;
pub use http::HttpGateway;
