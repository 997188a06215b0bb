//! # shop-api
//!
//! HTTP API layer for shopfusion-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for the catalog and cart
//! - Checkout submission and the OTP step
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/v1/products` | List products |
//! | GET | `/api/v1/cart` | Cart with totals |
//! | GET | `/api/v1/banks` | Net-banking banks |
//! | POST | `/api/v1/checkout` | Submit payment form |
//! | POST | `/api/v1/checkout/otp/verify` | Verify OTP |
//! | GET | `/api/v1/orders/latest` | Last order |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
