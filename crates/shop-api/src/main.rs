//! # ShopFusion
//!
//! Storefront API with a simulated multi-method checkout.
//!
//! ## Usage
//!
//! ```bash
//! # Point at the payment backend
//! export SHOP_API_BASE_URL=http://127.0.0.1:8000
//! export SHOP_API_TOKEN=...
//!
//! # Run the server
//! shopfusion
//! ```

use shop_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    print_banner();

    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Products loaded: {}", state.catalog.products.len());
    info!(
        "Sandbox UPI: {}, merchant: {}",
        state.checkout_config.sandbox, state.checkout_config.merchant_name
    );

    let app = routes::create_router(state);

    info!("ShopFusion starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Checkout: POST http://{}/api/v1/checkout", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  ShopFusion
  ━━━━━━━━━━━━━━━━━━━━━━━
  Storefront & checkout
  Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
