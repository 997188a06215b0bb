//! # Application State
//!
//! Shared state for the Axum application.
//! Holds the catalog, the payment gateway and the single checkout context
//! (cart, orchestrator, OTP flow) behind one async mutex.
//!
//! The mutex is only held for reads and write-backs. Payment calls run on
//! copies with the lock released, and `begin_payment` allows one at a time.

use shop_core::{
    BankDirectory, BoxedPaymentGateway, BoxedReceiptGenerator, BoxedSessionStore, CartStore,
    CheckoutConfig, CheckoutOrchestrator, FileSessionStore, InMemorySessionStore, NoopReceipts,
    OtpVerification, ProductCatalog, TextReceiptWriter,
};
use shop_gateway::HttpGateway;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Directory for session records; in-memory when unset
    pub session_dir: Option<PathBuf>,
    /// Directory for receipts; receipts are skipped when unset
    pub receipt_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            session_dir: std::env::var("SHOP_SESSION_DIR").ok().map(PathBuf::from),
            receipt_dir: std::env::var("SHOP_RECEIPT_DIR").ok().map(PathBuf::from),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e)
            })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: "development".to_string(),
            session_dir: None,
            receipt_dir: None,
        }
    }
}

/// The shopper's cart and checkout progress
pub struct CheckoutContext {
    pub cart: CartStore,
    pub orchestrator: CheckoutOrchestrator,
    /// Present once a card checkout has dispatched an OTP
    pub otp: Option<OtpVerification>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Product catalog
    pub catalog: Arc<ProductCatalog>,
    /// Payment backend
    pub gateway: BoxedPaymentGateway,
    /// Session records
    pub sessions: BoxedSessionStore,
    /// Receipt sink
    pub receipts: BoxedReceiptGenerator,
    /// Net-banking bank list
    pub banks: BankDirectory,
    /// Cart, orchestrator and OTP flow
    pub checkout: Arc<Mutex<CheckoutContext>>,
    /// Set while a submission, verification or resend is running
    payment_in_flight: Arc<AtomicBool>,
    /// Checkout settings
    pub checkout_config: CheckoutConfig,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create a new AppState backed by the HTTP gateway
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let checkout_config = CheckoutConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load checkout config: {}", e))?;

        let catalog = load_product_catalog()?;

        let gateway = HttpGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize payment gateway: {}", e))?;
        tracing::info!("Payment backend: {}", gateway.config().base_url);

        let sessions: BoxedSessionStore = match &config.session_dir {
            Some(dir) => Arc::new(FileSessionStore::new(dir)),
            None => Arc::new(InMemorySessionStore::new()),
        };
        let receipts: BoxedReceiptGenerator = match &config.receipt_dir {
            Some(dir) => Arc::new(TextReceiptWriter::new(dir)),
            None => Arc::new(NoopReceipts),
        };

        Ok(Self::with_parts(
            config,
            catalog,
            Arc::new(gateway),
            sessions,
            receipts,
            checkout_config,
        ))
    }

    /// Assemble state from explicit parts (for testing)
    pub fn with_parts(
        config: AppConfig,
        catalog: ProductCatalog,
        gateway: BoxedPaymentGateway,
        sessions: BoxedSessionStore,
        receipts: BoxedReceiptGenerator,
        checkout_config: CheckoutConfig,
    ) -> Self {
        let orchestrator =
            CheckoutOrchestrator::new(gateway.clone(), sessions.clone(), checkout_config.clone())
                .with_receipts(receipts.clone());
        let banks = BankDirectory::new(gateway.clone(), checkout_config.retry.clone());

        Self {
            catalog: Arc::new(catalog),
            gateway,
            sessions,
            receipts,
            banks,
            checkout: Arc::new(Mutex::new(CheckoutContext {
                cart: CartStore::new(),
                orchestrator,
                otp: None,
            })),
            payment_in_flight: Arc::new(AtomicBool::new(false)),
            checkout_config,
            config,
        }
    }

    /// Claim the payment slot. `None` while another payment call runs.
    pub fn begin_payment(&self) -> Option<PaymentSlot> {
        self.payment_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PaymentSlot(self.payment_in_flight.clone()))
    }

    /// Bind a fresh OTP flow to the stored pending transaction
    pub async fn resume_otp(&self) -> shop_core::PaymentResult<OtpVerification> {
        let flow = OtpVerification::resume(
            self.gateway.clone(),
            self.sessions.clone(),
            &self.checkout_config,
        )
        .await?;
        Ok(flow.with_receipts(self.receipts.clone()))
    }
}

/// Held for the duration of one payment call; frees the slot on drop
pub struct PaymentSlot(Arc<AtomicBool>);

impl Drop for PaymentSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Load product catalog from config file
fn load_product_catalog() -> anyhow::Result<ProductCatalog> {
    // Try to load from config/products.toml
    let config_paths = [
        "config/products.toml",
        "../config/products.toml",
        "../../config/products.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = ProductCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} products from {}", catalog.products.len(), path);
            return Ok(catalog);
        }
    }

    // Return empty catalog if no config found
    tracing::warn!("No product catalog found, using empty catalog");
    Ok(ProductCatalog::new())
}
