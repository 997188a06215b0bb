//! # Routes
//!
//! Axum router configuration for the storefront API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Catalog:
///   - GET  /api/v1/products - List products
///   - GET  /api/v1/products/{id} - Get product by ID
///
/// - Cart:
///   - GET    /api/v1/cart - Cart with totals
///   - POST   /api/v1/cart/items - Add product
///   - PUT    /api/v1/cart/items/{id} - Set quantity
///   - DELETE /api/v1/cart/items/{id} - Remove line
///   - POST   /api/v1/cart/items/{id}/decrement - Decrement line
///   - POST   /api/v1/cart/coupon - Apply coupon
///
/// - Checkout:
///   - GET  /api/v1/banks - Net-banking banks
///   - POST /api/v1/checkout - Submit payment form
///   - GET  /api/v1/checkout/otp - OTP countdown and binding
///   - POST /api/v1/checkout/otp/verify - Verify OTP
///   - POST /api/v1/checkout/otp/resend - Resend OTP
///   - POST /api/v1/checkout/card/otp - Simple form: send OTP for a card
///   - POST /api/v1/checkout/card/pay - Simple form: verify OTP and charge
///   - GET  /api/v1/orders/latest - Last completed order
pub fn create_router(state: AppState) -> Router {
    // The storefront is served from a different origin in development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let catalog_routes = Router::new()
        .route("/products", get(handlers::list_products))
        .route("/products/{product_id}", get(handlers::get_product));

    let cart_routes = Router::new()
        .route("/cart", get(handlers::get_cart))
        .route("/cart/items", post(handlers::add_item))
        .route(
            "/cart/items/{item_id}",
            put(handlers::set_quantity).delete(handlers::remove_item),
        )
        .route("/cart/items/{item_id}/decrement", post(handlers::decrement_item))
        .route("/cart/coupon", post(handlers::apply_coupon));

    let checkout_routes = Router::new()
        .route("/banks", get(handlers::list_banks))
        .route("/checkout", post(handlers::submit_checkout))
        .route("/checkout/otp", get(handlers::otp_status))
        .route("/checkout/otp/verify", post(handlers::verify_otp))
        .route("/checkout/otp/resend", post(handlers::resend_otp))
        .route("/checkout/card/otp", post(handlers::request_card_otp))
        .route("/checkout/card/pay", post(handlers::pay_with_card))
        .route("/orders/latest", get(handlers::latest_order));

    let api_routes = Router::new()
        .merge(catalog_routes)
        .merge(cart_routes)
        .merge(checkout_routes);

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        // API v1
        .nest("/api/v1", api_routes)
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}
