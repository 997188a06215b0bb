//! # Request Handlers
//!
//! Axum request handlers for the storefront API: catalog, cart, bank list,
//! checkout submission and the OTP step.
//!
//! Payment handlers copy what they need out of the checkout context, run the
//! slow part with the lock released, then write the result back.

use crate::state::{AppState, CheckoutContext};
use axum::{
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use shop_core::{
    CardDetails, CartItem, CartStore, CheckoutStage, Coupon, OrderRecord, OtpState,
    OtpVerification, PaymentError, PaymentFields, Price, SubmitOutcome,
};
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Add-to-cart request
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: u32,
}

/// Set-quantity request
#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

/// Coupon request
#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    pub code: String,
}

/// Checkout form, tagged by `payment_method`. Missing fields arrive empty and
/// are reported by the checkout validation.
#[derive(Debug, Deserialize)]
#[serde(tag = "payment_method", rename_all = "lowercase")]
pub enum CheckoutRequest {
    Card {
        #[serde(default)]
        card_number: String,
        #[serde(default)]
        card_holder: String,
        #[serde(default)]
        expiry_month: String,
        #[serde(default)]
        expiry_year: String,
        #[serde(default)]
        cvv: String,
    },
    Upi {
        #[serde(default)]
        upi_id: String,
    },
    Netbanking {
        #[serde(default)]
        bank_code: String,
    },
    Wallet,
}

impl CheckoutRequest {
    fn into_fields(self, user_agent: String) -> PaymentFields {
        match self {
            CheckoutRequest::Card {
                card_number,
                card_holder,
                expiry_month,
                expiry_year,
                cvv,
            } => PaymentFields::Card(CardDetails::new(
                card_number,
                card_holder,
                expiry_month,
                expiry_year,
                cvv,
            )),
            CheckoutRequest::Upi { upi_id } => PaymentFields::Upi { upi_id, user_agent },
            CheckoutRequest::Netbanking { bank_code } => PaymentFields::Netbanking { bank_code },
            CheckoutRequest::Wallet => PaymentFields::Wallet,
        }
    }
}

/// OTP submission
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
}

/// Simple form, step one
#[derive(Debug, Deserialize)]
pub struct CardOtpRequest {
    #[serde(default)]
    pub card_number: String,
}

/// Simple form, step two
#[derive(Debug, Deserialize)]
pub struct CardPaymentRequest {
    #[serde(default)]
    pub card_number: String,
    #[serde(default)]
    pub card_holder: String,
    #[serde(default)]
    pub expiry_month: String,
    #[serde(default)]
    pub expiry_year: String,
    #[serde(default)]
    pub cvv: String,
    #[serde(default)]
    pub otp: String,
}

impl CardPaymentRequest {
    fn card(&self) -> CardDetails {
        CardDetails::new(
            self.card_number.clone(),
            self.card_holder.clone(),
            self.expiry_month.clone(),
            self.expiry_year.clone(),
            self.cvv.clone(),
        )
    }
}

/// Cart with totals
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub subtotal: Price,
    pub discount: Price,
    pub total: Price,
    pub total_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<Coupon>,
}

impl CartView {
    fn new(cart: &CartStore, state: &AppState) -> Self {
        let total = cart.total(state.checkout_config.amount_policy);
        Self {
            items: cart.snapshot(),
            item_count: cart.item_count(),
            subtotal: cart.subtotal(),
            discount: cart.discount(),
            total,
            total_display: total.display(),
            coupon: cart.coupon().cloned(),
        }
    }
}

/// Checkout submission result
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub stage: CheckoutStage,
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
}

/// Finished order as shown on the confirmation page
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub transaction_id: String,
    pub items: Vec<CartItem>,
    pub total: Price,
    pub expected_delivery: NaiveDate,
}

impl From<OrderRecord> for OrderView {
    fn from(order: OrderRecord) -> Self {
        let expected_delivery = order.expected_delivery(Local::now().date_naive());
        Self {
            total: order.total(),
            transaction_id: order.transaction_id,
            items: order.items,
            expected_delivery,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>, code: u16) -> Self {
        Self {
            detail: detail.into(),
            code,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn payment_error_to_response(err: PaymentError) -> ApiError {
    let code = err.status_code();
    let response = ErrorResponse::new(err.user_message(), code);
    (StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(response))
}

fn not_found(detail: impl Into<String>) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(detail, 404)))
}

fn payment_busy() -> ApiError {
    warn!("Rejected payment call while another is running");
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse::new("A payment is already being processed.", 409)),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "shopfusion",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Get products list
pub async fn list_products(State(state): State<AppState>) -> impl IntoResponse {
    let products: Vec<_> = state.catalog.active_products().collect();
    Json(serde_json::json!({
        "products": products,
        "count": products.len()
    }))
}

/// Get single product
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<u32>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .catalog
        .get(product_id)
        .ok_or_else(|| not_found(format!("Product not found: {}", product_id)))?;

    Ok(Json(product.clone()))
}

pub async fn get_cart(State(state): State<AppState>) -> Json<CartView> {
    let ctx = state.checkout.lock().await;
    Json(CartView::new(&ctx.cart, &state))
}

/// Add a product, or bump its quantity if already in the cart
#[instrument(skip(state))]
pub async fn add_item(
    State(state): State<AppState>,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    let product = state
        .catalog
        .get(request.product_id)
        .filter(|p| p.active)
        .ok_or_else(|| not_found(format!("Product not found: {}", request.product_id)))?;

    let mut ctx = state.checkout.lock().await;
    let quantity = ctx.cart.add(product).quantity;
    info!("Cart: {} x{}", product.name, quantity);
    Ok(Json(CartView::new(&ctx.cart, &state)))
}

/// Set a line's quantity; zero removes it
pub async fn set_quantity(
    State(state): State<AppState>,
    Path(item_id): Path<u32>,
    Json(request): Json<SetQuantityRequest>,
) -> Result<Json<CartView>, ApiError> {
    let mut ctx = state.checkout.lock().await;
    if !ctx.cart.set_quantity(item_id, request.quantity) {
        return Err(not_found(format!("Item not in cart: {}", item_id)));
    }
    Ok(Json(CartView::new(&ctx.cart, &state)))
}

/// Decrement a line; the line goes away at zero
pub async fn decrement_item(
    State(state): State<AppState>,
    Path(item_id): Path<u32>,
) -> Result<Json<CartView>, ApiError> {
    let mut ctx = state.checkout.lock().await;
    if !ctx.cart.decrement(item_id) {
        return Err(not_found(format!("Item not in cart: {}", item_id)));
    }
    Ok(Json(CartView::new(&ctx.cart, &state)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path(item_id): Path<u32>,
) -> Result<Json<CartView>, ApiError> {
    let mut ctx = state.checkout.lock().await;
    if !ctx.cart.remove(item_id) {
        return Err(not_found(format!("Item not in cart: {}", item_id)));
    }
    Ok(Json(CartView::new(&ctx.cart, &state)))
}

pub async fn apply_coupon(
    State(state): State<AppState>,
    Json(request): Json<CouponRequest>,
) -> Result<Json<CartView>, ApiError> {
    let mut ctx = state.checkout.lock().await;
    ctx.cart
        .apply_coupon(&request.code)
        .map_err(payment_error_to_response)?;
    Ok(Json(CartView::new(&ctx.cart, &state)))
}

/// Banks for net-banking; falls back to the static list
pub async fn list_banks(State(state): State<AppState>) -> impl IntoResponse {
    let banks = state.banks.banks().await;
    Json(serde_json::json!({ "banks": banks }))
}

/// Submit the payment form
#[instrument(skip(state, headers, request))]
pub async fn submit_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let _slot = state.begin_payment().ok_or_else(payment_busy)?;
    let (mut orchestrator, mut cart) = {
        let ctx = state.checkout.lock().await;
        (ctx.orchestrator.clone(), ctx.cart.clone())
    };

    let result = orchestrator
        .submit(request.into_fields(user_agent), &mut cart)
        .await;
    let stage = orchestrator.stage();
    {
        let mut ctx = state.checkout.lock().await;
        ctx.orchestrator = orchestrator;
        // Items added while the payment ran were not paid for
        if result.is_ok() && cart.is_empty() {
            ctx.cart.clear();
        }
    }

    let outcome = result.map_err(|e| {
        error!("Checkout failed: {}", e);
        payment_error_to_response(e)
    })?;

    let otp = match &outcome {
        SubmitOutcome::OtpRequired(_) => {
            Some(state.resume_otp().await.map_err(payment_error_to_response)?)
        }
        _ => None,
    };
    state.checkout.lock().await.otp = otp;

    Ok(Json(CheckoutResponse { stage, outcome }))
}

/// Simple form: send an OTP for the card alone
#[instrument(skip(state, request))]
pub async fn request_card_otp(
    State(state): State<AppState>,
    Json(request): Json<CardOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let _slot = state.begin_payment().ok_or_else(payment_busy)?;
    let mut orchestrator = state.checkout.lock().await.orchestrator.clone();

    let card = CardDetails {
        number: request.card_number,
        ..Default::default()
    };
    let result = orchestrator.request_card_otp(&card).await;
    let stage = orchestrator.stage();
    state.checkout.lock().await.orchestrator = orchestrator;

    let dispatch = result.map_err(payment_error_to_response)?;
    Ok(Json(serde_json::json!({
        "stage": stage,
        "transaction_id": dispatch.transaction_id,
        "mobile_number": dispatch.mobile_number,
    })))
}

/// Simple form: confirm the OTP and charge the card
#[instrument(skip(state, request))]
pub async fn pay_with_card(
    State(state): State<AppState>,
    Json(request): Json<CardPaymentRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let _slot = state.begin_payment().ok_or_else(payment_busy)?;
    let (mut orchestrator, mut cart) = {
        let ctx = state.checkout.lock().await;
        (ctx.orchestrator.clone(), ctx.cart.clone())
    };

    let result = orchestrator
        .pay_with_card_otp(&request.card(), &request.otp, &mut cart)
        .await;
    {
        let mut ctx = state.checkout.lock().await;
        ctx.orchestrator = orchestrator;
        if result.is_ok() {
            ctx.cart.clear();
        }
    }

    let order = result.map_err(payment_error_to_response)?;
    info!("Order confirmed: {}", order.transaction_id);
    Ok(Json(OrderView::from(order)))
}

/// The OTP flow in progress, resumed from the session store when the
/// process has restarted since the OTP was sent
async fn active_otp<'a>(
    state: &AppState,
    ctx: &'a mut CheckoutContext,
) -> Result<&'a mut OtpVerification, ApiError> {
    if ctx.otp.is_none() {
        let flow = state.resume_otp().await.map_err(payment_error_to_response)?;
        if *flow.state() == OtpState::Idle {
            return Err(not_found("No OTP verification in progress"));
        }
        ctx.otp = Some(flow);
    }
    ctx.otp
        .as_mut()
        .ok_or_else(|| not_found("No OTP verification in progress"))
}

/// Countdown and binding of the OTP step
pub async fn otp_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let mut guard = state.checkout.lock().await;
    let otp = active_otp(&state, &mut guard).await?;
    Ok(Json(otp.status()))
}

#[instrument(skip(state, request))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let _slot = state.begin_payment().ok_or_else(payment_busy)?;
    let (mut otp, mut cart) = {
        let mut guard = state.checkout.lock().await;
        let otp = active_otp(&state, &mut guard).await?.clone();
        (otp, guard.cart.clone())
    };

    // Malformed input leaves the code empty; verify reports it
    otp.set_code(&request.otp);
    let result = otp.verify(&mut cart).await;
    {
        let mut ctx = state.checkout.lock().await;
        ctx.otp = Some(otp);
        if result.is_ok() {
            ctx.cart.clear();
        }
    }

    let order = result.map_err(payment_error_to_response)?;
    info!("Order confirmed: {}", order.transaction_id);
    Ok(Json(OrderView::from(order)))
}

pub async fn resend_otp(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let _slot = state.begin_payment().ok_or_else(payment_busy)?;
    let mut otp = {
        let mut guard = state.checkout.lock().await;
        active_otp(&state, &mut guard).await?.clone()
    };

    let result = otp.resend().await;
    let status = otp.status();
    state.checkout.lock().await.otp = Some(otp);

    result.map_err(payment_error_to_response)?;
    Ok(Json(status))
}

/// Most recent completed order
pub async fn latest_order(State(state): State<AppState>) -> Result<Json<OrderView>, ApiError> {
    let order = state
        .sessions
        .order()
        .await
        .map_err(payment_error_to_response)?
        .ok_or_else(|| not_found("No order found"))?;
    Ok(Json(OrderView::from(order)))
}
