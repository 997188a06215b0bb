//! # shop-wasm
//!
//! WebAssembly bindings for shopfusion-rs.
//!
//! This crate provides WASM-compatible functions for:
//! - Cart totals (exact or floored) with coupons
//! - Price formatting in rupees
//! - Payment form checks (card number, expiry, brand)
//! - UPI links and the mobile/desktop hand-off choice
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { calculate_cart_total, format_price } from 'shopfusion-wasm';
//!
//! await init();
//!
//! const total = calculate_cart_total(JSON.stringify([
//!   { id: 1, name: 'Echo Dot', price_paise: 449900, quantity: 1 }
//! ]), 'DISCOUNT100', false);
//!
//! console.log('Total:', format_price(total));
//! ```
//!
//! ## Building
//!
//! ```bash
//! wasm-pack build --target web
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shop_core::card::CARD_NUMBER_DIGITS;
use shop_core::{
    build_upi_url, is_expiry_valid, normalize_card_number, AmountPolicy, CardBrand, CartItem,
    CartStore, Currency, Price,
};
use wasm_bindgen::prelude::*;

const PAYEE_NAME: &str = "Demo Merchant";
const PAYMENT_NOTE: &str = "Demo Payment";

/// Cart item for WASM interface
#[derive(Debug, Serialize, Deserialize)]
#[wasm_bindgen]
pub struct WasmCartItem {
    id: u32,
    name: String,
    price_paise: i64,
    quantity: u32,
}

#[wasm_bindgen]
impl WasmCartItem {
    #[wasm_bindgen(constructor)]
    pub fn new(id: u32, name: String, price_paise: i64, quantity: u32) -> Self {
        Self {
            id,
            name,
            price_paise,
            quantity,
        }
    }

    #[wasm_bindgen(getter)]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.name.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn price_paise(&self) -> i64 {
        self.price_paise
    }

    #[wasm_bindgen(getter)]
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Line total in paise
    #[wasm_bindgen]
    pub fn total_paise(&self) -> i64 {
        self.to_cart_item().total().amount
    }

    /// Format total for display
    #[wasm_bindgen]
    pub fn format_total(&self) -> String {
        format_price(self.total_paise())
    }
}

impl WasmCartItem {
    fn to_cart_item(&self) -> CartItem {
        CartItem {
            id: self.id,
            name: self.name.clone(),
            price: Price::from_minor(self.price_paise, Currency::INR),
            image: String::new(),
            quantity: self.quantity,
        }
    }
}

/// Payable total in paise for a JSON array of cart items.
///
/// `floored` drops the paise the way the simple payment form does.
#[wasm_bindgen]
pub fn calculate_cart_total(
    items_json: &str,
    coupon: Option<String>,
    floored: bool,
) -> Result<i64, JsValue> {
    cart_total(items_json, coupon.as_deref(), floored).map_err(|e| JsValue::from_str(&e))
}

fn cart_total(items_json: &str, coupon: Option<&str>, floored: bool) -> Result<i64, String> {
    let items: Vec<WasmCartItem> =
        serde_json::from_str(items_json).map_err(|e| format!("Invalid cart items: {}", e))?;

    let mut cart = CartStore::from_items(items.iter().map(WasmCartItem::to_cart_item));
    if let Some(code) = coupon.filter(|c| !c.trim().is_empty()) {
        cart.apply_coupon(code).map_err(|e| e.user_message())?;
    }

    let policy = if floored {
        AmountPolicy::Floored
    } else {
        AmountPolicy::Precise
    };
    Ok(cart.total(policy).amount)
}

/// Format paise as a rupee string (e.g. "₹4499.00")
#[wasm_bindgen]
pub fn format_price(paise: i64) -> String {
    Price::from_minor(paise, Currency::INR).display()
}

/// Strip spaces and dashes from a card number
#[wasm_bindgen]
pub fn normalize_card(raw: &str) -> String {
    normalize_card_number(raw)
}

#[wasm_bindgen]
pub fn is_card_number_valid(raw: &str) -> bool {
    normalize_card_number(raw).len() == CARD_NUMBER_DIGITS
}

/// "Visa", "Mastercard", or "" when unknown
#[wasm_bindgen]
pub fn detect_card_brand(raw: &str) -> String {
    CardBrand::detect(raw).as_str().to_string()
}

/// Two-digit MM/YY expiry check against the browser clock
#[wasm_bindgen]
pub fn is_card_expiry_valid(month: &str, year: &str) -> bool {
    let now = js_sys::Date::new_0();
    expiry_valid_on(month, year, now.get_full_year() as i32, now.get_month() + 1)
}

fn expiry_valid_on(month: &str, year: &str, current_year: i32, current_month: u32) -> bool {
    NaiveDate::from_ymd_opt(current_year, current_month, 1)
        .map(|today| is_expiry_valid(month, year, today))
        .unwrap_or(false)
}

/// `upi://pay` link for a payee address and an amount in paise
#[wasm_bindgen]
pub fn upi_payment_url(upi_id: &str, amount_paise: i64) -> String {
    build_upi_url(
        upi_id,
        PAYEE_NAME,
        PAYMENT_NOTE,
        Price::from_minor(amount_paise, Currency::INR),
    )
}

/// `handle@provider` shape check for the UPI form field
#[wasm_bindgen]
pub fn is_upi_id_valid(upi_id: &str) -> bool {
    shop_core::is_valid_upi_id(upi_id.trim())
}

/// Whether a UPI link should open directly instead of showing a QR code
#[wasm_bindgen]
pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    shop_core::is_mobile_user_agent(user_agent)
}

/// Log to browser console
#[wasm_bindgen]
pub fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

/// Get library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
