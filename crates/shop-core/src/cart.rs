//! # Cart Store
//!
//! The shopper's cart. Owned by whoever drives the storefront and lent to the
//! checkout components; every mutation goes through a method here.

use crate::error::{PaymentError, PaymentResult};
use crate::product::{Currency, Price, Product};
use serde::{Deserialize, Serialize};

/// Coupon codes and their flat discount in paise
const COUPONS: &[(&str, i64)] = &[("DISCOUNT100", 10_000)];

/// A product snapshot with a quantity, unique by `id` within a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: u32,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub image: String,
    pub quantity: u32,
}

impl CartItem {
    /// Snapshot a catalog product with quantity 1
    pub fn from_product(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
            image: product.image.clone(),
            quantity: 1,
        }
    }

    /// Line total (price × quantity)
    pub fn total(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// How the payable amount is derived from the cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountPolicy {
    /// Exact sum of line totals
    #[default]
    Precise,
    /// Sum rounded down to a whole currency unit (simple payment form)
    Floored,
}

/// An applied coupon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount: Price,
}

/// In-memory cart
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartStore {
    items: Vec<CartItem>,
    #[serde(default)]
    coupon: Option<Coupon>,
    #[serde(default)]
    currency: Currency,
}

impl CartStore {
    /// Create an empty cart
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cart from existing items (merging duplicate ids)
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            if item.quantity == 0 {
                continue;
            }
            match cart.find_mut(item.id) {
                Some(existing) => existing.quantity += item.quantity,
                None => cart.items.push(item),
            }
        }
        cart
    }

    /// Add a product, or bump its quantity if already present
    pub fn add(&mut self, product: &Product) -> &CartItem {
        let idx = match self.items.iter().position(|i| i.id == product.id) {
            Some(idx) => {
                self.items[idx].quantity += 1;
                idx
            }
            None => {
                self.items.push(CartItem::from_product(product));
                self.items.len() - 1
            }
        };
        &self.items[idx]
    }

    /// Increment an existing line. Returns false if the id is not in the cart.
    pub fn increment(&mut self, id: u32) -> bool {
        match self.find_mut(id) {
            Some(item) => {
                item.quantity += 1;
                true
            }
            None => false,
        }
    }

    /// Decrement a line, removing it when the quantity reaches zero.
    /// Returns false if the id is not in the cart.
    pub fn decrement(&mut self, id: u32) -> bool {
        let Some(item) = self.find_mut(id) else {
            return false;
        };
        item.quantity -= 1;
        if item.quantity == 0 {
            self.remove(id);
        }
        true
    }

    /// Set a line's quantity; zero removes the line
    pub fn set_quantity(&mut self, id: u32, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(id);
        }
        match self.find_mut(id) {
            Some(item) => {
                item.quantity = quantity;
                true
            }
            None => false,
        }
    }

    /// Remove a line entirely
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        self.items.len() != before
    }

    /// Empty the cart and drop any coupon
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon = None;
    }

    /// Apply a coupon code
    pub fn apply_coupon(&mut self, code: &str) -> PaymentResult<&Coupon> {
        let (code, minor) = COUPONS
            .iter()
            .find(|(c, _)| *c == code.trim())
            .ok_or_else(|| PaymentError::validation("Invalid coupon code."))?;

        let coupon = Coupon {
            code: code.to_string(),
            discount: Price::from_minor(*minor, self.currency),
        };
        Ok(&*self.coupon.insert(coupon))
    }

    /// Currently applied coupon
    pub fn coupon(&self) -> Option<&Coupon> {
        self.coupon.as_ref()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn get(&self, id: u32) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across lines
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Σ price × quantity, exact
    pub fn subtotal(&self) -> Price {
        let amount = self.items.iter().map(|i| i.total().amount).sum();
        Price::from_minor(amount, self.currency)
    }

    /// Applied discount (zero without a coupon)
    pub fn discount(&self) -> Price {
        self.coupon
            .as_ref()
            .map(|c| c.discount)
            .unwrap_or(Price::zero(self.currency))
    }

    /// Payable amount under `policy`. Never negative.
    pub fn total(&self, policy: AmountPolicy) -> Price {
        let total = self.subtotal().saturating_sub(self.discount());
        match policy {
            AmountPolicy::Precise => total,
            AmountPolicy::Floored => total.floored(),
        }
    }

    /// Copy of the current lines, for order records
    pub fn snapshot(&self) -> Vec<CartItem> {
        self.items.clone()
    }

    fn find_mut(&mut self, id: u32) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }
}
