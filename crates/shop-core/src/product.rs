//! # Product Types
//!
//! Product catalog types for the storefront.
//! Products are loaded from `config/products.toml`.

use serde::{Deserialize, Serialize};

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    INR,
    USD,
}

impl Currency {
    /// Returns the ISO 4217 currency code (uppercase, as UPI expects it)
    pub fn code(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
        }
    }

    /// Display symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::INR => "₹",
            Currency::USD => "$",
        }
    }

    /// Smallest units per whole unit (paise per rupee, cents per dollar)
    pub fn minor_per_major(&self) -> i64 {
        100
    }

    /// Convert a decimal amount to the smallest currency unit
    pub fn to_smallest_unit(&self, amount: f64) -> i64 {
        (amount * self.minor_per_major() as f64).round() as i64
    }

    /// Convert from smallest unit back to decimal
    pub fn from_smallest_unit(&self, amount: i64) -> f64 {
        amount as f64 / self.minor_per_major() as f64
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Price with amount in smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Price {
    /// Amount in smallest currency unit (paise for INR)
    pub amount: i64,
    /// Currency
    #[serde(default)]
    pub currency: Currency,
}

impl Price {
    /// Create a new price from decimal amount
    pub fn new(amount: f64, currency: Currency) -> Self {
        Self {
            amount: currency.to_smallest_unit(amount),
            currency,
        }
    }

    /// Create a price from whole rupees
    pub fn rupees(amount: i64) -> Self {
        Self::from_minor(amount * Currency::INR.minor_per_major(), Currency::INR)
    }

    /// Create a price from smallest unit
    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Zero in the given currency
    pub fn zero(currency: Currency) -> Self {
        Self::from_minor(0, currency)
    }

    /// Get the decimal amount
    pub fn as_decimal(&self) -> f64 {
        self.currency.from_smallest_unit(self.amount)
    }

    /// Multiply by a quantity
    pub fn times(&self, quantity: u32) -> Self {
        Self::from_minor(self.amount * i64::from(quantity), self.currency)
    }

    /// Drop the fractional part (round down to a whole unit)
    pub fn floored(&self) -> Self {
        let unit = self.currency.minor_per_major();
        Self::from_minor(self.amount.div_euclid(unit) * unit, self.currency)
    }

    /// Subtract, never going below zero
    pub fn saturating_sub(&self, other: Price) -> Self {
        Self::from_minor((self.amount - other.amount).max(0), self.currency)
    }

    /// Fixed two-decimal rendering without symbol (e.g. "200.00")
    pub fn fixed2(&self) -> String {
        let unit = self.currency.minor_per_major();
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.abs();
        format!("{}{}.{:02}", sign, abs / unit, abs % unit)
    }

    /// Format for display (e.g., "₹4499.00")
    pub fn display(&self) -> String {
        format!("{}{}", self.currency.symbol(), self.fixed2())
    }
}

/// A product in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Catalog identifier
    pub id: u32,

    /// Display name
    pub name: String,

    /// Unit price
    pub price: Price,

    /// Image reference (asset path or URL)
    #[serde(default)]
    pub image: String,

    /// Whether this product is available for purchase
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// Create a new active product
    pub fn new(id: u32, name: impl Into<String>, price: Price) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            image: String::new(),
            active: true,
        }
    }

    /// Builder: set image reference
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }
}

/// Product catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub products: Vec<Product>,
}

impl ProductCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product to the catalog
    pub fn add(&mut self, product: Product) {
        self.products.push(product);
    }

    /// Find a product by ID
    pub fn get(&self, id: u32) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Get all active products
    pub fn active_products(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.active)
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
