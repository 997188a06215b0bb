//! # Card Details
//!
//! Transient card input and the local checks run before any network call.
//! Card data is never serialized or persisted.

use crate::error::{PaymentError, PaymentResult};
use chrono::{Datelike, NaiveDate};
use std::fmt;

/// Required digit count after normalisation
pub const CARD_NUMBER_DIGITS: usize = 16;

/// Card network, guessed from the leading digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardBrand {
    Visa,
    Mastercard,
    Unknown,
}

impl CardBrand {
    pub fn detect(number: &str) -> Self {
        let digits = normalize_card_number(number);
        if digits.starts_with('4') {
            return CardBrand::Visa;
        }
        match digits.get(..2) {
            Some("51" | "52" | "53" | "54" | "55") => CardBrand::Mastercard,
            _ => CardBrand::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardBrand::Visa => "Visa",
            CardBrand::Mastercard => "Mastercard",
            CardBrand::Unknown => "",
        }
    }
}

/// Card fields as typed by the shopper
#[derive(Clone, Default)]
pub struct CardDetails {
    pub number: String,
    pub holder: String,
    /// Two digits, "01".."12"
    pub expiry_month: String,
    /// Two digits
    pub expiry_year: String,
    pub cvv: String,
}

// Keeps the PAN and CVV out of logs.
impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &mask_card_number(&self.number))
            .field("holder", &self.holder)
            .field("expiry", &self.expiry())
            .finish_non_exhaustive()
    }
}

impl CardDetails {
    pub fn new(
        number: impl Into<String>,
        holder: impl Into<String>,
        expiry_month: impl Into<String>,
        expiry_year: impl Into<String>,
        cvv: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            holder: holder.into(),
            expiry_month: expiry_month.into(),
            expiry_year: expiry_year.into(),
            cvv: cvv.into(),
        }
    }

    /// Digits-only card number, or a validation error unless exactly 16 digits
    pub fn normalized_number(&self) -> PaymentResult<String> {
        let digits = normalize_card_number(&self.number);
        if digits.len() != CARD_NUMBER_DIGITS {
            return Err(PaymentError::validation("Invalid Card Number"));
        }
        Ok(digits)
    }

    /// Expiry check against `today`
    pub fn check_expiry(&self, today: NaiveDate) -> PaymentResult<()> {
        if is_expiry_valid(&self.expiry_month, &self.expiry_year, today) {
            Ok(())
        } else {
            Err(PaymentError::validation("Card is expired or invalid"))
        }
    }

    /// `MM/YY`
    pub fn expiry(&self) -> String {
        format!("{}/{}", self.expiry_month, self.expiry_year)
    }

    pub fn brand(&self) -> CardBrand {
        CardBrand::detect(&self.number)
    }
}

/// Strip every non-digit character
pub fn normalize_card_number(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// `****1234` mask for logs
pub fn mask_card_number(raw: &str) -> String {
    let digits = normalize_card_number(raw);
    let tail = digits.len().saturating_sub(4);
    format!("****{}", &digits[tail..])
}

/// Two-digit month/year expiry rule.
///
/// Valid iff month ∈ [1,12] and either the year is after the current
/// two-digit year, or it is the current year and the month has not passed.
pub fn is_expiry_valid(month: &str, year: &str, today: NaiveDate) -> bool {
    let two_digits = |s: &str| s.len() == 2 && s.chars().all(|c| c.is_ascii_digit());
    if !two_digits(month) || !two_digits(year) {
        return false;
    }
    let (Ok(month), Ok(year)) = (month.parse::<u32>(), year.parse::<i32>()) else {
        return false;
    };
    if !(1..=12).contains(&month) {
        return false;
    }

    let current_year = today.year() % 100;
    let current_month = today.month();
    year > current_year || (year == current_year && month >= current_month)
}
