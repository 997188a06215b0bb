//! UPI intent links and device detection.

use crate::product::Price;
use serde::{Deserialize, Serialize};

/// User-agent fragments that mark a handset able to open `upi://` links
const MOBILE_AGENTS: &[&str] = &[
    "android",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

/// Case-insensitive match against the known mobile user agents
pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    MOBILE_AGENTS.iter().any(|m| ua.contains(m))
}

fn encode(component: &str) -> String {
    url::form_urlencoded::byte_serialize(component.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// `handle@provider`, each side non-empty and limited to letters, digits,
/// `.`, `-` and `_`
pub fn is_valid_upi_id(upi_id: &str) -> bool {
    let allowed = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    };
    match upi_id.split_once('@') {
        Some((handle, provider)) => allowed(handle) && allowed(provider),
        None => false,
    }
}

/// `upi://pay` link. Every component is percent-encoded; the `@` of the
/// payee address is kept literal, as UPI apps expect.
pub fn build_upi_url(payee_address: &str, payee_name: &str, note: &str, amount: Price) -> String {
    format!(
        "upi://pay?pa={}&pn={}&tn={}&am={}&cu={}",
        encode(payee_address).replace("%40", "@"),
        encode(payee_name),
        encode(note),
        amount.fixed2(),
        amount.currency.code(),
    )
}

/// How the shopper completes a UPI payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum UpiHandoff {
    /// Navigate the handset to the link
    DeepLink(String),
    /// Render the link as a QR code to scan from a phone
    QrCode(String),
}

impl UpiHandoff {
    pub fn for_user_agent(user_agent: &str, url: String) -> Self {
        if is_mobile_user_agent(user_agent) {
            UpiHandoff::DeepLink(url)
        } else {
            UpiHandoff::QrCode(url)
        }
    }

    pub fn url(&self) -> &str {
        match self {
            UpiHandoff::DeepLink(url) | UpiHandoff::QrCode(url) => url,
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            UpiHandoff::DeepLink(_) => "Opening your UPI app to complete the payment.",
            UpiHandoff::QrCode(_) => "Scan this QR code with any UPI app to pay.",
        }
    }
}
