//! # Checkout Error Types
//!
//! Typed error handling for the shopfusion checkout engine.
//! All checkout operations return `Result<T, PaymentError>`.
//!
//! Every variant is recoverable: callers turn it into a visible message and
//! roll back to the previous interactive stage.

use thiserror::Error;

/// Core error type for all checkout operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// Bad local input (card number, expiry, missing bank or UPI id).
    /// Raised before any network call is made.
    #[error("{0}")]
    Validation(String),

    /// The payment backend answered with a non-success status and a reason
    #[error("{message}")]
    RemoteRejection { endpoint: String, message: String },

    /// Network or response-parsing failure talking to the backend
    #[error("Network error: {0}")]
    Transport(String),

    /// The selected path has no remote call behind it
    #[error("{0}")]
    DeadPath(String),

    /// Configuration errors (bad env values, unreadable catalog)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Session store read/write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        PaymentError::Validation(message.into())
    }

    /// Shorthand for a rejection returned by `endpoint`
    pub fn rejected(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::RemoteRejection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Only transport failures are retried; a server rejection is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Transport(_))
    }

    /// Message suitable for showing to the shopper as-is
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Validation(msg) | PaymentError::DeadPath(msg) => msg.clone(),
            PaymentError::RemoteRejection { message, .. } => message.clone(),
            PaymentError::Transport(_) => "Something went wrong. Please try again.".to_string(),
            _ => "Unexpected error. Please try again later.".to_string(),
        }
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Validation(_) => 400,
            PaymentError::RemoteRejection { .. } => 402,
            PaymentError::Transport(_) => 503,
            PaymentError::DeadPath(_) => 501,
            PaymentError::Configuration(_) => 500,
            PaymentError::Storage(_) => 500,
            PaymentError::Serialization(_) => 500,
            PaymentError::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Serialization(err.to_string())
    }
}

/// Result type alias for checkout operations
pub type PaymentResult<T> = Result<T, PaymentError>;
