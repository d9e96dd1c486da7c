//! Error types for the application

use serde::Serialize;
use thiserror::Error;

/// Result type alias using our HedgeError
pub type Result<T> = std::result::Result<T, HedgeError>;

/// Main error type for coordinator, backend and history operations
#[derive(Error, Debug)]
pub enum HedgeError {
    /// Request carried no authenticated user
    #[error("Authentication required")]
    AuthRequired,

    /// Required request parameters were absent
    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    /// Trade-history limit was non-numeric or below 1
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// Primary credential missing or not active
    #[error("No active primary credential selected")]
    NoCredential,

    /// Hedge credential missing or not active
    #[error("No active hedge credential selected")]
    NoHedgeCredential,

    /// Neither last traded nor mark price is usable for the symbol
    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    /// Position parameters or calculation are not valid
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Backend does not know the subscription
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Edit cancelled the old subscription but could not create the replacement
    #[error("Subscription {cancelled_id} was cancelled but its replacement failed: {source}")]
    EditPartialFailure {
        cancelled_id: String,
        #[source]
        source: Box<HedgeError>,
    },

    /// Transport errors, including request timeouts
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Response body did not have the expected shape
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for HedgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HedgeError::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            HedgeError::InvalidResponse(err.to_string())
        } else {
            HedgeError::Network(err.to_string())
        }
    }
}

impl HedgeError {
    /// HTTP status used when this error is returned from a read endpoint
    pub fn http_status(&self) -> u16 {
        match self {
            HedgeError::AuthRequired => 401,
            HedgeError::MissingParameters(_) | HedgeError::InvalidLimit(_) => 400,
            HedgeError::SubscriptionNotFound(_) => 404,
            _ => 500,
        }
    }

    /// Stable machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            HedgeError::AuthRequired => "AUTH_REQUIRED",
            HedgeError::MissingParameters(_) => "MISSING_PARAMETERS",
            HedgeError::InvalidLimit(_) => "INVALID_LIMIT",
            HedgeError::SubscriptionNotFound(_) => "NOT_FOUND",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Whether this error happened before any request was sent
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            HedgeError::NoCredential
                | HedgeError::NoHedgeCredential
                | HedgeError::PriceUnavailable(_)
                | HedgeError::InvalidPosition(_)
        )
    }

    /// Whether the backend reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            HedgeError::SubscriptionNotFound(_) => true,
            HedgeError::Backend { status, message } => {
                *status == 404 || message.to_lowercase().contains("not found")
            }
            _ => false,
        }
    }
}

/// Error payload returned by read endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl From<&HedgeError> for ErrorBody {
    fn from(err: &HedgeError) -> Self {
        // Internal details stay in the logs
        let error = match err.http_status() {
            500 => "Failed to fetch trade history".to_string(),
            _ => err.to_string(),
        };
        Self {
            error,
            code: err.error_code(),
        }
    }
}
