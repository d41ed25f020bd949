use serde::Deserialize;
use thiserror::Error;

/// Error code the aggregator uses when an item's credentials have expired and
/// the user has to go through the link flow again.
pub const REAUTH_ERROR_CODE: &str = "ITEM_LOGIN_REQUIRED";

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {code} (status {status}): {message}")]
    Api {
        status: u16,
        error_type: String,
        code: String,
        message: String,
    },
    #[error("Login required for this item: {message}")]
    ReauthRequired { message: String },
    #[error("Transaction feed ended after {received} of {total} records")]
    TruncatedFeed { received: usize, total: usize },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Implemented by error types that can tell whether the failed call would
/// succeed after the user re-authenticates the item.
pub trait ReauthSignal {
    fn requires_reauth(&self) -> bool;
}

impl ReauthSignal for AggregatorError {
    fn requires_reauth(&self) -> bool {
        matches!(self, AggregatorError::ReauthRequired { .. })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub display_message: Option<String>,
}

impl AggregatorError {
    /// Classifies an error response once, at the client boundary.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ApiErrorBody>(body) {
            Ok(err) if err.error_code == REAUTH_ERROR_CODE => AggregatorError::ReauthRequired {
                message: err.display_message.unwrap_or(err.error_message),
            },
            Ok(err) => AggregatorError::Api {
                status,
                error_type: err.error_type,
                code: err.error_code,
                message: err.error_message,
            },
            Err(_) => AggregatorError::Api {
                status,
                error_type: String::new(),
                code: String::new(),
                message: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }
}
