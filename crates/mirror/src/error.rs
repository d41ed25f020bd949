use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Mirror API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected mirror data: {0}")]
    Decode(String),
    #[error("Invalid mirror URL: {0}")]
    InvalidUrl(String),
    #[error("Record {0} has no mirror row to write to")]
    NotStored(String),
}

impl MirrorError {
    /// Builds an `Api` error from a response body, which comes either as
    /// `{"error": {"type", "message"}}` or as `{"error": "CODE"}`.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| match v.get("error") {
                Some(serde_json::Value::String(code)) => Some(code.clone()),
                Some(err) => {
                    let kind = err.get("type").and_then(|t| t.as_str()).unwrap_or_default();
                    let message = err.get("message").and_then(|m| m.as_str()).unwrap_or_default();
                    Some(match (kind.is_empty(), message.is_empty()) {
                        (false, false) => format!("{kind}: {message}"),
                        (false, true) => kind.to_string(),
                        _ => message.to_string(),
                    })
                }
                None => None,
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
        MirrorError::Api { status, message }
    }
}
