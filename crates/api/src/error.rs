//! API error types.

/// Errors from the API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request never produced a decodable API answer
    /// (non-2xx status without an envelope, failed chunk PUT, …).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid access token")]
    InvalidToken,
}

impl ApiError {
    /// Returns `true` for failures where repeating the request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http(e) => !e.is_builder() && !e.is_decode(),
            ApiError::Transport(_) => true,
            _ => false,
        }
    }
}
