use thiserror::Error;

/// Error types that can occur while running a code review request.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// HTTP transport or provider-side failure
    #[error("HTTP error: {0}")]
    HttpError(String),
    /// Missing or rejected API credential
    #[error("Auth error: {0}")]
    AuthError(String),
    /// The provider finished without producing any text
    #[error("No response received from {0}")]
    EmptyResponse(String),
    /// The request was aborted, either by the user or by a newer submission.
    /// Set at the point where the cancellation signal is observed; callers
    /// branch on this variant, never on message text.
    #[error("review cancelled")]
    Cancelled,
    /// Input rejected before any request was created
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// API response parsing or format error
    #[error("Response format error: {0}")]
    ResponseFormatError(String),
    /// JSON serialization/deserialization errors
    #[error("JSON parse error: {0}")]
    JsonError(String),
    /// History persistence failure
    #[error("History error: {0}")]
    HistoryError(String),
}

impl From<reqwest::Error> for ReviewError {
    fn from(err: reqwest::Error) -> Self {
        ReviewError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for ReviewError {
    fn from(err: serde_json::Error) -> Self {
        ReviewError::JsonError(format!(
            "{} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}

impl ReviewError {
    /// True when the error represents an aborted request rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReviewError::Cancelled)
    }
}
