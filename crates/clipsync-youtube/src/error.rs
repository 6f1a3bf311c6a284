//! YouTube client error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for YouTube operations.
pub type YoutubeResult<T> = Result<T, YoutubeError>;

/// Server statuses worth retrying.
pub const RETRIABLE_STATUS_CODES: [u16; 4] = [500, 502, 503, 504];

/// Errors that can occur while talking to the YouTube API.
#[derive(Debug, Error)]
pub enum YoutubeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Server error {0}: {1}")]
    ServerError(u16, String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Nothing to upload: {} is empty", .0.display())]
    EmptyFile(PathBuf),

    #[error("Upload stalled at byte {0}")]
    Stalled(u64),

    #[error("Giving up after {retries} retries: {last_error}")]
    RetriesExhausted { retries: u32, last_error: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl YoutubeError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            s if RETRIABLE_STATUS_CODES.contains(&s) => Self::ServerError(s, body),
            401 | 403 => Self::AuthError(format!("HTTP {}: {}", status, body)),
            _ => Self::RequestFailed(format!("HTTP {}: {}", status, body)),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            YoutubeError::ServerError(status, _) => Some(*status),
            YoutubeError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Transient failures: designated server statuses and transport/IO errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            YoutubeError::ServerError(..) | YoutubeError::Stalled(_) | YoutubeError::Io(_) => true,
            YoutubeError::Network(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            _ => false,
        }
    }

    /// Environment problems that abort the whole run.
    pub fn is_config(&self) -> bool {
        matches!(self, YoutubeError::ConfigError(_))
    }
}
