//! Error types for the Qlik Cloud client.

use membersync_core::SyncError;
use thiserror::Error;

/// Result type alias using `QlikError`.
pub type QlikResult<T> = Result<T, QlikError>;

/// Errors that can occur when reading users and audits from Qlik Cloud.
#[derive(Debug, Error)]
pub enum QlikError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The API answered with a non-success status.
    #[error("{resource} API returned {status}")]
    Api { resource: &'static str, status: u16 },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<QlikError> for SyncError {
    fn from(err: QlikError) -> Self {
        SyncError::Source(err.to_string())
    }
}
