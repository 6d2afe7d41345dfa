//! Error types for the Microsoft Graph directory client.

use chrono::{DateTime, Utc};
use membersync_core::RemoteError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `GraphError`.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur when talking to Microsoft Graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The token endpoint rejected the client credentials request.
    #[error("Authentication failed with status {status}: {message}")]
    Auth { status: u16, message: String },

    /// Microsoft Graph answered with a non-success status.
    #[error("Graph API error {status} ({code}): {message}")]
    GraphApi {
        status: u16,
        code: String,
        message: String,
        retry_after: Option<Duration>,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The response was well-formed but missing something we need.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// HTTP status of the failed call, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::GraphApi { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for a Graph error with this status whose message contains `needle`.
    #[must_use]
    pub fn is_api_error(&self, expected: u16, needle: &str) -> bool {
        matches!(self, Self::GraphApi { status, message, .. }
            if *status == expected && message.contains(needle))
    }
}

impl From<GraphError> for RemoteError {
    fn from(err: GraphError) -> Self {
        let message = err.to_string();
        match err {
            GraphError::GraphApi {
                status,
                retry_after,
                ..
            } => RemoteError::from_status(status, message).with_retry_after(retry_after),
            GraphError::Auth { status, .. } => RemoteError::from_status(status, message),
            GraphError::Http(e) if e.is_timeout() => RemoteError::timeout(message),
            GraphError::Http(e) if e.is_decode() => RemoteError::invalid_response(message),
            GraphError::Http(e) => match e.status() {
                Some(status) => RemoteError::from_status(status.as_u16(), message),
                None => RemoteError::io(message),
            },
            GraphError::Config(_)
            | GraphError::Json(_)
            | GraphError::Url(_)
            | GraphError::InvalidResponse(_) => RemoteError::invalid_response(message),
        }
    }
}

/// Parses a `Retry-After` header value.
///
/// Accepts delta-seconds or an HTTP date. Dates in the past and zero
/// values yield `None`.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return (secs > 0).then(|| Duration::from_secs(secs));
    }

    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = when.with_timezone(&Utc) - Utc::now();
    wait.to_std().ok().filter(|d| !d.is_zero())
}
