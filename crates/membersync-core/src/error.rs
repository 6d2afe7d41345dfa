//! Error types for the reconciliation engine.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `SyncError`.
pub type SyncResult<T> = Result<T, SyncError>;

/// Coarse classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The call did not complete in time.
    Timeout,
    /// The remote throttled the call (HTTP 429).
    RateLimited,
    /// The remote failed on its side (HTTP 5xx).
    ServerError,
    /// The request was rejected (HTTP 4xx other than 429).
    ClientError,
    /// Transport-level failure before any status was received.
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate-limited",
            Self::ServerError => "server-error",
            Self::ClientError => "client-error",
            Self::Io => "io",
        };
        f.write_str(s)
    }
}

/// A failed call against the directory or the user source.
///
/// Built at the client boundary from whatever the transport reported and
/// consumed by [`crate::RetryPolicy`], which only looks at `kind`, `status`
/// and `retry_after`.
#[derive(Debug, Clone, Error)]
#[error("{kind} failure{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct RemoteError {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
    pub message: String,
}

impl RemoteError {
    /// Classifies an HTTP status code.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => FailureKind::RateLimited,
            500..=599 => FailureKind::ServerError,
            _ => FailureKind::ClientError,
        };
        Self {
            kind,
            status: Some(status),
            retry_after: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Io,
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// A malformed or unexpected response. Never retried.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ClientError,
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// Attaches a server-provided retry-after hint.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Whether the call may succeed if repeated.
    ///
    /// Timeouts are always retryable. With a status, 429 and any 5xx are
    /// retryable. Without a status, transport and server-side failures are
    /// retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if self.kind == FailureKind::Timeout {
            return true;
        }
        match self.status {
            Some(status) => status == 429 || (500..=599).contains(&status),
            None => matches!(
                self.kind,
                FailureKind::Io | FailureKind::RateLimited | FailureKind::ServerError
            ),
        }
    }
}

/// Errors surfaced by the engine and its building blocks.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote call failed and was not retried.
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// A dispatched operation did not finish within its time limit.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// All retry attempts failed with transient errors.
    #[error("{operation} for {key} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: String,
        key: String,
        attempts: u32,
        source: RemoteError,
    },

    /// The operation failed with an error that retrying cannot fix.
    #[error("{operation} for {key} failed on attempt {attempt} (not retryable): {source}")]
    NonRetryable {
        operation: String,
        key: String,
        attempt: u32,
        source: RemoteError,
    },

    /// Waiting for an admission permit was interrupted.
    #[error("Waiting for a {limiter} permit was interrupted")]
    Interrupted { limiter: String },

    /// A dispatched task panicked or was cancelled by the runtime.
    #[error("Dispatched task failed: {0}")]
    TaskFailed(String),

    /// The user source could not deliver a complete user list.
    #[error("User source fetch failed: {0}")]
    Source(String),
}

impl SyncError {
    /// Returns true if this is a per-operation timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The underlying remote error, if any.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e) => Some(e),
            Self::RetriesExhausted { source, .. } | Self::NonRetryable { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
