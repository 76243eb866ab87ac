//! Error taxonomy for the synchronization engine
//!
//! Whole-operation failures (configuration, exhausted retries, malformed
//! top-level responses) propagate to the caller. Per-item failures are
//! absorbed by the paginator and combiner and only surface as logs and
//! degraded rows.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Transient HTTP error {status}: {body}")]
    TransientHttp { status: u16, body: String },

    #[error("HTTP request failed with status {status}: {body}")]
    TerminalHttp { status: u16, body: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Exhausted retries after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: Box<SyncError>,
    },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Partial batch failure for {item}: {message}")]
    PartialBatch { item: String, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Classify a non-2xx HTTP status: 429 and 5xx may be retried, everything
    /// else is terminal.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 429 || status >= 500 {
            Self::TransientHttp { status, body }
        } else {
            Self::TerminalHttp { status, body }
        }
    }

    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientHttp { .. } | Self::Network { .. })
    }

    /// HTTP status carried by the error, looking through exhausted retries.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransientHttp { status, .. } | Self::TerminalHttp { status, .. } => Some(*status),
            Self::ExhaustedRetries { last_error, .. } => last_error.status(),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        Self::storage(error.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::malformed(error.to_string())
    }
}
