// Error type for the audit client. Every failure of the library surface is
// one of these variants; the binary wraps them with `anyhow` context.

use thiserror::Error;

/// Errors returned by [`crate::api::ApiClient`].
#[derive(Debug, Error)]
pub enum AuditError {
    /// The server could not be reached: connection refused, DNS failure,
    /// timeout, or the connection dropped mid-exchange.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered with something other than 200.
    #[error("audit request failed: {status} - {body}")]
    AuditRequestFailed { status: u16, body: String },

    /// The request payload could not be encoded as JSON.
    #[error("failed to serialize audit request: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The request payload breaks one of its invariants.
    #[error("invalid audit request: {0}")]
    InvalidRequest(String),

    /// An attachment could not be read in full.
    #[error("failed to read attachment '{file_name}': {source}")]
    Attachment {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    /// A 200 response whose body is not valid JSON.
    #[error("invalid audit response body: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AuditError {
    /// True when the failure was the configured timeout elapsing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AuditError::Transport(e) if e.is_timeout())
    }

    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuditError::AuditRequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
