//! ERP adapter error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// Error that can occur while talking to the ERP.
#[derive(Debug, Error)]
pub enum ErpError {
    // Transport errors (transient, retried)
    /// Failed to establish a connection to the ERP endpoint.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A request exceeded the configured timeout.
    #[error("request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The ERP answered but reported itself temporarily unavailable.
    #[error("ERP unavailable: {message}")]
    Unavailable { message: String },

    // Authentication (re-auth once mid-run, otherwise fatal to the run)
    /// Credentials were rejected, or the cached session expired.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // Permanent errors
    /// The server returned something that is not a valid RPC response.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// The server returned an explicit RPC fault.
    #[error("RPC fault {code}: {message}")]
    Protocol { code: i64, message: String },

    /// Adapter configuration is invalid (bad URL, missing database, ...).
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The ERP endpoint does not expose a required RPC capability.
    ///
    /// Raised by the startup probe; this is a fatal configuration error,
    /// never worked around at runtime.
    #[error("ERP capability missing: {capability}")]
    CapabilityMissing { capability: String },

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ErpError {
    /// Shorthand for a connection failure without a source error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ErpError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an authentication failure.
    pub fn auth(message: impl Into<String>) -> Self {
        ErpError::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Shorthand for an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        ErpError::InvalidResponse {
            message: message.into(),
        }
    }

    /// Check if this error is transient and the call should be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErpError::ConnectionFailed { .. } | ErpError::Timeout { .. } | ErpError::Unavailable { .. }
        )
    }

    /// Check if this error is an authentication/authorization failure.
    ///
    /// The gateway reacts to these by re-authenticating exactly once.
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ErpError::AuthenticationFailed { .. })
    }

    /// Classify a `reqwest` transport error.
    pub(crate) fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ErpError::Timeout { timeout_secs }
        } else if err.is_connect() {
            ErpError::ConnectionFailed {
                message: err.to_string(),
                source: Some(Box::new(err)),
            }
        } else {
            ErpError::ConnectionFailed {
                message: format!("transport error: {err}"),
                source: Some(Box::new(err)),
            }
        }
    }
}

/// Result alias for ERP adapter operations.
pub type ErpResult<T> = std::result::Result<T, ErpError>;
