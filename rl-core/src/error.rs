//! Global error types for RocketLink.
//!
//! All error categories across the workspace are unified into a single
//! `RlError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using RlError.
pub type RlResult<T> = Result<T, RlError>;

/// Unified error type covering all error categories in RocketLink.
#[derive(Error, Debug)]
pub enum RlError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Session errors --
    /// The transport could not be opened.
    #[error("connect error: {0}")]
    Connect(String),

    /// The server rejected our credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The connection dropped while a request was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// A frame was malformed or arrived in an unexpected state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No response arrived within the allowed window.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A server method call returned an error object.
    #[error("method {method} failed: {reason}")]
    MethodFailed {
        /// Name of the method that was called.
        method: String,
        /// Reason reported by the server.
        reason: String,
    },

    /// A request was issued while the session was not authenticated.
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// An operation needs a focused room and there is none.
    #[error("no room is focused")]
    NoActiveRoom,

    /// The session task has stopped.
    #[error("session stopped")]
    SessionClosed,

    // -- REST errors --
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(String),

    /// Server returned an error response.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from server.
        message: String,
    },

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RlError {
    /// Whether this error is worth retrying by reconnecting.
    ///
    /// Authentication failures and handshake rejections are surfaced to the
    /// user instead.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RlError::Connect(_) | RlError::ConnectionLost | RlError::Timeout(_) | RlError::Http(_)
        )
    }
}

impl From<serde_json::Error> for RlError {
    fn from(e: serde_json::Error) -> Self {
        RlError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RlError {
    fn from(e: toml::de::Error) -> Self {
        RlError::Config(e.to_string())
    }
}
