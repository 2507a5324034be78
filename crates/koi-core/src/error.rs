//! Unified client error types for Koi.
//!
//! All crates map their internal errors into [`ClientError`] for consistent
//! propagation through the ? operator.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the client.
///
/// Transport-level failures are retried inside the connection layer and
/// only `ReconnectExhausted` and `SendFailed` are expected to reach the
/// embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A connection-level failure (dial error, dropped socket, dead link).
    Transport,
    /// The reconnect policy ran out of attempts; the client is offline.
    ReconnectExhausted,
    /// A message could not be delivered over the transport *or* the
    /// REST fallback.
    SendFailed,
    /// An out-of-order or malformed call signal. Logged and ignored by
    /// the call machine; surfaced only when a local command is illegal.
    InvalidSignal,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A configuration error occurred.
    Configuration,
    /// A REST request to the backend failed.
    Rest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "TRANSPORT"),
            Self::ReconnectExhausted => write!(f, "RECONNECT_EXHAUSTED"),
            Self::SendFailed => write!(f, "SEND_FAILED"),
            Self::InvalidSignal => write!(f, "INVALID_SIGNAL"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Rest => write!(f, "REST"),
        }
    }
}

/// The unified client error used throughout Koi.
///
/// Crate-specific errors are mapped into `ClientError` using `From` impls
/// or explicit `.map_err()` calls, giving a single error type at the
/// application boundary.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ClientError {
    /// Create a new client error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new client error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create a reconnect-exhausted error.
    pub fn reconnect_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReconnectExhausted, message)
    }

    /// Create a send-failed error.
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SendFailed, message)
    }

    /// Create an invalid-signal error.
    pub fn invalid_signal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSignal, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a REST error.
    pub fn rest(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rest, message)
    }
}

impl Clone for ClientError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
