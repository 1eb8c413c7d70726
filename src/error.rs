//! Error types for bodybridge.

use thiserror::Error;

/// Main error type for all producer, buffer and bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error raised by a channel or transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The charset encoder could not encode the input.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The shared buffer was aborted.
    #[error("Operation aborted")]
    Aborted,

    /// A blocking wait exceeded the configured timeout.
    #[error("Timed out waiting on shared buffer")]
    Timeout,

    /// The response head was mutated after it had been sent.
    #[error("Response already committed")]
    ResponseCommitted,

    /// An operation was invoked in a state that does not permit it.
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure raised by application handler code.
    #[error("Handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BridgeError {
    /// Wrap an arbitrary application error as a handler failure.
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        BridgeError::Handler(err.into())
    }

    /// Whether this error is the result of an aborted shared buffer.
    pub fn is_aborted(&self) -> bool {
        match self {
            BridgeError::Aborted => true,
            BridgeError::Io(e) => e
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<BridgeError>())
                .is_some_and(BridgeError::is_aborted),
            _ => false,
        }
    }
}

impl From<BridgeError> for std::io::Error {
    fn from(err: BridgeError) -> Self {
        use std::io::ErrorKind;

        match err {
            BridgeError::Io(e) => e,
            BridgeError::Aborted => std::io::Error::new(ErrorKind::ConnectionAborted, err),
            BridgeError::Timeout => std::io::Error::new(ErrorKind::TimedOut, err),
            other => std::io::Error::new(ErrorKind::Other, other),
        }
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
