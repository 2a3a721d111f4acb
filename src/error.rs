//! Bridge error types
//!
//! Unified error handling for the binding layer. Most accessors never
//! surface these: lookups return `None` and released handles return empty
//! values. Errors are reserved for operations that must report failure to
//! their caller (stream acquisition, unsupported cursor moves, export and
//! persistence).

use thiserror::Error;

use crate::native::NativeError;

/// Unified bridge error type
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The native module refused to open the archive
    #[error("Failed to open container: {0}")]
    ContainerOpen(String),

    /// An object whose native handle was already released
    #[error("{0} is closed")]
    Closed(&'static str),

    /// The package could not produce a stream for the path
    #[error("No stream available for {0}")]
    StreamUnavailable(String),

    /// The cursor does not support this operation (filtered streams)
    #[error("Unsupported stream operation: {0}")]
    Unsupported(&'static str),

    /// Package used before it was attached to a container, or after the
    /// container was dropped
    #[error("Package is not attached to a live container")]
    ContainerDetached,

    /// Failure reported by the native module
    #[error("Native error: {0}")]
    Native(#[from] NativeError),

    /// JSON export or library persistence failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<BridgeError> for std::io::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(e) => e,
            BridgeError::Unsupported(_) | BridgeError::Native(NativeError::Unsupported(_)) => {
                std::io::Error::new(std::io::ErrorKind::Unsupported, err.to_string())
            }
            BridgeError::Closed(_) => {
                std::io::Error::new(std::io::ErrorKind::NotConnected, err.to_string())
            }
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        }
    }
}
