//! Error types for the Aura Gate service.

use thiserror::Error;

/// Main error type for Aura Gate operations.
///
/// Quota decisions never surface here: a rejected request is an ordinary
/// [`Decision`](crate::ratelimit::Decision), not an error.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GateError {
    fn from(err: config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Result type alias for Aura Gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
