//! Error types for the rewind engine.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the rewind engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Test/mock/report store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Instrumentation backend errors
    #[error("Instrumentation error: {0}")]
    Instrumentation(String),

    /// Request emulation errors
    #[error("Emulation error: {0}")]
    Emulation(String),

    /// Pre-/post-script errors
    #[error("Script error: {0}")]
    Script(String),

    /// Validation errors (user-facing misconfiguration)
    #[error("Validation error: {0}")]
    Validation(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal invariant violations
    #[error("Internal error: {0}")]
    Internal(String),

    /// Run canceled by the caller
    #[error("Operation aborted")]
    Aborted,
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an instrumentation error.
    pub fn instrumentation(message: impl Into<String>) -> Self {
        Self::Instrumentation(message.into())
    }

    /// Create an emulation error.
    pub fn emulation(message: impl Into<String>) -> Self {
        Self::Emulation(message.into())
    }

    /// Create a script error.
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an HTTP transport error.
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error is the cancellation sentinel.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
