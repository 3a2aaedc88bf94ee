//! Error types for the mindflow core library.

use thiserror::Error;

use crate::status::SystemStatus;

/// Top-level error type for all core operations.
#[derive(Error, Debug)]
pub enum MindflowError {
    /// The status gate refused admission; the caller may retry later.
    #[error("System busy: current status is {status}")]
    Busy {
        /// The status that blocked admission.
        status: SystemStatus,
    },

    /// The shared chatbot is not available (never initialised or init failed).
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A session id that the memory store does not know.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The memory store failed to serve a request.
    #[error("Memory store error: {0}")]
    Store(String),

    /// The embedding provider failed to produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration error (missing schema, invalid threshold, bad TOML/JSON).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MindflowError {
    /// Whether this error is an admission refusal from the status gate.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MindflowError>;
