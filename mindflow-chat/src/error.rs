//! Error types for the chat layer.

use mindflow_core::MindflowError;
use mindflow_llm::LlmError;
use thiserror::Error;

/// Errors surfaced by the orchestrator and the chat service.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Admission, store, embedding or configuration failure from the core.
    #[error(transparent)]
    Core(#[from] MindflowError),

    /// Generation backend failure.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// `refresh` or `update_input` without an uncommitted user input.
    #[error("There is no user input.")]
    NoPendingInput,

    /// The caller sent something the operation cannot act on.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Application configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system failure while loading configuration or schemas.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether this is a status-gate refusal the caller may retry later.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_busy())
    }
}

/// Convenience result type for the chat layer.
pub type Result<T> = std::result::Result<T, ChatError>;
