//! Dialogue-layer errors.

use thiserror::Error;

use umi_core::UmiError;
use umi_llm::LlmError;

/// Errors surfaced by [`crate::DialogueEngine`].
///
/// Generator failures never appear here during a turn; they are absorbed by
/// the mock fallback. `Llm` only arises while building the engine.
#[derive(Debug, Error)]
pub enum DialogueError {
    /// Store, config or stat error from the core.
    #[error(transparent)]
    Core(#[from] UmiError),

    /// Generator misconfiguration.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// No built-in item by that name.
    #[error("Unknown item '{0}'")]
    UnknownItem(String),

    /// Session back end name not recognised.
    #[error("Unknown session backend '{0}'")]
    UnknownBackend(String),

    /// Tracing could not be installed.
    #[error("Tracing setup failed: {0}")]
    Telemetry(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, DialogueError>;
