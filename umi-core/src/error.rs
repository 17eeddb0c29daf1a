//! Error types for the UMI core library.

use thiserror::Error;

/// Top-level error type for all UMI operations.
#[derive(Error, Debug)]
pub enum UmiError {
    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stat name that explicit game logic tried to write does not exist
    /// on the target actor.
    #[error("Unknown stat '{stat}' for {target}")]
    UnknownStat {
        /// The stat name as given.
        stat: String,
        /// Which actor was targeted ("player" or an NPC id).
        target: String,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, UmiError>;
