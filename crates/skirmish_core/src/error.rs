//! Error types for the match simulation.
//!
//! Only fallible library entry points (catalog loading, codec, state
//! restore) return these. Invalid commands and lost targets inside a tick
//! are state transitions, not errors.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Unknown entity template.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(u64),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Wire message could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Desync detected between two simulations.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}
