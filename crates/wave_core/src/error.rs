//! Error types for the game simulation.

use thiserror::Error;

use crate::entity::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all game simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Malformed or illegal wire data (empty variants, unknown codes, truncation).
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// A geometric invariant was broken upstream (negative length, bad orientation).
    #[error("Geometry invariant violated: {0}")]
    Geometry(String),

    /// Static world or match configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// A gameplay operation was called in a state where it is not defined.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Every sampled spawn position collided with an existing footprint.
    #[error("Couldn't find free spawn position after {trials} trials")]
    NoFreeSpawnPosition {
        /// Number of positions sampled.
        trials: u32,
    },

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Desync detected in multiplayer.
    #[error("Desync detected at step {step}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Step where desync occurred.
        step: u32,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}

impl GameError {
    /// Whether the error means participants may have diverged and the match must stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Precondition(_) | Self::NoFreeSpawnPosition { .. })
    }
}
