//! Error types for the authority server.

use thiserror::Error;

use wave_core::entity::EntityId;
use wave_core::error::GameError;

/// Result type alias using [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;

/// Everything that can go wrong while hosting a match.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The simulation or the wire codec rejected something.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Socket or file IO failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server configuration could not be parsed.
    #[error("Failed to parse server config: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// A setting is out of range.
    #[error("Invalid server setting: {0}")]
    InvalidSetting(String),

    /// An action arrived for a participant that is not in the match.
    #[error("Unknown participant {0}")]
    UnknownParticipant(EntityId),

    /// A frame announced more bytes than the relay accepts.
    #[error("Frame of {len} bytes exceeds the limit of {max}")]
    FrameTooLarge {
        /// Announced payload length.
        len: usize,
        /// Largest accepted payload.
        max: usize,
    },

    /// A participant missed step batches and can no longer stay in sync.
    #[error("Participant missed {missed} step batches")]
    ParticipantLagged {
        /// Number of skipped batches.
        missed: u64,
    },

    /// The session task is gone.
    #[error("Session closed")]
    SessionClosed,
}
