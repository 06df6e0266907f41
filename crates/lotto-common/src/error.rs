//! Error types for the lottery archive

use thiserror::Error;

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Main error type for archive storage and domain validation
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid draw {draw_id} for {game_id}: {reason}")]
    InvalidDraw {
        game_id: String,
        draw_id: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArchiveError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
