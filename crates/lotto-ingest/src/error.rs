//! Error types for ingestion
//!
//! Failures are contained per game: the orchestrator turns any of these into a
//! failed outcome for that game and moves on to the next one.

use lotto_common::ArchiveError;
use thiserror::Error;

/// Failure signal returned by the source connector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Timeouts, network errors and 5xx responses, after every retry was used
    #[error("Fetching {url} failed after {attempts} attempt(s): {reason}")]
    Transient {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The request was, or resolved to, a URL outside the official domain
    #[error("Source integrity violation: {url} resolved to {final_url}, outside official domain '{official_domain}'")]
    SourceIntegrity {
        url: String,
        final_url: String,
        official_domain: String,
    },

    /// Non-retryable HTTP status (4xx)
    #[error("Request to {url} was rejected with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("Invalid source URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    /// Whether the failure indicates possible spoofing rather than an outage
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, FetchError::SourceIntegrity { .. })
    }
}

/// Per-game ingestion failure
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Partition or coverage write failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] ArchiveError),

    #[error("Record {draw_id} for {game_id} reached storage without a checksum")]
    UnstampedRecord { game_id: String, draw_id: String },

    #[error("Unknown game id: {0}")]
    UnknownGame(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(ArchiveError::Io(err))
    }
}
