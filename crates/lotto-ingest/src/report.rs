//! Per-run results reported by the orchestrator

use chrono::NaiveDate;
use std::fmt;

/// Counts for one successfully processed game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionRunResult {
    pub game_id: String,

    /// Records the source returned for this run
    pub fetched: usize,

    /// Records appended to partitions
    pub added: usize,

    /// Latest draw date among the appended records
    pub last_draw_date: Option<NaiveDate>,

    /// Archive URL the records came from
    pub source: String,

    /// Stored draws whose re-scraped checksum differed
    pub conflicts: usize,
}

/// Pipeline stage where a game failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    Store,
    Coverage,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Fetch => write!(f, "fetch"),
            FailureStage::Store => write!(f, "store"),
            FailureStage::Coverage => write!(f, "coverage"),
        }
    }
}

/// What happened to one game in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    Ingested(IngestionRunResult),
    Failed {
        game_id: String,
        stage: FailureStage,
        error: String,
    },
    /// Not attempted (e.g. the id is not in the registry)
    Skipped { game_id: String, reason: String },
}

impl GameOutcome {
    pub fn game_id(&self) -> &str {
        match self {
            GameOutcome::Ingested(result) => &result.game_id,
            GameOutcome::Failed { game_id, .. } | GameOutcome::Skipped { game_id, .. } => game_id,
        }
    }
}

/// Outcomes of one batch, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<GameOutcome>,
}

impl BatchReport {
    pub fn results(&self) -> impl Iterator<Item = &IngestionRunResult> {
        self.outcomes.iter().filter_map(|o| match o {
            GameOutcome::Ingested(result) => Some(result),
            _ => None,
        })
    }

    pub fn outcome(&self, game_id: &str) -> Option<&GameOutcome> {
        self.outcomes.iter().find(|o| o.game_id() == game_id)
    }

    pub fn succeeded(&self) -> usize {
        self.results().count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, GameOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, GameOutcome::Skipped { .. }))
            .count()
    }

    pub fn total_added(&self) -> usize {
        self.results().map(|r| r.added).sum()
    }
}
