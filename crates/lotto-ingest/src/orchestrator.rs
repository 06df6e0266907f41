//! Batch ingestion across games
//!
//! Games run one after another. Each game goes through
//! fetch → stamp → filter/append → coverage update, and any failure along the
//! way becomes a [`GameOutcome::Failed`] for that game only.

use chrono::NaiveDate;
use lotto_common::checksum;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{GameSelector, IngestMode};
use crate::coverage::CoverageTracker;
use crate::error::IngestError;
use crate::registry::SourceRegistry;
use crate::report::{BatchReport, FailureStage, GameOutcome, IngestionRunResult};
use crate::source::DrawSource;
use crate::store::PartitionStore;

/// Runs ingestion batches against one data repository
pub struct IngestionOrchestrator {
    registry: SourceRegistry,
    store: PartitionStore,
    coverage: CoverageTracker,
}

impl IngestionOrchestrator {
    pub fn new(registry: SourceRegistry, store: PartitionStore, coverage: CoverageTracker) -> Self {
        Self {
            registry,
            store,
            coverage,
        }
    }

    /// Orchestrator whose partitions and coverage document live under `data_repo`
    pub fn for_data_repo(registry: SourceRegistry, data_repo: impl AsRef<Path>) -> Self {
        let root = data_repo.as_ref();
        Self::new(registry, PartitionStore::new(root), CoverageTracker::new(root))
    }

    /// Ingest every selected game and report one outcome per game.
    ///
    /// Explicitly selected ids are processed in the given order (duplicates
    /// once); `All` follows registry order. Ids without a registered source are
    /// reported as skipped.
    pub async fn run(&self, selector: &GameSelector, mode: IngestMode) -> BatchReport {
        let ids = match selector {
            GameSelector::All => self.registry.ids(),
            GameSelector::Only(ids) => {
                let mut seen = HashSet::new();
                ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
            },
        };

        info!(games = ids.len(), mode = %mode, "starting ingestion batch");

        let mut report = BatchReport::default();
        for game_id in ids {
            let outcome = match self.registry.get(&game_id) {
                Some(source) => {
                    let span = info_span!("ingest_game", game_id = %game_id);
                    self.ingest_game(source, mode).instrument(span).await
                },
                None => GameOutcome::Skipped {
                    reason: IngestError::UnknownGame(game_id.clone()).to_string(),
                    game_id,
                },
            };
            log_outcome(&outcome);
            report.outcomes.push(outcome);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            added = report.total_added(),
            "ingestion batch finished"
        );
        report
    }

    async fn ingest_game(&self, source: Arc<dyn DrawSource>, mode: IngestMode) -> GameOutcome {
        let game = source.game();
        let failed = |stage: FailureStage, error: String| GameOutcome::Failed {
            game_id: game.id.clone(),
            stage,
            error,
        };

        let since = self.since(&game.id, mode);
        let mut records = match source.fetch_historical(since, None).await {
            Ok(records) => records,
            Err(e) => return failed(FailureStage::Fetch, e.to_string()),
        };
        let fetched = records.len();

        for record in &mut records {
            checksum::stamp(record);
        }

        let summary = match self.store.filter_and_append(game, records) {
            Ok(summary) => summary,
            Err(e) => return failed(FailureStage::Store, e.to_string()),
        };

        let result = IngestionRunResult {
            game_id: game.id.clone(),
            fetched,
            added: summary.added,
            last_draw_date: summary.last_added_date,
            source: game.url.clone(),
            conflicts: summary.conflicts.len(),
        };

        if let Err(e) = self.coverage.update(&result) {
            return failed(FailureStage::Coverage, e.to_string());
        }

        GameOutcome::Ingested(result)
    }

    /// Lower bound of the fetch window for `mode`
    fn since(&self, game_id: &str, mode: IngestMode) -> Option<NaiveDate> {
        match mode {
            IngestMode::Full => None,
            IngestMode::Incremental => match self.coverage.entry(game_id) {
                Ok(entry) => entry.and_then(|e| e.last_draw_date),
                Err(e) => {
                    warn!(game_id, error = %e, "cannot read coverage, fetching the full archive");
                    None
                },
            },
        }
    }
}

fn log_outcome(outcome: &GameOutcome) {
    match outcome {
        GameOutcome::Ingested(result) => info!(
            game_id = %result.game_id,
            fetched = result.fetched,
            added = result.added,
            conflicts = result.conflicts,
            last_draw_date = ?result.last_draw_date,
            "game ingested"
        ),
        GameOutcome::Failed {
            game_id,
            stage,
            error,
        } => error!(game_id = %game_id, stage = %stage, error = %error, "game failed"),
        GameOutcome::Skipped { game_id, reason } => {
            warn!(game_id = %game_id, reason = %reason, "game skipped")
        },
    }
}
