//! Coverage document tracking
//!
//! One JSON document per data repository records, for each game, the latest
//! ingested draw date, the coverage status and a summary of the last run.
//!
//! Updates are whole-document read-modify-write. That is fine for a scheduled
//! batch, but two concurrent writers will lose one of the updates.

use chrono::{DateTime, Utc};
use lotto_common::types::LastIngest;
use lotto_common::{ArchiveError, CoverageDocument, CoverageEntry, CoverageStatus};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::report::IngestionRunResult;

/// Location of the coverage document inside a data repository
pub const COVERAGE_RELATIVE_PATH: &str = "datasets/_meta/coverage.json";

/// Reads and updates the coverage document
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    path: PathBuf,
}

impl CoverageTracker {
    /// Tracker for the coverage document of `data_repo`
    pub fn new(data_repo: impl AsRef<Path>) -> Self {
        Self {
            path: data_repo.as_ref().join(COVERAGE_RELATIVE_PATH),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document, or an empty one if none has been written yet
    pub fn load(&self) -> Result<CoverageDocument, ArchiveError> {
        if !self.path.exists() {
            return Ok(CoverageDocument::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn entry(&self, game_id: &str) -> Result<Option<CoverageEntry>, ArchiveError> {
        Ok(self.load()?.games.remove(game_id))
    }

    /// Record a successful run for `result.game_id`
    pub fn update(&self, result: &IngestionRunResult) -> Result<CoverageEntry, ArchiveError> {
        self.update_at(result, Utc::now())
    }

    /// Record a successful run with an explicit timestamp.
    ///
    /// - `last_draw_date` only moves forward; a run that added nothing keeps it
    /// - `coverage_status` becomes `incremental` when draws were added and is
    ///   otherwise carried forward (`initial` for a new entry)
    /// - `last_ingest` and the document's `last_updated` are always refreshed
    pub fn update_at(
        &self,
        result: &IngestionRunResult,
        now: DateTime<Utc>,
    ) -> Result<CoverageEntry, ArchiveError> {
        let mut doc = self.load()?;
        doc.last_updated = Some(now);

        let entry = doc.games.entry(result.game_id.clone()).or_default();
        if let Some(date) = result.last_draw_date {
            entry.last_draw_date = entry.last_draw_date.max(Some(date));
        }
        if result.added > 0 {
            entry.coverage_status = CoverageStatus::Incremental;
        }
        entry.last_ingest = Some(LastIngest {
            utc: now,
            fetched: result.fetched,
            added: result.added,
            source: result.source.clone(),
        });
        let updated = entry.clone();

        self.save(&doc)?;
        debug!(
            game_id = %result.game_id,
            status = %updated.coverage_status,
            last_draw_date = ?updated.last_draw_date,
            "coverage updated"
        );
        Ok(updated)
    }

    /// Write through a temporary file so readers never see a half-written document
    fn save(&self, doc: &CoverageDocument) -> Result<(), ArchiveError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut content = serde_json::to_string_pretty(doc)?;
        content.push('\n');

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use tempfile::TempDir;

    fn result(added: usize, last: Option<(i32, u32, u32)>) -> IngestionRunResult {
        IngestionRunResult {
            game_id: "pais_lotto".to_string(),
            fetched: 10,
            added,
            last_draw_date: last.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            source: "https://www.pais.co.il/lotto/archive.aspx".to_string(),
            conflicts: 0,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 16, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_document_loads_empty() {
        let dir = TempDir::new().unwrap();
        let tracker = CoverageTracker::new(dir.path());
        assert_eq!(tracker.load().unwrap(), CoverageDocument::default());
        assert!(tracker.entry("pais_lotto").unwrap().is_none());
    }

    #[test]
    fn test_first_run_with_draws_is_incremental() {
        let dir = TempDir::new().unwrap();
        let tracker = CoverageTracker::new(dir.path());

        let entry = tracker.update_at(&result(3, Some((2024, 6, 15))), at(3)).unwrap();

        assert_eq!(entry.coverage_status, CoverageStatus::Incremental);
        assert_eq!(entry.last_draw_date, NaiveDate::from_ymd_opt(2024, 6, 15));
        let ingest = entry.last_ingest.unwrap();
        assert_eq!((ingest.fetched, ingest.added), (10, 3));
        assert_eq!(ingest.utc, at(3));

        let doc = tracker.load().unwrap();
        assert_eq!(doc.last_updated, Some(at(3)));
        assert!(tracker.path().ends_with("datasets/_meta/coverage.json"));
    }

    #[test]
    fn test_run_without_new_draws_only_refreshes_timestamps() {
        let dir = TempDir::new().unwrap();
        let tracker = CoverageTracker::new(dir.path());
        tracker.update_at(&result(3, Some((2024, 6, 15))), at(3)).unwrap();

        let entry = tracker.update_at(&result(0, None), at(4)).unwrap();

        assert_eq!(entry.coverage_status, CoverageStatus::Incremental);
        assert_eq!(entry.last_draw_date, NaiveDate::from_ymd_opt(2024, 6, 15));
        let ingest = entry.last_ingest.unwrap();
        assert_eq!(ingest.added, 0);
        assert_eq!(ingest.utc, at(4));
        assert_eq!(tracker.load().unwrap().last_updated, Some(at(4)));
    }

    #[test]
    fn test_empty_first_run_stays_initial() {
        let dir = TempDir::new().unwrap();
        let tracker = CoverageTracker::new(dir.path());

        let entry = tracker.update_at(&result(0, None), at(3)).unwrap();
        assert_eq!(entry.coverage_status, CoverageStatus::Initial);
        assert_eq!(entry.last_draw_date, None);
    }

    #[test]
    fn test_last_draw_date_never_moves_back() {
        let dir = TempDir::new().unwrap();
        let tracker = CoverageTracker::new(dir.path());
        tracker.update_at(&result(1, Some((2024, 6, 15))), at(3)).unwrap();

        // a late backfill of an older draw
        let entry = tracker.update_at(&result(1, Some((2023, 1, 3))), at(4)).unwrap();
        assert_eq!(entry.last_draw_date, NaiveDate::from_ymd_opt(2024, 6, 15));
    }

    #[test]
    fn test_other_games_and_unknown_fields_survive() {
        let dir = TempDir::new().unwrap();
        let tracker = CoverageTracker::new(dir.path());
        fs::create_dir_all(tracker.path().parent().unwrap()).unwrap();
        fs::write(
            tracker.path(),
            r#"{"last_updated": null, "owner": "ops", "games": {"pais_chance": {"last_draw_date": "2024-01-01", "coverage_status": "initial"}}}"#,
        )
        .unwrap();

        tracker.update_at(&result(2, Some((2024, 6, 15))), at(3)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(tracker.path()).unwrap()).unwrap();
        assert_eq!(raw["owner"], "ops");
        assert_eq!(raw["games"]["pais_chance"]["last_draw_date"], "2024-01-01");
        assert_eq!(raw["games"]["pais_lotto"]["coverage_status"], "incremental");
        assert_eq!(raw["games"]["pais_lotto"]["last_ingest"]["added"], 2);
        assert!(!tracker.path().with_extension("json.tmp").exists());
    }
}
