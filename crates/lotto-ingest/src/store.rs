//! Append-only per-year partitions with id-based dedup
//!
//! Each (game, year) owns one NDJSON file at
//! `<data repo>/<game data_subdir>/<year>.ndjson`. Lines are only ever
//! appended; existing lines are never rewritten, reordered or deleted.
//!
//! Appends are not transactional. A crash mid-batch can leave some records of a
//! batch written and others not; re-running the ingestion is safe because
//! records are filtered by `draw_id` before every append.

use chrono::NaiveDate;
use lotto_common::{ArchiveError, DrawRecord, GameConfig};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::IngestError;

/// Partition file extension
pub const PARTITION_EXTENSION: &str = "ndjson";

/// A re-scraped draw whose fields no longer match what was stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumConflict {
    pub game_id: String,
    pub draw_id: String,
    pub year: i32,
    pub stored: String,
    pub incoming: String,
}

/// Outcome of one `filter_and_append` call
#[derive(Debug, Clone, Default)]
pub struct AppendSummary {
    /// Lines written across all partitions
    pub added: usize,

    /// Latest draw date among the written lines
    pub last_added_date: Option<NaiveDate>,

    /// Incoming records rejected because their checksum disagrees with storage
    pub conflicts: Vec<ChecksumConflict>,

    /// Incoming records dropped because they break the game's invariants
    pub invalid: usize,
}

/// Only the fields needed for dedup
#[derive(Deserialize)]
struct IndexLine {
    draw_id: serde_json::Value,
    #[serde(default)]
    checksum: String,
}

/// File-backed partition store rooted at a data repository
#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Partition file for one (game, year)
    pub fn partition_path(&self, game: &GameConfig, year: i32) -> PathBuf {
        self.root
            .join(&game.data_subdir)
            .join(format!("{}.{}", year, PARTITION_EXTENSION))
    }

    /// Map of `draw_id -> checksum` for every parseable line of a partition.
    ///
    /// A missing file is an empty partition. Unparseable lines (for example a
    /// line cut short by a crash) are skipped with a warning.
    pub fn load_index(&self, path: &Path) -> Result<HashMap<String, String>, ArchiveError> {
        let mut index = HashMap::new();
        if !path.exists() {
            return Ok(index);
        }

        let reader = BufReader::new(fs::File::open(path)?);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IndexLine>(&line) {
                Ok(entry) => {
                    let draw_id = match entry.draw_id {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    index.insert(draw_id, entry.checksum);
                },
                Err(e) => warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping unreadable partition line"
                ),
            }
        }

        Ok(index)
    }

    /// Append the records of `batch` whose `draw_id` is not yet stored.
    ///
    /// Records are grouped by the calendar year of their draw date, and each
    /// group is sorted by `(draw_date, draw_id)` before it is appended to the
    /// tail of its partition. A record whose `draw_id` is already present is
    /// never written; if its checksum differs from the stored one, the
    /// disagreement is reported as a [`ChecksumConflict`].
    ///
    /// Every record must be stamped. Records that break the game's invariants
    /// or belong to another game are dropped with a warning.
    pub fn filter_and_append(
        &self,
        game: &GameConfig,
        batch: Vec<DrawRecord>,
    ) -> Result<AppendSummary, IngestError> {
        let mut summary = AppendSummary::default();
        let mut by_year: BTreeMap<i32, Vec<DrawRecord>> = BTreeMap::new();

        for record in batch {
            if !record.is_stamped() {
                return Err(IngestError::UnstampedRecord {
                    game_id: record.game_id,
                    draw_id: record.draw_id,
                });
            }
            if record.game_id != game.id {
                warn!(game_id = %game.id, record_game = %record.game_id, draw_id = %record.draw_id, "dropping record for another game");
                summary.invalid += 1;
                continue;
            }
            if let Err(e) = record.validate(&game.shape) {
                warn!(game_id = %game.id, error = %e, "dropping invalid record");
                summary.invalid += 1;
                continue;
            }
            by_year.entry(record.year()).or_default().push(record);
        }

        for (year, mut records) in by_year {
            records.sort_by(|a, b| {
                (a.draw_date, a.draw_id.as_str()).cmp(&(b.draw_date, b.draw_id.as_str()))
            });
            self.append_year(game, year, records, &mut summary)?;
        }

        Ok(summary)
    }

    fn append_year(
        &self,
        game: &GameConfig,
        year: i32,
        records: Vec<DrawRecord>,
        summary: &mut AppendSummary,
    ) -> Result<(), IngestError> {
        let path = self.partition_path(game, year);
        let mut index = self.load_index(&path)?;
        let mut fresh = Vec::new();

        for record in records {
            if let Some(stored) = index.get(&record.draw_id) {
                // lines written without a checksum cannot be compared
                if !stored.is_empty() && !stored.eq_ignore_ascii_case(&record.checksum) {
                    warn!(
                        game_id = %game.id,
                        draw_id = %record.draw_id,
                        year,
                        stored = %stored,
                        incoming = %record.checksum,
                        "checksum changed for a stored draw; keeping the stored line"
                    );
                    summary.conflicts.push(ChecksumConflict {
                        game_id: game.id.clone(),
                        draw_id: record.draw_id.clone(),
                        year,
                        stored: stored.clone(),
                        incoming: record.checksum.clone(),
                    });
                }
                continue;
            }
            index.insert(record.draw_id.clone(), record.checksum.clone());
            fresh.push(record);
        }

        if fresh.is_empty() {
            debug!(game_id = %game.id, year, "no new draws for partition");
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        terminate_last_line(&path)?;
        serde_jsonlines::append_json_lines(&path, &fresh)?;

        summary.added += fresh.len();
        let newest = fresh.iter().map(|r| r.draw_date).max();
        summary.last_added_date = summary.last_added_date.max(newest);

        info!(
            game_id = %game.id,
            year,
            added = fresh.len(),
            path = %path.display(),
            "appended draws to partition"
        );
        Ok(())
    }

    /// Read every parseable record of one partition, in file order
    pub fn read_partition(
        &self,
        game: &GameConfig,
        year: i32,
    ) -> Result<Vec<DrawRecord>, ArchiveError> {
        let path = self.partition_path(game, year);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DrawRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping unreadable partition line"
                ),
            }
        }
        Ok(records)
    }

    /// Years that have a partition file for `game`, ascending
    pub fn years(&self, game: &GameConfig) -> Result<Vec<i32>, ArchiveError> {
        let dir = self.root.join(&game.data_subdir);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut years: Vec<i32> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == PARTITION_EXTENSION))
            .filter_map(|p| p.file_stem()?.to_str()?.parse().ok())
            .collect();
        years.sort_unstable();
        Ok(years)
    }
}

/// Make sure a partition ends with a newline before appending, so a line cut
/// short by an earlier crash cannot swallow the next record.
fn terminate_last_line(path: &Path) -> std::io::Result<()> {
    let mut file = match OpenOptions::new().read(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if file.metadata()?.len() == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lotto_common::checksum;
    use lotto_common::GameShape;
    use tempfile::TempDir;

    fn lotto() -> GameConfig {
        GameConfig {
            id: "pais_lotto".to_string(),
            name: "Lotto".to_string(),
            official_domain: "pais.co.il".to_string(),
            url: "https://www.pais.co.il/lotto/archive.aspx".to_string(),
            shape: GameShape::new(6, 1, 1, 37),
            data_subdir: "datasets/pais/lotto/ndjson".into(),
        }
    }

    fn draw(id: &str, y: i32, m: u32, d: u32, first: u32) -> DrawRecord {
        let mut record = DrawRecord {
            game_id: "pais_lotto".to_string(),
            draw_id: id.to_string(),
            draw_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            numbers: vec![first, 11, 19, 22, 28, 35],
            bonus_numbers: Some(vec![7]),
            source_url: "https://www.pais.co.il/lotto/archive.aspx".to_string(),
            checksum: String::new(),
            metadata: BTreeMap::new(),
        };
        checksum::stamp(&mut record);
        record
    }

    fn ids(records: &[DrawRecord]) -> Vec<&str> {
        records.iter().map(|r| r.draw_id.as_str()).collect()
    }

    #[test]
    fn test_groups_by_year_and_sorts_batch() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());
        let game = lotto();

        let batch = vec![
            draw("3712", 2024, 6, 15, 3),
            draw("3600", 2023, 12, 30, 4),
            draw("3710", 2024, 6, 8, 5),
            draw("3711", 2024, 6, 11, 6),
        ];
        let summary = store.filter_and_append(&game, batch).unwrap();

        assert_eq!(summary.added, 4);
        assert_eq!(summary.last_added_date, NaiveDate::from_ymd_opt(2024, 6, 15));
        assert_eq!(store.years(&game).unwrap(), vec![2023, 2024]);
        assert_eq!(ids(&store.read_partition(&game, 2023).unwrap()), vec!["3600"]);
        assert_eq!(
            ids(&store.read_partition(&game, 2024).unwrap()),
            vec!["3710", "3711", "3712"]
        );
    }

    #[test]
    fn test_reappending_is_idempotent_and_byte_stable() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());
        let game = lotto();
        let batch = vec![draw("3711", 2024, 6, 11, 6), draw("3712", 2024, 6, 15, 3)];

        store.filter_and_append(&game, batch.clone()).unwrap();
        let path = store.partition_path(&game, 2024);
        let before = fs::read(&path).unwrap();

        let summary = store.filter_and_append(&game, batch).unwrap();
        assert_eq!(summary.added, 0);
        assert!(summary.conflicts.is_empty());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_new_draws_go_to_the_tail() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());
        let game = lotto();

        store.filter_and_append(&game, vec![draw("3711", 2024, 6, 11, 6)]).unwrap();
        let path = store.partition_path(&game, 2024);
        let before = fs::read_to_string(&path).unwrap();

        let summary = store
            .filter_and_append(&game, vec![draw("3711", 2024, 6, 11, 6), draw("3712", 2024, 6, 15, 3)])
            .unwrap();
        assert_eq!(summary.added, 1);

        let after = fs::read_to_string(&path).unwrap();
        assert!(after.starts_with(&before));
        assert_eq!(after.lines().count(), 2);
    }

    #[test]
    fn test_changed_checksum_is_reported_not_written() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());
        let game = lotto();

        let original = draw("3712", 2024, 6, 15, 3);
        store.filter_and_append(&game, vec![original.clone()]).unwrap();

        let corrected = draw("3712", 2024, 6, 15, 4);
        let summary = store.filter_and_append(&game, vec![corrected.clone()]).unwrap();

        assert_eq!(summary.added, 0);
        assert_eq!(
            summary.conflicts,
            vec![ChecksumConflict {
                game_id: "pais_lotto".to_string(),
                draw_id: "3712".to_string(),
                year: 2024,
                stored: original.checksum.clone(),
                incoming: corrected.checksum.clone(),
            }]
        );
        let stored = store.read_partition(&game, 2024).unwrap();
        assert_eq!(stored, vec![original]);
    }

    #[test]
    fn test_duplicates_within_one_batch_are_written_once() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());
        let game = lotto();

        let summary = store
            .filter_and_append(&game, vec![draw("3712", 2024, 6, 15, 3), draw("3712", 2024, 6, 15, 3)])
            .unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(store.read_partition(&game, 2024).unwrap().len(), 1);
    }

    #[test]
    fn test_conflict_within_one_batch_keeps_first() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());
        let game = lotto();
        let first = draw("3712", 2024, 6, 15, 3);
        let corrected = draw("3712", 2024, 6, 15, 4);

        let summary = store
            .filter_and_append(&game, vec![first.clone(), corrected.clone()])
            .unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(summary.conflicts.len(), 1);
        assert_eq!(summary.conflicts[0].draw_id, "3712");
        assert_eq!(summary.conflicts[0].stored, first.checksum);
        assert_eq!(summary.conflicts[0].incoming, corrected.checksum);
        assert_eq!(store.read_partition(&game, 2024).unwrap(), vec![first]);
    }

    #[test]
    fn test_unstamped_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());
        let mut record = draw("3712", 2024, 6, 15, 3);
        record.checksum.clear();

        let err = store.filter_and_append(&lotto(), vec![record]).unwrap_err();
        assert!(matches!(err, IngestError::UnstampedRecord { .. }));
        assert!(store.years(&lotto()).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_records_are_dropped() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());

        let mut out_of_range = draw("1", 2024, 6, 15, 3);
        out_of_range.numbers = vec![3, 11, 19, 22, 28, 40];
        checksum::stamp(&mut out_of_range);
        let mut other_game = draw("2", 2024, 6, 15, 3);
        other_game.game_id = "pais_chance".to_string();

        let summary = store
            .filter_and_append(&lotto(), vec![out_of_range, other_game, draw("3", 2024, 6, 15, 3)])
            .unwrap();
        assert_eq!(summary.invalid, 2);
        assert_eq!(summary.added, 1);
    }

    #[test]
    fn test_recovers_from_truncated_tail() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path());
        let game = lotto();

        store.filter_and_append(&game, vec![draw("3711", 2024, 6, 11, 6)]).unwrap();
        let path = store.partition_path(&game, 2024);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"game_id":"pais_lotto","draw_id":"37"#).unwrap();
        drop(file);

        let summary = store.filter_and_append(&game, vec![draw("3712", 2024, 6, 15, 3)]).unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(ids(&store.read_partition(&game, 2024).unwrap()), vec!["3711", "3712"]);
    }

    #[test]
    fn test_index_accepts_numeric_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2020.ndjson");
        fs::write(&path, "{\"draw_id\":3001,\"checksum\":\"abc\"}\n\n{\"draw_id\":\"3002\"}\n").unwrap();

        let index = PartitionStore::new(dir.path()).load_index(&path).unwrap();
        assert_eq!(index.get("3001").map(String::as_str), Some("abc"));
        assert_eq!(index.get("3002").map(String::as_str), Some(""));
    }
}
