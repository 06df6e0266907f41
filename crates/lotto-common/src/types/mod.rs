//! Common types used across the lottery archive

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::error::{ArchiveError, Result};

/// Metadata key recording which parser produced a record
pub const META_PARSER: &str = "parser";

/// Metadata key recording where a record's `draw_id` came from
pub const META_DRAW_ID_SOURCE: &str = "draw_id_source";

// ============================================================================
// Game Types
// ============================================================================

/// Shape of a single draw for one game.
///
/// The parser uses the shape to pick candidate numbers out of a row and the
/// store uses it to reject records that break the game's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameShape {
    /// Number of main numbers drawn
    pub numbers_count: usize,

    /// Number of bonus ("strong") numbers drawn after the main numbers
    #[serde(default)]
    pub bonus_count: usize,

    /// Smallest legal number (inclusive)
    pub min_num: u32,

    /// Largest legal number (inclusive)
    pub max_num: u32,
}

impl GameShape {
    pub fn new(numbers_count: usize, bonus_count: usize, min_num: u32, max_num: u32) -> Self {
        Self {
            numbers_count,
            bonus_count,
            min_num,
            max_num,
        }
    }

    /// Total number of in-range tokens a row must carry
    pub fn required_tokens(&self) -> usize {
        self.numbers_count + self.bonus_count
    }

    /// Whether `n` falls inside the game's number range
    pub fn contains(&self, n: u64) -> bool {
        u64::from(self.min_num) <= n && n <= u64::from(self.max_num)
    }

    /// Check that the shape can describe a real draw
    pub fn validate(&self) -> Result<()> {
        if self.numbers_count == 0 {
            return Err(ArchiveError::config("numbers_count must be greater than 0"));
        }
        if self.min_num > self.max_num {
            return Err(ArchiveError::config(format!(
                "min_num ({}) cannot be greater than max_num ({})",
                self.min_num, self.max_num
            )));
        }
        let span = u64::from(self.max_num - self.min_num) + 1;
        if span < self.numbers_count as u64 {
            return Err(ArchiveError::config(format!(
                "range {}..={} cannot hold {} distinct numbers",
                self.min_num, self.max_num, self.numbers_count
            )));
        }
        Ok(())
    }
}

/// Per-game ingestion configuration.
///
/// One record per game replaces per-source connector classes: the connector,
/// parser and store are all parameterized by this value.
///
/// # Examples
///
/// ```rust,ignore
/// use lotto_common::types::{GameConfig, GameShape};
///
/// let lotto = GameConfig {
///     id: "pais_lotto".to_string(),
///     name: "Lotto".to_string(),
///     official_domain: "pais.co.il".to_string(),
///     url: "https://www.pais.co.il/lotto/archive.aspx".to_string(),
///     shape: GameShape::new(6, 1, 1, 37),
///     data_subdir: "datasets/pais/lotto/ndjson".into(),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Registry key (e.g., "pais_lotto")
    pub id: String,

    /// Display name
    pub name: String,

    /// Domain every fetch must resolve inside (subdomains included)
    pub official_domain: String,

    /// Archive page URL
    pub url: String,

    /// Draw shape
    #[serde(flatten)]
    pub shape: GameShape,

    /// Partition directory, relative to the data repository root
    pub data_subdir: PathBuf,
}

impl GameConfig {
    /// Structural validation; URL checks live with the connector
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ArchiveError::config("game id cannot be empty"));
        }
        if self.official_domain.trim().is_empty() {
            return Err(ArchiveError::config(format!(
                "game {} has no official domain",
                self.id
            )));
        }
        if self.data_subdir.as_os_str().is_empty() || self.data_subdir.is_absolute() {
            return Err(ArchiveError::config(format!(
                "game {} data_subdir must be a non-empty relative path",
                self.id
            )));
        }
        self.shape
            .validate()
            .map_err(|e| ArchiveError::config(format!("game {}: {}", self.id, e)))
    }
}

// ============================================================================
// Draw Records
// ============================================================================

/// One official draw result.
///
/// Serializes to exactly one partition line:
/// `{game_id, draw_id, date, numbers, bonus?, source, checksum, metadata}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub game_id: String,

    /// Identity key within a (game, year) partition
    pub draw_id: String,

    #[serde(rename = "date")]
    pub draw_date: NaiveDate,

    /// Main numbers, ascending
    pub numbers: Vec<u32>,

    /// Bonus numbers in extraction order
    #[serde(rename = "bonus", default, skip_serializing_if = "Option::is_none")]
    pub bonus_numbers: Option<Vec<u32>>,

    #[serde(rename = "source")]
    pub source_url: String,

    /// Empty until stamped
    #[serde(default)]
    pub checksum: String,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl DrawRecord {
    /// Calendar year of the draw, i.e. its partition key
    pub fn year(&self) -> i32 {
        self.draw_date.year()
    }

    pub fn is_stamped(&self) -> bool {
        !self.checksum.is_empty()
    }

    /// Check the record against the game's invariants
    pub fn validate(&self, shape: &GameShape) -> Result<()> {
        let invalid = |reason: String| ArchiveError::InvalidDraw {
            game_id: self.game_id.clone(),
            draw_id: self.draw_id.clone(),
            reason,
        };

        if self.draw_id.is_empty() {
            return Err(invalid("empty draw_id".to_string()));
        }

        if self.numbers.len() != shape.numbers_count {
            return Err(invalid(format!(
                "expected {} numbers, got {}",
                shape.numbers_count,
                self.numbers.len()
            )));
        }

        if let Some(n) = self.numbers.iter().find(|n| !shape.contains(u64::from(**n))) {
            return Err(invalid(format!(
                "number {} outside {}..={}",
                n, shape.min_num, shape.max_num
            )));
        }

        let distinct: HashSet<u32> = self.numbers.iter().copied().collect();
        if distinct.len() != self.numbers.len() {
            return Err(invalid(format!("duplicate numbers in {:?}", self.numbers)));
        }

        if self.numbers.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid(format!("numbers not ascending: {:?}", self.numbers)));
        }

        let bonus_len = self.bonus_numbers.as_ref().map_or(0, Vec::len);
        if bonus_len != shape.bonus_count {
            return Err(invalid(format!(
                "expected {} bonus numbers, got {}",
                shape.bonus_count, bonus_len
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Coverage Types
// ============================================================================

/// How much of a game's history has been ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    /// Entry exists but no run has added a draw yet
    #[default]
    Initial,
    /// At least one run added draws
    Incremental,
}

impl std::fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoverageStatus::Initial => write!(f, "initial"),
            CoverageStatus::Incremental => write!(f, "incremental"),
        }
    }
}

/// Summary of the most recent successful run for a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastIngest {
    pub utc: DateTime<Utc>,
    pub fetched: usize,
    pub added: usize,
    pub source: String,
}

/// Per-game coverage state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoverageEntry {
    #[serde(default)]
    pub last_draw_date: Option<NaiveDate>,

    #[serde(default)]
    pub coverage_status: CoverageStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ingest: Option<LastIngest>,

    /// Fields written by other tools are carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Coverage document, one per data repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoverageDocument {
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub games: BTreeMap<String, CoverageEntry>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
