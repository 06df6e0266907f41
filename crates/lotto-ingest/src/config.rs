//! Ingestion configuration
//!
//! Retry settings and the game registry, loaded from environment variables
//! (and `.env`) on top of built-in defaults. Games can be added or replaced
//! through a TOML file:
//!
//! ```toml
//! [[games]]
//! id = "pais_lotto"
//! name = "Lotto"
//! official_domain = "pais.co.il"
//! url = "https://www.pais.co.il/lotto/archive.aspx"
//! numbers_count = 6
//! bonus_count = 1
//! min_num = 1
//! max_num = 37
//! data_subdir = "datasets/pais/lotto/ndjson"
//! ```

use lotto_common::{GameConfig, GameShape};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::connector::{
    is_official, RetryPolicy, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_SECS,
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
use crate::error::IngestError;

// ============================================================================
// Built-in Games
// ============================================================================

/// Official operator domain for the Pais games
pub const PAIS_DOMAIN: &str = "pais.co.il";

pub const PAIS_LOTTO_URL: &str = "https://www.pais.co.il/lotto/archive.aspx";

pub const PAIS_CHANCE_URL: &str = "https://www.pais.co.il/chance/archive.aspx";

/// Games known without any configuration
pub fn builtin_games() -> Vec<GameConfig> {
    vec![
        GameConfig {
            id: "pais_lotto".to_string(),
            name: "Lotto".to_string(),
            official_domain: PAIS_DOMAIN.to_string(),
            url: PAIS_LOTTO_URL.to_string(),
            shape: GameShape::new(6, 1, 1, 37),
            data_subdir: "datasets/pais/lotto/ndjson".into(),
        },
        GameConfig {
            id: "pais_chance".to_string(),
            name: "Chance".to_string(),
            official_domain: PAIS_DOMAIN.to_string(),
            url: PAIS_CHANCE_URL.to_string(),
            shape: GameShape::new(6, 1, 1, 37),
            data_subdir: "datasets/pais/chance/ndjson".into(),
        },
    ]
}

// ============================================================================
// Mode and Selection
// ============================================================================

/// How much of each archive a run asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Only draws on or after the game's last covered date
    #[default]
    Incremental,
    /// The whole archive
    Full,
}

impl FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "incremental" => Ok(IngestMode::Incremental),
            "full" => Ok(IngestMode::Full),
            _ => Err(format!("Invalid mode '{}': expected 'incremental' or 'full'", s)),
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestMode::Incremental => write!(f, "incremental"),
            IngestMode::Full => write!(f, "full"),
        }
    }
}

/// Which games a batch covers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GameSelector {
    #[default]
    All,
    Only(Vec<String>),
}

impl FromStr for GameSelector {
    type Err = String;

    /// `all`, or a comma-separated list of game ids
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(GameSelector::All);
        }

        let ids: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Err("Game selector is empty: use 'all' or a comma-separated list of ids".to_string());
        }
        Ok(GameSelector::Only(ids))
    }
}

// ============================================================================
// Ingest Configuration
// ============================================================================

#[derive(Debug, Deserialize)]
struct GamesFile {
    #[serde(default)]
    games: Vec<GameConfig>,
}

/// Main ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Attempts per fetch
    pub max_retries: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// First backoff delay in milliseconds
    pub backoff_base_ms: u64,
    /// Backoff ceiling in seconds
    pub backoff_max_secs: u64,
    pub user_agent: String,
    /// Game registry, in configuration order
    pub games: Vec<GameConfig>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            games: builtin_games(),
        }
    }
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    ///
    /// Environment variables:
    /// - `INGEST_MAX_RETRIES`: attempts per fetch (default 3)
    /// - `INGEST_TIMEOUT_SECS`: per-request timeout (default 30)
    /// - `INGEST_BACKOFF_BASE_MS`: first retry delay (default 1000)
    /// - `INGEST_BACKOFF_MAX_SECS`: backoff ceiling (default 60)
    /// - `INGEST_USER_AGENT`: HTTP user agent
    /// - `PAIS_LOTTO_URL`, `PAIS_CHANCE_URL`: archive URL overrides
    /// - `INGEST_GAMES_FILE`: TOML file with extra or replacement games
    pub fn from_env() -> Result<Self, IngestError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`IngestConfig::from_env`] with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.max_retries = parse_var(&lookup, "INGEST_MAX_RETRIES", config.max_retries)?;
        config.timeout_secs = parse_var(&lookup, "INGEST_TIMEOUT_SECS", config.timeout_secs)?;
        config.backoff_base_ms =
            parse_var(&lookup, "INGEST_BACKOFF_BASE_MS", config.backoff_base_ms)?;
        config.backoff_max_secs =
            parse_var(&lookup, "INGEST_BACKOFF_MAX_SECS", config.backoff_max_secs)?;
        if let Some(agent) = lookup("INGEST_USER_AGENT") {
            config.user_agent = agent;
        }

        for game in &mut config.games {
            let key = format!("{}_URL", game.id.to_uppercase());
            if let Some(url) = lookup(&key) {
                game.url = url;
            }
        }

        if let Some(path) = lookup("INGEST_GAMES_FILE") {
            let extra = load_games_file(Path::new(&path))?;
            config.merge_games(extra);
        }

        config.validate()?;
        Ok(config)
    }

    /// Add games, replacing built-ins that share an id
    pub fn merge_games(&mut self, games: Vec<GameConfig>) {
        for game in games {
            match self.games.iter_mut().find(|g| g.id == game.id) {
                Some(existing) => *existing = game,
                None => self.games.push(game),
            }
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            timeout: Duration::from_secs(self.timeout_secs),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_retries == 0 {
            return Err(IngestError::config("INGEST_MAX_RETRIES must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(IngestError::config("INGEST_TIMEOUT_SECS must be greater than 0"));
        }
        if self.backoff_max_secs.saturating_mul(1000) < self.backoff_base_ms {
            return Err(IngestError::config(format!(
                "backoff ceiling ({}s) is below the base delay ({}ms)",
                self.backoff_max_secs, self.backoff_base_ms
            )));
        }

        let mut seen = HashSet::new();
        for game in &self.games {
            if !seen.insert(game.id.as_str()) {
                return Err(IngestError::config(format!("duplicate game id '{}'", game.id)));
            }
            game.validate()
                .map_err(|e| IngestError::config(e.to_string()))?;

            let url = Url::parse(&game.url).map_err(|e| {
                IngestError::config(format!("game {} has an invalid url '{}': {}", game.id, game.url, e))
            })?;
            if !is_official(&url, &game.official_domain) {
                return Err(IngestError::config(format!(
                    "game {} url '{}' is outside its official domain '{}'",
                    game.id, game.url, game.official_domain
                )));
            }
        }

        Ok(())
    }
}

/// Read `[[games]]` tables from a TOML file
pub fn load_games_file(path: &Path) -> Result<Vec<GameConfig>, IngestError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IngestError::config(format!("cannot read games file {}: {}", path.display(), e))
    })?;
    let file: GamesFile = toml::from_str(&content).map_err(|e| {
        IngestError::config(format!("invalid games file {}: {}", path.display(), e))
    })?;
    Ok(file.games)
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, IngestError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
