//! Draw source capability contract
//!
//! Sources are composed, not subclassed: [`ArchiveSource`] pairs one game's
//! configuration with the shared connector and the heuristic parser.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use lotto_common::{DrawRecord, GameConfig};
use std::sync::Arc;
use tracing::info;

use crate::connector::SourceConnector;
use crate::error::IngestError;
use crate::parser::HeuristicParser;

/// Anything that can produce draw records for one game
#[async_trait]
pub trait DrawSource: Send + Sync {
    /// Game this source serves
    fn game(&self) -> &GameConfig;

    /// Draws dated within `since..=until`; `None` leaves that side open.
    ///
    /// Records are returned unstamped, in source order.
    async fn fetch_historical(
        &self,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<Vec<DrawRecord>, IngestError>;

    /// Draws from the last `days` days, today included
    async fn fetch_latest(&self, days: u32) -> Result<Vec<DrawRecord>, IngestError> {
        let today = Utc::now().date_naive();
        let since = today - Duration::days(i64::from(days));
        self.fetch_historical(Some(since), Some(today)).await
    }
}

/// Official archive page fetched over HTTP and parsed heuristically
pub struct ArchiveSource {
    game: GameConfig,
    connector: Arc<SourceConnector>,
    parser: HeuristicParser,
}

impl ArchiveSource {
    pub fn new(game: GameConfig, connector: Arc<SourceConnector>) -> Self {
        Self {
            game,
            connector,
            parser: HeuristicParser::new(),
        }
    }
}

#[async_trait]
impl DrawSource for ArchiveSource {
    fn game(&self) -> &GameConfig {
        &self.game
    }

    async fn fetch_historical(
        &self,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<Vec<DrawRecord>, IngestError> {
        let page = self
            .connector
            .fetch_with_retry(&self.game.url, &self.game.official_domain)
            .await?;

        let parsed = self.parser.parse(&page.body, &self.game, &self.game.url);
        let extracted = parsed.records.len();

        let records: Vec<DrawRecord> = parsed
            .records
            .into_iter()
            .filter(|r| since.is_none_or(|s| r.draw_date >= s))
            .filter(|r| until.is_none_or(|u| r.draw_date <= u))
            .collect();

        info!(
            game_id = %self.game.id,
            extracted,
            in_window = records.len(),
            skipped_rows = parsed.rows_skipped,
            since = ?since,
            "extracted draws from archive"
        );
        Ok(records)
    }
}
