//! Lotto Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Scrapes official lottery archives and appends verified draws to a
//! file-based data repository.
//!
//! # Pipeline
//!
//! For every selected game the [`orchestrator::IngestionOrchestrator`] runs
//! fetch → parse → stamp → filter/append → coverage update:
//!
//! - **connector**: HTTP fetch with retries and official-domain checks
//! - **parser**: date/number heuristics over table rows or text lines
//! - **store**: per-year NDJSON partitions, deduplicated by draw id
//! - **coverage**: the per-game coverage document
//!
//! # Example
//!
//! ```no_run
//! use lotto_ingest::config::{GameSelector, IngestConfig, IngestMode};
//! use lotto_ingest::connector::SourceConnector;
//! use lotto_ingest::orchestrator::IngestionOrchestrator;
//! use lotto_ingest::registry::SourceRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let connector = Arc::new(SourceConnector::new(config.retry_policy(), &config.user_agent)?);
//!     let registry = SourceRegistry::from_games(&config.games, connector);
//!
//!     let orchestrator = IngestionOrchestrator::for_data_repo(registry, "./lotto-data");
//!     let report = orchestrator.run(&GameSelector::All, IngestMode::Incremental).await;
//!     println!("added {} draws", report.total_added());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connector;
pub mod coverage;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod registry;
pub mod report;
pub mod source;
pub mod store;

pub use error::{FetchError, IngestError};
