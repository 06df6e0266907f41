//! Lotto Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the lottery archive workspace.
//!
//! # Overview
//!
//! - **Types**: draw records, game shapes and the coverage document
//! - **Checksums**: deterministic draw fingerprints used for change detection
//! - **Error Handling**: the shared error and result types
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use lotto_common::checksum::draw_checksum;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
//! let digest = draw_checksum("12", date, &[3, 11, 19, 22, 28, 35], Some(&[7]));
//! assert_eq!(digest.len(), 16);
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ArchiveError, Result};
pub use types::{CoverageDocument, CoverageEntry, CoverageStatus, DrawRecord, GameConfig, GameShape};
