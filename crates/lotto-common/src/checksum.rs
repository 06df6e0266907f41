//! Draw fingerprints for change detection
//!
//! A checksum is a pure function of `(draw_id, draw_date, sorted(numbers),
//! sorted(bonus_numbers))`. The digest input is
//! `draw_id|YYYY-MM-DDT00:00:00|[n1, n2, ...]` followed by `|[b1, ...]` when the
//! draw has bonus numbers, hashed with SHA-256 and truncated to
//! [`CHECKSUM_HEX_LEN`] hex characters. This matches the digests already
//! stored in existing partitions.
//!
//! Not a security primitive: it only flags source corrections and parser drift.

use crate::types::DrawRecord;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Length of a stored checksum in hex characters
pub const CHECKSUM_HEX_LEN: usize = 16;

/// Compute the fingerprint for a draw's identity fields
pub fn draw_checksum(
    draw_id: &str,
    draw_date: NaiveDate,
    numbers: &[u32],
    bonus_numbers: Option<&[u32]>,
) -> String {
    let mut input = format!(
        "{}|{}T00:00:00|{}",
        draw_id,
        draw_date.format("%Y-%m-%d"),
        sorted_list(numbers)
    );
    if let Some(bonus) = bonus_numbers.filter(|b| !b.is_empty()) {
        input.push('|');
        input.push_str(&sorted_list(bonus));
    }

    let digest = Sha256::digest(input.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(CHECKSUM_HEX_LEN);
    hex
}

/// Checksum of a record's current fields
pub fn record_checksum(record: &DrawRecord) -> String {
    draw_checksum(
        &record.draw_id,
        record.draw_date,
        &record.numbers,
        record.bonus_numbers.as_deref(),
    )
}

/// Set the record's checksum from its fields
pub fn stamp(record: &mut DrawRecord) {
    record.checksum = record_checksum(record);
}

/// Whether the stored checksum still matches the record's fields
pub fn verify(record: &DrawRecord) -> bool {
    record.checksum.eq_ignore_ascii_case(&record_checksum(record))
}

fn sorted_list(values: &[u32]) -> String {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let items: Vec<String> = sorted.iter().map(u32::to_string).collect();
    format!("[{}]", items.join(", "))
}
