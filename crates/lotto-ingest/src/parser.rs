//! Heuristic archive parser
//!
//! Extracts draws from archive pages without relying on CSS classes or column
//! positions. Each row unit (a `<tr>`, or a text line when the page has no
//! table rows) is handled on its own:
//!
//! 1. find a `DD/MM/YYYY` date, skip the row if there is none or it is not a
//!    real calendar date
//! 2. blank out every date token so its digits cannot be mistaken for numbers
//! 3. collect the integers inside the game's number range
//! 4. skip the row unless there are at least `numbers_count + bonus_count`
//! 5. the trailing `numbers_count + bonus_count` candidates are the draw:
//!    main numbers first (sorted), then bonus numbers (extraction order)
//! 6. the draw id is the first remaining integer in `1..=999999` that lies
//!    outside the number range, else the first remaining in-range integer,
//!    else a deterministic id built from the date and the selected numbers
//!
//! A skipped row never aborts the page scan.
//!
//! The "trailing candidates" rule has not been confirmed against captured
//! archive markup; rows that fail it are dropped rather than guessed at.

use chrono::NaiveDate;
use lotto_common::types::{GameConfig, META_DRAW_ID_SOURCE, META_PARSER};
use lotto_common::DrawRecord;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, trace};

/// Provenance tag stored in every record's metadata
pub const PARSER_NAME: &str = "heuristic_v1";

/// Largest integer accepted as an external draw sequence number
pub const MAX_SEQUENCE_ID: u64 = 999_999;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    {
        Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("date pattern is valid")
    }
});

static INT_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    {
        Regex::new(r"\d+").expect("integer pattern is valid")
    }
});

static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    {
        Selector::parse("tr").expect("row selector is valid")
    }
});

/// Why a row produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSkip {
    NoDate,
    BadDate(String),
    TooFewNumbers { found: usize, needed: usize },
    Invalid(String),
}

/// Result of scanning one page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Records in page order, not yet stamped
    pub records: Vec<DrawRecord>,

    /// Row units examined
    pub rows_seen: usize,

    /// Rows that carried a date but were dropped
    pub rows_skipped: usize,
}

/// Markup-independent draw extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicParser;

impl HeuristicParser {
    pub fn new() -> Self {
        Self
    }

    /// Extract unstamped draw records from page content.
    ///
    /// `source_url` is recorded on every record as its provenance.
    pub fn parse(&self, content: &str, game: &GameConfig, source_url: &str) -> ParsedPage {
        let rows = row_units(content);
        let mut page = ParsedPage {
            rows_seen: rows.len(),
            ..ParsedPage::default()
        };

        for (index, row) in rows.iter().enumerate() {
            match self.parse_row(row, game, source_url) {
                Ok(record) => page.records.push(record),
                // rows without a date are layout (headers, pagers), not skipped draws
                Err(RowSkip::NoDate) => trace!(row = index, "row has no date token"),
                Err(reason) => {
                    debug!(game_id = %game.id, row = index, ?reason, text = %row, "skipping row");
                    page.rows_skipped += 1;
                },
            }
        }

        debug!(
            game_id = %game.id,
            rows = page.rows_seen,
            records = page.records.len(),
            skipped = page.rows_skipped,
            "parsed archive page"
        );
        page
    }

    /// Apply the heuristic to the text of one row unit
    pub fn parse_row(
        &self,
        text: &str,
        game: &GameConfig,
        source_url: &str,
    ) -> Result<DrawRecord, RowSkip> {
        let shape = &game.shape;

        let caps = DATE_RE.captures(text).ok_or(RowSkip::NoDate)?;
        let draw_date = parse_date(&caps).ok_or_else(|| RowSkip::BadDate(caps[0].to_string()))?;

        let without_dates = DATE_RE.replace_all(text, " ");
        let ints: Vec<u64> = INT_RE
            .find_iter(&without_dates)
            .filter_map(|m| m.as_str().parse::<u64>().ok())
            .collect();

        let candidates: Vec<(usize, u32)> = ints
            .iter()
            .enumerate()
            .filter(|(_, v)| shape.contains(**v))
            .filter_map(|(i, v)| u32::try_from(*v).ok().map(|n| (i, n)))
            .collect();

        let needed = shape.required_tokens();
        if candidates.len() < needed {
            return Err(RowSkip::TooFewNumbers {
                found: candidates.len(),
                needed,
            });
        }

        let selected = &candidates[candidates.len() - needed..];
        let consumed: HashSet<usize> = selected.iter().map(|(i, _)| *i).collect();
        let selected_values: Vec<u32> = selected.iter().map(|(_, n)| *n).collect();

        let mut numbers = selected_values[..shape.numbers_count].to_vec();
        numbers.sort_unstable();
        let bonus_numbers = (shape.bonus_count > 0)
            .then(|| selected_values[shape.numbers_count..].to_vec());

        let leftovers: Vec<u64> = ints
            .iter()
            .enumerate()
            .filter(|(i, v)| !consumed.contains(i) && (1..=MAX_SEQUENCE_ID).contains(*v))
            .map(|(_, v)| *v)
            .collect();
        // an out-of-range integer beats an in-range leftover such as a row index
        let sequence_id = leftovers
            .iter()
            .find(|v| !shape.contains(**v))
            .or_else(|| leftovers.first())
            .map(|v| v.to_string());

        let (draw_id, id_source) = match sequence_id {
            Some(id) => (id, "sequence"),
            None => (synthesize_draw_id(draw_date, &selected_values), "synthesized"),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(META_PARSER.to_string(), serde_json::json!(PARSER_NAME));
        metadata.insert(META_DRAW_ID_SOURCE.to_string(), serde_json::json!(id_source));

        let record = DrawRecord {
            game_id: game.id.clone(),
            draw_id,
            draw_date,
            numbers,
            bonus_numbers,
            source_url: source_url.to_string(),
            checksum: String::new(),
            metadata,
        };

        record
            .validate(shape)
            .map_err(|e| RowSkip::Invalid(e.to_string()))?;

        Ok(record)
    }
}

/// Deterministic id for rows without a sequence number:
/// `YYYY-MM-DD-n1-n2-...` over the selected numbers in extraction order.
pub fn synthesize_draw_id(draw_date: NaiveDate, selected: &[u32]) -> String {
    let mut id = draw_date.format("%Y-%m-%d").to_string();
    for n in selected {
        id.push('-');
        id.push_str(&n.to_string());
    }
    id
}

fn parse_date(caps: &regex::Captures<'_>) -> Option<NaiveDate> {
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Split content into row texts with whitespace collapsed.
///
/// Table rows when there are any, otherwise the non-empty lines of the
/// document text.
fn row_units(content: &str) -> Vec<String> {
    let document = Html::parse_document(content);

    let rows: Vec<String> = document
        .select(&ROW_SELECTOR)
        .map(|tr| collapse_whitespace(tr.text()))
        .filter(|text| !text.is_empty())
        .collect();
    if !rows.is_empty() {
        return rows;
    }

    let text: String = document.root_element().text().collect();
    text.lines()
        .map(|line| collapse_whitespace(std::iter::once(line)))
        .filter(|line| !line.is_empty())
        .collect()
}

fn collapse_whitespace<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lotto_common::GameShape;

    const URL: &str = "https://www.pais.co.il/lotto/archive.aspx";

    fn game(shape: GameShape) -> GameConfig {
        GameConfig {
            id: "pais_lotto".to_string(),
            name: "Lotto".to_string(),
            official_domain: "pais.co.il".to_string(),
            url: URL.to_string(),
            shape,
            data_subdir: "datasets/pais/lotto/ndjson".into(),
        }
    }

    fn lotto() -> GameConfig {
        game(GameShape::new(6, 1, 1, 37))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_leading_sequence_number_becomes_draw_id() {
        let record = HeuristicParser::new()
            .parse_row("12 15/06/2024 03 11 19 22 28 35 07", &lotto(), URL)
            .unwrap();

        assert_eq!(record.numbers, vec![3, 11, 19, 22, 28, 35]);
        assert_eq!(record.bonus_numbers, Some(vec![7]));
        assert_eq!(record.draw_date, date(2024, 6, 15));
        assert_eq!(record.draw_id, "12");
        assert_eq!(record.metadata[META_PARSER], PARSER_NAME);
        assert_eq!(record.metadata[META_DRAW_ID_SOURCE], "sequence");
        assert!(record.checksum.is_empty());
    }

    #[test]
    fn test_out_of_range_sequence_number() {
        let record = HeuristicParser::new()
            .parse_row("Draw 3712 | 15/06/2024 | 35 03 28 11 22 19 | 7 | prize 1000000", &lotto(), URL)
            .unwrap();

        assert_eq!(record.draw_id, "3712");
        assert_eq!(record.numbers, vec![3, 11, 19, 22, 28, 35]);
        assert_eq!(record.bonus_numbers, Some(vec![7]));
    }

    #[test]
    fn test_out_of_range_id_beats_row_index() {
        let parser = HeuristicParser::new();
        let first = parser
            .parse_row("1 3712 15/06/2024 03 11 19 22 28 35 07", &lotto(), URL)
            .unwrap();
        let second = parser
            .parse_row("2 3713 18/06/2024 04 08 15 16 23 36 01", &lotto(), URL)
            .unwrap();

        assert_eq!(first.draw_id, "3712");
        assert_eq!(second.draw_id, "3713");
        assert_eq!(first.numbers, vec![3, 11, 19, 22, 28, 35]);
        assert_eq!(first.metadata[META_DRAW_ID_SOURCE], "sequence");
    }

    #[test]
    fn test_too_few_numbers_is_skipped() {
        let err = HeuristicParser::new()
            .parse_row("4021 15/06/2024 03 11 19 22 28 35", &lotto(), URL)
            .unwrap_err();
        assert_eq!(err, RowSkip::TooFewNumbers { found: 6, needed: 7 });
    }

    #[test]
    fn test_irregular_whitespace_still_parses() {
        let record = HeuristicParser::new()
            .parse_row("\t3712\n\n15/06/2024   03\u{a0}11 \t19    22\n28 35\r\n 07  ", &lotto(), URL)
            .unwrap();
        assert_eq!(record.numbers, vec![3, 11, 19, 22, 28, 35]);
        assert_eq!(record.draw_id, "3712");
    }

    #[test]
    fn test_date_digits_do_not_pollute_candidates() {
        // 05 and 06 from the date would otherwise be counted as numbers
        let err = HeuristicParser::new()
            .parse_row("9000 05/06/2024 03 11 19 22 28", &lotto(), URL)
            .unwrap_err();
        assert_eq!(err, RowSkip::TooFewNumbers { found: 5, needed: 7 });
    }

    #[test]
    fn test_missing_and_impossible_dates() {
        let parser = HeuristicParser::new();
        assert_eq!(
            parser.parse_row("3712 03 11 19 22 28 35 07", &lotto(), URL).unwrap_err(),
            RowSkip::NoDate
        );
        assert_eq!(
            parser.parse_row("3712 31/02/2024 03 11 19 22 28 35 07", &lotto(), URL).unwrap_err(),
            RowSkip::BadDate("31/02/2024".to_string())
        );
    }

    #[test]
    fn test_duplicate_numbers_are_skipped() {
        let err = HeuristicParser::new()
            .parse_row("3712 15/06/2024 03 03 19 22 28 35 07", &lotto(), URL)
            .unwrap_err();
        assert!(matches!(err, RowSkip::Invalid(_)));
    }

    #[test]
    fn test_synthesized_id_is_deterministic() {
        let parser = HeuristicParser::new();
        let row = "15/06/2024 03 11 19 22 28 35 07";
        let first = parser.parse_row(row, &lotto(), URL).unwrap();
        let second = parser.parse_row(row, &lotto(), URL).unwrap();

        assert_eq!(first.draw_id, "2024-06-15-3-11-19-22-28-35-7");
        assert_eq!(first.draw_id, second.draw_id);
        assert_eq!(first.metadata[META_DRAW_ID_SOURCE], "synthesized");
    }

    #[test]
    fn test_game_without_bonus() {
        let game = game(GameShape::new(5, 0, 1, 50));
        let record = HeuristicParser::new()
            .parse_row("812 01/01/2023 50 1 17 9 33", &game, URL)
            .unwrap();
        assert_eq!(record.numbers, vec![1, 9, 17, 33, 50]);
        assert_eq!(record.bonus_numbers, None);
        assert_eq!(record.draw_id, "812");
    }

    #[test]
    fn test_html_table_page() {
        let html = r#"
            <html><body>
            <table class="archive">
              <tr><th>Draw</th><th>Date</th><th>Numbers</th><th>Strong</th></tr>
              <tr class="row">
                <td>3712</td><td><span>15/06/2024</span></td>
                <td><ul><li>3</li><li>11</li><li>19</li><li>22</li><li>28</li><li>35</li></ul></td>
                <td><b>7</b></td>
              </tr>
              <tr><td>3711</td><td>11/06/2024</td><td>1 2 3</td><td>4</td></tr>
              <tr><td>3710</td><td>08/06/2024</td><td>5 9 14 21 30 37</td><td>2</td></tr>
              <tr><td colspan="4">Page 1 of 40</td></tr>
            </table>
            </body></html>
        "#;

        let page = HeuristicParser::new().parse(html, &lotto(), URL);

        assert_eq!(page.rows_seen, 5);
        assert_eq!(page.rows_skipped, 1);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].draw_id, "3712");
        assert_eq!(page.records[0].numbers, vec![3, 11, 19, 22, 28, 35]);
        assert_eq!(page.records[1].draw_id, "3710");
        assert_eq!(page.records[1].bonus_numbers, Some(vec![2]));
        assert!(page.records.iter().all(|r| r.source_url == URL));
    }

    #[test]
    fn test_plain_text_fallback() {
        let text = "Results\n3712 15/06/2024 03 11 19 22 28 35 07\n\n3711 11/06/2024 04 08 15 16 23 36 01\n";
        let page = HeuristicParser::new().parse(text, &lotto(), URL);

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].draw_id, "3711");
        assert_eq!(page.records[1].numbers, vec![4, 8, 15, 16, 23, 36]);
        assert_eq!(page.records[1].bonus_numbers, Some(vec![1]));
    }
}
