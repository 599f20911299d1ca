//! Best-effort extraction of a bar-delimited table from answer text
//!
//! The grammar is line based and intentionally lossy:
//! - a candidate line contains at least one `|` and no `-` (this drops
//!   separator rows such as `|---|---|`, and also any row whose cells
//!   contain a hyphen)
//! - the first candidate is the header row, the rest are data rows
//! - cells are split on `|` after trimming whitespace and the outer bars,
//!   then trimmed individually
//!
//! Cell text is kept as trimmed; no type coercion happens here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DELIMITER: char = '|';

/// Why no table could be extracted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no table found ({lines} candidate line(s), need at least 2)")]
    NoTable { lines: usize },
    #[error("table has {columns} column(s), need at least 2")]
    TooFewColumns { columns: usize },
    #[error("all {skipped} data row(s) were malformed")]
    NoRows { skipped: usize },
}

/// A header row plus data rows, every row as wide as the header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ParsedTable {
    /// Values of one column, in row order
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(index).map(String::as_str))
    }
}

fn is_candidate(line: &str) -> bool {
    line.contains(DELIMITER) && !line.contains('-')
}

fn split_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_matches(DELIMITER)
        .split(DELIMITER)
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// Pull the first table out of `text`.
///
/// Rows whose cell count differs from the header are skipped rather than
/// failing the whole table.
pub fn extract_table(text: &str) -> Result<ParsedTable, ExtractionError> {
    let lines: Vec<&str> = text.lines().filter(|line| is_candidate(line)).collect();
    let Some((header_line, data_lines)) = lines.split_first() else {
        return Err(ExtractionError::NoTable { lines: 0 });
    };
    if data_lines.is_empty() {
        return Err(ExtractionError::NoTable { lines: 1 });
    }

    let headers = split_cells(header_line);
    if headers.len() < 2 {
        return Err(ExtractionError::TooFewColumns {
            columns: headers.len(),
        });
    }

    let mut rows = Vec::with_capacity(data_lines.len());
    let mut skipped = 0;
    for line in data_lines {
        let cells = split_cells(line);
        if cells.len() == headers.len() {
            rows.push(cells);
        } else {
            tracing::debug!(
                expected = headers.len(),
                found = cells.len(),
                "Skipping malformed table row"
            );
            skipped += 1;
        }
    }

    if rows.is_empty() {
        return Err(ExtractionError::NoRows { skipped });
    }

    Ok(ParsedTable { headers, rows })
}
