//! Chart derivation from an extracted table
//!
//! Exactly one series is produced: the first column as category labels and
//! the second column as values. A table whose second column is not fully
//! numeric simply has no chart.

use crate::table::{extract_table, ExtractionError, ParsedTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single category/value series ready to be drawn as bars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub category_field: String,
    pub value_field: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub category: String,
    pub value: f64,
}

impl ChartPoint {
    pub fn new(category: impl Into<String>, value: f64) -> Self {
        Self {
            category: category.into(),
            value,
        }
    }
}

/// Chart construction failed after a usable table was found
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VisualizationError {
    #[error("table has {columns} column(s), need at least 2")]
    MissingValueColumn { columns: usize },
    #[error("value {value:?} in row {row} is out of range")]
    OutOfRange { row: usize, value: String },
}

/// Outcome of `build_chart` when nothing went wrong
#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutcome {
    Chart(ChartSpec),
    /// The value column holds a cell that is not a number
    NonNumeric { row: usize, value: String },
}

/// What the rendering surface should do with a finished answer
#[derive(Debug, Clone, PartialEq)]
pub enum Visualization {
    Chart(ChartSpec),
    NoTable(ExtractionError),
    NonNumeric { row: usize, value: String },
    Failed(VisualizationError),
}

impl Visualization {
    pub fn chart(&self) -> Option<&ChartSpec> {
        match self {
            Visualization::Chart(spec) => Some(spec),
            _ => None,
        }
    }

    /// Message for the user when chart construction itself failed
    pub fn warning(&self) -> Option<String> {
        match self {
            Visualization::Failed(e) => Some(format!("Visualization error: {e}")),
            _ => None,
        }
    }
}

/// Parse a cell as a number after removing thousands separators and spaces
pub fn coerce_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.chars().filter(|c| *c != ',' && *c != ' ').collect();
    cleaned.parse::<f64>().ok()
}

/// Pair column 0 labels with column 1 values when column 1 is all numeric
pub fn build_chart(table: &ParsedTable) -> Result<ChartOutcome, VisualizationError> {
    let (Some(category_field), Some(value_field)) = (table.headers.first(), table.headers.get(1))
    else {
        return Err(VisualizationError::MissingValueColumn {
            columns: table.headers.len(),
        });
    };

    let mut points = Vec::with_capacity(table.rows.len());
    for (row, (category, raw)) in table.column(0).zip(table.column(1)).enumerate() {
        let Some(value) = coerce_number(raw) else {
            return Ok(ChartOutcome::NonNumeric {
                row,
                value: raw.to_string(),
            });
        };
        if !value.is_finite() {
            return Err(VisualizationError::OutOfRange {
                row,
                value: raw.to_string(),
            });
        }
        points.push(ChartPoint::new(category, value));
    }

    Ok(ChartOutcome::Chart(ChartSpec {
        category_field: category_field.clone(),
        value_field: value_field.clone(),
        points,
    }))
}

/// Run table extraction and chart derivation over a finished answer
pub fn visualize(text: &str) -> Visualization {
    let table = match extract_table(text) {
        Ok(table) => table,
        Err(e) => return Visualization::NoTable(e),
    };

    match build_chart(&table) {
        Ok(ChartOutcome::Chart(spec)) => Visualization::Chart(spec),
        Ok(ChartOutcome::NonNumeric { row, value }) => Visualization::NonNumeric { row, value },
        Err(e) => Visualization::Failed(e),
    }
}
