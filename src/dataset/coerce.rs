//! Type coercion: turns loosely-typed uploads into the numeric schema.
//!
//! Every column in [`NUMERIC_COLUMNS`] is parsed cell by cell. Anything that
//! is not a finite number becomes [`Cell::Missing`]; nothing fails. Other
//! columns are left untouched. Coercing twice gives the same dataset as
//! coercing once.

use super::{Cell, Dataset, NUMERIC_COLUMNS, YEAR};

/// How a numeric column is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericKind {
    /// Whole numbers only; fractional values are treated as missing.
    Integer,
    Float,
}

fn kind_of(column: &str) -> Option<NumericKind> {
    if column == YEAR {
        Some(NumericKind::Integer)
    } else if NUMERIC_COLUMNS.contains(&column) {
        Some(NumericKind::Float)
    } else {
        None
    }
}

/// Normalize every numeric column of the dataset.
pub fn coerce(mut dataset: Dataset) -> Dataset {
    let targets: Vec<(usize, NumericKind)> = dataset
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(i, c)| kind_of(c).map(|k| (i, k)))
        .collect();

    if targets.is_empty() {
        return dataset;
    }

    for row in dataset.rows_mut() {
        for &(index, kind) in &targets {
            if let Some(cell) = row.get_mut(index) {
                let coerced = coerce_cell(cell, kind);
                *cell = coerced;
            }
        }
    }

    dataset
}

fn coerce_cell(cell: &Cell, kind: NumericKind) -> Cell {
    let value = match cell {
        Cell::Missing => None,
        Cell::Int(i) => Some(*i as f64),
        Cell::Float(f) => Some(*f),
        Cell::Text(s) => parse_number(s),
    };

    let Some(value) = value.filter(|v| v.is_finite()) else {
        return Cell::Missing;
    };

    match kind {
        NumericKind::Integer => {
            if let Cell::Int(i) = cell {
                Cell::Int(*i)
            } else if value.fract() == 0.0 && value.abs() < 9.0e15 {
                Cell::Int(value as i64)
            } else {
                Cell::Missing
            }
        }
        NumericKind::Float => Cell::Float(value),
    }
}

/// Parse a user-supplied numeric string.
///
/// Surrounding whitespace is ignored. Empty strings, non-numbers, `NaN` and
/// infinities all yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
