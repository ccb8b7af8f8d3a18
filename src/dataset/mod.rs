//! Tabular dataset model shared by every stage of the analytics pipeline.
//!
//! A [`Dataset`] is an ordered list of rows over a named column set. Cells are
//! loosely typed on the way in (whatever the uploader sent) and become strictly
//! numeric or [`Cell::Missing`] after [`coerce::coerce`] runs.
//!
//! Pipeline per request:
//!
//! ```text
//! resolver::DatasetResolver -> coerce::coerce -> filter::apply -> analytics
//! ```

pub mod coerce;
pub mod resolver;
pub mod sample;
pub mod source;

use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Canonical schema
// ---------------------------------------------------------------------------

pub const COMPANY_NAME: &str = "CompanyName";
pub const INDUSTRY: &str = "Industry";
pub const REGION: &str = "Region";
pub const YEAR: &str = "Year";
pub const REVENUE: &str = "Revenue";
pub const PROFIT_MARGIN: &str = "ProfitMargin";
pub const MARKET_CAP: &str = "MarketCap";
pub const GROWTH_RATE: &str = "GrowthRate";
pub const ESG_OVERALL: &str = "ESG_Overall";
pub const ESG_ENVIRONMENTAL: &str = "ESG_Environmental";
pub const ESG_SOCIAL: &str = "ESG_Social";
pub const ESG_GOVERNANCE: &str = "ESG_Governance";
pub const CARBON_EMISSIONS: &str = "CarbonEmissions";
pub const WATER_USAGE: &str = "WaterUsage";
pub const ENERGY_CONSUMPTION: &str = "EnergyConsumption";

/// Every column the analytics views know about, in display order.
pub const CANONICAL_COLUMNS: [&str; 15] = [
    COMPANY_NAME,
    INDUSTRY,
    REGION,
    YEAR,
    REVENUE,
    PROFIT_MARGIN,
    MARKET_CAP,
    GROWTH_RATE,
    ESG_OVERALL,
    ESG_ENVIRONMENTAL,
    ESG_SOCIAL,
    ESG_GOVERNANCE,
    CARBON_EMISSIONS,
    WATER_USAGE,
    ENERGY_CONSUMPTION,
];

/// Columns that are parsed as numbers by the coercion layer.
pub const NUMERIC_COLUMNS: [&str; 12] = [
    YEAR,
    REVENUE,
    PROFIT_MARGIN,
    MARKET_CAP,
    GROWTH_RATE,
    ESG_OVERALL,
    ESG_ENVIRONMENTAL,
    ESG_SOCIAL,
    ESG_GOVERNANCE,
    CARBON_EMISSIONS,
    WATER_USAGE,
    ENERGY_CONSUMPTION,
];

/// The four ESG score components, overall first.
pub const ESG_COMPONENTS: [&str; 4] = [ESG_OVERALL, ESG_ENVIRONMENTAL, ESG_SOCIAL, ESG_GOVERNANCE];

/// Columns an uploaded dataset must carry to be accepted.
pub const REQUIRED_UPLOAD_COLUMNS: [&str; 9] = [
    COMPANY_NAME,
    INDUSTRY,
    REGION,
    YEAR,
    REVENUE,
    ESG_OVERALL,
    ESG_ENVIRONMENTAL,
    ESG_SOCIAL,
    ESG_GOVERNANCE,
];

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// A single dataset value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Absent, empty, or unparsable.
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
}

static MISSING: Cell = Cell::Missing;

impl Cell {
    /// Convert a raw JSON value as received from an upload.
    ///
    /// Booleans, arrays and objects are kept as text; the coercion layer
    /// decides later whether they mean anything numerically.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Missing, Self::Float),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Bool(b) => Self::Text(b.to_string()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Numeric view of the cell. Text is never reinterpreted here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) if f.is_finite() => Some(*f),
            _ => None,
        }
    }

    /// Grouping/matching key for categorical columns.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) if f.is_finite() => Some(f.to_string()),
            Self::Float(_) => None,
            Self::Text(s) => Some(s.clone()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Missing => Value::Null,
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Missing => serializer.serialize_none(),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(_) => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// An in-memory table: named columns and rows of cells aligned to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// An empty dataset over the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// An empty dataset carrying the canonical columns, so consumers never
    /// have to special-case "no schema".
    pub fn empty_canonical() -> Self {
        Self::new(CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect())
    }

    /// Build a dataset from JSON records.
    ///
    /// Declared `columns` come first in their given order; keys that only
    /// appear inside records are appended in first-seen order. A record that
    /// lacks a column gets [`Cell::Missing`] there.
    pub fn from_records(columns: &[String], records: &[serde_json::Map<String, Value>]) -> Self {
        let mut all_columns: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if !all_columns.contains(column) {
                all_columns.push(column.clone());
            }
        }
        for record in records {
            for key in record.keys() {
                if !all_columns.contains(key) {
                    all_columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                all_columns
                    .iter()
                    .map(|c| record.get(c).map_or(Cell::Missing, Cell::from_json))
                    .collect()
            })
            .collect();

        Self {
            columns: all_columns,
            rows,
        }
    }

    /// Append a row. Short rows are padded with [`Cell::Missing`] and long
    /// rows truncated so every row stays aligned with the columns.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Missing);
        self.rows.push(row);
    }

    /// A dataset with the same columns and the given rows.
    pub fn with_rows(&self, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<Cell>] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, if the dataset has it.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column. An absent column reads as all-missing.
    pub fn column<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Cell> + use<'a> {
        let index = self.column_index(name);
        self.rows.iter().map(move |row| cell_at(row, index))
    }

    /// Numeric values of one column, `None` where missing.
    pub fn numbers<'a>(&'a self, name: &str) -> impl Iterator<Item = Option<f64>> + use<'a> {
        self.column(name).map(Cell::as_f64)
    }

    /// Rows rendered as ordered JSON objects, one per row.
    pub fn records(&self) -> impl Iterator<Item = RecordView<'_>> {
        self.rows.iter().map(|row| RecordView {
            columns: &self.columns,
            row,
        })
    }
}

/// Cell of `row` at a resolved column position; an unresolved column is missing.
pub fn cell_at(row: &[Cell], index: Option<usize>) -> &Cell {
    index.and_then(|i| row.get(i)).unwrap_or(&MISSING)
}

/// Borrowed view of one row that serializes as a JSON object in column order.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    columns: &'a [String],
    row: &'a [Cell],
}

impl Serialize for RecordView<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(self.row.iter()) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<serde_json::Map<String, Value>> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn from_records_appends_undeclared_columns() {
        let rows = records(json!([
            {"CompanyName": "A", "Extra": 1},
            {"CompanyName": "B", "Year": 2020}
        ]));
        let ds = Dataset::from_records(&["CompanyName".to_string()], &rows);
        assert_eq!(ds.columns(), &["CompanyName", "Extra", "Year"]);
        assert_eq!(ds.rows()[0][2], Cell::Missing);
        assert_eq!(ds.rows()[1][2], Cell::Int(2020));
    }

    #[test]
    fn absent_column_reads_as_missing() {
        let rows = records(json!([{"CompanyName": "A"}]));
        let ds = Dataset::from_records(&[], &rows);
        let revenue: Vec<Option<f64>> = ds.numbers(REVENUE).collect();
        assert_eq!(revenue, vec![None]);
    }

    #[test]
    fn record_view_keeps_column_order() {
        let rows = records(json!([{"Zeta": 1, "Alpha": "x"}]));
        let ds = Dataset::from_records(&["Zeta".to_string(), "Alpha".to_string()], &rows);
        let json = serde_json::to_string(&ds.records().next().unwrap()).unwrap();
        assert_eq!(json, r#"{"Zeta":1,"Alpha":"x"}"#);
    }

    #[test]
    fn push_row_pads_short_rows() {
        let mut ds = Dataset::new(vec!["a".into(), "b".into()]);
        ds.push_row(vec![Cell::Int(1)]);
        assert_eq!(ds.rows()[0], vec![Cell::Int(1), Cell::Missing]);
    }

    #[test]
    fn empty_canonical_has_schema() {
        let ds = Dataset::empty_canonical();
        assert!(ds.is_empty());
        assert_eq!(ds.columns().len(), CANONICAL_COLUMNS.len());
    }
}
