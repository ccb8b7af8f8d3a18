//! Derived views over a filtered dataset.
//!
//! Every function here accepts an empty dataset and returns the view's
//! zero/empty shape for it.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::ser::SerializeMap;

use super::stats::{distinct_count, mean, pearson, round_opt, round_to, sum};
use crate::dataset::{
    CARBON_EMISSIONS, COMPANY_NAME, Cell, Dataset, ESG_COMPONENTS, ESG_ENVIRONMENTAL,
    ESG_GOVERNANCE, ESG_OVERALL, ESG_SOCIAL, GROWTH_RATE, INDUSTRY, PROFIT_MARGIN, REGION,
    RecordView, REVENUE, YEAR, cell_at,
};

/// Decimals for means in every view except correlations.
const MEAN_PLACES: i32 = 2;
const CORRELATION_PLACES: i32 = 3;

/// Columns of the correlation matrix, in output order.
pub const CORRELATION_COLUMNS: [&str; 5] =
    [ESG_OVERALL, REVENUE, PROFIT_MARGIN, GROWTH_RATE, CARBON_EMISSIONS];

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

/// Headline KPIs. All-missing means report `0.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_companies: usize,
    #[serde(rename = "avgESGScore")]
    pub avg_esg_score: f64,
    pub avg_revenue: f64,
    pub avg_growth_rate: f64,
    pub total_carbon_emissions: f64,
    pub avg_environmental_score: f64,
    pub avg_social_score: f64,
    pub avg_governance_score: f64,
}

pub fn overview(dataset: &Dataset) -> Overview {
    if dataset.is_empty() {
        return Overview::default();
    }

    let avg = |column: &str| round_to(mean(dataset.numbers(column)).unwrap_or(0.0), MEAN_PLACES);

    Overview {
        total_companies: distinct_count(dataset.column(COMPANY_NAME)),
        avg_esg_score: avg(ESG_OVERALL),
        avg_revenue: avg(REVENUE),
        avg_growth_rate: avg(GROWTH_RATE),
        total_carbon_emissions: round_to(sum(dataset.numbers(CARBON_EMISSIONS)), MEAN_PLACES),
        avg_environmental_score: avg(ESG_ENVIRONMENTAL),
        avg_social_score: avg(ESG_SOCIAL),
        avg_governance_score: avg(ESG_GOVERNANCE),
    }
}

// ---------------------------------------------------------------------------
// Industry / region breakdowns
// ---------------------------------------------------------------------------

/// Categorical column a breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Industry,
    Region,
}

impl Dimension {
    pub fn column(self) -> &'static str {
        match self {
            Self::Industry => INDUSTRY,
            Self::Region => REGION,
        }
    }
}

/// Per-group ESG means, revenue, emissions and company count.
///
/// Serializes with the dimension's column name as the key field, e.g.
/// `{"Industry": "Tech", "ESG_Overall": 75.0, ..., "CompanyCount": 1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub dimension: Dimension,
    pub key: String,
    /// Means of [`ESG_COMPONENTS`], in that order.
    pub esg: [Option<f64>; 4],
    pub revenue: Option<f64>,
    pub carbon_emissions: Option<f64>,
    pub company_count: usize,
}

impl GroupSummary {
    pub fn esg_overall(&self) -> Option<f64> {
        self.esg[0]
    }
}

impl Serialize for GroupSummary {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(8))?;
        map.serialize_entry(self.dimension.column(), &self.key)?;
        for (column, value) in ESG_COMPONENTS.iter().zip(self.esg.iter()) {
            map.serialize_entry(column, value)?;
        }
        map.serialize_entry(REVENUE, &self.revenue)?;
        map.serialize_entry(CARBON_EMISSIONS, &self.carbon_emissions)?;
        map.serialize_entry("CompanyCount", &self.company_count)?;
        map.end()
    }
}

/// Group rows by a categorical column. Groups come out sorted by key; rows
/// whose key is missing are left out.
pub fn breakdown(dataset: &Dataset, dimension: Dimension) -> Vec<GroupSummary> {
    let key_index = dataset.column_index(dimension.column());
    let mut groups: BTreeMap<String, Vec<&[Cell]>> = BTreeMap::new();
    for row in dataset.rows() {
        if let Some(key) = cell_at(row, key_index).as_key() {
            groups.entry(key).or_default().push(row);
        }
    }

    let esg_indices = ESG_COMPONENTS.map(|c| dataset.column_index(c));
    let revenue = dataset.column_index(REVENUE);
    let carbon = dataset.column_index(CARBON_EMISSIONS);
    let company = dataset.column_index(COMPANY_NAME);

    groups
        .into_iter()
        .map(|(key, rows)| GroupSummary {
            dimension,
            key,
            esg: esg_indices.map(|i| group_mean(&rows, i)),
            revenue: group_mean(&rows, revenue),
            carbon_emissions: group_mean(&rows, carbon),
            company_count: distinct_count(rows.iter().map(|r| cell_at(r, company))),
        })
        .collect()
}

pub fn industry_analysis(dataset: &Dataset) -> Vec<GroupSummary> {
    breakdown(dataset, Dimension::Industry)
}

pub fn regional_insights(dataset: &Dataset) -> Vec<GroupSummary> {
    breakdown(dataset, Dimension::Region)
}

fn group_mean(rows: &[&[Cell]], index: Option<usize>) -> Option<f64> {
    round_opt(mean(rows.iter().map(|r| cell_at(r, index).as_f64())), MEAN_PLACES)
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Per-year means, one point per year present in the data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    #[serde(rename = "Year")]
    pub year: i64,
    #[serde(rename = "ESG_Overall")]
    pub esg_overall: Option<f64>,
    #[serde(rename = "ESG_Environmental")]
    pub esg_environmental: Option<f64>,
    #[serde(rename = "ESG_Social")]
    pub esg_social: Option<f64>,
    #[serde(rename = "ESG_Governance")]
    pub esg_governance: Option<f64>,
    #[serde(rename = "Revenue")]
    pub revenue: Option<f64>,
    #[serde(rename = "CarbonEmissions")]
    pub carbon_emissions: Option<f64>,
    #[serde(rename = "GrowthRate")]
    pub growth_rate: Option<f64>,
}

/// Yearly trend points, ascending by year whatever the input order.
pub fn trends(dataset: &Dataset) -> Vec<TrendPoint> {
    let year_index = dataset.column_index(YEAR);
    let mut years: BTreeMap<i64, Vec<&[Cell]>> = BTreeMap::new();
    for row in dataset.rows() {
        if let Cell::Int(year) = cell_at(row, year_index) {
            years.entry(*year).or_default().push(row);
        }
    }

    let idx = |c: &str| dataset.column_index(c);
    let (overall, env, social, gov) = (
        idx(ESG_OVERALL),
        idx(ESG_ENVIRONMENTAL),
        idx(ESG_SOCIAL),
        idx(ESG_GOVERNANCE),
    );
    let (revenue, carbon, growth) = (idx(REVENUE), idx(CARBON_EMISSIONS), idx(GROWTH_RATE));

    years
        .into_iter()
        .map(|(year, rows)| TrendPoint {
            year,
            esg_overall: group_mean(&rows, overall),
            esg_environmental: group_mean(&rows, env),
            esg_social: group_mean(&rows, social),
            esg_governance: group_mean(&rows, gov),
            revenue: group_mean(&rows, revenue),
            carbon_emissions: group_mean(&rows, carbon),
            growth_rate: group_mean(&rows, growth),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Correlations
// ---------------------------------------------------------------------------

/// Symmetric Pearson matrix over [`CORRELATION_COLUMNS`].
///
/// Undefined coefficients (fewer than two complete pairs, zero variance)
/// are `None` and serialize as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    values: [[Option<f64>; 5]; 5],
}

impl CorrelationMatrix {
    pub fn columns(&self) -> &'static [&'static str] {
        &CORRELATION_COLUMNS
    }

    /// Coefficient for a column pair, `None` when undefined or unknown.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = CORRELATION_COLUMNS.iter().position(|c| *c == a)?;
        let j = CORRELATION_COLUMNS.iter().position(|c| *c == b)?;
        self.values[i][j]
    }
}

impl Serialize for CorrelationMatrix {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Row<'a>(&'a [Option<f64>; 5]);

        impl Serialize for Row<'_> {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(CORRELATION_COLUMNS.len()))?;
                for (column, value) in CORRELATION_COLUMNS.iter().zip(self.0.iter()) {
                    map.serialize_entry(column, value)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(CORRELATION_COLUMNS.len()))?;
        for (column, row) in CORRELATION_COLUMNS.iter().zip(self.values.iter()) {
            map.serialize_entry(column, &Row(row))?;
        }
        map.end()
    }
}

/// Pairwise-complete Pearson correlations, rounded to 3 decimals.
pub fn correlations(dataset: &Dataset) -> CorrelationMatrix {
    let columns: Vec<Vec<Option<f64>>> = CORRELATION_COLUMNS
        .iter()
        .map(|c| dataset.numbers(c).collect())
        .collect();

    let mut values = [[None; 5]; 5];
    for i in 0..CORRELATION_COLUMNS.len() {
        for j in i..CORRELATION_COLUMNS.len() {
            let pairs: Vec<(f64, f64)> = columns[i]
                .iter()
                .zip(columns[j].iter())
                .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                .collect();
            let r = round_opt(pearson(&pairs), CORRELATION_PLACES);
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    CorrelationMatrix { values }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// The filtered rows verbatim plus their count.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportView {
    pub dataset: Dataset,
}

impl ExportView {
    pub fn count(&self) -> usize {
        self.dataset.len()
    }
}

impl Serialize for ExportView {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data: Vec<RecordView<'_>> = self.dataset.records().collect();
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("data", &data)?;
        map.serialize_entry("count", &self.count())?;
        map.end()
    }
}

pub fn export(dataset: &Dataset) -> ExportView {
    ExportView {
        dataset: dataset.clone(),
    }
}

// ---------------------------------------------------------------------------
// Filter domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

/// Values a client can offer as filter choices for the current dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDomain {
    pub industries: Vec<String>,
    pub regions: Vec<String>,
    pub year_range: Range<i64>,
    pub revenue_range: Range<f64>,
    pub esg_range: Range<i64>,
}

/// Distinct categories (first-seen order) and numeric extents. Zeroed when
/// the dataset has no usable values.
pub fn filter_domain(dataset: &Dataset) -> FilterDomain {
    let years: Vec<i64> = dataset
        .column(YEAR)
        .filter_map(|c| match c {
            Cell::Int(y) => Some(*y),
            _ => None,
        })
        .collect();
    let revenues: Vec<f64> = dataset.numbers(REVENUE).flatten().collect();

    FilterDomain {
        industries: distinct_in_order(dataset, INDUSTRY),
        regions: distinct_in_order(dataset, REGION),
        year_range: Range {
            min: years.iter().copied().min().unwrap_or(0),
            max: years.iter().copied().max().unwrap_or(0),
        },
        revenue_range: Range {
            min: revenues.iter().copied().reduce(f64::min).unwrap_or(0.0),
            max: revenues.iter().copied().reduce(f64::max).unwrap_or(0.0),
        },
        esg_range: Range { min: 0, max: 100 },
    }
}

fn distinct_in_order(dataset: &Dataset, column: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for key in dataset.column(column).filter_map(Cell::as_key) {
        if !seen.contains(&key) {
            seen.push(key);
        }
    }
    seen
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
