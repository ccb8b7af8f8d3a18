//! Filter Engine: declarative row filters shared by every analytics view.
//!
//! A [`FilterSpec`] is parsed leniently from the request body. Each field
//! that survives parsing becomes one row predicate, and [`apply`] keeps the
//! rows that satisfy all of them, in their original order.
//!
//! - A numeric bound on a missing value fails (the row is excluded).
//! - An empty `industries`/`regions` list is no constraint at all.
//! - A malformed value drops that single constraint, never the request.

use serde_json::Value;

use crate::dataset::coerce::parse_number;
use crate::dataset::{
    CARBON_EMISSIONS, Cell, Dataset, ENERGY_CONSUMPTION, ESG_OVERALL, GROWTH_RATE, INDUSTRY,
    REGION, REVENUE, YEAR, cell_at,
};

// ---------------------------------------------------------------------------
// Filter object
// ---------------------------------------------------------------------------

/// Inclusive year bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearRange {
    pub min: f64,
    pub max: f64,
}

/// Typed filter object. `None`/empty fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub year_range: Option<YearRange>,
    pub industries: Vec<String>,
    pub regions: Vec<String>,
    pub min_esg_score: Option<f64>,
    pub min_revenue: Option<f64>,
    pub min_growth_rate: Option<f64>,
    pub max_carbon_emissions: Option<f64>,
    pub max_energy_consumption: Option<f64>,
}

impl FilterSpec {
    /// Parse a request body. Anything that is not a JSON object means "no
    /// filters"; unknown keys are ignored.
    pub fn from_json(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        Self {
            year_range: obj.get("yearRange").and_then(parse_year_range),
            industries: obj.get("industries").map(parse_string_list).unwrap_or_default(),
            regions: obj.get("regions").map(parse_string_list).unwrap_or_default(),
            min_esg_score: obj.get("minESGScore").and_then(parse_bound),
            min_revenue: obj.get("minRevenue").and_then(parse_bound),
            min_growth_rate: obj.get("minGrowthRate").and_then(parse_bound),
            max_carbon_emissions: obj.get("maxCarbonEmissions").and_then(parse_bound),
            max_energy_consumption: obj.get("maxEnergyConsumption").and_then(parse_bound),
        }
    }

    /// Parse a raw request body string; invalid JSON means "no filters".
    pub fn from_body(body: Option<&str>) -> Self {
        body.and_then(|b| serde_json::from_str::<Value>(b).ok())
            .map(|v| Self::from_json(&v))
            .unwrap_or_default()
    }

    /// True when no constraint is active.
    pub fn is_unconstrained(&self) -> bool {
        self.predicates().is_empty()
    }

    fn predicates(&self) -> Vec<Predicate<'_>> {
        let mut predicates = Vec::new();

        if let Some(range) = self.year_range {
            predicates.push(Predicate::Between {
                column: YEAR,
                min: range.min,
                max: range.max,
            });
        }
        if !self.industries.is_empty() {
            predicates.push(Predicate::OneOf {
                column: INDUSTRY,
                allowed: &self.industries,
            });
        }
        if !self.regions.is_empty() {
            predicates.push(Predicate::OneOf {
                column: REGION,
                allowed: &self.regions,
            });
        }

        let lower_bounds = [
            (ESG_OVERALL, self.min_esg_score),
            (REVENUE, self.min_revenue),
            (GROWTH_RATE, self.min_growth_rate),
        ];
        for (column, bound) in lower_bounds {
            if let Some(bound) = bound {
                predicates.push(Predicate::AtLeast { column, bound });
            }
        }

        let upper_bounds = [
            (CARBON_EMISSIONS, self.max_carbon_emissions),
            (ENERGY_CONSUMPTION, self.max_energy_consumption),
        ];
        for (column, bound) in upper_bounds {
            if let Some(bound) = bound {
                predicates.push(Predicate::AtMost { column, bound });
            }
        }

        predicates
    }
}

/// A single numeric bound: a JSON number or a numeric string.
fn parse_bound(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// `[min, max]` or `{"min": .., "max": ..}`. Both ends must parse.
fn parse_year_range(value: &Value) -> Option<YearRange> {
    let (min, max) = match value {
        Value::Array(items) if items.len() >= 2 => (&items[0], &items[1]),
        Value::Object(obj) => (obj.get("min")?, obj.get("max")?),
        _ => return None,
    };
    Some(YearRange {
        min: parse_bound(min)?,
        max: parse_bound(max)?,
    })
}

/// A list of category names, or a single name. Non-string entries other than
/// numbers are dropped.
fn parse_string_list(value: &Value) -> Vec<String> {
    let item = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match value {
        Value::Array(items) => items.iter().filter_map(item).collect(),
        other => item(other).into_iter().collect(),
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Predicate<'a> {
    Between {
        column: &'static str,
        min: f64,
        max: f64,
    },
    AtLeast {
        column: &'static str,
        bound: f64,
    },
    AtMost {
        column: &'static str,
        bound: f64,
    },
    OneOf {
        column: &'static str,
        allowed: &'a [String],
    },
}

impl Predicate<'_> {
    fn column(&self) -> &'static str {
        match self {
            Self::Between { column, .. }
            | Self::AtLeast { column, .. }
            | Self::AtMost { column, .. }
            | Self::OneOf { column, .. } => *column,
        }
    }

    fn matches(&self, cell: &Cell) -> bool {
        match self {
            Self::Between { min, max, .. } => cell.as_f64().is_some_and(|v| v >= *min && v <= *max),
            Self::AtLeast { bound, .. } => cell.as_f64().is_some_and(|v| v >= *bound),
            Self::AtMost { bound, .. } => cell.as_f64().is_some_and(|v| v <= *bound),
            Self::OneOf { allowed, .. } => cell
                .as_key()
                .is_some_and(|key| allowed.iter().any(|a| *a == key)),
        }
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Rows of `dataset` that satisfy every constraint in `spec`, in order.
///
/// The input is not modified; the result is a new dataset with the same
/// columns.
pub fn apply(dataset: &Dataset, spec: &FilterSpec) -> Dataset {
    let bound: Vec<(Option<usize>, Predicate<'_>)> = spec
        .predicates()
        .into_iter()
        .map(|p| (dataset.column_index(p.column()), p))
        .collect();

    let rows = dataset
        .rows()
        .iter()
        .filter(|row| bound.iter().all(|(index, p)| p.matches(cell_at(row, *index))))
        .cloned()
        .collect();

    dataset.with_rows(rows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
