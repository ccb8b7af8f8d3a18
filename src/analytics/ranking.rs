//! Top performers: per-company means ordered by one ESG component.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::stats::{mean, round_opt};
use crate::dataset::coerce::parse_number;
use crate::dataset::{
    COMPANY_NAME, Cell, Dataset, ESG_ENVIRONMENTAL, ESG_GOVERNANCE, ESG_OVERALL, ESG_SOCIAL,
    INDUSTRY, REVENUE, cell_at,
};

pub const DEFAULT_LIMIT: usize = 10;

/// ESG component a ranking sorts by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Category {
    #[default]
    Overall,
    Environmental,
    Social,
    Governance,
}

impl Category {
    /// Case-insensitive; anything unrecognised ranks by overall score.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "environmental" => Self::Environmental,
            "social" => Self::Social,
            "governance" => Self::Governance,
            _ => Self::Overall,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Overall => ESG_OVERALL,
            Self::Environmental => ESG_ENVIRONMENTAL,
            Self::Social => ESG_SOCIAL,
            Self::Governance => ESG_GOVERNANCE,
        }
    }

    fn score(self, performer: &Performer) -> Option<f64> {
        match self {
            Self::Overall => performer.esg_overall,
            Self::Environmental => performer.esg_environmental,
            Self::Social => performer.esg_social,
            Self::Governance => performer.esg_governance,
        }
    }
}

/// Ranking parameters carried next to the filters in a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankRequest {
    pub category: Category,
    pub limit: usize,
}

impl Default for RankRequest {
    fn default() -> Self {
        Self {
            category: Category::Overall,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl RankRequest {
    pub fn from_json(value: &Value) -> Self {
        let category = value
            .get("category")
            .and_then(Value::as_str)
            .map(Category::parse)
            .unwrap_or_default();
        let limit = value.get("limit").map_or(DEFAULT_LIMIT, parse_limit);
        Self { category, limit }
    }
}

/// A number or numeric string, truncated toward zero and clamped to at
/// least 1. Anything else means the default.
pub fn parse_limit(value: &Value) -> usize {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => (v.trunc().max(1.0)) as usize,
        _ => DEFAULT_LIMIT,
    }
}

/// One ranked company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performer {
    #[serde(rename = "CompanyName")]
    pub company_name: String,
    #[serde(rename = "ESG_Overall")]
    pub esg_overall: Option<f64>,
    #[serde(rename = "ESG_Environmental")]
    pub esg_environmental: Option<f64>,
    #[serde(rename = "ESG_Social")]
    pub esg_social: Option<f64>,
    #[serde(rename = "ESG_Governance")]
    pub esg_governance: Option<f64>,
    #[serde(rename = "Industry")]
    pub industry: Option<String>,
    #[serde(rename = "Revenue")]
    pub revenue: Option<f64>,
}

/// The `limit` best companies by `category`, highest first.
///
/// Companies keep first-encountered order among equal scores, and a company
/// with no value in the sort column is not ranked.
pub fn rank(dataset: &Dataset, category: Category, limit: usize) -> Vec<Performer> {
    let company = dataset.column_index(COMPANY_NAME);
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&[Cell]>> = HashMap::new();
    for row in dataset.rows() {
        let Some(name) = cell_at(row, company).as_key() else {
            continue;
        };
        groups
            .entry(name.clone())
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(row);
    }

    let idx = |c: &str| dataset.column_index(c);
    let (overall, env, social, gov) = (
        idx(ESG_OVERALL),
        idx(ESG_ENVIRONMENTAL),
        idx(ESG_SOCIAL),
        idx(ESG_GOVERNANCE),
    );
    let (industry, revenue) = (idx(INDUSTRY), idx(REVENUE));

    let avg = |rows: &[&[Cell]], index: Option<usize>| {
        round_opt(mean(rows.iter().map(|r| cell_at(r, index).as_f64())), 2)
    };

    let mut performers: Vec<(f64, Performer)> = order
        .into_iter()
        .filter_map(|name| {
            let rows = groups.remove(&name)?;
            let performer = Performer {
                esg_overall: avg(&rows, overall),
                esg_environmental: avg(&rows, env),
                esg_social: avg(&rows, social),
                esg_governance: avg(&rows, gov),
                industry: rows.iter().find_map(|r| cell_at(r, industry).as_key()),
                revenue: avg(&rows, revenue),
                company_name: name,
            };
            Some((category.score(&performer)?, performer))
        })
        .collect();

    // Stable: equal scores keep first-encountered order.
    performers.sort_by(|a, b| b.0.total_cmp(&a.0));
    performers
        .into_iter()
        .take(limit.max(1))
        .map(|(_, p)| p)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
