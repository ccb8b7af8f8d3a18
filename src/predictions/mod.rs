//! Prediction history: listing filters and the summary analytics view.
//!
//! Records themselves are persisted by [`crate::store`]; the outbound model
//! call lives in [`client`].

pub mod client;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::dataset::coerce::parse_number;
use crate::store::{Prediction, search_pattern};

const RECENT_LIMIT: usize = 10;
const OUTPUT_BINS: usize = 5;
const UNKNOWN_MODEL: &str = "Unknown";

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Query parameters of the history listing.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Pattern matched against the model name or any tag.
    pub search: Option<String>,
    /// Exact tag, case-insensitive.
    pub tag: Option<String>,
    /// Pattern matched against the model name.
    pub model: Option<String>,
}

/// Predictions matching `query`, newest first.
pub fn filter_history(predictions: Vec<Prediction>, query: &HistoryQuery) -> Vec<Prediction> {
    let search = search_pattern(query.search.as_deref());
    let model = search_pattern(query.model.as_deref());
    let tag = query
        .tag
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let mut matched: Vec<Prediction> = predictions
        .into_iter()
        .filter(|p| {
            let name = p.model.as_deref().unwrap_or("");
            if let Some(search) = &search
                && !search.is_match(name)
                && !p.tags.iter().any(|t| search.is_match(t))
            {
                return false;
            }
            if let Some(tag) = tag
                && !p.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
            {
                return false;
            }
            if let Some(model) = &model
                && !model.is_match(name)
            {
                return false;
            }
            true
        })
        .collect();

    newest_first(&mut matched);
    matched
}

fn newest_first(predictions: &mut [Prediction]) {
    predictions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelCount {
    pub model: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCount {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputBin {
    pub range: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentPrediction {
    pub id: String,
    pub model: Option<String>,
    pub output: Value,
    pub created_at: String,
}

/// Summary of a user's prediction history.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionAnalytics {
    pub total_predictions: usize,
    pub models_used: Vec<ModelCount>,
    pub predictions_over_time: Vec<DateCount>,
    pub output_distribution: Vec<OutputBin>,
    pub recent_predictions: Vec<RecentPrediction>,
}

pub fn analytics(predictions: &[Prediction]) -> PredictionAnalytics {
    let mut per_day: BTreeMap<String, usize> = BTreeMap::new();
    for p in predictions {
        *per_day
            .entry(p.created_at.format("%Y-%m-%d").to_string())
            .or_default() += 1;
    }

    let outputs: Vec<f64> = predictions.iter().filter_map(|p| numeric_output(&p.output)).collect();

    let mut recent = predictions.to_vec();
    newest_first(&mut recent);
    let recent_predictions = recent
        .into_iter()
        .take(RECENT_LIMIT)
        .map(|p| RecentPrediction {
            id: p.id,
            model: p.model,
            output: p.output,
            created_at: p.created_at.to_rfc3339(),
        })
        .collect();

    PredictionAnalytics {
        total_predictions: predictions.len(),
        models_used: models_used(predictions),
        predictions_over_time: per_day
            .into_iter()
            .map(|(date, count)| DateCount { date, count })
            .collect(),
        output_distribution: histogram(&outputs, OUTPUT_BINS),
        recent_predictions,
    }
}

/// Prediction count per model name, in first-seen order.
pub fn models_used(predictions: &[Prediction]) -> Vec<ModelCount> {
    let mut counts: Vec<ModelCount> = Vec::new();
    for p in predictions {
        let name = p.model.as_deref().unwrap_or(UNKNOWN_MODEL);
        match counts.iter_mut().find(|c| c.model == name) {
            Some(entry) => entry.count += 1,
            None => counts.push(ModelCount {
                model: name.to_string(),
                count: 1,
            }),
        }
    }
    counts
}

/// A number, or a string holding one. Booleans and other shapes are not
/// numeric outputs.
fn numeric_output(output: &Value) -> Option<f64> {
    match output {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Equal-width histogram over `[min, max]`. Each bin is half-open except the
/// last, which includes `max`. Empty when all values are equal.
pub fn histogram(values: &[f64], bins: usize) -> Vec<OutputBin> {
    let (Some(min), Some(max)) = (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) else {
        return Vec::new();
    };
    if bins == 0 || min >= max {
        return Vec::new();
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let slot = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[slot] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let lo = min + width * i as f64;
            let hi = if i + 1 == bins { max } else { min + width * (i + 1) as f64 };
            OutputBin {
                range: format!("{lo:.1}-{hi:.1}"),
                count,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
