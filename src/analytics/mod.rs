//! Aggregation and ranking over a resolved dataset.
//!
//! [`pipeline`] runs coercion and filtering; [`compute`] turns the result
//! into one of the named views. Both are pure: no I/O, no errors.

pub mod ranking;
pub mod stats;
pub mod views;

use std::fmt;

use serde::Serialize;

use crate::dataset::Dataset;
use crate::dataset::coerce::coerce;
use crate::filter::{self, FilterSpec};
use ranking::{Performer, RankRequest};
use views::{CorrelationMatrix, ExportView, FilterDomain, GroupSummary, Overview, TrendPoint};

/// A derived view, named as on the HTTP and CLI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Filters,
    Overview,
    TopPerformers,
    IndustryAnalysis,
    RegionalInsights,
    Trends,
    Correlations,
    Export,
}

impl View {
    pub const ALL: [View; 8] = [
        View::Filters,
        View::Overview,
        View::TopPerformers,
        View::IndustryAnalysis,
        View::RegionalInsights,
        View::Trends,
        View::Correlations,
        View::Export,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Filters => "filters",
            Self::Overview => "overview",
            Self::TopPerformers => "top-performers",
            Self::IndustryAnalysis => "industry-analysis",
            Self::RegionalInsights => "regional-insights",
            Self::Trends => "trends",
            Self::Correlations => "correlations",
            Self::Export => "export",
        }
    }

    /// Whether the view reads a filter object. `filters` describes the
    /// unfiltered dataset.
    pub fn is_filtered(self) -> bool {
        self != Self::Filters
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output of [`compute`]; serializes as the bare view body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewResult {
    Filters(FilterDomain),
    Overview(Overview),
    TopPerformers(Vec<Performer>),
    Groups(Vec<GroupSummary>),
    Trends(Vec<TrendPoint>),
    Correlations(CorrelationMatrix),
    Export(ExportView),
}

/// Coerce a raw dataset and keep the rows matching `spec`.
pub fn pipeline(raw: Dataset, spec: &FilterSpec) -> Dataset {
    let coerced = coerce(raw);
    if spec.is_unconstrained() {
        return coerced;
    }
    filter::apply(&coerced, spec)
}

/// Compute a view over an already coerced and filtered dataset.
pub fn compute(view: View, dataset: &Dataset, rank: &RankRequest) -> ViewResult {
    match view {
        View::Filters => ViewResult::Filters(views::filter_domain(dataset)),
        View::Overview => ViewResult::Overview(views::overview(dataset)),
        View::TopPerformers => {
            ViewResult::TopPerformers(ranking::rank(dataset, rank.category, rank.limit))
        }
        View::IndustryAnalysis => ViewResult::Groups(views::industry_analysis(dataset)),
        View::RegionalInsights => ViewResult::Groups(views::regional_insights(dataset)),
        View::Trends => ViewResult::Trends(views::trends(dataset)),
        View::Correlations => ViewResult::Correlations(views::correlations(dataset)),
        View::Export => ViewResult::Export(views::export(dataset)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
