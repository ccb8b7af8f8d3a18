//! Analytics handlers.
//!
//! Each view runs the full pipeline fresh: resolve the user's dataset,
//! coerce, filter, compute.

use anyhow::Result;
use serde_json::Value;

use super::{AppState, Reply};
use crate::analytics::ranking::RankRequest;
use crate::analytics::{self, View};
use crate::filter::FilterSpec;

/// `POST /api/<view>` and `GET /api/filters`.
///
/// The body is the filter object; `top-performers` also reads `category`
/// and `limit` from it. A missing or malformed body means no filters.
pub fn analytics_view(
    state: &AppState,
    user: &str,
    view: View,
    body: Option<&str>,
) -> Result<Reply> {
    let raw = state.resolver.resolve(user)?;

    let params = body
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .unwrap_or(Value::Null);
    let spec = if view.is_filtered() {
        FilterSpec::from_json(&params)
    } else {
        FilterSpec::default()
    };
    let rank = RankRequest::from_json(&params);

    let dataset = analytics::pipeline(raw, &spec);
    let result = analytics::compute(view, &dataset, &rank);
    Ok(Reply::ok(&result)?.with_rows(dataset.len()))
}

/// `GET /api/health`.
pub fn get_health() -> Result<Reply> {
    Reply::ok(&serde_json::json!({ "status": "healthy" }))
}
