//! Persistence for everything that outlives a request: each user's active
//! dataset, uploaded datasets with their metadata, and prediction history.
//!
//! The analytics core only sees the narrow [`DatasetStore`] trait. The
//! file-backed implementation lives in [`file`].

pub mod file;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::Dataset;

pub use file::FileStore;

/// One uploaded row, as sent by the client.
pub type Record = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// The dataset a user's analytics run against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveDataset {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Record>,
    /// Upload this dataset was activated from, if any.
    #[serde(default)]
    pub upload_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveDataset {
    pub fn to_dataset(&self) -> Dataset {
        Dataset::from_records(&self.columns, &self.data)
    }
}

/// Metadata recorded for every upload.
///
/// Uploads recorded through [`NewUpload`] carry no rows; `row_count` is 0
/// and only the descriptive fields are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMeta {
    pub id: String,
    pub filename: Option<String>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Descriptive fields of an upload recorded without its rows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUpload {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Full rows of an upload, kept for preview, activation and download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadData {
    pub upload_id: String,
    pub filename: Option<String>,
    pub columns: Vec<String>,
    pub data: Vec<Record>,
}

/// A recorded model prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub metrics: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when recording a prediction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPrediction {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub metrics: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip)]
    pub raw_response: Option<Value>,
}

/// Editable prediction fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUpdate {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PredictionUpdate {
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.notes.is_none()
    }
}

// ---------------------------------------------------------------------------
// Dataset lookup seam
// ---------------------------------------------------------------------------

/// Read access to users' active datasets.
///
/// Absence is `Ok(None)`; `Err` is reserved for storage failures.
pub trait DatasetStore: Send + Sync {
    fn active_dataset(&self, user_id: &str) -> anyhow::Result<Option<ActiveDataset>>;
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

const DEFAULT_PAGE_LIMIT: usize = 10;
const MAX_PAGE_LIMIT: usize = 100;

/// A requested page: 1-based `page`, `limit` within `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    /// Parse raw `page`/`limit` query values.
    ///
    /// If either value is present but not an integer, both fall back to the
    /// defaults. Valid values are clamped into range.
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page.map(|p| p.trim().parse::<i64>()).transpose();
        let limit = limit.map(|l| l.trim().parse::<i64>()).transpose();
        match (page, limit) {
            (Ok(page), Ok(limit)) => Self {
                page: page.unwrap_or(1).max(1) as usize,
                limit: limit
                    .unwrap_or(DEFAULT_PAGE_LIMIT as i64)
                    .clamp(1, MAX_PAGE_LIMIT as i64) as usize,
            },
            _ => Self::default(),
        }
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub pages: usize,
}

/// Slice an already-ordered list into the requested page.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len();
    let skip = (request.page - 1).saturating_mul(request.limit);
    let items = items.into_iter().skip(skip).take(request.limit).collect();
    Page {
        items,
        total,
        page: request.page,
        limit: request.limit,
        pages: total.div_ceil(request.limit),
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Case-insensitive pattern for `search`-style query parameters.
///
/// An invalid regex is matched literally. Blank input means no filter.
pub fn search_pattern(raw: Option<&str>) -> Option<Regex> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    RegexBuilder::new(raw)
        .case_insensitive(true)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(raw))
                .case_insensitive(true)
                .build()
        })
        .ok()
}

/// Uploads whose filename matches `search`, order preserved.
pub fn filter_uploads(uploads: Vec<UploadMeta>, search: Option<&str>) -> Vec<UploadMeta> {
    let Some(pattern) = search_pattern(search) else {
        return uploads;
    };
    uploads
        .into_iter()
        .filter(|u| u.filename.as_deref().is_some_and(|f| pattern.is_match(f)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
