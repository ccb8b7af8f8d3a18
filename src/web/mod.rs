//! HTTP API for the analytics service.
//!
//! A sync `tiny_http` server whose listener is shared by a fixed pool of
//! worker threads. Each request is turned into an [`ApiRequest`], routed by
//! [`dispatch`] and answered with a JSON [`Reply`]. The router never touches
//! the socket, so it can be driven directly in tests.
//!
//! Identity comes from the `X-User-Id` header set by the fronting gateway.
//!
//! Launched via `esg-analytics serve` (default: `http://127.0.0.1:5000`).

mod api;
mod records;

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use chrono::Utc;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::analytics::View;
use crate::config::schema::AppConfig;
use crate::dataset::resolver::{DatasetResolver, FallbackPolicy};
use crate::dataset::sample::SampleDataset;
use crate::logging::{RequestLog, RequestLogEntry};
use crate::store::FileStore;

pub const USER_HEADER: &str = "X-User-Id";

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a handler needs, shared read-only across workers.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<FileStore>,
    pub resolver: DatasetResolver,
    pub log: RequestLog,
}

impl AppState {
    /// Open the store and build the resolver from `config`.
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = Arc::new(FileStore::open(config.storage.data_path())?);
        let log = RequestLog::from_config(&config.logging);
        Ok(Self::with_store(config, store, log))
    }

    /// Build state around an existing store.
    pub fn with_store(config: AppConfig, store: Arc<FileStore>, log: RequestLog) -> Self {
        let sample = Arc::new(SampleDataset::new(
            config.dataset.sample_file(),
            config.dataset.sample_seed,
        ));
        let resolver = DatasetResolver::new(
            store.clone(),
            sample,
            FallbackPolicy::from_config(&config.dataset),
        );
        Self {
            config,
            store,
            resolver,
            log,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / reply
// ---------------------------------------------------------------------------

/// A request stripped down to what the router reads.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus query string.
    pub url: String,
    pub user_id: Option<String>,
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            user_id: None,
            body: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }

    /// Decoded value of a query parameter.
    pub fn query(&self, key: &str) -> Option<String> {
        let query = self.url.split_once('?')?.1;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k) == key).then(|| decode_component(v))
        })
    }

    /// Non-blank user id.
    fn user(&self) -> Option<&str> {
        self.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// A JSON response body with its status.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    /// Rows analysed, recorded in the request log.
    pub rows: Option<usize>,
}

impl Reply {
    pub fn json<T: Serialize>(status: u16, data: &T) -> Result<Self> {
        let body = serde_json::to_string(data).context("failed to serialize JSON response")?;
        Ok(Self {
            status,
            body,
            rows: None,
        })
    }

    pub fn ok<T: Serialize>(data: &T) -> Result<Self> {
        Self::json(200, data)
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }).to_string(),
            rows: None,
        }
    }

    pub fn not_found() -> Self {
        Self::error(404, "not found")
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Parsed body, for tests and the CLI.
    pub fn value(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }

    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        Response::from_data(self.body.into_bytes())
            .with_header(content_type_json())
            .with_status_code(StatusCode(self.status))
    }
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Start the API server and block until the listener shuts down.
///
/// `workers` threads pull requests off the shared listener. A failing
/// request is answered with a 500 and never stops the server.
pub fn serve(config: AppConfig) -> Result<()> {
    let addr = config.server.addr.clone();
    let workers = config.server.workers.max(1);
    let state = Arc::new(AppState::new(config)?);

    let server = Arc::new(
        Server::http(&addr)
            .map_err(|e| anyhow::anyhow!("failed to start HTTP server on {addr}: {e}"))?,
    );

    println!("esg-analytics API running at http://{addr} ({workers} workers)");
    println!("Data directory: {}", state.store.root().display());
    println!("Press Ctrl+C to stop.\n");

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let server = Arc::clone(&server);
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name(format!("esg-worker-{i}"))
                .spawn(move || worker_loop(&server, &state))
                .context("failed to spawn worker thread")
        })
        .collect::<Result<_>>()?;

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn worker_loop(server: &Server, state: &AppState) {
    while let Ok(mut request) = server.recv() {
        let api_request = match read_request(&mut request, state.config.server.max_body_bytes) {
            Ok(r) => r,
            Err(reply) => {
                let _ = request.respond(reply.into_response());
                continue;
            }
        };
        let reply = handle(state, &api_request);
        let _ = request.respond(reply.into_response());
    }
}

/// Convert a raw request, reading the body for methods that carry one.
fn read_request(request: &mut Request, max_body: usize) -> Result<ApiRequest, Reply> {
    let method = request.method().clone();
    let mut api_request = ApiRequest::new(method.clone(), request.url());
    api_request.user_id = request
        .headers()
        .iter()
        .find(|h| h.field.equiv(USER_HEADER))
        .map(|h| h.value.as_str().to_string());

    if matches!(method, Method::Put | Method::Post | Method::Patch) {
        if request.body_length().is_some_and(|len| len > max_body) {
            return Err(Reply::error(413, "Request body too large"));
        }
        let mut buf = String::new();
        let limit = u64::try_from(max_body).unwrap_or(u64::MAX).saturating_add(1);
        if request.as_reader().take(limit).read_to_string(&mut buf).is_err() {
            return Err(Reply::error(400, "Request body is not valid UTF-8"));
        }
        if buf.len() > max_body {
            return Err(Reply::error(413, "Request body too large"));
        }
        api_request.body = Some(buf);
    }
    Ok(api_request)
}

/// Route a request, map errors to 500 and write the request log.
pub fn handle(state: &AppState, request: &ApiRequest) -> Reply {
    let started = Utc::now();
    let reply = dispatch(state, request).unwrap_or_else(|e| Reply::error(500, &format!("{e:#}")));

    let mut entry = RequestLogEntry::new(
        request.method.as_str(),
        request.path(),
        reply.status,
        started,
    );
    entry.user_id = request.user().map(String::from);
    entry.rows = reply.rows;
    state.log.record(&entry);

    reply
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Dispatch a request to its handler.
pub fn dispatch(state: &AppState, request: &ApiRequest) -> Result<Reply> {
    let path = request.path();
    let Some(rest) = path.strip_prefix("/api/") else {
        return Ok(Reply::not_found());
    };
    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
    let method = &request.method;
    let body = request.body.as_deref();

    if let (&Method::Get, ["health"]) = (method, segments.as_slice()) {
        return api::get_health();
    }

    let Some(user) = request.user() else {
        return Ok(Reply::error(401, "Missing user identity"));
    };

    match (method, segments.as_slice()) {
        // Analytics
        (&Method::Get, ["filters"]) => api::analytics_view(state, user, View::Filters, None),
        (&Method::Post, [name]) => match View::from_name(name).filter(|v| v.is_filtered()) {
            Some(view) => api::analytics_view(state, user, view, body),
            None => records_post(state, user, name, request),
        },

        // Uploads
        (&Method::Get, ["uploads"]) => records::list_uploads(state, user, request),
        (&Method::Get, ["uploads", id, "preview"]) => records::preview_upload(state, user, id),
        (&Method::Post, ["uploads", id, "analyze"]) => records::analyze_upload(state, user, id),
        (&Method::Get, ["uploads", id, "download"]) => {
            records::download_upload(state, user, id, request.query("format").as_deref())
        }
        (&Method::Delete, ["uploads", id]) => records::delete_upload(state, user, id),

        // Active dataset
        (&Method::Get, ["active-dataset"]) => records::get_active_dataset(state, user),

        // Prediction history
        (&Method::Get, ["predictions"]) => records::list_predictions(state, user, request),
        (&Method::Get, ["predictions", "analytics"]) => {
            records::prediction_analytics(state, user)
        }
        (&Method::Put, ["predictions", id]) => records::update_prediction(state, user, id, body),
        (&Method::Delete, ["predictions", id]) => records::delete_prediction(state, user, id),

        // Model
        (&Method::Get, ["model-status"]) => records::model_status(state),

        _ => Ok(Reply::not_found()),
    }
}

/// Single-segment POST routes that are not analytics views.
fn records_post(state: &AppState, user: &str, name: &str, request: &ApiRequest) -> Result<Reply> {
    let body = request.body.as_deref();
    match name {
        "upload-dataset" => records::upload_dataset(state, user, body),
        "uploads" => records::record_upload(state, user, body),
        "active-dataset" => records::set_active_dataset(state, user, body),
        "predictions" => records::save_prediction(state, user, body),
        "predict" => records::predict(state, user, body),
        "predict-batch" => records::predict_batch(state, user, body),
        _ => Ok(Reply::not_found()),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// JSON content type header.
pub(crate) fn content_type_json() -> Header {
    Header::from_bytes("Content-Type", "application/json; charset=utf-8").unwrap()
}

/// Percent-decode a query component (`+` is a space).
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
