//! Dataset management, prediction history and model proxy handlers.

use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{ApiRequest, AppState, Reply};
use crate::dataset::REQUIRED_UPLOAD_COLUMNS;
use crate::dataset::source::records_to_csv;
use crate::predictions::client::ModelClient;
use crate::predictions::{self, HistoryQuery};
use crate::store::{
    ActiveDataset, DatasetStore, NewPrediction, NewUpload, PageRequest, PredictionUpdate,
    Record, filter_uploads, paginate,
};

const PREVIEW_ROWS: usize = 10;
const MODEL_NOT_CONFIGURED: &str = "Model not configured on server. Contact administrator.";

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// `{filename, columns, data}` as sent by the upload page.
#[derive(Debug, Default, Deserialize)]
struct DatasetBody {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<Record>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictBody {
    #[serde(default)]
    inputs: Value,
}

#[derive(Debug, Default, Deserialize)]
struct BatchBody {
    #[serde(default)]
    data: Vec<Value>,
}

/// Parse a JSON body; an absent or blank body is the default value.
fn parse_body<T: DeserializeOwned + Default>(body: Option<&str>) -> Result<T, Reply> {
    match body.map(str::trim).filter(|b| !b.is_empty()) {
        None => Ok(T::default()),
        Some(b) => serde_json::from_str(b).map_err(|_| Reply::error(400, "Invalid JSON body")),
    }
}

macro_rules! body_or_reply {
    ($body:expr) => {
        match parse_body($body) {
            Ok(parsed) => parsed,
            Err(reply) => return Ok(reply),
        }
    };
}

fn page_request(request: &ApiRequest) -> PageRequest {
    PageRequest::parse(
        request.query("page").as_deref(),
        request.query("limit").as_deref(),
    )
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// `POST /api/upload-dataset`
pub fn upload_dataset(state: &AppState, user: &str, body: Option<&str>) -> Result<Reply> {
    let upload: DatasetBody = body_or_reply!(body);
    if upload.data.is_empty() || upload.columns.is_empty() {
        return Ok(Reply::error(400, "Invalid dataset"));
    }

    let missing: Vec<&str> = REQUIRED_UPLOAD_COLUMNS
        .iter()
        .copied()
        .filter(|c| !upload.columns.iter().any(|col| col.as_str() == *c))
        .collect();
    if !missing.is_empty() {
        return Reply::json(
            400,
            &json!({ "error": "Missing required columns", "missing": missing }),
        );
    }

    let meta = state
        .store
        .create_upload(user, upload.filename, upload.columns, upload.data)?;
    Reply::json(
        201,
        &json!({ "message": "Dataset uploaded successfully", "upload": meta }),
    )
}

/// `POST /api/uploads`: record upload metadata without rows.
pub fn record_upload(state: &AppState, user: &str, body: Option<&str>) -> Result<Reply> {
    let upload: NewUpload = body_or_reply!(body);
    let meta = state.store.record_upload(user, upload)?;
    Reply::json(201, &json!({ "message": "Upload recorded", "upload": meta }))
}

/// `GET /api/uploads?search=&page=&limit=`
pub fn list_uploads(state: &AppState, user: &str, request: &ApiRequest) -> Result<Reply> {
    let uploads = filter_uploads(
        state.store.list_uploads(user)?,
        request.query("search").as_deref(),
    );
    Reply::ok(&paginate(uploads, page_request(request)))
}

/// `GET /api/uploads/{id}/preview`
pub fn preview_upload(state: &AppState, user: &str, id: &str) -> Result<Reply> {
    let Some(meta) = state.store.upload(user, id)? else {
        return Ok(Reply::not_found());
    };

    let (columns, sample) = match state.store.upload_data(user, id)? {
        Some(data) if !data.data.is_empty() => {
            let columns = if data.columns.is_empty() {
                meta.columns.clone()
            } else {
                data.columns
            };
            let sample: Vec<Record> = data.data.into_iter().take(PREVIEW_ROWS).collect();
            (columns, sample)
        }
        _ => (meta.columns.clone(), Vec::new()),
    };

    Reply::ok(&json!({ "upload": meta, "columns": columns, "sample": sample }))
}

/// `POST /api/uploads/{id}/analyze`: make an upload the active dataset.
pub fn analyze_upload(state: &AppState, user: &str, id: &str) -> Result<Reply> {
    let Some(upload) = state.store.upload_data(user, id)? else {
        return Ok(Reply::error(404, "Dataset not found for this upload"));
    };
    if upload.data.is_empty() || upload.columns.is_empty() {
        return Ok(Reply::error(400, "Invalid dataset"));
    }

    let active = ActiveDataset {
        filename: upload.filename,
        columns: upload.columns,
        data: upload.data,
        upload_id: Some(upload.upload_id),
        updated_at: Utc::now(),
    };
    state.store.set_active(user, &active)?;
    Reply::ok(&json!({ "message": "Active dataset set" }))
}

/// `DELETE /api/uploads/{id}`
pub fn delete_upload(state: &AppState, user: &str, id: &str) -> Result<Reply> {
    let cleared = state.store.clear_active_for_upload(user, id)?;
    if !state.store.delete_upload(user, id)? {
        return Ok(Reply::not_found());
    }
    Reply::ok(&json!({ "message": "Upload deleted", "active_cleared": cleared }))
}

/// `GET /api/uploads/{id}/download?format=json|csv`
pub fn download_upload(
    state: &AppState,
    user: &str,
    id: &str,
    format: Option<&str>,
) -> Result<Reply> {
    let Some(upload) = state.store.upload_data(user, id)? else {
        return Ok(Reply::error(404, "Dataset not found"));
    };

    let csv = format.is_some_and(|f| f.trim().eq_ignore_ascii_case("csv"));
    if !csv {
        return Reply::ok(&json!({ "data": upload.data, "columns": upload.columns }));
    }
    if upload.data.is_empty() {
        return Ok(Reply::error(400, "No data"));
    }

    let content = records_to_csv(&upload.columns, &upload.data)?;
    let filename = upload
        .filename
        .unwrap_or_else(|| "dataset.csv".to_string());
    Reply::ok(&json!({ "filename": filename, "content": content }))
}

// ---------------------------------------------------------------------------
// Active dataset
// ---------------------------------------------------------------------------

/// `GET /api/active-dataset`
pub fn get_active_dataset(state: &AppState, user: &str) -> Result<Reply> {
    match state.store.active_dataset(user)? {
        Some(active) => Reply::ok(&json!({
            "active": true,
            "filename": active.filename,
            "columns": active.columns,
            "row_count": active.data.len(),
            "upload_id": active.upload_id,
            "updated_at": active.updated_at,
        })),
        None => Reply::ok(&json!({ "active": false })),
    }
}

/// `POST /api/active-dataset`
pub fn set_active_dataset(state: &AppState, user: &str, body: Option<&str>) -> Result<Reply> {
    let dataset: DatasetBody = body_or_reply!(body);
    if dataset.data.is_empty() || dataset.columns.is_empty() {
        return Ok(Reply::error(400, "Invalid dataset"));
    }

    let active = ActiveDataset {
        filename: dataset.filename,
        columns: dataset.columns,
        data: dataset.data,
        upload_id: None,
        updated_at: Utc::now(),
    };
    state.store.set_active(user, &active)?;
    Reply::ok(&json!({ "message": "Active dataset set" }))
}

// ---------------------------------------------------------------------------
// Prediction history
// ---------------------------------------------------------------------------

/// `POST /api/predictions`
pub fn save_prediction(state: &AppState, user: &str, body: Option<&str>) -> Result<Reply> {
    let new: NewPrediction = body_or_reply!(body);
    let prediction = state.store.insert_prediction(user, new)?;
    Reply::json(
        201,
        &json!({ "message": "Prediction saved", "prediction": prediction }),
    )
}

/// `GET /api/predictions?search=&tag=&model=&page=&limit=`
pub fn list_predictions(state: &AppState, user: &str, request: &ApiRequest) -> Result<Reply> {
    let query = HistoryQuery {
        search: request.query("search"),
        tag: request.query("tag"),
        model: request.query("model"),
    };
    let matched = predictions::filter_history(state.store.predictions(user)?, &query);
    Reply::ok(&paginate(matched, page_request(request)))
}

/// `PUT /api/predictions/{id}`
pub fn update_prediction(
    state: &AppState,
    user: &str,
    id: &str,
    body: Option<&str>,
) -> Result<Reply> {
    let update: PredictionUpdate = body_or_reply!(body);
    if update.is_empty() {
        return Ok(Reply::error(400, "Nothing to update"));
    }
    if !state.store.update_prediction(user, id, &update)? {
        return Ok(Reply::not_found());
    }
    Reply::ok(&json!({ "message": "Prediction updated" }))
}

/// `DELETE /api/predictions/{id}`
pub fn delete_prediction(state: &AppState, user: &str, id: &str) -> Result<Reply> {
    if !state.store.delete_prediction(user, id)? {
        return Ok(Reply::not_found());
    }
    Reply::ok(&json!({ "message": "Prediction deleted" }))
}

/// `GET /api/predictions/analytics`
pub fn prediction_analytics(state: &AppState, user: &str) -> Result<Reply> {
    let history = state.store.predictions(user)?;
    Reply::ok(&predictions::analytics(&history))
}

// ---------------------------------------------------------------------------
// Model proxy
// ---------------------------------------------------------------------------

/// `GET /api/model-status`
pub fn model_status(state: &AppState) -> Result<Reply> {
    let model = &state.config.model;
    if !model.is_configured() {
        return Reply::ok(&json!({
            "configured": false,
            "message": "Model endpoint not configured. Set model.url or ESG_MODEL_URL.",
        }));
    }
    Reply::ok(&json!({
        "configured": true,
        "model_name": model.name,
        "message": "Model ready for predictions",
    }))
}

/// `POST /api/predict`
pub fn predict(state: &AppState, user: &str, body: Option<&str>) -> Result<Reply> {
    let request: PredictBody = body_or_reply!(body);
    if is_blank(&request.inputs) {
        return Ok(Reply::error(400, "Input features are required"));
    }
    let Some(client) = ModelClient::from_config(&state.config.model) else {
        return Ok(Reply::error(503, MODEL_NOT_CONFIGURED));
    };

    let reply = match client.predict(&request.inputs) {
        Ok(reply) => reply,
        Err(e) => return Ok(Reply::error(500, &format!("Model API error: {e:#}"))),
    };

    let saved = state.store.insert_prediction(
        user,
        NewPrediction {
            model: Some(client.name().to_string()),
            inputs: request.inputs,
            output: reply.prediction.clone(),
            metrics: Value::Null,
            tags: vec!["auto".to_string()],
            raw_response: Some(reply.raw.clone()),
        },
    )?;

    Reply::ok(&json!({
        "message": "Prediction successful",
        "prediction": reply.prediction,
        "details": reply.raw,
        "saved_id": saved.id,
    }))
}

/// `POST /api/predict-batch`: one model call per row. A failing row is
/// reported in `errors` and does not stop the batch.
pub fn predict_batch(state: &AppState, user: &str, body: Option<&str>) -> Result<Reply> {
    let request: BatchBody = body_or_reply!(body);
    if request.data.is_empty() {
        return Ok(Reply::error(400, "No data provided"));
    }
    let Some(client) = ModelClient::from_config(&state.config.model) else {
        return Ok(Reply::error(503, MODEL_NOT_CONFIGURED));
    };

    let mut results = Vec::new();
    let mut errors = Vec::new();
    for (row, inputs) in request.data.into_iter().enumerate() {
        let outcome = client.predict(&inputs).and_then(|reply| {
            let saved = state.store.insert_prediction(
                user,
                NewPrediction {
                    model: Some(client.name().to_string()),
                    inputs,
                    output: reply.prediction.clone(),
                    metrics: Value::Null,
                    tags: vec!["batch".to_string()],
                    raw_response: Some(reply.raw),
                },
            )?;
            Ok((reply.prediction, saved.id))
        });
        match outcome {
            Ok((prediction, id)) => {
                results.push(json!({ "row": row, "prediction": prediction, "id": id }));
            }
            Err(e) => errors.push(json!({ "row": row, "error": format!("{e:#}") })),
        }
    }

    Reply::ok(&json!({
        "message": format!(
            "Batch prediction complete. {} succeeded, {} failed.",
            results.len(),
            errors.len()
        ),
        "results": results,
        "errors": errors,
    }))
}

/// Null, or an empty string, array or object.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
