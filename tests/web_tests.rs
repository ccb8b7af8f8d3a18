/// HTTP router tests.
///
/// Requests are dispatched straight into the router (no sockets) against a
/// store in a temporary directory.
use std::sync::Arc;

use esg_analytics::config::schema::AppConfig;
use esg_analytics::logging::RequestLog;
use esg_analytics::store::FileStore;
use esg_analytics::web::{self, ApiRequest, AppState, Reply};
use serde_json::{Value, json};
use tiny_http::Method;

const USER: &str = "analyst@example.com";

fn state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let state = AppState::with_store(AppConfig::default(), store, RequestLog::disabled());
    (dir, state)
}

fn call(state: &AppState, request: ApiRequest) -> Reply {
    web::handle(state, &request)
}

fn get(state: &AppState, url: &str) -> Reply {
    call(state, ApiRequest::new(Method::Get, url).with_user(USER))
}

fn post(state: &AppState, url: &str, body: Value) -> Reply {
    call(
        state,
        ApiRequest::new(Method::Post, url)
            .with_user(USER)
            .with_body(body.to_string()),
    )
}

fn upload_body() -> Value {
    json!({
        "filename": "esg-2021.csv",
        "columns": ["CompanyName", "Industry", "Region", "Year", "Revenue",
                    "ESG_Overall", "ESG_Environmental", "ESG_Social", "ESG_Governance"],
        "data": [
            {"CompanyName": "A", "Industry": "Tech", "Region": "Europe", "Year": 2020,
             "Revenue": 100, "ESG_Overall": 70, "ESG_Environmental": 60,
             "ESG_Social": 65, "ESG_Governance": 80},
            {"CompanyName": "A", "Industry": "Tech", "Region": "Europe", "Year": 2021,
             "Revenue": "120", "ESG_Overall": 80, "ESG_Environmental": 70,
             "ESG_Social": 75, "ESG_Governance": 85},
            {"CompanyName": "B", "Industry": "Retail", "Region": "Asia", "Year": 2020,
             "Revenue": 300, "ESG_Overall": 50, "ESG_Environmental": 40,
             "ESG_Social": 55, "ESG_Governance": 60}
        ]
    })
}

/// Upload the three-row dataset and make it active. Returns the upload id.
fn activate_upload(state: &AppState) -> String {
    let reply = post(state, "/api/upload-dataset", upload_body());
    assert_eq!(reply.status, 201, "{}", reply.body);
    let id = reply.value()["upload"]["id"].as_str().unwrap().to_string();
    let reply = post(state, &format!("/api/uploads/{id}/analyze"), Value::Null);
    assert_eq!(reply.status, 200, "{}", reply.body);
    id
}

// ---------------------------------------------------------------------------
// Boundary
// ---------------------------------------------------------------------------

#[test]
fn health_needs_no_identity() {
    let (_dir, state) = state();
    let reply = call(&state, ApiRequest::new(Method::Get, "/api/health"));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.value(), json!({"status": "healthy"}));
}

#[test]
fn missing_identity_is_unauthorized() {
    let (_dir, state) = state();
    let reply = call(&state, ApiRequest::new(Method::Post, "/api/overview"));
    assert_eq!(reply.status, 401);
    let reply = call(
        &state,
        ApiRequest::new(Method::Get, "/api/filters").with_user(""),
    );
    assert_eq!(reply.status, 401);
}

#[test]
fn unknown_routes_are_not_found() {
    let (_dir, state) = state();
    assert_eq!(get(&state, "/api/nope").status, 404);
    assert_eq!(get(&state, "/").status, 404);
    assert_eq!(get(&state, "/api/overview").status, 404);
    assert_eq!(post(&state, "/api/summary", json!({})).status, 404);
}

// ---------------------------------------------------------------------------
// Dataset resolution
// ---------------------------------------------------------------------------

#[test]
fn new_user_sees_empty_views() {
    let (_dir, state) = state();
    let overview = post(&state, "/api/overview", json!({}));
    assert_eq!(overview.status, 200);
    assert_eq!(overview.value()["totalCompanies"], 0);
    assert_eq!(overview.rows, Some(0));

    let filters = get(&state, "/api/filters").value();
    assert_eq!(filters["yearRange"], json!({"min": 0, "max": 0}));
    assert_eq!(filters["industries"], json!([]));

    let correlations = post(&state, "/api/correlations", Value::Null).value();
    assert_eq!(correlations.as_object().unwrap().len(), 5);
}

#[test]
fn seeded_user_sees_sample_dataset() {
    let (_dir, state) = state();
    let reply = call(
        &state,
        ApiRequest::new(Method::Get, "/api/filters").with_user("TEST@esg.local"),
    );
    let filters = reply.value();
    assert_eq!(filters["yearRange"], json!({"min": 2015, "max": 2025}));
    assert!(!filters["industries"].as_array().unwrap().is_empty());
    assert_eq!(reply.rows, Some(550));
}

#[test]
fn active_upload_drives_analytics() {
    let (_dir, state) = state();
    activate_upload(&state);

    let overview = post(&state, "/api/overview", json!({})).value();
    assert_eq!(overview["totalCompanies"], 2);
    assert_eq!(overview["avgESGScore"], 66.67);

    let industries = post(&state, "/api/industry-analysis", json!({})).value();
    assert_eq!(industries[0]["Industry"], "Retail");
    assert_eq!(industries[1]["ESG_Overall"], 75.0);

    let top = post(
        &state,
        "/api/top-performers",
        json!({"minESGScore": 60, "category": "overall", "limit": 1}),
    )
    .value();
    assert_eq!(top.as_array().unwrap().len(), 1);
    assert_eq!(top[0]["CompanyName"], "A");

    let regions = post(&state, "/api/regional-insights", json!({"regions": "Asia"})).value();
    assert_eq!(regions.as_array().unwrap().len(), 1);
    assert_eq!(regions[0]["Region"], "Asia");

    let trends = post(&state, "/api/trends", json!({})).value();
    assert_eq!(trends[0]["Year"], 2020);
    assert_eq!(trends[1]["Year"], 2021);

    let export = post(&state, "/api/export", json!({"yearRange": {"min": 2021, "max": 2021}}));
    assert_eq!(export.value()["count"], 1);
    assert_eq!(export.value()["data"][0]["Revenue"], 120.0);
    assert_eq!(export.rows, Some(1));
}

#[test]
fn malformed_filter_body_means_no_filters() {
    let (_dir, state) = state();
    activate_upload(&state);
    let reply = call(
        &state,
        ApiRequest::new(Method::Post, "/api/overview")
            .with_user(USER)
            .with_body("{not json"),
    );
    assert_eq!(reply.status, 200);
    assert_eq!(reply.value()["totalCompanies"], 2);
}

// ---------------------------------------------------------------------------
// Uploads and active dataset
// ---------------------------------------------------------------------------

#[test]
fn upload_validation() {
    let (_dir, state) = state();
    let reply = post(&state, "/api/upload-dataset", json!({"columns": [], "data": []}));
    assert_eq!(reply.status, 400);
    assert_eq!(reply.value()["error"], "Invalid dataset");

    let reply = post(
        &state,
        "/api/upload-dataset",
        json!({"columns": ["CompanyName", "Year"], "data": [{"CompanyName": "A"}]}),
    );
    assert_eq!(reply.status, 400);
    let missing = reply.value()["missing"].clone();
    assert_eq!(missing.as_array().unwrap().len(), 7);
    assert_eq!(missing[0], "Industry");

    let reply = call(
        &state,
        ApiRequest::new(Method::Post, "/api/upload-dataset")
            .with_user(USER)
            .with_body("[1, 2"),
    );
    assert_eq!(reply.status, 400);
}

#[test]
fn uploads_list_preview_download_and_delete() {
    let (_dir, state) = state();
    let id = activate_upload(&state);

    let listed = get(&state, "/api/uploads?search=ESG-2021&page=abc").value();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["page"], 1);
    assert_eq!(listed["limit"], 10);
    assert_eq!(listed["items"][0]["filename"], "esg-2021.csv");
    assert_eq!(get(&state, "/api/uploads?search=other").value()["total"], 0);

    let preview = get(&state, &format!("/api/uploads/{id}/preview")).value();
    assert_eq!(preview["sample"].as_array().unwrap().len(), 3);
    assert_eq!(preview["upload"]["row_count"], 3);

    let csv = get(&state, &format!("/api/uploads/{id}/download?format=csv")).value();
    assert_eq!(csv["filename"], "esg-2021.csv");
    assert!(csv["content"].as_str().unwrap().starts_with("CompanyName,Industry"));

    let raw = get(&state, &format!("/api/uploads/{id}/download")).value();
    assert_eq!(raw["data"].as_array().unwrap().len(), 3);

    let active = get(&state, "/api/active-dataset").value();
    assert_eq!(active["active"], true);
    assert_eq!(active["upload_id"], id.as_str());

    let reply = call(
        &state,
        ApiRequest::new(Method::Delete, format!("/api/uploads/{id}")).with_user(USER),
    );
    assert_eq!(reply.status, 200);
    assert_eq!(reply.value()["active_cleared"], true);
    assert_eq!(get(&state, "/api/active-dataset").value()["active"], false);
    assert_eq!(post(&state, "/api/overview", json!({})).value()["totalCompanies"], 0);
    assert_eq!(get(&state, &format!("/api/uploads/{id}/preview")).status, 404);
}

#[test]
fn upload_metadata_recorded_without_rows() {
    let (_dir, state) = state();
    let reply = post(
        &state,
        "/api/uploads",
        json!({"filename": "q4.xlsx", "content_type": "application/vnd.ms-excel",
               "size_bytes": 2048, "columns": ["CompanyName"], "notes": "draft"}),
    );
    assert_eq!(reply.status, 201);
    let body = reply.value();
    assert_eq!(body["message"], "Upload recorded");
    assert_eq!(body["upload"]["size_bytes"], 2048);
    assert_eq!(body["upload"]["content_type"], "application/vnd.ms-excel");
    assert_eq!(body["upload"]["row_count"], 0);
    let id = body["upload"]["id"].as_str().unwrap().to_string();

    let listed = get(&state, "/api/uploads").value();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["notes"], "draft");

    let preview = get(&state, &format!("/api/uploads/{id}/preview")).value();
    assert_eq!(preview["columns"], json!(["CompanyName"]));
    assert_eq!(preview["sample"], json!([]));
    assert_eq!(post(&state, &format!("/api/uploads/{id}/analyze"), Value::Null).status, 404);

    let bare = call(&state, ApiRequest::new(Method::Post, "/api/uploads").with_user(USER));
    assert_eq!(bare.status, 201);
    assert_eq!(bare.value()["upload"]["filename"], Value::Null);
    assert_eq!(get(&state, "/api/uploads").value()["total"], 2);
}

#[test]
fn uploads_are_private_to_their_user() {
    let (_dir, state) = state();
    let id = activate_upload(&state);
    let reply = call(
        &state,
        ApiRequest::new(Method::Get, format!("/api/uploads/{id}/preview")).with_user("mallory"),
    );
    assert_eq!(reply.status, 404);
    let reply = call(
        &state,
        ApiRequest::new(Method::Post, "/api/overview").with_user("mallory"),
    );
    assert_eq!(reply.value()["totalCompanies"], 0);
}

#[test]
fn active_dataset_can_be_set_directly() {
    let (_dir, state) = state();
    let reply = post(
        &state,
        "/api/active-dataset",
        json!({"filename": "inline", "columns": ["CompanyName"], "data": [{"CompanyName": "Z"}]}),
    );
    assert_eq!(reply.status, 200);
    let active = get(&state, "/api/active-dataset").value();
    assert_eq!(active["row_count"], 1);
    assert_eq!(active["upload_id"], Value::Null);
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

#[test]
fn prediction_history_crud() {
    let (_dir, state) = state();
    let saved = post(
        &state,
        "/api/predictions",
        json!({"model": "random_forest_v1", "inputs": {"Revenue": 1}, "output": 61.2, "tags": ["Manual"]}),
    );
    assert_eq!(saved.status, 201);
    let id = saved.value()["prediction"]["id"].as_str().unwrap().to_string();
    post(
        &state,
        "/api/predictions",
        json!({"model": "baseline", "output": 40.0, "tags": ["batch"]}),
    );

    let tagged = get(&state, "/api/predictions?tag=manual").value();
    assert_eq!(tagged["total"], 1);
    assert_eq!(tagged["items"][0]["id"], id.as_str());

    let by_model = get(&state, "/api/predictions?model=FOREST").value();
    assert_eq!(by_model["total"], 1);

    let nothing = call(
        &state,
        ApiRequest::new(Method::Put, format!("/api/predictions/{id}"))
            .with_user(USER)
            .with_body("{}"),
    );
    assert_eq!(nothing.status, 400);
    assert_eq!(nothing.value()["error"], "Nothing to update");

    let updated = call(
        &state,
        ApiRequest::new(Method::Put, format!("/api/predictions/{id}"))
            .with_user(USER)
            .with_body(r#"{"notes": "checked"}"#),
    );
    assert_eq!(updated.status, 200);

    let analytics = get(&state, "/api/predictions/analytics").value();
    assert_eq!(analytics["total_predictions"], 2);
    assert_eq!(analytics["models_used"].as_array().unwrap().len(), 2);
    assert_eq!(analytics["output_distribution"].as_array().unwrap().len(), 5);

    let deleted = call(
        &state,
        ApiRequest::new(Method::Delete, format!("/api/predictions/{id}")).with_user(USER),
    );
    assert_eq!(deleted.status, 200);
    let again = call(
        &state,
        ApiRequest::new(Method::Delete, format!("/api/predictions/{id}")).with_user(USER),
    );
    assert_eq!(again.status, 404);
}

#[test]
fn model_proxy_without_configuration() {
    let (_dir, state) = state();
    let status = get(&state, "/api/model-status").value();
    assert_eq!(status["configured"], false);

    let reply = post(&state, "/api/predict", json!({"inputs": {}}));
    assert_eq!(reply.status, 400);

    let reply = post(&state, "/api/predict", json!({"inputs": {"Revenue": 10}}));
    assert_eq!(reply.status, 503);

    let reply = post(&state, "/api/predict-batch", json!({"data": []}));
    assert_eq!(reply.status, 400);

    let reply = post(&state, "/api/predict-batch", json!({"data": [{"Revenue": 1}]}));
    assert_eq!(reply.status, 503);
}

#[test]
fn batch_rows_fail_independently() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let mut config = AppConfig::default();
    // Nothing listens on the discard port; every row fails fast.
    config.model.url = "http://127.0.0.1:9/predict".into();
    config.model.timeout_ms = 2_000;
    let state = AppState::with_store(config, store, RequestLog::disabled());

    let reply = post(&state, "/api/predict-batch", json!({"data": [{"a": 1}, {"a": 2}]}));
    assert_eq!(reply.status, 200);
    let body = reply.value();
    assert_eq!(body["results"], json!([]));
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    assert_eq!(body["errors"][1]["row"], 1);
}
