/// FileStore behaviour against a temporary data directory.
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use esg_analytics::store::{
    ActiveDataset, DatasetStore, FileStore, NewPrediction, NewUpload, PredictionUpdate, Record,
};
use serde_json::{Value, json};

fn records(rows: Value) -> Vec<Record> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_object().unwrap().clone())
        .collect()
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|c| c.to_string()).collect()
}

fn store() -> (tempfile::TempDir, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    (dir, store)
}

// ---------------------------------------------------------------------------
// Active dataset
// ---------------------------------------------------------------------------

#[test]
fn no_active_dataset_is_none() {
    let (_dir, store) = store();
    assert!(store.active_dataset("nobody").unwrap().is_none());
}

#[test]
fn active_dataset_round_trips_per_user() {
    let (_dir, store) = store();
    let active = ActiveDataset {
        filename: Some("esg.csv".into()),
        columns: columns(&["CompanyName", "ESG_Overall"]),
        data: records(json!([{"CompanyName": "A", "ESG_Overall": 70}])),
        upload_id: None,
        updated_at: Utc::now(),
    };
    store.set_active("alice@example.com", &active).unwrap();

    let loaded = store.active_dataset("alice@example.com").unwrap().unwrap();
    assert_eq!(loaded.filename.as_deref(), Some("esg.csv"));
    assert_eq!(loaded.to_dataset().len(), 1);
    assert!(store.active_dataset("bob@example.com").unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

#[test]
fn upload_lifecycle() {
    let (_dir, store) = store();
    let meta = store
        .create_upload(
            "u1",
            Some("q1.csv".into()),
            columns(&["CompanyName"]),
            records(json!([{"CompanyName": "A"}, {"CompanyName": "B"}])),
        )
        .unwrap();
    assert_eq!(meta.row_count, 2);

    let listed = store.list_uploads("u1").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, meta.id);
    assert!(store.list_uploads("u2").unwrap().is_empty());

    let data = store.upload_data("u1", &meta.id).unwrap().unwrap();
    assert_eq!(data.data.len(), 2);
    assert!(store.upload_data("u2", &meta.id).unwrap().is_none());

    assert!(store.delete_upload("u1", &meta.id).unwrap());
    assert!(store.upload("u1", &meta.id).unwrap().is_none());
    assert!(store.upload_data("u1", &meta.id).unwrap().is_none());
    assert!(!store.delete_upload("u1", &meta.id).unwrap());
}

#[test]
fn recorded_upload_has_metadata_only() {
    let (_dir, store) = store();
    let meta = store
        .record_upload(
            "u1",
            NewUpload {
                filename: Some("scan.pdf".into()),
                size_bytes: Some(512),
                notes: Some("appendix".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(meta.row_count, 0);

    let listed = store.upload("u1", &meta.id).unwrap().unwrap();
    assert_eq!(listed.size_bytes, Some(512));
    assert_eq!(listed.notes.as_deref(), Some("appendix"));
    assert!(store.upload_data("u1", &meta.id).unwrap().is_none());
    assert!(store.delete_upload("u1", &meta.id).unwrap());
}

#[test]
fn clearing_active_only_for_matching_upload() {
    let (_dir, store) = store();
    let active = ActiveDataset {
        filename: None,
        columns: columns(&["CompanyName"]),
        data: records(json!([{"CompanyName": "A"}])),
        upload_id: Some("upload-1".into()),
        updated_at: Utc::now(),
    };
    store.set_active("u1", &active).unwrap();

    assert!(!store.clear_active_for_upload("u1", "upload-2").unwrap());
    assert!(store.active_dataset("u1").unwrap().is_some());
    assert!(store.clear_active_for_upload("u1", "upload-1").unwrap());
    assert!(store.active_dataset("u1").unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

#[test]
fn prediction_update_and_delete() {
    let (_dir, store) = store();
    let saved = store
        .insert_prediction(
            "u1",
            NewPrediction {
                model: Some("rf".into()),
                output: json!(42.5),
                tags: vec!["manual".into()],
                ..Default::default()
            },
        )
        .unwrap();

    let update = PredictionUpdate {
        tags: Some(vec!["reviewed".into()]),
        notes: Some("looks right".into()),
    };
    assert!(store.update_prediction("u1", &saved.id, &update).unwrap());
    assert!(!store.update_prediction("u1", "missing", &update).unwrap());

    let history = store.predictions("u1").unwrap();
    assert_eq!(history[0].tags, vec!["reviewed"]);
    assert_eq!(history[0].notes.as_deref(), Some("looks right"));

    assert!(store.delete_prediction("u1", &saved.id).unwrap());
    assert!(store.predictions("u1").unwrap().is_empty());
}

#[test]
fn concurrent_inserts_are_not_lost() {
    let (_dir, store) = store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    store
                        .insert_prediction(
                            "shared",
                            NewPrediction {
                                output: json!(t * 100 + i),
                                ..Default::default()
                            },
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.predictions("shared").unwrap().len(), 40);
}

#[test]
fn user_ids_cannot_escape_the_data_dir() {
    let (dir, store) = store();
    store
        .insert_prediction("../../outside", NewPrediction::default())
        .unwrap();
    assert!(!dir.path().join("..").join("outside").exists());
    assert_eq!(store.predictions("../../outside").unwrap().len(), 1);
}
