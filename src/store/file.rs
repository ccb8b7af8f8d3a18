//! File-backed store: JSON documents under a data directory.
//!
//! Layout (one directory per user):
//!
//! ```text
//! <root>/users/<user>/active.json
//! <root>/users/<user>/uploads.json
//! <root>/users/<user>/datasets/<upload_id>.json
//! <root>/users/<user>/predictions.json
//! ```
//!
//! Writers are serialized through a write lock and land in a temp file that
//! is then renamed over the target. Readers share a read lock, so analytics
//! requests from any number of workers proceed in parallel.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{
    ActiveDataset, DatasetStore, NewPrediction, NewUpload, Prediction, PredictionUpdate, Record,
    UploadData, UploadMeta,
};

const ACTIVE_FILE: &str = "active.json";
const UPLOADS_FILE: &str = "uploads.json";
const PREDICTIONS_FILE: &str = "predictions.json";
const DATASETS_DIR: &str = "datasets";

/// JSON-file implementation of every store operation.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("users"))
            .with_context(|| format!("failed to create data directory {}", root.display()))?;
        Ok(Self {
            root,
            lock: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // Active dataset
    // -----------------------------------------------------------------------

    /// Make `dataset` the user's active dataset, replacing any previous one.
    pub fn set_active(&self, user_id: &str, dataset: &ActiveDataset) -> Result<()> {
        let _guard = self.write_guard();
        write_json(&self.user_dir(user_id).join(ACTIVE_FILE), dataset)
    }

    /// Clear the active dataset if it was activated from `upload_id`.
    pub fn clear_active_for_upload(&self, user_id: &str, upload_id: &str) -> Result<bool> {
        let _guard = self.write_guard();
        let path = self.user_dir(user_id).join(ACTIVE_FILE);
        let Some(active) = read_json::<ActiveDataset>(&path)? else {
            return Ok(false);
        };
        if active.upload_id.as_deref() != Some(upload_id) {
            return Ok(false);
        }
        remove_file_if_exists(&path)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Record an upload: metadata plus its full rows.
    pub fn create_upload(
        &self,
        user_id: &str,
        filename: Option<String>,
        columns: Vec<String>,
        data: Vec<Record>,
    ) -> Result<UploadMeta> {
        let _guard = self.write_guard();
        let dir = self.user_dir(user_id);

        let meta = UploadMeta {
            id: Uuid::new_v4().to_string(),
            filename: filename.clone(),
            row_count: data.len(),
            columns: columns.clone(),
            content_type: None,
            size_bytes: None,
            notes: None,
            created_at: Utc::now(),
        };

        let rows = UploadData {
            upload_id: meta.id.clone(),
            filename,
            columns,
            data,
        };
        write_json(&dir.join(DATASETS_DIR).join(format!("{}.json", meta.id)), &rows)?;

        append_upload(&dir, &meta)?;
        Ok(meta)
    }

    /// Record upload metadata only. The upload has no rows to preview,
    /// analyze or download.
    pub fn record_upload(&self, user_id: &str, upload: NewUpload) -> Result<UploadMeta> {
        let _guard = self.write_guard();
        let meta = UploadMeta {
            id: Uuid::new_v4().to_string(),
            filename: upload.filename,
            row_count: 0,
            columns: upload.columns,
            content_type: upload.content_type,
            size_bytes: upload.size_bytes,
            notes: upload.notes,
            created_at: Utc::now(),
        };
        append_upload(&self.user_dir(user_id), &meta)?;
        Ok(meta)
    }

    /// All uploads of a user, newest first.
    pub fn list_uploads(&self, user_id: &str) -> Result<Vec<UploadMeta>> {
        let _guard = self.read_guard();
        let mut uploads: Vec<UploadMeta> =
            read_json(&self.user_dir(user_id).join(UPLOADS_FILE))?.unwrap_or_default();
        uploads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(uploads)
    }

    pub fn upload(&self, user_id: &str, upload_id: &str) -> Result<Option<UploadMeta>> {
        let _guard = self.read_guard();
        let uploads: Vec<UploadMeta> =
            read_json(&self.user_dir(user_id).join(UPLOADS_FILE))?.unwrap_or_default();
        Ok(uploads.into_iter().find(|u| u.id == upload_id))
    }

    pub fn upload_data(&self, user_id: &str, upload_id: &str) -> Result<Option<UploadData>> {
        let _guard = self.read_guard();
        read_json(&self.dataset_path(user_id, upload_id))
    }

    /// Delete an upload's metadata and rows. Returns whether metadata existed.
    pub fn delete_upload(&self, user_id: &str, upload_id: &str) -> Result<bool> {
        let _guard = self.write_guard();
        let uploads_path = self.user_dir(user_id).join(UPLOADS_FILE);
        let mut uploads: Vec<UploadMeta> = read_json(&uploads_path)?.unwrap_or_default();
        let before = uploads.len();
        uploads.retain(|u| u.id != upload_id);
        let removed = uploads.len() != before;
        if removed {
            write_json(&uploads_path, &uploads)?;
        }
        remove_file_if_exists(&self.dataset_path(user_id, upload_id))?;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Predictions
    // -----------------------------------------------------------------------

    pub fn insert_prediction(&self, user_id: &str, new: NewPrediction) -> Result<Prediction> {
        let _guard = self.write_guard();
        let path = self.user_dir(user_id).join(PREDICTIONS_FILE);
        let mut predictions: Vec<Prediction> = read_json(&path)?.unwrap_or_default();

        let prediction = Prediction {
            id: Uuid::new_v4().to_string(),
            model: new.model,
            inputs: new.inputs,
            output: new.output,
            metrics: new.metrics,
            tags: new.tags,
            notes: None,
            raw_response: new.raw_response,
            created_at: Utc::now(),
        };
        predictions.push(prediction.clone());
        write_json(&path, &predictions)?;

        Ok(prediction)
    }

    /// Every prediction of a user in insertion order.
    pub fn predictions(&self, user_id: &str) -> Result<Vec<Prediction>> {
        let _guard = self.read_guard();
        Ok(read_json(&self.user_dir(user_id).join(PREDICTIONS_FILE))?.unwrap_or_default())
    }

    /// Apply an update. Returns whether the prediction exists.
    pub fn update_prediction(
        &self,
        user_id: &str,
        prediction_id: &str,
        update: &PredictionUpdate,
    ) -> Result<bool> {
        let _guard = self.write_guard();
        let path = self.user_dir(user_id).join(PREDICTIONS_FILE);
        let mut predictions: Vec<Prediction> = read_json(&path)?.unwrap_or_default();

        let Some(prediction) = predictions.iter_mut().find(|p| p.id == prediction_id) else {
            return Ok(false);
        };
        if let Some(tags) = &update.tags {
            prediction.tags = tags.clone();
        }
        if let Some(notes) = &update.notes {
            prediction.notes = Some(notes.clone());
        }
        write_json(&path, &predictions)?;
        Ok(true)
    }

    pub fn delete_prediction(&self, user_id: &str, prediction_id: &str) -> Result<bool> {
        let _guard = self.write_guard();
        let path = self.user_dir(user_id).join(PREDICTIONS_FILE);
        let mut predictions: Vec<Prediction> = read_json(&path)?.unwrap_or_default();
        let before = predictions.len();
        predictions.retain(|p| p.id != prediction_id);
        if predictions.len() == before {
            return Ok(false);
        }
        write_json(&path, &predictions)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    // A panic while holding the lock cannot corrupt files (writes are
    // rename-based), so a poisoned lock is still usable.
    fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join("users").join(encode_user_dir(user_id))
    }

    fn dataset_path(&self, user_id: &str, upload_id: &str) -> PathBuf {
        self.user_dir(user_id)
            .join(DATASETS_DIR)
            .join(format!("{}.json", encode_user_dir(upload_id)))
    }
}

impl DatasetStore for FileStore {
    fn active_dataset(&self, user_id: &str) -> Result<Option<ActiveDataset>> {
        let _guard = self.read_guard();
        read_json(&self.user_dir(user_id).join(ACTIVE_FILE))
    }
}

/// Bytes escaped in directory names: everything except ASCII letters,
/// digits, `-` and `_`.
const DIR_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Map an arbitrary id onto a safe single path component.
///
/// Escaped bytes become `%XX`, so `.`/`/` can never form a traversal.
pub fn encode_user_dir(id: &str) -> String {
    if id.is_empty() {
        return "%".to_string();
    }
    utf8_percent_encode(id, DIR_NAME).to_string()
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_vec(value).context("failed to serialize document")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Append to `uploads.json`; the caller holds the write lock.
fn append_upload(dir: &Path, meta: &UploadMeta) -> Result<()> {
    let uploads_path = dir.join(UPLOADS_FILE);
    let mut uploads: Vec<UploadMeta> = read_json(&uploads_path)?.unwrap_or_default();
    uploads.push(meta.clone());
    write_json(&uploads_path, &uploads)
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_user_dir_escapes_separators() {
        assert_eq!(encode_user_dir("abc-123_x"), "abc-123_x");
        assert_eq!(encode_user_dir("test@esg.local"), "test%40esg%2Elocal");
        assert_eq!(encode_user_dir("../etc"), "%2E%2E%2Fetc");
        assert_eq!(encode_user_dir(""), "%");
        assert_eq!(encode_user_dir("é"), "%C3%A9");
    }

    #[test]
    fn readers_do_not_block_each_other() {
        use std::sync::mpsc;
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let store = &store;

        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        thread::scope(move |s| {
            s.spawn(move || {
                let _reader = store.read_guard();
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            });
            held_rx.recv().unwrap();
            // Another reader holds the lock; this read must still go through.
            assert!(store.active_dataset("u1").unwrap().is_none());
            assert!(store.list_uploads("u1").unwrap().is_empty());
            release_tx.send(()).unwrap();
        });
    }
}
