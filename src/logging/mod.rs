//! Request logging.
//!
//! Every handled request appends one JSON line to the request log
//! (`~/.esg-analytics/request-log.jsonl` by default) and, when enabled,
//! prints a one-line access entry to stdout.
//!
//! Logging is best-effort: failures are silently ignored.

use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::config::schema::LoggingConfig;

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// One line of the request log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    pub duration_ms: u64,
    /// Rows left after filtering (analytics views only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rows: Option<usize>,
}

impl RequestLogEntry {
    pub fn new(method: &str, path: &str, status: u16, started: DateTime<Utc>) -> Self {
        let elapsed = Utc::now().signed_duration_since(started);
        Self {
            timestamp: started.to_rfc3339(),
            method: method.to_string(),
            path: path.to_string(),
            status,
            user_id: None,
            duration_ms: elapsed.num_milliseconds().max(0) as u64,
            rows: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Request log sink shared by the server workers.
#[derive(Debug)]
pub struct RequestLog {
    path: Option<PathBuf>,
    access_log: bool,
    lock: Mutex<()>,
}

impl RequestLog {
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            path: config.enabled.then(|| config.log_path()),
            access_log: config.access_log,
            lock: Mutex::new(()),
        }
    }

    /// A logger that writes nothing.
    pub fn disabled() -> Self {
        Self {
            path: None,
            access_log: false,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append `entry` and print the access line.
    pub fn record(&self, entry: &RequestLogEntry) {
        if self.access_log {
            println!("{}", access_line(entry));
        }
        if let Some(path) = &self.path {
            let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
            let _ = append_entry(path, entry);
        }
    }
}

/// `METHOD path status HH:MM:SS` in local time.
pub fn access_line(entry: &RequestLogEntry) -> String {
    let time = DateTime::parse_from_rfc3339(&entry.timestamp)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| Local::now().format("%H:%M:%S").to_string());
    format!("{} {} {} {}", entry.method, entry.path, entry.status, time)
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

fn append_entry(path: &Path, entry: &RequestLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{json}")?;

    Ok(())
}

/// Read every entry of a request log, skipping malformed lines.
///
/// A missing or unreadable file yields an empty vec.
pub fn read_entries(path: &Path) -> Vec<RequestLogEntry> {
    let Ok(file) = fs::File::open(path) else {
        return Vec::new();
    };

    BufReader::new(file)
        .lines()
        .map_while(std::result::Result::ok)
        .filter_map(|line| serde_json::from_str::<RequestLogEntry>(&line).ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
