/// Configuration schema and defaults for the analytics service.
///
/// Defines the TOML-serializable configuration structure with the sections
/// `[server]`, `[storage]`, `[dataset]`, `[model]` and `[logging]`.
///
/// Every field has a built-in default. Users only need to set the values
/// they want to override.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level service configuration.
///
/// Maps directly to `~/.esg-analytics/config.toml` and `.esg-analytics.toml`.
/// All sections and fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// [server]
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (`host:port`).
    pub addr: String,
    /// Worker threads pulling requests off the listener.
    pub workers: usize,
    /// Requests with larger bodies are rejected.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
            workers: 4,
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// [storage]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory. Empty means `~/.esg-analytics/data`.
    pub data_dir: String,
}

impl StorageConfig {
    /// Resolved data directory, with `~/` expanded.
    pub fn data_path(&self) -> PathBuf {
        if self.data_dir.trim().is_empty() {
            return super::home_path("data");
        }
        super::expand_home(&self.data_dir)
    }
}

// ---------------------------------------------------------------------------
// [dataset]
// ---------------------------------------------------------------------------

/// What a user without an active dataset sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fallback {
    /// An empty dataset with the canonical columns (default).
    #[default]
    Empty,
    /// The sample dataset, for everyone.
    Sample,
}

impl std::fmt::Display for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Sample => write!(f, "sample"),
        }
    }
}

/// Dataset resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Fallback for users with no active dataset.
    pub fallback: Fallback,
    /// Users that get the sample dataset regardless of `fallback`.
    pub sample_users: Vec<String>,
    /// Optional CSV used as the sample dataset. Empty means generated data.
    pub sample_path: String,
    /// Seed for the generated sample dataset.
    pub sample_seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            fallback: Fallback::default(),
            sample_users: vec!["test@esg.local".to_string()],
            sample_path: String::new(),
            sample_seed: 42,
        }
    }
}

impl DatasetConfig {
    pub fn sample_file(&self) -> Option<PathBuf> {
        if self.sample_path.trim().is_empty() {
            None
        } else {
            Some(super::expand_home(&self.sample_path))
        }
    }
}

// ---------------------------------------------------------------------------
// [model]
// ---------------------------------------------------------------------------

/// External prediction model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Endpoint URL. Empty means no model is configured.
    pub url: String,
    /// Display name recorded with each prediction.
    pub name: String,
    /// Request timeout (milliseconds).
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: "WatsonX ESG Predictor".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ModelConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// [logging]
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether the JSONL request log is written.
    pub enabled: bool,
    /// Request log path. Empty means `~/.esg-analytics/request-log.jsonl`.
    pub path: String,
    /// Print one console line per request.
    pub access_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: String::new(),
            access_log: true,
        }
    }
}

impl LoggingConfig {
    pub fn log_path(&self) -> PathBuf {
        if self.path.trim().is_empty() {
            return super::home_path("request-log.jsonl");
        }
        super::expand_home(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Default TOML content
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Generate the annotated default TOML config file content.
    ///
    /// Used by `esg-analytics config init`.
    pub fn default_toml() -> String {
        r#"# esg-analytics configuration
#
# Configuration hierarchy (highest precedence wins):
#   1. Environment variables (ESG_*)
#   2. Project config (.esg-analytics.toml in current directory)
#   3. User global config (~/.esg-analytics/config.toml)
#   4. Built-in defaults

[server]
addr = "127.0.0.1:5000"
workers = 4
max_body_bytes = 33554432             # 32 MiB

[storage]
data_dir = ""                         # Empty -> ~/.esg-analytics/data

[dataset]
fallback = "empty"                    # empty | sample
sample_users = ["test@esg.local"]     # Users that always get the sample dataset
sample_path = ""                      # Optional CSV; empty -> generated sample
sample_seed = 42

[model]
url = ""                              # External prediction endpoint; empty = disabled
name = "WatsonX ESG Predictor"
timeout_ms = 30000

[logging]
enabled = true
path = ""                             # Empty -> ~/.esg-analytics/request-log.jsonl
access_log = true
"#
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr, "127.0.0.1:5000");
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.dataset.fallback, Fallback::Empty);
        assert_eq!(config.dataset.sample_users, vec!["test@esg.local"]);
        assert_eq!(config.dataset.sample_seed, 42);
        assert!(!config.model.is_configured());
        assert!(config.logging.enabled);
    }

    #[test]
    fn deserialize_minimal_toml() {
        let toml_str = r#"
[dataset]
fallback = "sample"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.dataset.fallback, Fallback::Sample);
        // All other fields fall back to defaults
        assert_eq!(config.dataset.sample_seed, 42);
        assert_eq!(config.server.workers, 4);
    }

    #[test]
    fn deserialize_full_toml() {
        let toml_str = r#"
[server]
addr = "0.0.0.0:8080"
workers = 8
max_body_bytes = 1024

[storage]
data_dir = "/var/lib/esg"

[dataset]
fallback = "empty"
sample_users = ["demo", "qa"]
sample_path = "/srv/esg.csv"
sample_seed = 7

[model]
url = "http://model.local/predict"
name = "rf-v2"
timeout_ms = 500

[logging]
enabled = false
path = "/tmp/requests.jsonl"
access_log = false
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.server.max_body_bytes, 1024);
        assert_eq!(config.storage.data_path(), PathBuf::from("/var/lib/esg"));
        assert_eq!(config.dataset.sample_users, vec!["demo", "qa"]);
        assert_eq!(config.dataset.sample_file(), Some(PathBuf::from("/srv/esg.csv")));
        assert!(config.model.is_configured());
        assert_eq!(config.model.timeout_ms, 500);
        assert!(!config.logging.enabled);
        assert_eq!(config.logging.log_path(), PathBuf::from("/tmp/requests.jsonl"));
    }

    #[test]
    fn default_toml_parses_back() {
        let config: AppConfig = toml::from_str(&AppConfig::default_toml()).unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:5000");
        assert_eq!(config.model.name, "WatsonX ESG Predictor");
        assert!(config.dataset.sample_file().is_none());
    }

    #[test]
    fn unknown_fallback_is_rejected() {
        let toml_str = r#"
[dataset]
fallback = "everyone"
"#;
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
    }
}
