/// Configuration system for esg-analytics.
///
/// Provides a layered configuration hierarchy:
///
/// 1. **Built-in defaults**: hardcoded in [`schema::AppConfig::default()`]
/// 2. **User global config**: `~/.esg-analytics/config.toml`
/// 3. **Project local config**: `.esg-analytics.toml` in the current working directory
/// 4. **Environment variables**: `ESG_*` overrides (highest precedence)
///
/// A file layer replaces the previous layer wholesale; since every section
/// is `serde(default)`, keys a file omits keep their built-in values.
///
/// # Usage
///
/// ```rust,ignore
/// use esg_analytics::config;
///
/// let cfg = config::load();
/// let store = FileStore::open(cfg.storage.data_path())?;
/// ```
pub mod schema;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub use schema::AppConfig;

const APP_DIR: &str = ".esg-analytics";
const PROJECT_FILE: &str = ".esg-analytics.toml";

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the fully resolved configuration.
///
/// Merges all layers in order: defaults → global TOML → project TOML → env
/// vars.
pub fn load() -> AppConfig {
    let mut config = AppConfig::default();

    if let Some(global) = load_toml_file(global_config_path()) {
        merge_config(&mut config, &global);
    }

    if let Some(project) = load_toml_file(project_config_path()) {
        merge_config(&mut config, &project);
    }

    apply_env_overrides(&mut config);

    config
}

/// Load a TOML config file from the given path (if it exists).
///
/// Returns `None` if the path is `None`, the file doesn't exist, or the
/// content is malformed. A broken config file must never stop the server
/// from starting with defaults.
fn load_toml_file(path: Option<PathBuf>) -> Option<AppConfig> {
    let path = path?;
    let content = fs::read_to_string(&path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge a loaded config layer into the base config.
///
/// Each layer is deserialized with defaults filled in, so the overlay fully
/// replaces the base. Keys a user did not set carry the same defaults the
/// base has.
fn merge_config(base: &mut AppConfig, overlay: &AppConfig) {
    *base = overlay.clone();
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

/// `~/.esg-analytics/<name>`, or a relative `.esg-analytics/<name>` when the
/// home directory is unknown.
pub(crate) fn home_path(name: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(APP_DIR)
        .join(name)
}

/// Expand a leading `~/` to the home directory.
pub(crate) fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().unwrap_or_default().join(rest),
        None => PathBuf::from(raw),
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DIR).join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(PROJECT_FILE))
}

/// Return the path to the global config file for display/init purposes.
pub fn global_config_file() -> Option<PathBuf> {
    global_config_path()
}

/// Return the path to the project config file for display purposes.
pub fn project_config_file() -> Option<PathBuf> {
    project_config_path()
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides (highest precedence layer).
///
/// Supported variables:
/// - `ESG_ADDR`: listen address
/// - `ESG_WORKERS`: worker thread count
/// - `ESG_DATA_DIR`: storage directory
/// - `ESG_FALLBACK`: `empty` or `sample`
/// - `ESG_SAMPLE_USERS`: comma-separated user ids that get the sample dataset
/// - `ESG_SAMPLE_PATH`: CSV used as the sample dataset
/// - `ESG_MODEL_URL`, `ESG_MODEL_NAME`, `ESG_MODEL_TIMEOUT_MS`: prediction endpoint
/// - `ESG_LOGGING`: request log on/off (`1`/`true`/`yes`/`on`)
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(val) = std::env::var("ESG_ADDR")
        && !val.is_empty()
    {
        config.server.addr = val;
    }
    if let Ok(val) = std::env::var("ESG_WORKERS")
        && let Ok(n) = val.parse::<usize>()
    {
        config.server.workers = n;
    }
    if let Ok(val) = std::env::var("ESG_DATA_DIR")
        && !val.is_empty()
    {
        config.storage.data_dir = val;
    }
    if let Ok(val) = std::env::var("ESG_FALLBACK")
        && let Some(fallback) = parse_fallback(&val)
    {
        config.dataset.fallback = fallback;
    }
    if let Ok(val) = std::env::var("ESG_SAMPLE_USERS") {
        config.dataset.sample_users = parse_list(&val);
    }
    if let Ok(val) = std::env::var("ESG_SAMPLE_PATH") {
        config.dataset.sample_path = val;
    }
    if let Ok(val) = std::env::var("ESG_MODEL_URL") {
        config.model.url = val.trim().to_string();
    }
    if let Ok(val) = std::env::var("ESG_MODEL_NAME")
        && !val.is_empty()
    {
        config.model.name = val;
    }
    if let Ok(val) = std::env::var("ESG_MODEL_TIMEOUT_MS")
        && let Ok(ms) = val.parse::<u64>()
    {
        config.model.timeout_ms = ms;
    }
    if let Ok(val) = std::env::var("ESG_LOGGING") {
        config.logging.enabled = is_truthy(&val);
    }
}

/// Check if a string value represents a truthy boolean.
fn is_truthy(val: &str) -> bool {
    matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_fallback(val: &str) -> Option<schema::Fallback> {
    match val.trim().to_ascii_lowercase().as_str() {
        "empty" => Some(schema::Fallback::Empty),
        "sample" => Some(schema::Fallback::Sample),
        _ => None,
    }
}

fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Config init / set / reset
// ---------------------------------------------------------------------------

/// Write the default annotated config to `~/.esg-analytics/config.toml`.
///
/// Returns an error if the file already exists (use `force = true` to
/// overwrite).
pub fn init_config(force: bool) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create ~/.esg-analytics/ directory")?;
    }

    fs::write(&path, AppConfig::default_toml()).context("failed to write config file")?;

    Ok(path)
}

/// Set a single config key to a value in the global config file.
///
/// Supports dotted keys like `dataset.fallback`. When no file exists yet the
/// defaults are written out first, so the key's type is known.
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let path = global_config_path().context("could not determine home directory")?;

    let current = if path.exists() {
        fs::read_to_string(&path).context("failed to read config file")?
    } else {
        toml::to_string_pretty(&AppConfig::default())
            .context("failed to serialize default config")?
    };

    let mut value_table: toml::Value =
        toml::from_str(&current).context("failed to parse config as TOML value")?;
    set_toml_value(&mut value_table, key, value)?;

    // Reject edits that would no longer load (e.g. an unknown enum value).
    let updated =
        toml::to_string_pretty(&value_table).context("failed to serialize updated config")?;
    toml::from_str::<AppConfig>(&updated)
        .with_context(|| format!("invalid value '{value}' for '{key}'"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    fs::write(&path, updated).context("failed to write config file")?;

    Ok(())
}

/// Set a value in a TOML value tree using a dotted key path.
fn set_toml_value(root: &mut toml::Value, key: &str, raw_value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        anyhow::bail!("empty config key segment in '{key}'");
    }

    let mut current = root;
    for &part in &parts[..parts.len() - 1] {
        current = current
            .get_mut(part)
            .with_context(|| format!("config key not found: section '{part}' in '{key}'"))?;
    }

    let leaf = parts[parts.len() - 1];

    let table = current.as_table_mut().with_context(|| {
        format!(
            "expected table at '{}'",
            key.rsplit_once('.').map(|(s, _)| s).unwrap_or("")
        )
    })?;

    let new_value = match table.get(leaf) {
        Some(toml::Value::Boolean(_)) => toml::Value::Boolean(is_truthy(raw_value)),
        Some(toml::Value::Integer(_)) => {
            let n: i64 = raw_value
                .parse()
                .with_context(|| format!("expected integer for '{key}', got '{raw_value}'"))?;
            toml::Value::Integer(n)
        }
        Some(toml::Value::Float(_)) => {
            let f: f64 = raw_value
                .parse()
                .with_context(|| format!("expected float for '{key}', got '{raw_value}'"))?;
            toml::Value::Float(f)
        }
        Some(toml::Value::Array(_)) => toml::Value::Array(
            parse_list(raw_value)
                .into_iter()
                .map(toml::Value::String)
                .collect(),
        ),
        Some(_) => toml::Value::String(raw_value.to_string()),
        None => anyhow::bail!("unknown config key '{key}'"),
    };

    table.insert(leaf.to_string(), new_value);
    Ok(())
}

/// Reset the global config to defaults (overwrite the file).
pub fn reset_config() -> Result<PathBuf> {
    init_config(true)
}

/// Show the effective (fully resolved) config as TOML.
pub fn show_effective_config() -> Result<String> {
    let config = load();
    toml::to_string_pretty(&config).context("failed to serialize effective config")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
