//! Configuration loading for pricewatch.
//!
//! A config file carries global settings plus a named collection of site
//! profiles. Profiles are kept as raw documents until one is requested, so a
//! broken profile only affects commands that use it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::repository::DieselDbContext;
use crate::scrapers::SiteProfile;
use crate::services::NotifyConfig;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "pricewatch.db";

/// Default alert threshold, in percent below the stored price.
pub const DEFAULT_ALERT_THRESHOLD: f64 = 50.0;

/// Basenames tried when looking for a config file in a directory.
const CONFIG_BASENAMES: &[&str] = &["pricewatch", "config"];

/// Extensions tried for each basename, in order.
const CONFIG_EXTENSIONS: &[&str] = &["json", "toml", "yaml", "yml"];

/// Legacy profile-only file name.
const LEGACY_CONFIG_FILE: &str = "site_configs.json";

/// Keys that mark a document as the structured (non-legacy) format.
const TOP_LEVEL_KEYS: &[&str] = &[
    "data_dir",
    "target",
    "database",
    "user_agent",
    "alert_threshold",
    "notify",
    "sites",
    "profiles",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("no site profile named {name:?} (available: {})", .available.join(", "))]
    ProfileNotFound { name: String, available: Vec<String> },
    #[error("site profile {name:?} is invalid: {message}")]
    InvalidProfile { name: String, message: String },
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Set via the DATABASE_URL env var.
    pub database_url: Option<String>,
    /// Default alert threshold in percent.
    pub alert_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|d| d.join("pricewatch"))
            .or_else(|| dirs::home_dir().map(|h| h.join(".pricewatch")))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> DieselDbContext {
        DieselDbContext::from_url(&self.database_url())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// User agent pinned for profiles that don't pin their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Alert threshold in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<f64>,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Site profiles by key.
    #[serde(default, alias = "profiles")]
    pub sites: BTreeMap<String, Value>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// One line of the profile listing.
#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    pub key: String,
    pub name: String,
    pub base_url: String,
    pub extraction: String,
}

impl Config {
    /// Load configuration from a specific file path.
    /// The format follows the extension: JSON, TOML or YAML.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse a config document of the given format.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        let document: Value = match ext {
            "toml" => toml::from_str(contents).map_err(|e| format!("invalid TOML: {}", e))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| format!("invalid YAML: {}", e))?
            }
            _ => serde_json::from_str(contents).map_err(|e| format!("invalid JSON: {}", e))?,
        };
        Self::from_document(document)
    }

    fn from_document(document: Value) -> Result<Self, String> {
        if is_legacy_document(&document) {
            let Value::Object(map) = document else {
                return Ok(Self::default());
            };
            return Ok(Self {
                sites: map.into_iter().collect(),
                ..Default::default()
            });
        }
        serde_json::from_value(document).map_err(|e| e.to_string())
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(threshold) = self.alert_threshold {
            settings.alert_threshold = threshold;
        }
    }

    /// Sorted profile keys.
    pub fn site_names(&self) -> Vec<String> {
        self.sites.keys().cloned().collect()
    }

    /// Load and validate the profile stored under `name`.
    pub fn profile(&self, name: &str) -> Result<SiteProfile, ConfigError> {
        let raw = self
            .sites
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
                available: self.site_names(),
            })?;

        let invalid = |message: String| ConfigError::InvalidProfile {
            name: name.to_string(),
            message,
        };

        let mut profile: SiteProfile =
            serde_json::from_value(raw.clone()).map_err(|e| invalid(e.to_string()))?;
        if profile.name.trim().is_empty() {
            profile.name = name.to_string();
        }
        if let Some(ref ua) = self.user_agent {
            profile
                .request_config
                .working_details
                .user_agent_string
                .get_or_insert_with(|| ua.clone());
        }
        profile.validate().map_err(|e| invalid(e.to_string()))?;
        Ok(profile)
    }

    /// Listing data for every profile, without full validation.
    pub fn site_summaries(&self) -> Vec<SiteSummary> {
        let text = |v: &Value, keys: &[&str]| {
            keys.iter()
                .try_fold(v, |node, key| node.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        self.sites
            .iter()
            .map(|(key, raw)| {
                let name = text(raw, &["name"]);
                SiteSummary {
                    key: key.clone(),
                    name: if name.is_empty() { key.clone() } else { name },
                    base_url: text(raw, &["base_url"]),
                    extraction: text(raw, &["data_extraction", "method"]),
                }
            })
            .collect()
    }

    /// Compute SHA-256 hash of the serialized config.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A profile-only document: a top-level map whose values all carry a
/// `base_url` and which has none of the structured format's keys.
fn is_legacy_document(document: &Value) -> bool {
    let Value::Object(map) = document else {
        return false;
    };
    !map.is_empty()
        && !map.keys().any(|k| TOP_LEVEL_KEYS.contains(&k.as_str()))
        && map.values().all(|v| v.get("base_url").is_some())
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data-dir flag).
    pub data_dir: Option<PathBuf>,
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    for basename in CONFIG_BASENAMES {
        for ext in CONFIG_EXTENSIONS {
            let path = dir.join(format!("{}.{}", basename, ext));
            if path.is_file() {
                return Some(path);
            }
        }
    }
    None
}

/// Locate the config file: explicit path, then `PRICEWATCH_CONFIG`, then the
/// working directory, then the user config directory.
fn find_config_file(options: &LoadOptions) -> Option<PathBuf> {
    if let Some(ref path) = options.config_path {
        return Some(path.clone());
    }

    if let Some(path) = std::env::var("PRICEWATCH_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
    {
        return Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if let Some(path) = find_in_dir(&cwd) {
        return Some(path);
    }
    let legacy = cwd.join(LEGACY_CONFIG_FILE);
    if legacy.is_file() {
        return Some(legacy);
    }

    dirs::config_dir().and_then(|dir| find_in_dir(&dir.join("pricewatch")))
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    let config = match find_config_file(&options) {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            Config::load_from_path(&path).await?
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            Config::default()
        }
    };

    let mut settings = Settings::default();

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(data_dir) = options.data_dir {
        settings.data_dir = PathBuf::from(shellexpand::tilde(&data_dir.to_string_lossy()).as_ref());
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()) {
        tracing::debug!("Using DATABASE_URL from environment");
        settings.database_url = Some(database_url);
    }

    Ok((settings, config))
}
