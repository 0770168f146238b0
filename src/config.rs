//! Configuration for tzarchiver.
//!
//! Configuration sources (highest priority first):
//! 1. Explicit `--config <path>`
//! 2. Config file (.tzarchiver/config.yaml) found in the current directory or a parent
//! 3. Defaults
//!
//! `TZARCHIVER_HOME` overrides the home directory (default `~/.tzarchiver`).
//! A relative `data_dir` in a config file is resolved against the directory
//! containing the config file.
//!
//! The resolved [`ArchiverConfig`] is built once and handed to each component's
//! constructor; nothing reads configuration from global state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "TZARCHIVER_HOME";

/// Environment variables holding archive credentials
pub const ACCESS_KEY_ENV: &str = "ARCHIVE_ACCESS";
pub const SECRET_KEY_ENV: &str = "ARCHIVE_SECRET";

/// Optional dotenv file with credentials, searched from the current directory upward
pub const ENV_FILE: &str = ".env";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// State directory (relative to the config file's directory)
    pub data_dir: Option<String>,
    pub ipfs_gateway: Option<String>,
    pub default_token_limit: Option<usize>,
    #[serde(default)]
    pub wayback: WaybackSettings,
    #[serde(default)]
    pub tzkt: TzktSettings,
    #[serde(default)]
    pub exploration: ExplorationSettings,
}

/// Archive service limits and capture options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaybackSettings {
    pub base_url: String,
    pub availability_url: String,
    /// Submissions admitted per rolling minute
    pub rate_limit_per_minute: usize,
    /// Concurrent in-flight captures
    pub max_concurrent: usize,
    pub slot_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub js_behavior_timeout: u64,
    pub delay_availability: bool,
    pub if_not_archived_within_seconds: u64,
    pub status_poll_seconds: u64,
    pub completion_timeout_seconds: u64,
}

impl Default for WaybackSettings {
    fn default() -> Self {
        Self {
            base_url: "https://web.archive.org".to_string(),
            availability_url: "https://archive.org/wayback/available".to_string(),
            rate_limit_per_minute: 12,
            max_concurrent: 4,
            slot_timeout_seconds: 120,
            request_timeout_seconds: 15,
            js_behavior_timeout: 7,
            delay_availability: false,
            if_not_archived_within_seconds: 31_536_000, // 1 year
            status_poll_seconds: 5,
            completion_timeout_seconds: 300,
        }
    }
}

impl WaybackSettings {
    pub fn slot_timeout(&self) -> Duration {
        Duration::from_secs(self.slot_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_seconds)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_seconds)
    }
}

/// Blockchain index client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TzktSettings {
    pub base_url: String,
    /// Largest page the index serves per request
    pub page_max: usize,
    pub request_delay_ms: u64,
    pub request_timeout_seconds: u64,
}

impl Default for TzktSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.tzkt.io/v1".to_string(),
            page_max: 10_000,
            request_delay_ms: 100,
            request_timeout_seconds: 15,
        }
    }
}

impl TzktSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Continuous exploration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationSettings {
    /// Approximate number of indexed tokens carrying artifacts
    pub max_tokens: u64,
    pub batch_size: u64,
    /// Pause between iterations (doubled after an error)
    pub delay_ms: u64,
    /// Consecutive empty batches before reseeding
    pub empty_batch_threshold: u32,
}

impl Default for ExplorationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 8_000_000,
            batch_size: 10_000,
            delay_ms: 500,
            empty_batch_threshold: 5,
        }
    }
}

impl ExplorationSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        self.delay() * 2
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiverConfig {
    /// Directory holding the persisted state files
    pub data_dir: PathBuf,
    pub ipfs_gateway: String,
    pub default_token_limit: usize,
    pub wayback: WaybackSettings,
    pub tzkt: TzktSettings,
    pub exploration: ExplorationSettings,
    /// Path to config file (if found)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

impl ArchiverConfig {
    /// Defaults rooted at the given home directory
    pub fn with_home(home: &Path) -> Self {
        Self::from_file(ConfigFile::default(), home, None)
    }

    /// Load configuration from all sources and validate it
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let home = home_dir()?;

        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };

        let config = match config_path {
            Some(path) => {
                let file = load_config_file(&path)?;
                let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();
                let mut config = Self::from_file(file, &home, Some(&base));
                config.config_file = Some(path);
                config
            }
            None => Self::with_home(&home),
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(file: ConfigFile, home: &Path, base: Option<&Path>) -> Self {
        let data_dir = match (file.data_dir, base) {
            (Some(dir), Some(base)) => resolve_path(base, &dir),
            (Some(dir), None) => PathBuf::from(dir),
            (None, _) => home.join("data"),
        };

        Self {
            data_dir,
            ipfs_gateway: file
                .ipfs_gateway
                .unwrap_or_else(|| "https://ipfs.fileship.xyz".to_string()),
            default_token_limit: file.default_token_limit.unwrap_or(10_000),
            wayback: file.wayback,
            tzkt: file.tzkt,
            exploration: file.exploration,
            config_file: None,
        }
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wayback.max_concurrent == 0 {
            return Err(ConfigError::Invalid("wayback.max_concurrent must be >= 1"));
        }
        if self.wayback.rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "wayback.rate_limit_per_minute must be >= 1",
            ));
        }
        if self.tzkt.page_max == 0 {
            return Err(ConfigError::Invalid("tzkt.page_max must be >= 1"));
        }
        if self.exploration.batch_size == 0 {
            return Err(ConfigError::Invalid("exploration.batch_size must be >= 1"));
        }
        if self.exploration.max_tokens < 4 {
            return Err(ConfigError::Invalid("exploration.max_tokens must be >= 4"));
        }
        if self.exploration.empty_batch_threshold == 0 {
            return Err(ConfigError::Invalid(
                "exploration.empty_batch_threshold must be >= 1",
            ));
        }
        if self.default_token_limit == 0 {
            return Err(ConfigError::Invalid("default_token_limit must be >= 1"));
        }
        Ok(())
    }
}

/// Configuration validation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Archive service credentials
#[derive(Clone)]
pub struct ArchiveCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl ArchiveCredentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("LOW {}:{}", self.access_key, self.secret_key)
    }
}

impl fmt::Debug for ArchiveCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveCredentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Home directory: $TZARCHIVER_HOME or ~/.tzarchiver
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".tzarchiver"))
}

/// Load `.env` from the current directory or a parent into the environment
pub fn load_env_file() -> Option<PathBuf> {
    let current = std::env::current_dir().ok()?;
    load_env_file_from(&current)
}

/// Load the nearest `.env` at or above `start`.
///
/// Variables already set in the environment are left untouched. Returns the
/// file that was loaded.
pub fn load_env_file_from(start: &Path) -> Option<PathBuf> {
    let path = start
        .ancestors()
        .map(|dir| dir.join(ENV_FILE))
        .find(|path| path.is_file())?;

    dotenvy::from_path(&path).ok()?;
    Some(path)
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".tzarchiver").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}
