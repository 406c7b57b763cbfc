//! Configuration loading and resolution
//!
//! Settings come from a single TOML file. Every section is optional and
//! falls back to built-in defaults, so a missing file only produces a
//! warning.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`ACCORDO_GEMINI_API_KEY`, `ACCORDO_CONFIG`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the media/analysis service API key
pub const API_KEY_ENV: &str = "ACCORDO_GEMINI_API_KEY";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "ACCORDO_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// API key for the media/analysis service
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    /// SQLite file backing the keyed store
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub import: ImportConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Generative-analysis call options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Caps response length
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Controls variability of the generated text (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Long-running job polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    /// Give up on a job after this long; 0 waits forever
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

/// Retry with exponential backoff for transient service errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first; 1 disables retry
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Bulk record import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Records processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Store write budget; 0 disables throttling
    #[serde(default = "default_writes_per_second")]
    pub writes_per_second: u32,

    /// Bucket that recording URIs point into
    #[serde(default = "default_recordings_bucket")]
    pub recordings_bucket: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_max_output_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_wait_secs() -> u64 {
    30 * 60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_concurrency() -> usize {
    4
}

fn default_writes_per_second() -> u32 {
    25
}

fn default_recordings_bucket() -> String {
    "accordo-recordings".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            writes_per_second: default_writes_per_second(),
            recordings_bucket: default_recordings_bucket(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// `None` means unbounded
    pub fn max_wait(&self) -> Option<Duration> {
        (self.max_wait_secs > 0).then(|| Duration::from_secs(self.max_wait_secs))
    }
}

impl TomlConfig {
    /// Check values that deserialize fine but cannot be used
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_secs == 0 {
            return Err(Error::Config("polling.interval_secs must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.import.concurrency == 0 {
            return Err(Error::Config("import.concurrency must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.analysis.temperature) {
            return Err(Error::Config(format!(
                "analysis.temperature must be between 0.0 and 2.0, got {}",
                self.analysis.temperature
            )));
        }
        Ok(())
    }
}

/// Default config file location: `<config dir>/accordo/accordo-ai.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("accordo").join("accordo-ai.toml"))
}

/// Default SQLite location: `<data dir>/accordo/accordo.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("accordo").join("accordo.db"))
        .unwrap_or_else(|| PathBuf::from("./accordo.db"))
}

/// Pick the config file: CLI argument, then `ACCORDO_CONFIG`, then the default path
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path()
}

/// Load TOML configuration, falling back to defaults when the file is absent
///
/// A file that exists but does not parse or validate is an error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        warn!("No config directory available, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;

    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Resolve the service API key
///
/// **Priority:** CLI → ENV → TOML. Blank values are skipped.
pub fn resolve_api_key(cli_arg: Option<&str>, toml_config: &TomlConfig) -> Result<String> {
    if let Some(key) = cli_arg.filter(|k| is_valid_key(k)) {
        info!("API key taken from command line");
        return Ok(key.to_string());
    }

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if is_valid_key(&key) {
            info!("API key loaded from environment variable");
            return Ok(key);
        }
    }

    if let Some(key) = toml_config.gemini_api_key.as_deref().filter(|k| is_valid_key(k)) {
        info!("API key loaded from TOML config");
        return Ok(key.to_string());
    }

    Err(Error::Config(format!(
        "API key not configured. Use one of:\n\
         1. Command line: --api-key your-key\n\
         2. Environment: {API_KEY_ENV}=your-key\n\
         3. TOML config: gemini_api_key = \"your-key\""
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
