//! Configuration infrastructure
//!
//! One `AppConfig` is loaded at process start and passed by reference into
//! every component; nothing reads ambient global state.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. JSON config file (created with defaults on first run)
//! 3. `SESSION_SYNC_<SECTION>__<KEY>` environment variables
//!
//! The file is read with serde_json so map keys that are data (query
//! parameter names, headers, the POST body template) keep their case. The
//! `config` crate lowercases keys, so it only supplies the environment layer,
//! which is merged over the file value before deserializing.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::infrastructure::api_client::HttpMethod;

pub const APP_DIR_NAME: &str = "session-sync";
pub const CONFIG_FILE_NAME: &str = "session_sync_config.json";
pub const ENV_PREFIX: &str = "SESSION_SYNC";
pub const DEFAULT_API_BASE_URL: &str = "https://api.trainingsessions.io/v1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read environment overrides: {source}")]
    Environment {
        #[from]
        source: config::ConfigError,
    },

    #[error("Failed to parse config file: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub pagination: PaginationConfig,
    pub sync: SyncConfig,
    pub webhook: WebhookConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Outbound API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// Usually supplied through `SESSION_SYNC_API_TOKEN` instead of the file
    pub api_token: Option<String>,

    /// Header carrying the API key
    pub api_key_header: String,

    pub sessions_endpoint: String,

    pub timeout_seconds: u64,

    pub user_agent: String,

    /// Extra headers sent with every request (caller overrides still win)
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            api_key_header: "X-API-Key".to_string(),
            sessions_endpoint: "/sessions".to_string(),
            timeout_seconds: 30,
            user_agent: format!("session-sync/{}", env!("CARGO_PKG_VERSION")),
            extra_headers: BTreeMap::new(),
        }
    }
}

/// Retry policy for a single API call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Wait before retry `n` (0-based) is `base_delay_ms * 2^n`
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Backoff before the retry that follows attempt `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Pagination protocol settings for collection endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub method: HttpMethod,

    /// JSON payload sent when paging with POST
    pub body_template: Option<Value>,

    pub page_param: String,

    pub limit_param: String,

    pub page_size: u32,

    pub start_page: u32,

    /// Static query parameters merged into every page request
    pub extra_params: BTreeMap<String, String>,

    /// Pause between consecutive page requests
    pub inter_page_delay_ms: u64,

    /// Safety ceiling on pages per run
    pub max_pages: Option<u32>,

    /// Retry the whole pagination with POST when the first GET page is rejected
    pub post_fallback: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            body_template: None,
            page_param: "page".to_string(),
            limit_param: "limit".to_string(),
            page_size: 100,
            start_page: 1,
            extra_params: BTreeMap::new(),
            inter_page_delay_ms: 300,
            max_pages: None,
            post_fallback: true,
        }
    }
}

impl PaginationConfig {
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }
}

/// Table targets and pacing for sync runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub sessions_table: String,
    pub sessions_key: String,
    pub attendees_table: String,
    pub attendees_key: String,

    /// Pause after every N processed sessions in the combiner
    pub sessions_per_pause: usize,
    pub session_pause_ms: u64,

    /// Stop a run early (returning partial results) after this many seconds
    pub max_run_seconds: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sessions_table: "Sessions".to_string(),
            sessions_key: "session.id".to_string(),
            attendees_table: "Attendees".to_string(),
            attendees_key: "row_key".to_string(),
            sessions_per_pause: 10,
            session_pause_ms: 1000,
            max_run_seconds: None,
        }
    }
}

impl SyncConfig {
    pub fn session_pause(&self) -> Duration {
        Duration::from_millis(self.session_pause_ms)
    }

    pub fn max_run_duration(&self) -> Option<Duration> {
        self.max_run_seconds.map(Duration::from_secs)
    }
}

/// Inbound event ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub secret_header: String,
    pub table: String,
    pub key_field: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_header: "X-Webhook-Secret".to_string(),
            table: "WebhookData".to_string(),
            key_field: "id".to_string(),
        }
    }
}

/// Storage backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `sqlite:` URL; defaults to a file under the app data directory
    pub database_url: Option<String>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Defaults to `<app data dir>/logs`
    pub log_dir: Option<PathBuf>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            max_files: 7,
            module_filters: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: &str| {
            Err(ConfigError::Validation {
                message: message.to_string(),
            })
        };

        if self.api.base_url.trim().is_empty() {
            return fail("api.base_url must not be empty");
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return fail("api.base_url must be an absolute URL");
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1");
        }
        if self.pagination.page_size == 0 {
            return fail("pagination.page_size must be greater than 0");
        }
        if self.pagination.page_param.is_empty() || self.pagination.limit_param.is_empty() {
            return fail("pagination parameter names must not be empty");
        }
        for (name, value) in [
            ("sync.sessions_table", &self.sync.sessions_table),
            ("sync.sessions_key", &self.sync.sessions_key),
            ("sync.attendees_table", &self.sync.attendees_table),
            ("sync.attendees_key", &self.sync.attendees_key),
            ("webhook.table", &self.webhook.table),
            ("webhook.key_field", &self.webhook.key_field),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("{name} must not be empty"),
                });
            }
        }
        if self.sync.sessions_per_pause == 0 {
            return fail("sync.sessions_per_pause must be greater than 0");
        }
        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);
        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME);
        Ok(data_dir)
    }

    /// Manager for the default config location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load file + environment layers, writing a default file on first run.
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 Configuration file not found, creating default: {:?}", self.config_path);
            self.save_config(&AppConfig::default()).await?;
        }

        let contents = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;
        let config = Self::build_layers(&contents, Self::environment_overrides()?)?;
        config.validate()?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// File contents with `overrides` merged on top.
    fn build_layers(contents: &str, overrides: Value) -> Result<AppConfig, ConfigError> {
        let mut merged: Value = if contents.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(contents)?
        };
        merge_values(&mut merged, overrides);
        Ok(serde_json::from_value(merged)?)
    }

    /// `SESSION_SYNC_*` variables as a nested JSON object (keys lowercased).
    fn environment_overrides() -> Result<Value, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Resolve the SQLite URL, defaulting into the app data directory.
    pub fn resolve_database_url(config: &AppConfig) -> Result<String> {
        match &config.storage.database_url {
            Some(url) => Ok(url.clone()),
            None => {
                let path = Self::get_app_data_dir()?.join("database").join("session_sync.db");
                Ok(format!("sqlite:{}", path.display()))
            }
        }
    }
}

/// Objects merge key by key; any other overlay value replaces the base.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
