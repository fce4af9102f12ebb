//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RMSYNC_*)
//! 2. TOML config file (if RMSYNC_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (RMSYNC_*)
/// 2. TOML config file (if RMSYNC_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inline credential: JSON `{"devicetoken", "usertoken"}` or a raw device JWT.
    ///
    /// Set via RMSYNC_TOKEN environment variable. Takes precedence over `token_file`.
    #[serde(default)]
    pub token: Option<String>,

    /// Credential file read when `token` is unset.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Host serving the token renewal endpoint.
    #[serde(default = "default_auth_host")]
    pub auth_host: String,

    /// Host serving the sync protocol.
    #[serde(default = "default_sync_host")]
    pub sync_host: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Transport retries for connect/timeout/5xx failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Concurrency of the per-document metadata fan-out.
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,

    /// Collection cache TTL in seconds.
    ///
    /// Set via RMSYNC_CACHE_TTL_SECS environment variable.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Freshness window of extraction/OCR results in seconds.
    #[serde(default = "default_content_ttl_secs")]
    pub content_ttl_secs: u64,

    /// Maximum document-level extraction entries held in memory.
    #[serde(default = "default_extraction_cache_size")]
    pub extraction_cache_size: usize,

    /// Maximum page-level OCR entries held in memory.
    #[serde(default = "default_page_cache_size")]
    pub page_cache_size: usize,

    /// Path to the durable SQLite index, or `:memory:`.
    ///
    /// Set via RMSYNC_INDEX_PATH environment variable.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Regenerate the full-text projection when the index is opened.
    #[serde(default)]
    pub force_rebuild: bool,

    /// Folder the background loader restricts itself to.
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Documents fetched per background loader batch.
    #[serde(default = "default_loader_batch_size")]
    pub loader_batch_size: usize,

    /// Consecutive batch failures after which the loader stops.
    #[serde(default = "default_loader_max_failures")]
    pub loader_max_failures: u32,
}

fn default_token_file() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".rmapi")
}

fn default_auth_host() -> String {
    "https://webapp-prod.cloud.remarkable.engineering".into()
}

fn default_sync_host() -> String {
    "https://internal.cloud.remarkable.com".into()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_parallel_workers() -> usize {
    5
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_content_ttl_secs() -> u64 {
    300
}

fn default_extraction_cache_size() -> usize {
    50
}

fn default_page_cache_size() -> usize {
    200
}

fn default_index_path() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache")).join("rmsync").join("index.db")
}

fn default_root_path() -> String {
    "/".into()
}

fn default_loader_batch_size() -> usize {
    10
}

fn default_loader_max_failures() -> u32 {
    3
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_file: default_token_file(),
            auth_host: default_auth_host(),
            sync_host: default_sync_host(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            parallel_workers: default_parallel_workers(),
            cache_ttl_secs: default_cache_ttl_secs(),
            content_ttl_secs: default_content_ttl_secs(),
            extraction_cache_size: default_extraction_cache_size(),
            page_cache_size: default_page_cache_size(),
            index_path: default_index_path(),
            force_rebuild: false,
            root_path: default_root_path(),
            loader_batch_size: default_loader_batch_size(),
            loader_max_failures: default_loader_max_failures(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_secs)
    }

    /// Whether the durable index should live in memory only.
    pub fn index_in_memory(&self) -> bool {
        self.index_path.as_os_str() == ":memory:"
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RMSYNC_`
    /// 2. TOML file from `RMSYNC_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RMSYNC_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("RMSYNC_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
