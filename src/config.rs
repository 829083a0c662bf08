use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP trigger surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port the trigger API listens on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    7031
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Remote state store configuration (GitHub repository contents backend)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Repository owner holding the state records
    #[serde(default = "default_store_owner")]
    pub owner: String,
    /// Repository name holding the state records
    #[serde(default = "default_store_repo")]
    pub repo: String,
    /// API base URL (override for tests)
    #[serde(default = "default_store_api_base")]
    pub api_base: String,
    /// Access token; required unless running with the in-memory store
    #[serde(default)]
    pub token: Option<String>,
    /// Path of the watermark record within the repository
    #[serde(default = "default_watermark_path")]
    pub watermark_path: String,
    /// Path of the in-progress lock record within the repository
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
    /// Timeout for state record reads/writes (metadata class)
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_store_owner() -> String {
    "example-org".to_string()
}

fn default_store_repo() -> String {
    "sync-state".to_string()
}

fn default_store_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_watermark_path() -> String {
    "state/last_processed_id.txt".to_string()
}

fn default_lock_path() -> String {
    "state/in_progress_id.txt".to_string()
}

fn default_store_timeout() -> u64 {
    20
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            owner: default_store_owner(),
            repo: default_store_repo(),
            api_base: default_store_api_base(),
            token: None,
            watermark_path: default_watermark_path(),
            lock_path: default_lock_path(),
            timeout_secs: default_store_timeout(),
        }
    }
}

/// Accounting backend (document source) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the accounting API
    #[serde(default = "default_source_base_url")]
    pub base_url: String,
    /// API key; sent as a query parameter
    #[serde(default)]
    pub api_key: Option<String>,
    /// API token; sent as a query parameter
    #[serde(default)]
    pub api_token: Option<String>,
    /// Timeout for list/summary calls (metadata class)
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,
    /// Timeout for full-document fetches (payloads can be large)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_source_base_url() -> String {
    "https://go.paytraq.com".to_string()
}

fn default_list_timeout() -> u64 {
    20
}

fn default_fetch_timeout() -> u64 {
    45
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            api_key: None,
            api_token: None,
            list_timeout_secs: default_list_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// Downstream delivery worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Worker endpoint receiving the normalized document payload
    #[serde(default)]
    pub worker_url: Option<String>,
    /// Timeout for the delivery call; downstream processing can be slow
    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
    /// CRM pipeline the worker files deals under
    #[serde(default = "default_pipeline_id")]
    pub pipeline_id: u64,
    /// CRM stage for newly created deals
    #[serde(default = "default_stage_id")]
    pub stage_id: u64,
}

fn default_delivery_timeout() -> u64 {
    90
}

fn default_pipeline_id() -> u64 {
    7
}

fn default_stage_id() -> u64 {
    50
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            worker_url: None,
            timeout_secs: default_delivery_timeout(),
            pipeline_id: default_pipeline_id(),
            stage_id: default_stage_id(),
        }
    }
}

/// Document selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Maximum candidates inspected during an override filter scan
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

fn default_scan_limit() -> usize {
    200
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            scan_limit: default_scan_limit(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to file instead of stderr
    #[serde(default)]
    pub to_file: bool,

    /// Directory for log files when `to_file` is set
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
            dir: default_log_dir(),
        }
    }
}

impl Config {
    /// Path to the local config file, checked in the working directory
    pub fn local_config_path() -> PathBuf {
        PathBuf::from("salesbridge.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the service works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Local config next to the service (primary config location)
        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/salesbridge/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("salesbridge").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with SALESBRIDGE_ prefix, e.g.
        // SALESBRIDGE__STORE__TOKEN, SALESBRIDGE__DELIVERY__WORKER_URL
        builder = builder.add_source(
            config::Environment::with_prefix("SALESBRIDGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.store.watermark_path, "state/last_processed_id.txt");
        assert_eq!(config.store.lock_path, "state/in_progress_id.txt");
        assert_eq!(config.selector.scan_limit, 200);
        assert!(config.store.token.is_none());
        // Delivery calls get the long timeout class
        assert!(config.delivery.timeout_secs > config.store.timeout_secs);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.port, config.server.port);
        assert_eq!(back.source.base_url, config.source.base_url);
    }

    #[test]
    fn explicit_config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9999\n\n[selector]\nscan_limit = 25\n",
        )
        .unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.selector.scan_limit, 25);
        // Untouched sections keep their defaults
        assert_eq!(config.store.watermark_path, "state/last_processed_id.txt");
    }
}
