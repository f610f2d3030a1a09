use crate::ml::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides `training.store_training_data`
pub const STORE_TRAINING_DATA_ENV: &str = "STORE_TRAINING_DATA";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Metadata store and artifact locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Training workflow switches
    #[serde(default)]
    pub training: TrainingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());
        let store_flag = std::env::var(STORE_TRAINING_DATA_ENV).ok();

        Self::load_from(&config_path, store_flag.as_deref())
    }

    /// Layer the embedded defaults, an optional file, `ARP_*` variables and
    /// the training-data flag, in that order
    pub fn load_from(
        config_path: &str,
        store_training_data: Option<&str>,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name(config_path).required(false))
            // e.g. ARP_SERVER__HTTP_PORT=9000
            .add_source(
                config::Environment::with_prefix("ARP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option(
                "training.store_training_data",
                store_training_data.map(parse_flag),
            )?
            .build()?
            .try_deserialize()
    }

    /// Settings handed to the pipeline
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            store_training_data: self.training.store_training_data,
            artifacts_dir: self.storage.artifacts_dir.clone(),
        }
    }
}

/// Truthy for `1`, `true`, `yes`, `y` and `on` (any case); false otherwise
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest accepted multipart body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Metadata store backend
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path for the embedded database
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Directory for model artifacts
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Keep every training row next to the model metadata
    #[serde(default = "default_true")]
    pub store_training_data: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            store_training_data: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/arp")
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("./artifacts/models")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "asset-risk-predictor".to_string()
}

fn default_true() -> bool {
    true
}
