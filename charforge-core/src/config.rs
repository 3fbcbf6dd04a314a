use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CharforgeConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Which store implementation backs worldviews and profiles.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// "postgres" or "memory"
    pub backend: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub model: String,
    /// Falls back to the GEMINI_API_KEY env var when empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

fn default_generation_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Webhook for outbound notices. Empty means notices are only logged.
    #[serde(default)]
    pub notify_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchdogConfig {
    pub interval_seconds: u64,
    pub idle_threshold_seconds: u64,
    /// Reap sessions that stay idle this long after their warning.
    /// Unset keeps warned sessions alive until the user returns or quits.
    #[serde(default)]
    pub reap_after_warning_seconds: Option<u64>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            idle_threshold_seconds: 180,
            reap_after_warning_seconds: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl CharforgeConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }

    /// Parse a config from TOML text. Used by tests and embedders.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(src, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
