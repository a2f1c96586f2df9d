use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "titipan";

/// Runtime settings, layered from an optional TOML file and `TITIPAN_*`
/// environment variables. Command-line flags override both.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database")]
    pub database: String,
    /// Recorded as the creator of deposits and the actor of every change
    #[serde(default = "default_actor")]
    pub actor: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_database() -> String {
    "titipan.db".to_string()
}

fn default_actor() -> String {
    std::env::var("USER").unwrap_or_else(|_| "admin".to_string())
}

fn default_page_size() -> u32 {
    20
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_log_filter() -> String {
    "titipan=info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database(),
            actor: default_actor(),
            page_size: default_page_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    /// Load settings. An explicit `path` must exist; otherwise `titipan.toml`
    /// in the working directory is read if present.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = File::with_name(path.unwrap_or(DEFAULT_CONFIG_FILE)).required(path.is_some());

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("TITIPAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
