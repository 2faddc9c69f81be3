use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::forecast::Granularity;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub table: TableConfig,
    pub forecast: ForecastConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Overrides the token location (default: `<data dir>/optocom/token`).
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    pub page_size: usize,
    /// How many page numbers the pager shows around the current page.
    pub page_window: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            page_window: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    pub default_view: Granularity,
    pub chart_width: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_view: Granularity::Weekly,
            chart_width: 40,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("optocom");

        let builder = Config::builder()
            // 1. Load default values
            .set_default("api.base_url", "http://localhost:8000")?
            .set_default("network.request_timeout_secs", 30)?
            .set_default("network.connect_timeout_secs", 10)?
            .set_default("storage.token_file", None::<String>)?
            .set_default("table.page_size", 20)?
            .set_default("table.page_window", 5)?
            .set_default("forecast.default_view", "weekly")?
            .set_default("forecast.chart_width", 40)?
            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))
            // 4. Load from Environment variables (OPTOCOM__API__BASE_URL=...)
            .add_source(Environment::with_prefix("OPTOCOM").separator("__"));

        let s = builder.build().context("Failed to assemble configuration")?;
        s.try_deserialize().context("Invalid configuration")
    }
}
