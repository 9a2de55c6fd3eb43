use crate::error::AppError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize, Clone)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub request_delay_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scan_directory: String,
    pub run_output_file: String,
    pub country_output_file: String,
    pub cache_file: String,
    pub allowed_extensions: HashSet<String>,
    pub log_level: String,
    pub geocoder: GeocoderConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, AppError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Layered: defaults, then RUN_MODE overlay, then local overrides, then
        // environment variables (e.g. TRIP_MAPPER_GEOCODER__API_KEY).
        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("TRIP_MAPPER").separator("__"))
            .build()?;

        Ok(s.try_deserialize()?)
    }
}
