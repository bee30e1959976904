use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{AppError, Result};
use crate::services::config_watcher::ReloadableConfig;
use crate::services::json_schema;

/// Exchange the sync engine knows how to talk to
pub const SUPPORTED_EXCHANGE: &str = "binance";

/// Service configuration loaded from a schema-validated JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Informational exchange identifier (JSON key `main_exchange`)
    #[serde(rename = "main_exchange")]
    pub exchange: String,

    /// SQLite file path; relative paths resolve against the working directory
    pub database_path: PathBuf,
}

impl ServiceConfig {
    /// Reads `config_path`, validates it against the JSON schema at
    /// `schema_path` and parses the result.
    pub fn load(config_path: &Path, schema_path: &Path) -> Result<Self> {
        let schema = read_json(schema_path)?;
        let document = read_json(config_path)?;

        json_schema::validate(&schema, &document).map_err(|e| {
            AppError::Config(format!("{} failed schema validation: {}", config_path.display(), e))
        })?;

        let config: ServiceConfig = serde_json::from_value(document)
            .map_err(|e| AppError::Config(format!("{}: {}", config_path.display(), e)))?;
        config.check()?;

        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.exchange.trim().is_empty() {
            return Err(AppError::Config("main_exchange must not be empty".to_string()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(AppError::Config("database_path must not be empty".to_string()));
        }
        if !self.exchange.eq_ignore_ascii_case(SUPPORTED_EXCHANGE) {
            warn!(
                exchange = %self.exchange,
                "Configured exchange is informational only, market data is always fetched from Binance futures"
            );
        }
        Ok(())
    }
}

impl ReloadableConfig for ServiceConfig {
    fn load_and_validate(config_path: &Path, schema_path: &Path) -> Result<Self> {
        Self::load(config_path, schema_path)
    }

    fn to_diagnostic_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable config: {}>", e))
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("Invalid JSON in {}: {}", path.display(), e)))
}
