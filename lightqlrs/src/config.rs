//! Configuration system for LightQL.
//!
//! A single TOML file covers row limits, the target warehouse and
//! validation strictness.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialect::WarehouseType;
use crate::error::{LightqlError, Result};
use crate::limits::{RowLimitPolicy, DEFAULT_CSV_CELLS_LIMIT, DEFAULT_MAX_LIMIT};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LightqlConfig {
    pub query: QueryConfig,
    pub warehouse: WarehouseConfig,
    pub validation: ValidationConfig,
}

/// Row limit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Cell budget a result may fill (default: 100000).
    pub csv_cells_limit: u64,
    /// Largest limit a request may ask for (0 = unlimited, default: 5000).
    pub max_limit: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// SQL dialect to compile for (default: postgres).
    pub dialect: WarehouseType,
}

/// Validation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Log explore validation errors instead of failing (default: false).
    pub warn_only: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            csv_cells_limit: DEFAULT_CSV_CELLS_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

impl QueryConfig {
    pub fn row_limit_policy(&self) -> RowLimitPolicy {
        RowLimitPolicy {
            csv_cells_limit: self.csv_cells_limit,
            max_limit: (self.max_limit > 0).then_some(self.max_limit),
        }
    }
}

impl LightqlConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LightqlError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(toml_str)
            .map_err(|e| LightqlError::Config(format!("failed to parse config: {e}")))?;
        if cfg.query.csv_cells_limit == 0 {
            return Err(LightqlError::Config(
                "query.csv_cells_limit must be greater than zero".to_string(),
            ));
        }
        Ok(cfg)
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `LIGHTQL_CONFIG` environment variable
    /// 2. `./lightql.toml` (current directory)
    /// 3. `~/.config/lightql/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("LIGHTQL_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from LIGHTQL_CONFIG");
                    return cfg;
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "ignoring LIGHTQL_CONFIG"),
            }
        }

        if let Ok(cfg) = Self::from_file("lightql.toml") {
            tracing::info!("loaded config from ./lightql.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("lightql").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    pub fn row_limit_policy(&self) -> RowLimitPolicy {
        self.query.row_limit_policy()
    }
}
