pub mod model;
pub mod query;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

use crate::query::Column;

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Data access error: {0}")]
    DataAccess(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No data for metric '{metric}' on dimension '{dimension}'")]
    InsufficientData { metric: String, dimension: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl OpsError {
    /// True for failures of the underlying store (unreachable, malformed
    /// query, timeout) as opposed to problems with the data itself.
    pub fn is_data_access(&self) -> bool {
        matches!(self, OpsError::Database(_) | OpsError::DataAccess(_))
    }
}

pub type Result<T> = std::result::Result<T, OpsError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub database: DatabaseConfig,
    pub data: DataConfig,
    pub detector: DetectorConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub table: String,
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://opsintel.db".to_string(),
            max_connections: 5,
            table: "transactions".to_string(),
            query_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(OpsError::Configuration(
                "Database URL not configured".to_string(),
            ));
        }

        let valid_table = !self.table.is_empty()
            && self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_table {
            return Err(OpsError::Configuration(format!(
                "Invalid table name '{}'",
                self.table
            )));
        }

        if self.max_connections == 0 {
            return Err(OpsError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub csv_path: String,
    pub load_on_start: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: "Operations_analyst_data.csv".to_string(),
            load_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Trailing window, in observations (days).
    pub window: usize,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    /// Categorical column whose distinct values each get a TPV check.
    pub category_column: String,
    /// Evaluate independent checks concurrently.
    pub parallel: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: 30,
            warning_threshold: 2.0,
            critical_threshold: 3.0,
            category_column: "product".to_string(),
            parallel: false,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(OpsError::Configuration(
                "Detector window must be at least 1".to_string(),
            ));
        }

        validate_thresholds(self.warning_threshold, self.critical_threshold)?;

        self.category()?;
        Ok(())
    }

    pub fn category(&self) -> Result<Column> {
        let column: Column = self.category_column.parse()?;
        if !column.is_categorical() {
            return Err(OpsError::Configuration(format!(
                "Column '{}' is not a categorical column",
                self.category_column
            )));
        }
        Ok(column)
    }
}

/// Z-score thresholds must be finite, non-negative and ordered; equal
/// values are allowed.
pub fn validate_thresholds(warning: f64, critical: f64) -> Result<()> {
    for (name, value) in [
        ("warning_threshold", warning),
        ("critical_threshold", critical),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(OpsError::Configuration(format!(
                "{} must be a finite, non-negative number (got {})",
                name, value
            )));
        }
    }

    if warning > critical {
        return Err(OpsError::Configuration(format!(
            "warning_threshold ({}) must not exceed critical_threshold ({})",
            warning, critical
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
