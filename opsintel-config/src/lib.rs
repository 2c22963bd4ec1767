use config::{Config, Environment, File};
use opsintel_core::{OpsConfig, OpsError, Result};
use std::path::Path;
use tracing::info;

pub const ENV_PREFIX: &str = "OPSINTEL";

pub struct ConfigManager {
    config: OpsConfig,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::from_file("config.yaml")
    }

    /// YAML file overlaid with `OPSINTEL_<SECTION>__<KEY>` environment
    /// variables. A missing file leaves only defaults and environment.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(environment())
            .build()
            .map_err(|e| OpsError::Configuration(e.to_string()))?;

        let config: OpsConfig = config
            .try_deserialize()
            .map_err(|e| OpsError::Configuration(e.to_string()))?;

        info!(path = %path.display(), "Configuration loaded");
        Ok(Self { config })
    }

    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(environment())
            .build()
            .map_err(|e| OpsError::Configuration(e.to_string()))?;

        let config: OpsConfig = config
            .try_deserialize()
            .map_err(|e| OpsError::Configuration(e.to_string()))?;

        info!("Configuration loaded from environment");
        Ok(Self { config })
    }

    pub fn get_config(&self) -> &OpsConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut OpsConfig {
        &mut self.config
    }

    pub fn into_config(self) -> OpsConfig {
        self.config
    }

    pub fn validate(&self) -> Result<()> {
        self.config.database.validate()?;
        self.config.detector.validate()?;

        if self.config.data.csv_path.is_empty() {
            return Err(OpsError::Configuration(
                "CSV path not configured".to_string(),
            ));
        }

        if self.config.logging.level.is_empty() {
            return Err(OpsError::Configuration(
                "Logging level not configured".to_string(),
            ));
        }

        info!("Configuration validation passed");
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.config)
            .map_err(|e| OpsError::Configuration(e.to_string()))?;

        std::fs::write(path.as_ref(), yaml)?;

        info!(path = %path.as_ref().display(), "Configuration saved to file");
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self {
            config: OpsConfig::default(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
