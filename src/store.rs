//! Settings persistence
//!
//! Settings live in a YAML file next to the crate by default, the same place
//! the browser tooling reads its `config.yaml` from. `RESERVATION_CONFIG`
//! points somewhere else.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::Settings;
use crate::utils::ConfigError;

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "RESERVATION_CONFIG";

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$RESERVATION_CONFIG`, or `config.yaml` in the package root
    pub fn from_env() -> Self {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::new(path),
            None => Self::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings; defaults when the file does not exist yet
    pub fn load(&self) -> Result<Settings, ConfigError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(Settings::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Validate, then write
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_yaml::to_string(settings)?)?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Overwrite the file with the defaults
    pub fn reset(&self) -> Result<Settings, ConfigError> {
        let defaults = Settings::default();
        self.save(&defaults)?;
        Ok(defaults)
    }
}
