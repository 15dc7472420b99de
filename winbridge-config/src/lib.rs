//! Configuration for winbridge: a TOML file with `[runner]`, `[paths]` and
//! `[logging]` sections. Every field has a default, so an empty or missing
//! file is a valid configuration. Command-line flags override what is here.

mod loader;
mod logging;
mod paths;
mod runner;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use loader::{CONFIG_FILE_NAME, ConfigManager};
pub use logging::LoggingConfig;
pub use paths::PathsConfig;
pub use runner::RunnerConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct WinbridgeConfig {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WinbridgeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.runner
            .validate()
            .context("Invalid runner configuration")?;
        self.paths
            .validate()
            .context("Invalid paths configuration")?;
        self.logging
            .validate()
            .context("Invalid logging configuration")?;
        Ok(())
    }
}
