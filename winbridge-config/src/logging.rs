use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

const LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// `[logging]` section. `RUST_LOG` takes precedence when set.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_string()
    }

    /// Filter directive scoped to this workspace's targets.
    pub fn filter_directive(&self) -> String {
        let level = self.level.trim().to_ascii_lowercase();
        ["winrun", "winbridge", "winbridge_commons", "winbridge_config", "winbridge_runner"]
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn validate(&self) -> Result<()> {
        let level = self.level.trim().to_ascii_lowercase();
        ensure!(
            LEVELS.contains(&level.as_str()),
            "logging.level {:?} must be one of {}",
            self.level,
            LEVELS.join(", ")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_covers_workspace_targets() {
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
        };
        config.validate().unwrap();
        let directive = config.filter_directive();
        assert!(directive.starts_with("winrun=debug,"));
        assert!(directive.contains("winbridge_runner=debug"));
    }

    #[test]
    fn rejects_unknown_levels() {
        let config = LoggingConfig {
            level: "loud".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
