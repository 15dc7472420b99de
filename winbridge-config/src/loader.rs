use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::WinbridgeConfig;

/// File looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "winbridge.toml";

/// Loads [`WinbridgeConfig`] from the first location that exists:
/// an explicit path, `./winbridge.toml`, then
/// `<user config dir>/winbridge/config.toml`. Without any file the
/// defaults apply.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: WinbridgeConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load using the current directory and the platform config directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let workspace = std::env::current_dir().context("Failed to resolve current directory")?;
        Self::load_with(explicit, &workspace, dirs::config_dir().as_deref())
    }

    pub fn load_with(
        explicit: Option<&Path>,
        workspace: &Path,
        user_config_dir: Option<&Path>,
    ) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let candidates = std::iter::once(workspace.join(CONFIG_FILE_NAME))
            .chain(user_config_dir.map(|dir| dir.join("winbridge").join("config.toml")));
        for candidate in candidates {
            if candidate.is_file() {
                return Self::load_from_file(&candidate);
            }
        }

        debug!("no configuration file found; using defaults");
        let config = WinbridgeConfig::default();
        config
            .validate()
            .context("Default configuration failed validation")?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = WinbridgeConfig::from_toml_str(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn config(&self) -> &WinbridgeConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn into_config(self) -> WinbridgeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &str) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn falls_back_to_defaults_without_files() {
        let workspace = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let manager = ConfigManager::load_with(None, workspace.path(), Some(user.path())).unwrap();

        assert!(manager.config_path().is_none());
        assert_eq!(manager.config(), &WinbridgeConfig::default());
    }

    #[test]
    fn workspace_file_wins_over_user_file() {
        let workspace = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let local = write(workspace.path(), CONFIG_FILE_NAME, "[runner]\nconcurrency = 2\n");
        write(user.path(), "winbridge/config.toml", "[runner]\nconcurrency = 7\n");

        let manager = ConfigManager::load_with(None, workspace.path(), Some(user.path())).unwrap();
        assert_eq!(manager.config_path(), Some(local.as_path()));
        assert_eq!(manager.config().runner.concurrency, 2);
    }

    #[test]
    fn user_file_is_used_when_workspace_has_none() {
        let workspace = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write(
            user.path(),
            "winbridge/config.toml",
            "[paths]\nstrategy = \"wslpath\"\n[logging]\nlevel = \"debug\"\n",
        );

        let config = ConfigManager::load_with(None, workspace.path(), Some(user.path()))
            .unwrap()
            .into_config();
        assert_eq!(config.paths.strategy, "wslpath");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.runner.drain_grace_ms, 500);
    }

    #[test]
    fn explicit_path_must_exist_and_be_valid() {
        let workspace = TempDir::new().unwrap();
        let missing = workspace.path().join("nope.toml");
        let err = ConfigManager::load_with(Some(&missing), workspace.path(), None).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config file"));

        let invalid = write(workspace.path(), "bad.toml", "[runner]\nencoding = \"ebcdic\"\n");
        let err = ConfigManager::load_with(Some(&invalid), workspace.path(), None).unwrap_err();
        assert!(format!("{err:#}").contains("unsupported encoding"));
    }

    #[test]
    fn malformed_toml_names_the_file() {
        let workspace = TempDir::new().unwrap();
        let path = write(workspace.path(), CONFIG_FILE_NAME, "[runner\n");
        let err = ConfigManager::load_with(None, workspace.path(), None).unwrap_err();
        assert!(format!("{err:#}").contains(&path.display().to_string()));
    }
}
