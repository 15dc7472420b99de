use std::sync::Arc;

use anyhow::{Result, anyhow, ensure};
use serde::{Deserialize, Serialize};
use winbridge_commons::{
    CachedTranslator, MountTableTranslator, PathCache, PathStrategy, PathTranslator,
    WslpathTranslator,
};

/// `[paths]` section: how native paths are turned into host paths.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PathsConfig {
    /// `mount-table` (pure, default) or `wslpath` (spawns the utility).
    #[serde(default = "PathsConfig::default_strategy")]
    pub strategy: String,
    #[serde(default = "PathsConfig::default_translator_program")]
    pub translator_program: String,
    /// Overrides `WSL_DISTRO_NAME` in synthesised `\\wsl.localhost` paths.
    #[serde(default)]
    pub distro_name: Option<String>,
    #[serde(default = "PathsConfig::default_mount_root")]
    pub mount_root: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            strategy: Self::default_strategy(),
            translator_program: Self::default_translator_program(),
            distro_name: None,
            mount_root: Self::default_mount_root(),
        }
    }
}

impl PathsConfig {
    fn default_strategy() -> String {
        PathStrategy::default().as_str().to_string()
    }

    fn default_translator_program() -> String {
        "wslpath".to_string()
    }

    fn default_mount_root() -> String {
        "/mnt/".to_string()
    }

    pub fn path_strategy(&self) -> Result<PathStrategy> {
        self.strategy
            .parse()
            .map_err(|err: String| anyhow!("paths.strategy: {err}"))
    }

    /// Build the translator `strategy` names, memoised through a cache of
    /// its own. `strategy` overrides the configured one.
    pub fn build_translator(
        &self,
        strategy: Option<PathStrategy>,
    ) -> Result<Arc<dyn PathTranslator>> {
        let strategy = match strategy {
            Some(strategy) => strategy,
            None => self.path_strategy()?,
        };
        let cache = Arc::new(PathCache::new());
        let translator: Arc<dyn PathTranslator> = match strategy {
            PathStrategy::MountTable => {
                let mut table = MountTableTranslator::system().with_mount_root(&self.mount_root);
                if let Some(distro) = &self.distro_name {
                    table = table.with_distro_name(distro);
                }
                Arc::new(CachedTranslator::new(table, cache))
            }
            PathStrategy::Wslpath => Arc::new(CachedTranslator::new(
                WslpathTranslator::with_program(&self.translator_program),
                cache,
            )),
        };
        Ok(translator)
    }

    pub fn validate(&self) -> Result<()> {
        self.path_strategy()?;
        ensure!(
            !self.translator_program.trim().is_empty(),
            "paths.translator_program must not be empty"
        );
        ensure!(
            self.mount_root.starts_with('/'),
            "paths.mount_root must be an absolute path, got {:?}",
            self.mount_root
        );
        if let Some(distro) = &self.distro_name {
            ensure!(
                !distro.trim().is_empty() && !distro.contains(['\\', '/']),
                "paths.distro_name {distro:?} is not a valid distribution name"
            );
        }
        Ok(())
    }
}
