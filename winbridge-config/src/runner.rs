use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};
use winbridge_runner::{DEFAULT_MAX_LINE_BYTES, TextEncoding};

/// `[runner]` section: defaults applied to every command.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Worker count; 0 means one per available CPU.
    #[serde(default)]
    pub concurrency: usize,
    /// Per-command deadline such as `"30s"` or `"2m"`; empty means unbounded.
    #[serde(default)]
    pub default_timeout: String,
    /// Output encoding selector; empty keeps output as-is.
    #[serde(default)]
    pub encoding: String,
    /// Translate path-shaped arguments unless overridden on the command line.
    #[serde(default)]
    pub convert_paths: bool,
    /// Milliseconds output readers may keep draining after a kill.
    #[serde(default = "RunnerConfig::default_drain_grace_ms")]
    pub drain_grace_ms: u64,
    /// Upper bound on one captured output line.
    #[serde(default = "RunnerConfig::default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            default_timeout: String::new(),
            encoding: String::new(),
            convert_paths: false,
            drain_grace_ms: Self::default_drain_grace_ms(),
            max_line_bytes: Self::default_max_line_bytes(),
        }
    }
}

impl RunnerConfig {
    const MAX_CONCURRENCY: usize = 1024;
    const MAX_DRAIN_GRACE_MS: u64 = 60_000;
    const MIN_LINE_BYTES: usize = 256;

    const fn default_drain_grace_ms() -> u64 {
        500
    }

    const fn default_max_line_bytes() -> usize {
        DEFAULT_MAX_LINE_BYTES
    }

    /// Parsed `default_timeout`; zero and empty both mean unbounded.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        let raw = self.default_timeout.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let parsed = humantime::parse_duration(raw)
            .with_context(|| format!("runner.default_timeout {raw:?} is not a duration"))?;
        Ok(Some(parsed).filter(|timeout| !timeout.is_zero()))
    }

    /// Parsed `encoding`; empty means no decoding.
    pub fn text_encoding(&self) -> Result<Option<TextEncoding>> {
        if self.encoding.trim().is_empty() {
            return Ok(None);
        }
        self.encoding
            .parse::<TextEncoding>()
            .map(Some)
            .map_err(|err| anyhow!("runner.encoding: {err}"))
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.concurrency <= Self::MAX_CONCURRENCY,
            "runner.concurrency must be at most {} (or 0 for one worker per CPU)",
            Self::MAX_CONCURRENCY
        );
        ensure!(
            self.drain_grace_ms <= Self::MAX_DRAIN_GRACE_MS,
            "runner.drain_grace_ms must be at most {}ms",
            Self::MAX_DRAIN_GRACE_MS
        );
        ensure!(
            self.max_line_bytes >= Self::MIN_LINE_BYTES,
            "runner.max_line_bytes must be at least {} bytes",
            Self::MIN_LINE_BYTES
        );
        self.timeout()?;
        self.text_encoding()?;
        Ok(())
    }
}
