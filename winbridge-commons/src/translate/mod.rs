//! Path translation between the Linux (native) and Windows (host) namespaces.
//!
//! Two strategies satisfy [`PathTranslator`]:
//! - [`MountTableTranslator`] computes the answer from `/proc/mounts` without
//!   spawning anything. It is the default.
//! - [`WslpathTranslator`] asks the `wslpath` utility for every path.
//!
//! Either one is wrapped in [`CachedTranslator`] so each `(direction, path)`
//! pair is resolved at most once per [`PathCache`].

mod cache;
mod mount_table;
mod wslpath;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use cache::{CachedTranslator, PathCache, clear_path_cache};
pub use mount_table::{MountEntry, MountSource, MountTableTranslator, ProcMounts, StaticMounts};
pub use wslpath::{SystemWslpath, WslpathInvoker, WslpathTranslator};

use crate::errors::PathError;

/// Direction of a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Linux path to Windows path.
    ToHost,
    /// Windows path to Linux path.
    ToNative,
}

impl Direction {
    /// The `wslpath` flag selecting this direction.
    pub fn wslpath_flag(self) -> &'static str {
        match self {
            Self::ToHost => "-w",
            Self::ToNative => "-u",
        }
    }
}

/// Converts paths between the two filesystem namespaces.
pub trait PathTranslator: Send + Sync + fmt::Debug {
    fn to_host_path(&self, native_path: &str) -> Result<String, PathError>;

    fn to_native_path(&self, host_path: &str) -> Result<String, PathError>;

    fn translate(&self, direction: Direction, path: &str) -> Result<String, PathError> {
        match direction {
            Direction::ToHost => self.to_host_path(path),
            Direction::ToNative => self.to_native_path(path),
        }
    }
}

impl<T: PathTranslator + ?Sized> PathTranslator for Arc<T> {
    fn to_host_path(&self, native_path: &str) -> Result<String, PathError> {
        (**self).to_host_path(native_path)
    }

    fn to_native_path(&self, host_path: &str) -> Result<String, PathError> {
        (**self).to_native_path(host_path)
    }
}

/// Which translation strategy to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathStrategy {
    #[default]
    MountTable,
    Wslpath,
}

impl PathStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MountTable => "mount-table",
            Self::Wslpath => "wslpath",
        }
    }
}

impl fmt::Display for PathStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mount-table" | "mounts" | "table" => Ok(Self::MountTable),
            "wslpath" | "delegated" => Ok(Self::Wslpath),
            other => Err(format!(
                "unknown path strategy {other:?} (expected mount-table or wslpath)"
            )),
        }
    }
}

/// Build the process-default translator for `strategy`, memoised through the
/// global [`PathCache`].
pub fn default_translator(strategy: PathStrategy) -> Arc<dyn PathTranslator> {
    match strategy {
        PathStrategy::MountTable => Arc::new(CachedTranslator::new(
            MountTableTranslator::system(),
            PathCache::global(),
        )),
        PathStrategy::Wslpath => Arc::new(CachedTranslator::new(
            WslpathTranslator::system(),
            PathCache::global(),
        )),
    }
}
