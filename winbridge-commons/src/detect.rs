//! Detection of the WSL host bridge.
//!
//! The kernel version string identifies a WSL instance: any mention of
//! "microsoft" means Windows is on the other side, and WSL2 kernels are
//! built as `microsoft-standard`. The probe reads `/proc/version` once per
//! process; [`reset_detection`] exists so tests can observe it again.

use std::fmt;

use tracing::debug;

use crate::once::ResettableOnce;

const PROC_VERSION: &str = "/proc/version";

/// Which generation of the host bridge is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HostVersion {
    /// Not running under WSL.
    #[default]
    None,
    V1,
    V2,
}

impl HostVersion {
    /// Classify a kernel version string such as the contents of `/proc/version`.
    pub fn from_kernel_version(content: &str) -> Self {
        let lower = content.to_ascii_lowercase();
        if !lower.contains("microsoft") {
            return Self::None;
        }
        if lower.contains("microsoft-standard") {
            Self::V2
        } else {
            Self::V1
        }
    }

    pub fn is_available(self) -> bool {
        self != Self::None
    }

    /// Numeric generation, `0` when absent.
    pub fn as_number(self) -> u8 {
        match self {
            Self::None => 0,
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::V1 => f.write_str("WSL1"),
            Self::V2 => f.write_str("WSL2"),
        }
    }
}

static DETECTED: ResettableOnce<HostVersion> = ResettableOnce::new();

fn detect() -> HostVersion {
    let version = match std::fs::read_to_string(PROC_VERSION) {
        Ok(content) => HostVersion::from_kernel_version(&content),
        Err(error) => {
            debug!(
                path = PROC_VERSION,
                %error,
                "kernel version unreadable; assuming no host bridge"
            );
            HostVersion::None
        }
    };
    debug!(%version, "host bridge detection finished");
    version
}

/// Host bridge generation, detected once per process.
pub fn detect_host_version() -> HostVersion {
    DETECTED.get_or_init(detect)
}

/// True when the process runs inside a WSL instance.
pub fn is_host_bridge_available() -> bool {
    detect_host_version().is_available()
}

/// Drop the cached detection result so the next query probes again.
pub fn reset_detection() {
    DETECTED.reset();
}

/// Answers the executor's "is the host bridge usable" question.
pub trait HostProbe: Send + Sync + fmt::Debug {
    fn host_version(&self) -> HostVersion;

    fn is_available(&self) -> bool {
        self.host_version().is_available()
    }
}

/// Probe backed by the process-wide cached detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostProbe;

impl HostProbe for SystemHostProbe {
    fn host_version(&self) -> HostVersion {
        detect_host_version()
    }
}

/// Probe with a fixed answer, for tests and for hosts where the bridge is
/// known to exist without WSL's kernel markers.
#[derive(Debug, Clone, Copy)]
pub struct StaticHostProbe(pub HostVersion);

impl StaticHostProbe {
    pub fn available() -> Self {
        Self(HostVersion::V2)
    }

    pub fn unavailable() -> Self {
        Self(HostVersion::None)
    }
}

impl HostProbe for StaticHostProbe {
    fn host_version(&self) -> HostVersion {
        self.0
    }
}
