//! Shared building blocks for the winbridge crates: host bridge detection,
//! translation of paths between the Linux and Windows namespaces, and the
//! process-wide once-initialised state both of them rely on.
//!
//! Everything here is synchronous and free of process-spawning policy; the
//! executor in `winbridge-runner` decides when and how these helpers are
//! consulted.

pub mod detect;
pub mod errors;
pub mod once;
pub mod paths;
pub mod translate;

pub use detect::{
    HostProbe, HostVersion, StaticHostProbe, SystemHostProbe, detect_host_version,
    is_host_bridge_available, reset_detection,
};
pub use errors::PathError;
pub use once::ResettableOnce;
pub use paths::{clean_native_path, is_path_shaped};
pub use translate::{
    CachedTranslator, Direction, MountEntry, MountSource, MountTableTranslator, PathCache,
    PathStrategy, PathTranslator, ProcMounts, StaticMounts, SystemWslpath, WslpathInvoker,
    WslpathTranslator, clear_path_cache, default_translator,
};
