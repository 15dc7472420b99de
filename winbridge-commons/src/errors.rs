use thiserror::Error;

/// Failures while translating a path between the two namespaces.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path provided")]
    Empty,

    /// The delegated translator could not be run or rejected the path.
    #[error("failed to translate {path:?}: {reason}")]
    Translation { path: String, reason: String },

    /// Neither a drive-letter path nor a `\\wsl.localhost` / `\\wsl$` path.
    #[error("unrecognized Windows path format: {0:?}")]
    UnrecognizedHostPath(String),

    #[error("cannot resolve relative path {path:?}: {reason}")]
    Relative { path: String, reason: String },
}
