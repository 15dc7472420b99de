//! Error taxonomy for bridge executions.
//!
//! - Translation and encoding failures abort before any process starts.
//! - [`BridgeError::EnvironmentUnavailable`] is fatal and never retried.
//! - [`BridgeError::Launch`] means the process never ran; no result exists.
//! - [`BridgeError::Cancelled`] and [`BridgeError::TimedOut`] accompany a
//!   result holding whatever output was captured before termination.
//!
//! A non-zero exit code is not an error; it is carried by the result.

use std::io;
use std::time::Duration;

use thiserror::Error;
use winbridge_commons::PathError;

use crate::encoding::SUPPORTED_ENCODINGS;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("not running in a WSL environment")]
    EnvironmentUnavailable,

    #[error("failed to convert argument {argument:?}")]
    ArgumentTranslation {
        argument: String,
        #[source]
        source: PathError,
    },

    #[error("unsupported encoding: {name:?} (supported: {})", SUPPORTED_ENCODINGS)]
    UnsupportedEncoding { name: String },

    #[error("failed to start command {command:?}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("command was cancelled")]
    Cancelled,

    #[error("command timed out after {}", humantime::format_duration(*.timeout))]
    TimedOut { timeout: Duration },

    #[error("command execution failed: {context}")]
    Execution {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BridgeError {
    /// True for the two externally triggered terminations.
    pub fn is_termination(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut { .. })
    }

    /// Errors raised before the process could have started.
    pub fn is_pre_launch(&self) -> bool {
        matches!(
            self,
            Self::EnvironmentUnavailable
                | Self::ArgumentTranslation { .. }
                | Self::UnsupportedEncoding { .. }
                | Self::Launch { .. }
        )
    }

    pub(crate) fn execution(context: impl Into<String>, source: io::Error) -> Self {
        Self::Execution {
            context: context.into(),
            source,
        }
    }
}

/// Failures of the pool itself, as opposed to the jobs it runs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is shut down and no longer accepts jobs")]
    Closed,
}
