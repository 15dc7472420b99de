use std::fmt;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::debug;

use super::{Direction, PathTranslator};
use crate::errors::PathError;

const DEFAULT_PROGRAM: &str = "wslpath";

/// Runs the external translator for one path.
pub trait WslpathInvoker: Send + Sync + fmt::Debug {
    /// Return the translator's raw stdout for `path` in `direction`.
    fn invoke(&self, direction: Direction, path: &str) -> Result<String, PathError>;
}

/// Spawns the translator program, `wslpath` by default.
#[derive(Debug, Clone)]
pub struct SystemWslpath {
    program: String,
}

impl Default for SystemWslpath {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl SystemWslpath {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl WslpathInvoker for SystemWslpath {
    fn invoke(&self, direction: Direction, path: &str) -> Result<String, PathError> {
        let failure = |reason: String| PathError::Translation {
            path: path.to_string(),
            reason,
        };

        debug!(
            program = %self.program,
            flag = direction.wslpath_flag(),
            path,
            "spawning path translator"
        );
        let output = Command::new(&self.program)
            .arg(direction.wslpath_flag())
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|error| failure(format!("{} could not run: {error}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Delegated translator: every call asks the external utility.
#[derive(Debug, Clone)]
pub struct WslpathTranslator {
    invoker: Arc<dyn WslpathInvoker>,
}

impl WslpathTranslator {
    pub fn new(invoker: Arc<dyn WslpathInvoker>) -> Self {
        Self { invoker }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemWslpath::default()))
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self::new(Arc::new(SystemWslpath::new(program)))
    }

    fn run(&self, direction: Direction, path: &str) -> Result<String, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        let raw = self.invoker.invoke(direction, path)?;
        let translated = raw.trim_end();
        if translated.is_empty() {
            return Err(PathError::Translation {
                path: path.to_string(),
                reason: "translator produced no output".to_string(),
            });
        }
        Ok(translated.to_string())
    }
}

impl PathTranslator for WslpathTranslator {
    fn to_host_path(&self, native_path: &str) -> Result<String, PathError> {
        self.run(Direction::ToHost, native_path)
    }

    fn to_native_path(&self, host_path: &str) -> Result<String, PathError> {
        self.run(Direction::ToNative, host_path)
    }
}
