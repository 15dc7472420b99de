//! Invocation description and outcome types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;

use crate::encoding::TextEncoding;
use crate::error::BridgeError;

/// Where the child's standard input comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdinSource {
    /// The child sees an immediately closed input.
    #[default]
    Null,
    /// A fixed payload written to the child, then closed.
    Bytes(Bytes),
    /// The caller's own standard input.
    Inherit,
}

impl StdinSource {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Immutable description of one bridged command.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Variables layered over the inherited environment.
    pub env: IndexMap<String, String>,
    /// Publish the overlay variables through the visibility manifest.
    pub tunnel_env: bool,
    pub working_dir: Option<PathBuf>,
    /// `None` or a zero duration means unbounded.
    pub timeout: Option<Duration>,
    /// Translate path-shaped arguments to host paths before launch.
    pub convert_paths: bool,
    /// Decoder for captured output; `None` keeps the bytes as they are.
    pub encoding: Option<TextEncoding>,
    pub stdin: StdinSource,
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn tunnel_env(mut self, tunnel: bool) -> Self {
        self.tunnel_env = tunnel;
        self
    }

    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn convert_paths(mut self, convert: bool) -> Self {
        self.convert_paths = convert;
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Select the output decoder by name.
    pub fn with_encoding_name(mut self, name: &str) -> Result<Self, BridgeError> {
        self.encoding = Some(name.parse()?);
        Ok(self)
    }

    pub fn stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn stdin_bytes(self, payload: impl Into<Bytes>) -> Self {
        self.stdin(StdinSource::Bytes(payload.into()))
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Effective deadline; zero collapses to none.
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|timeout| !timeout.is_zero())
    }

    /// Shell-quoted rendering for logs and error messages.
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| shell_escape::escape(part.into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of one execution.
///
/// A non-zero `exit_code` is a normal result. `error` is only set when the
/// process was terminated by a deadline or cancellation, in which case the
/// output fields hold whatever was captured before that.
#[derive(Debug)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process ended without an exit status (killed by a signal).
    pub exit_code: i32,
    pub duration: Duration,
    pub error: Option<BridgeError>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }
}
