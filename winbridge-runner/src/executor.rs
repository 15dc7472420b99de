//! Runs one [`CommandSpec`] as a host process.
//!
//! An invocation moves through validation, command resolution, argument
//! translation and environment composition before the child is started.
//! While it runs, stdout and stderr are drained by independent tasks and
//! input is fed by a third, so a child that interleaves its own I/O never
//! deadlocks against us. The wait races the caller's cancellation token and
//! the per-command deadline; whichever fires first kills the child.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use winbridge_commons::{
    HostProbe, PathStrategy, PathTranslator, SystemHostProbe, clean_native_path, default_translator,
    is_path_shaped,
};

use crate::command::{CommandSpec, ExecutionResult, StdinSource};
use crate::encoding::{self, TextEncoding};
use crate::env::{self, ComposedEnv};
use crate::error::BridgeError;
use crate::stream::{CaptureBuffer, DEFAULT_MAX_LINE_BYTES, collect_lines};

/// Suffix appended when probing the search path for a host binary.
pub const HOST_EXECUTABLE_SUFFIX: &str = ".exe";

/// How long output readers may keep draining after the child was killed.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Executes bridged commands.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `spec` to completion, or until `cancel` fires or its deadline passes.
    ///
    /// `Err` means no process ran (or waiting on it failed). A terminated
    /// process yields `Ok` with `result.error` set.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        spec: &CommandSpec,
    ) -> Result<ExecutionResult, BridgeError>;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        spec: &CommandSpec,
    ) -> Result<ExecutionResult, BridgeError> {
        (**self).execute(cancel, spec).await
    }
}

/// The production executor.
#[derive(Clone)]
pub struct HostBridgeExecutor {
    probe: Arc<dyn HostProbe>,
    translator: Arc<dyn PathTranslator>,
    drain_grace: Duration,
    max_line_bytes: usize,
}

impl fmt::Debug for HostBridgeExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridgeExecutor")
            .field("probe", &self.probe)
            .field("translator", &self.translator)
            .field("drain_grace", &self.drain_grace)
            .field("max_line_bytes", &self.max_line_bytes)
            .finish()
    }
}

impl Default for HostBridgeExecutor {
    fn default() -> Self {
        Self::new(
            Arc::new(SystemHostProbe),
            default_translator(PathStrategy::default()),
        )
    }
}

impl HostBridgeExecutor {
    pub fn new(probe: Arc<dyn HostProbe>, translator: Arc<dyn PathTranslator>) -> Self {
        Self {
            probe,
            translator,
            drain_grace: DEFAULT_DRAIN_GRACE,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HostProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn PathTranslator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    pub fn translator(&self) -> &Arc<dyn PathTranslator> {
        &self.translator
    }

    async fn translate_args(&self, spec: &CommandSpec) -> Result<Vec<String>, BridgeError> {
        if !spec.convert_paths || !spec.args.iter().any(|arg| is_path_shaped(arg)) {
            return Ok(spec.args.clone());
        }
        // The delegated strategy spawns a process per path.
        let translator = Arc::clone(&self.translator);
        let args = spec.args.clone();
        let working_dir = spec.working_dir.clone();
        tokio::task::spawn_blocking(move || {
            translate_arguments(translator.as_ref(), &args, working_dir.as_deref())
        })
            .await
            .map_err(|join| {
                BridgeError::execution("argument translation task failed", io::Error::other(join))
            })?
    }

    fn build_command(
        &self,
        spec: &CommandSpec,
        program: &str,
        args: &[String],
        environment: &ComposedEnv,
    ) -> Command {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        if let ComposedEnv::Explicit(vars) = environment {
            command.env_clear().envs(vars);
        }

        command.stdin(match InputMode::for_spec(spec) {
            InputMode::Terminal => Stdio::inherit(),
            InputMode::Closed => Stdio::null(),
            InputMode::Fed => Stdio::piped(),
        });
        if spec.interactive {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        command
    }

    async fn drain_reader(&self, name: &'static str, task: &mut JoinHandle<io::Result<usize>>) {
        match tokio::time::timeout(self.drain_grace, &mut *task).await {
            Ok(joined) => log_reader_outcome(name, joined),
            Err(_) => {
                task.abort();
                debug!(
                    stream = name,
                    grace = ?self.drain_grace,
                    "output reader aborted after drain grace"
                );
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for HostBridgeExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        spec: &CommandSpec,
    ) -> Result<ExecutionResult, BridgeError> {
        if !self.probe.is_available() {
            return Err(BridgeError::EnvironmentUnavailable);
        }
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let program = resolve_command(&spec.command);
        let args = self.translate_args(spec).await?;
        let environment = env::compose(spec);
        let rendered = spec.display_command();
        let mut command = self.build_command(spec, &program, &args, &environment);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| BridgeError::Launch {
            command: rendered.clone(),
            source,
        })?;
        debug!(
            command = %rendered,
            program = %program,
            pid = child.id(),
            interactive = spec.interactive,
            "host process started"
        );

        let stdin_task = spawn_stdin_writer(&mut child, &spec.stdin);
        let encoding = spec.encoding.unwrap_or_default();
        let stdout = CaptureBuffer::new();
        let stderr = CaptureBuffer::new();
        let mut stdout_task = spawn_reader(
            child.stdout.take(),
            encoding,
            stdout.clone(),
            self.max_line_bytes,
            "stdout",
        );
        let mut stderr_task = spawn_reader(
            child.stderr.take(),
            encoding,
            stderr.clone(),
            self.max_line_bytes,
            "stderr",
        );

        let token = cancel.child_token();
        let timeout = spec.effective_timeout();
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut status: Option<ExitStatus> = None;
        let mut stdout_done = false;
        let mut stderr_done = false;

        let completion = loop {
            if status.is_some() && stdout_done && stderr_done {
                break Completion::Finished;
            }
            tokio::select! {
                waited = child.wait(), if status.is_none() => match waited {
                    Ok(exit) => status = Some(exit),
                    Err(err) => break Completion::WaitFailed(err),
                },
                joined = &mut stdout_task, if !stdout_done => {
                    stdout_done = true;
                    log_reader_outcome("stdout", joined);
                }
                joined = &mut stderr_task, if !stderr_done => {
                    stderr_done = true;
                    log_reader_outcome("stderr", joined);
                }
                _ = token.cancelled() => break Completion::Cancelled,
                _ = &mut deadline => break Completion::TimedOut,
            }
        };

        if let Some(task) = &stdin_task {
            task.abort();
        }

        let error = match completion {
            Completion::Finished => None,
            Completion::WaitFailed(err) => {
                stdout_task.abort();
                stderr_task.abort();
                return Err(BridgeError::execution(
                    format!("failed waiting for {rendered}"),
                    err,
                ));
            }
            Completion::Cancelled => Some(BridgeError::Cancelled),
            Completion::TimedOut => Some(BridgeError::TimedOut {
                timeout: timeout.unwrap_or_default(),
            }),
        };

        if let Some(reason) = &error {
            if status.is_none() {
                status = terminate(&mut child).await;
            }
            info!(command = %rendered, reason = %reason, "host process terminated");
            if !stdout_done {
                self.drain_reader("stdout", &mut stdout_task).await;
            }
            if !stderr_done {
                self.drain_reader("stderr", &mut stderr_task).await;
            }
        }

        let exit_code = status.and_then(|exit| exit.code()).unwrap_or(-1);
        let duration = started.elapsed();
        debug!(command = %rendered, exit_code, ?duration, "host process finished");

        Ok(ExecutionResult {
            stdout: stdout.snapshot(),
            stderr: stderr.snapshot(),
            exit_code,
            duration,
            error,
        })
    }
}

/// How the child's standard input is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    /// Shares the caller's stdin.
    Terminal,
    Closed,
    /// Piped and written by a feeder task.
    Fed,
}

impl InputMode {
    fn for_spec(spec: &CommandSpec) -> Self {
        match (&spec.stdin, spec.interactive) {
            (StdinSource::Null | StdinSource::Inherit, true) => Self::Terminal,
            (StdinSource::Null, false) => Self::Closed,
            (StdinSource::Bytes(_), _) | (StdinSource::Inherit, false) => Self::Fed,
        }
    }
}

enum Completion {
    Finished,
    WaitFailed(io::Error),
    Cancelled,
    TimedOut,
}

/// Append the host executable suffix when that name resolves on `PATH`.
pub fn resolve_command(command: &str) -> String {
    if command.to_ascii_lowercase().ends_with(HOST_EXECUTABLE_SUFFIX) {
        return command.to_string();
    }
    let candidate = format!("{command}{HOST_EXECUTABLE_SUFFIX}");
    match which::which(&candidate) {
        Ok(path) => {
            debug!(command, resolved = %path.display(), "resolved host executable");
            candidate
        }
        Err(_) => command.to_string(),
    }
}

/// Translate every path-shaped argument; the first failure aborts.
///
/// Relative arguments name files under `working_dir` when one is given,
/// since that is where the child will look for them.
pub fn translate_arguments(
    translator: &dyn PathTranslator,
    args: &[String],
    working_dir: Option<&Path>,
) -> Result<Vec<String>, BridgeError> {
    args.iter()
        .map(|arg| {
            if !is_path_shaped(arg) {
                return Ok(arg.clone());
            }
            let native = match working_dir {
                Some(dir) if !arg.starts_with('/') => {
                    clean_native_path(&dir.join(arg).to_string_lossy())
                }
                _ => arg.clone(),
            };
            translator
                .to_host_path(&native)
                .map_err(|source| BridgeError::ArgumentTranslation {
                    argument: arg.clone(),
                    source,
                })
        })
        .collect()
}

async fn terminate(child: &mut Child) -> Option<ExitStatus> {
    if let Err(err) = child.start_kill() {
        debug!(error = %err, "kill request failed; process may have already exited");
    }
    match child.wait().await {
        Ok(status) => Some(status),
        Err(err) => {
            warn!(error = %err, "failed to reap terminated host process");
            None
        }
    }
}

fn spawn_reader<R>(
    pipe: Option<R>,
    encoding: TextEncoding,
    sink: CaptureBuffer,
    max_line_bytes: usize,
    name: &'static str,
) -> JoinHandle<io::Result<usize>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let Some(pipe) = pipe else {
            return Ok(0);
        };
        let decoded = encoding::wrap(pipe, encoding).await?;
        collect_lines(decoded, sink, max_line_bytes, name).await
    })
}

fn spawn_stdin_writer(child: &mut Child, source: &StdinSource) -> Option<JoinHandle<()>> {
    let mut pipe = child.stdin.take()?;
    let source = source.clone();
    Some(tokio::spawn(async move {
        let written = match source {
            StdinSource::Bytes(payload) => pipe.write_all(&payload).await,
            StdinSource::Inherit => tokio::io::copy(&mut tokio::io::stdin(), &mut pipe)
                .await
                .map(|_| ()),
            StdinSource::Null => Ok(()),
        };
        match written {
            Ok(()) => {
                if let Err(err) = pipe.shutdown().await {
                    debug!(error = %err, "closing child input failed");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("child closed its input before all of it was written");
            }
            Err(err) => warn!(error = %err, "failed to feed child input"),
        }
    }))
}

fn log_reader_outcome(
    name: &'static str,
    joined: Result<io::Result<usize>, tokio::task::JoinError>,
) {
    match joined {
        Ok(Ok(lines)) => debug!(stream = name, lines, "output reader finished"),
        Ok(Err(err)) => {
            warn!(stream = name, error = %err, "output reader failed; capture is partial");
        }
        Err(err) if err.is_cancelled() => {}
        Err(err) => warn!(stream = name, error = %err, "output reader panicked"),
    }
}
