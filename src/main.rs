//! winrun: run Windows executables from WSL.
//!
//! Thin front end over `winbridge-runner`: parses flags, loads the
//! configuration, refuses to run outside WSL, submits the command to a
//! worker pool and maps the outcome onto the process exit code.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use winbridge_commons::{SystemHostProbe, detect_host_version};
use winbridge_config::{ConfigManager, LoggingConfig, WinbridgeConfig};
use winbridge_runner::{CommandSpec, HostBridgeExecutor, JobOutcome, StdinSource, WorkerPool};

mod args;

use args::Cli;

/// Exit status after an interrupt forces the process down.
const INTERRUPTED_EXIT_CODE: i32 = 130;
/// How long a cancelled run may take to wind down before exiting anyway.
const FORCE_EXIT_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[winrun] Error: {err:#}");
            1
        }
    };
    // Exit explicitly: a forwarded stdin read cannot be interrupted and
    // would otherwise hold the runtime open.
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = ConfigManager::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .into_config();
    initialize_tracing(&config.logging);

    let version = detect_host_version();
    if !version.is_available() {
        eprintln!("Error: winrun must be run inside a WSL environment.");
        eprintln!("  This does not appear to be a WSL instance.");
        return Ok(1);
    }
    eprintln!("[winrun] {version} environment detected");

    let spec = build_spec(&cli, &config)?;
    let translator = config.paths.build_translator(cli.path_strategy)?;
    let executor = HostBridgeExecutor::new(Arc::new(SystemHostProbe), translator)
        .with_drain_grace(config.runner.drain_grace())
        .with_max_line_bytes(config.runner.max_line_bytes);
    let concurrency = cli.concurrency.unwrap_or(config.runner.concurrency);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let pool = WorkerPool::with_cancellation(Arc::new(executor), concurrency, shutdown);
    let results = pool
        .results()
        .context("worker pool result stream unavailable")?;
    debug!(concurrency = pool.concurrency(), command = %spec.display_command(), "submitting");
    pool.submit(spec).await?;
    pool.shutdown().await;

    let mut exit_code = 0;
    for outcome in results.drain().await {
        if let Some(code) = report(outcome) {
            exit_code = code;
        }
    }
    Ok(exit_code)
}

fn initialize_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directive()));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("[winrun] warning: failed to initialize tracing: {err}");
    }
}

fn build_spec(cli: &Cli, config: &WinbridgeConfig) -> Result<CommandSpec> {
    let Some((program, rest)) = cli.command.split_first() else {
        anyhow::bail!("no command specified; use '--' to separate flags from the command");
    };

    let stdin_is_terminal = std::io::stdin().is_terminal();
    let interactive = cli.interactive || (stdin_is_terminal && cli.wants_terminal());
    if interactive && !cli.interactive {
        eprintln!("[winrun] Auto-detected interactive mode");
    }

    let encoding = match cli.encoding {
        Some(encoding) => Some(encoding),
        None => config.runner.text_encoding()?,
    };
    let timeout = match cli.timeout {
        Some(timeout) => Some(timeout),
        None => config.runner.timeout()?,
    };
    let stdin = if interactive || !stdin_is_terminal {
        StdinSource::Inherit
    } else {
        StdinSource::Null
    };

    let mut spec = CommandSpec::new(program.as_str())
        .args(rest.iter().cloned())
        .tunnel_env(cli.tunnel_env)
        .convert_paths(cli.convert_paths || config.runner.convert_paths)
        .stdin(stdin)
        .interactive(interactive);
    for (key, value) in &cli.env {
        spec = spec.env(key.as_str(), value.as_str());
    }
    spec.encoding = encoding;
    spec.timeout = timeout;
    Ok(spec)
}

/// Print one outcome; returns the exit code it contributes, if non-zero.
fn report(outcome: JobOutcome) -> Option<i32> {
    let JobOutcome { id, spec, result } = outcome;
    let result = match result {
        Ok(result) => result,
        Err(err) => {
            eprintln!("[winrun] Error: {err}");
            return Some(1);
        }
    };

    if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprintln!("{}", result.stderr);
    }

    let millis = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX);
    info!(
        job_id = %id,
        exit_code = result.exit_code,
        duration = ?result.duration,
        "command completed"
    );
    eprintln!(
        "[winrun] Command {:?} completed in {} (exit code: {})",
        spec.command,
        humantime::format_duration(Duration::from_millis(millis)),
        result.exit_code
    );

    if let Some(err) = result.error {
        eprintln!("[winrun] Error: {err}");
        return Some(1);
    }
    (result.exit_code != 0).then_some(result.exit_code)
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if !interrupted().await {
            return;
        }
        eprintln!("\n[winrun] Interrupt received, requesting graceful shutdown...");
        shutdown.cancel();

        tokio::select! {
            second = interrupted() => {
                if second {
                    eprintln!("[winrun] Interrupt received again, force exiting.");
                }
            }
            _ = tokio::time::sleep(FORCE_EXIT_GRACE) => {
                eprintln!("[winrun] Grace period expired, force exiting.");
            }
        }
        std::process::exit(INTERRUPTED_EXIT_CODE);
    });
}

/// Resolves on Ctrl-C (or SIGTERM on Unix). `false` if no handler could be installed.
async fn interrupted() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            return tokio::select! {
                ctrl_c = tokio::signal::ctrl_c() => ctrl_c.is_ok(),
                term = terminate.recv() => term.is_some(),
            };
        }
    }
    tokio::signal::ctrl_c().await.is_ok()
}
