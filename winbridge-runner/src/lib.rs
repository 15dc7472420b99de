//! Run Windows executables from inside WSL.
//!
//! [`HostBridgeExecutor`] performs one invocation: it resolves the `.exe`,
//! optionally rewrites path arguments into Windows form, publishes selected
//! variables through `WSLENV`, decodes captured output and enforces the
//! deadline and cancellation of a [`CommandSpec`]. [`WorkerPool`] runs many
//! of them with bounded concurrency.
//!
//! ```no_run
//! use std::sync::Arc;
//! use winbridge_runner::{CommandSpec, HostBridgeExecutor, WorkerPool};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(Arc::new(HostBridgeExecutor::default()), 4);
//! let results = pool.results().ok_or("results already taken")?;
//! pool.submit(CommandSpec::new("cmd").args(["/c", "ver"])).await?;
//! pool.shutdown().await;
//! for outcome in results.drain().await {
//!     println!("{}: {:?}", outcome.id, outcome.result.map(|r| r.stdout));
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod encoding;
pub mod env;
pub mod error;
pub mod executor;
pub mod pool;
pub mod stream;

pub use command::{CommandSpec, ExecutionResult, StdinSource};
pub use encoding::{DecodingReader, SUPPORTED_ENCODINGS, TextEncoding};
pub use env::{
    ComposedEnv, VISIBILITY_MANIFEST_VAR, WslEnvFlag, build_visibility_manifest, compose,
    compose_with, infer_flag,
};
pub use error::{BridgeError, PoolError};
pub use executor::{
    CommandExecutor, DEFAULT_DRAIN_GRACE, HostBridgeExecutor, resolve_command,
    translate_arguments,
};
pub use pool::{JobId, JobOutcome, ResultStream, WorkerPool};
pub use stream::DEFAULT_MAX_LINE_BYTES;
