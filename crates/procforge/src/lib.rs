//! Declarative process construction and supervision
//!
//! Builds external processes from a declarative `CmdSpec` - an optional
//! script body, program name and arguments, environment overrides, stdio
//! target strings, and a timeout - and supervises the resulting `Cmd`
//! through start, wait, and cancellation:
//!
//! - layered environment resolution with exported/local/read-only semantics;
//! - shebang-aware script materialization, including a `${SOURCE}`
//!   placeholder that lets a script refer to its own on-disk path;
//! - symbolic stdio target resolution (`STDOUT`, `_`, paths with lazy
//!   directory creation);
//! - race-free timeout enforcement against both a configured duration and a
//!   caller-supplied deadline, with cleanup callbacks guaranteed to run
//!   exactly once.
//!
//! ```no_run
//! use procforge::{CmdSpec, RunError};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = CmdSpec {
//!     script: "#!/usr/bin/env python3 ${SOURCE}.py\nprint('hi')".to_string(),
//!     timeout: "30s".to_string(),
//!     ..Default::default()
//! };
//! let mut cmd = spec.build(None)?;
//! cmd.start(None)?;
//! match cmd.wait().await {
//!     Ok(()) => {}
//!     Err(err @ RunError::TimedOut { .. }) => eprintln!("cancelled: {err}"),
//!     Err(err) => return Err(err.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod fields;
pub mod spawn;

pub use spawn::{
    env_map, env_strings, parse_duration, BuildError, Cleanup, CleanupList, Cmd, CmdSpec,
    CmdState, DeadlineExceeded, DurationError, EnvRead, Environ, ListEnviron, ReadOnlyVar,
    RunError, SignalKind, StdioDefault, StdioHandle, StdioKind, Variable, SOURCE_VAR,
};
