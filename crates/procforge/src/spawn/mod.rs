//! Process construction and supervision
//!
//! This module provides the core command lifecycle:
//! - `env` - layered environment variable store
//! - `stdio` - symbolic stdio target resolution
//! - `builder` - `CmdSpec` assembly into launchable commands
//! - `supervisor` - start/wait/signal with timeout racing and cleanups
//! - `duration` - timeout string parsing
//! - `errors` - build and run error surfaces

pub mod builder;
pub mod duration;
pub mod env;
pub mod errors;
mod script;
pub mod stdio;
pub mod supervisor;

// Re-export the public surface
pub use builder::CmdSpec;
pub use duration::{parse_duration, DurationError};
pub use env::{env_map, env_strings, EnvRead, Environ, ListEnviron, ReadOnlyVar, Variable};
pub use errors::{BuildError, DeadlineExceeded, RunError};
pub use script::SOURCE_VAR;
pub use stdio::{StdioDefault, StdioHandle, StdioKind};
pub use supervisor::{Cleanup, CleanupList, Cmd, CmdState, SignalKind};
