//! Error types for command construction and supervision
//!
//! Two surfaces: `BuildError` for everything that can go wrong while
//! assembling a command (configuration, expansion, resource errors) and
//! `RunError` for the supervised lifecycle (failed start, non-zero exit,
//! timeout). Every error propagates to the immediate caller; nothing is
//! retried or swallowed.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use crate::fields::FieldsError;
use crate::spawn::duration::DurationError;
use crate::spawn::env::ReadOnlyVar;
use crate::spawn::stdio::StdioKind;

/// Errors produced while building a command from its specification.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A per-command environment override hit a read-only variable.
    #[error(transparent)]
    Env(#[from] ReadOnlyVar),

    /// The script's shebang line has no terminating line break.
    #[error("expected line break after shebang")]
    ExpectedLineBreak,

    /// The shebang line splits into zero words.
    #[error("empty shebang line")]
    EmptyShebang,

    /// The word splitter rejected the shebang line.
    #[error(transparent)]
    Fields(#[from] FieldsError),

    /// The configured timeout string did not parse.
    #[error("invalid timeout {input:?}")]
    InvalidTimeout {
        input: String,
        #[source]
        source: DurationError,
    },

    /// A stdio target could not be resolved to an open handle.
    #[error("failed to resolve {kind} target {target:?}")]
    Stdio {
        kind: StdioKind,
        target: String,
        #[source]
        source: io::Error,
    },

    /// The script body could not be written to its temp file.
    #[error("failed to materialize script")]
    TempFile(#[source] io::Error),
}

/// Cause attached to timeout reports so callers can match on "the deadline
/// ran out" without inspecting the outer error shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

/// Errors produced while starting, waiting on, or signaling a command.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The process could not be spawned.
    #[error("failed to start {name:?}")]
    Start {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Collecting the exit status failed.
    #[error("failed to wait for {name:?}")]
    Wait {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The process ran to completion with a non-success status.
    #[error("{name:?} exited with {status}")]
    ExitStatus { name: String, status: ExitStatus },

    /// The effective timeout expired before the process finished. Carries
    /// the process id for diagnostics; the process has been sent a
    /// termination signal.
    #[error("{name:?} timed out after {timeout:?} (pid {pid:?})")]
    TimedOut {
        name: String,
        timeout: Duration,
        pid: Option<u32>,
        #[source]
        source: DeadlineExceeded,
    },

    /// The caller-supplied deadline was already (or effectively) expired at
    /// start; the process was never spawned.
    #[error("deadline already exceeded")]
    DeadlineExceeded,

    /// `wait` or `signal` was called on a command that never started.
    #[error("command not started")]
    NotStarted,

    /// `start` was called twice.
    #[error("command already started")]
    AlreadyStarted,
}

impl RunError {
    /// Whether this error reports an externally imposed cancellation rather
    /// than a failure of the process itself.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, RunError::TimedOut { .. } | RunError::DeadlineExceeded)
    }
}
