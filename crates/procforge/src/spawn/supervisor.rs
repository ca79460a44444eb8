//! Process supervision
//!
//! Owns the command lifecycle after construction:
//! - `CleanupList` - ordered callbacks guaranteed to run exactly once
//! - `SignalKind` - signal types forwarded to the child
//! - `Cmd` - the launchable handle: start/wait/signal with timeout racing
//!
//! `wait` under an active timeout races process exit against expiry with
//! `tokio::select!`; on expiry the child receives SIGTERM and a detached
//! reaper task collects the exit status so the process-table entry is never
//! leaked.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::spawn::errors::{DeadlineExceeded, RunError};
use crate::spawn::stdio::StdioHandle;

/// Deadlines with less remaining time than this are treated as expired.
const MIN_DEADLINE: Duration = Duration::from_millis(1);

// ============================================================================
// Cleanup callbacks
// ============================================================================

/// A registered "on completion" callback.
pub type Cleanup = Box<dyn FnOnce() -> anyhow::Result<()>>;

/// Ordered cleanup callbacks with guaranteed single execution.
///
/// Callbacks run in registration order. `run` drains the list, so a second
/// call is a no-op; dropping the list runs anything not yet run. This makes
/// every exit path (successful wait, build failure, abandoned handle) funnel
/// through one release point.
#[derive(Default)]
pub struct CleanupList {
    items: Vec<Cleanup>,
}

impl std::fmt::Debug for CleanupList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupList")
            .field("items", &self.items.len())
            .finish()
    }
}

impl CleanupList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Failures are logged, never propagated; they must
    /// not prevent the remaining callbacks from running.
    pub fn push(&mut self, cleanup: impl FnOnce() -> anyhow::Result<()> + 'static) {
        self.items.push(Box::new(cleanup));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run all not-yet-run callbacks in registration order.
    pub fn run(&mut self) {
        for cleanup in self.items.drain(..) {
            if let Err(err) = cleanup() {
                warn!("cleanup failed: {err:#}");
            }
        }
    }
}

impl Drop for CleanupList {
    fn drop(&mut self) {
        self.run();
    }
}

// ============================================================================
// Signals
// ============================================================================

/// Types of signals that can be sent to processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    SIGTERM,
    SIGKILL,
    SIGABRT,
    SIGQUIT,
    SIGINT,
    SIGSTOP,
    Other(i32),
}

impl From<i32> for SignalKind {
    fn from(value: i32) -> Self {
        match value {
            2 => SignalKind::SIGINT,
            3 => SignalKind::SIGQUIT,
            6 => SignalKind::SIGABRT,
            9 => SignalKind::SIGKILL,
            15 => SignalKind::SIGTERM,
            19 => SignalKind::SIGSTOP,
            _ => SignalKind::Other(value),
        }
    }
}

impl From<SignalKind> for i32 {
    fn from(kind: SignalKind) -> i32 {
        match kind {
            SignalKind::SIGINT => 2,
            SignalKind::SIGQUIT => 3,
            SignalKind::SIGABRT => 6,
            SignalKind::SIGKILL => 9,
            SignalKind::SIGTERM => 15,
            SignalKind::SIGSTOP => 19,
            SignalKind::Other(value) => value,
        }
    }
}

/// Send a signal to a child process.
fn kill_child(child: &mut Child, signal: SignalKind) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let sig = match signal {
                SignalKind::SIGTERM => Signal::SIGTERM,
                SignalKind::SIGKILL => Signal::SIGKILL,
                SignalKind::SIGINT => Signal::SIGINT,
                SignalKind::SIGQUIT => Signal::SIGQUIT,
                SignalKind::SIGABRT => Signal::SIGABRT,
                SignalKind::SIGSTOP => Signal::SIGSTOP,
                SignalKind::Other(n) => match Signal::try_from(n) {
                    Ok(sig) => sig,
                    Err(_) => Signal::SIGTERM,
                },
            };
            let _ = kill(Pid::from_raw(pid as i32), sig);
        }
    }

    #[cfg(windows)]
    {
        // Windows has no signals; terminate regardless of kind.
        let _ = signal;
        let _ = child.start_kill();
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (child, signal);
    }
}

// ============================================================================
// Command handle
// ============================================================================

/// Supervision state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdState {
    NotStarted,
    Running,
    Completed,
    TimedOut,
}

/// Where the child's stdin comes from.
pub(crate) enum StdinSource {
    /// A resolved handle (stream, file, or discard target).
    Handle(StdioHandle),
    /// The script body, piped in after spawn.
    Script(String),
}

impl std::fmt::Debug for StdinSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StdinSource::Handle(h) => f.debug_tuple("Handle").field(h).finish(),
            StdinSource::Script(_) => f.debug_tuple("Script").finish(),
        }
    }
}

/// A launchable process descriptor produced by the builder.
///
/// Owned exclusively by the caller that built it; `start` and `wait` take
/// `&mut self` and must not be raced from multiple tasks. Cleanup callbacks
/// run exactly once: when `wait` returns, or when the handle is dropped
/// without ever being waited on.
#[derive(Debug)]
pub struct Cmd {
    name: String,
    args: Vec<String>,
    env: Vec<String>,
    dir: Option<PathBuf>,
    stdin: Option<StdinSource>,
    stdout: Option<StdioHandle>,
    stderr: Option<StdioHandle>,
    timeout: Duration,
    effective_timeout: Option<Duration>,
    pid: Option<u32>,
    child: Option<Child>,
    state: CmdState,
    cleanups: CleanupList,
}

impl Cmd {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        args: Vec<String>,
        env: Vec<String>,
        dir: Option<PathBuf>,
        stdin: StdinSource,
        stdout: StdioHandle,
        stderr: StdioHandle,
        timeout: Duration,
        cleanups: CleanupList,
    ) -> Self {
        Self {
            name,
            args,
            env,
            dir,
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
            timeout,
            effective_timeout: None,
            pid: None,
            child: None,
            state: CmdState::NotStarted,
            cleanups,
        }
    }

    /// The final program name.
    pub fn program(&self) -> &str {
        &self.name
    }

    /// The final argument list.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The flattened, sorted `NAME=VALUE` environment snapshot.
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// The configured timeout (zero when unset).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The effective timeout computed at start.
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.effective_timeout
    }

    /// The child's process id, once started.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// The current supervision state.
    pub fn state(&self) -> CmdState {
        self.state
    }

    /// Register an additional cleanup callback.
    pub fn on_completion(&mut self, cleanup: impl FnOnce() -> anyhow::Result<()> + 'static) {
        self.cleanups.push(cleanup);
    }

    /// Spawn the process.
    ///
    /// The effective timeout is the minimum of the configured timeout (when
    /// positive) and the remaining time until `deadline` (when supplied). A
    /// deadline that is already effectively expired fails with
    /// `RunError::DeadlineExceeded` without spawning. Never blocks; must be
    /// called within a Tokio runtime.
    pub fn start(&mut self, deadline: Option<Instant>) -> Result<(), RunError> {
        if self.state != CmdState::NotStarted {
            return Err(RunError::AlreadyStarted);
        }

        let mut effective = (self.timeout > Duration::ZERO).then_some(self.timeout);
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining <= MIN_DEADLINE {
                return Err(RunError::DeadlineExceeded);
            }
            effective = Some(match effective {
                Some(timeout) => timeout.min(remaining),
                None => remaining,
            });
        }
        self.effective_timeout = effective;

        let mut command = Command::new(&self.name);
        command.args(&self.args);
        command.env_clear();
        for entry in &self.env {
            if let Some((name, value)) = entry.split_once('=') {
                command.env(name, value);
            }
        }
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let start_err = |name: &str, source: std::io::Error| RunError::Start {
            name: name.to_string(),
            source,
        };

        let piped_body = match self.stdin.take() {
            Some(StdinSource::Script(body)) => {
                command.stdin(Stdio::piped());
                Some(body)
            }
            Some(StdinSource::Handle(handle)) => {
                command.stdin(handle.into_stdio().map_err(|e| start_err(&self.name, e))?);
                None
            }
            None => None,
        };
        if let Some(handle) = self.stdout.take() {
            command.stdout(handle.into_stdio().map_err(|e| start_err(&self.name, e))?);
        }
        if let Some(handle) = self.stderr.take() {
            command.stderr(handle.into_stdio().map_err(|e| start_err(&self.name, e))?);
        }

        let mut child = command.spawn().map_err(|e| start_err(&self.name, e))?;
        self.pid = child.id();

        if let Some(body) = piped_body {
            if let Some(mut stdin) = child.stdin.take() {
                tokio::spawn(async move {
                    let _ = stdin.write_all(body.as_bytes()).await;
                    let _ = stdin.shutdown().await;
                });
            }
        }

        debug!(name = %self.name, pid = ?self.pid, timeout = ?effective, "spawned process");
        self.child = Some(child);
        self.state = CmdState::Running;
        Ok(())
    }

    /// Wait for the process to finish, racing the effective timeout.
    ///
    /// On expiry the child is sent SIGTERM and a `RunError::TimedOut`
    /// carrying the pid is reported; the exit status is still collected in
    /// the background. Cleanup callbacks run exactly once before this
    /// returns, on every path - including a `wait` that was never paired
    /// with a successful `start`.
    pub async fn wait(&mut self) -> Result<(), RunError> {
        let result = self.wait_inner().await;
        self.cleanups.run();
        result
    }

    async fn wait_inner(&mut self) -> Result<(), RunError> {
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Err(RunError::NotStarted),
        };

        let timeout = match self.effective_timeout {
            Some(timeout) => timeout,
            None => {
                let status = child.wait().await.map_err(|e| RunError::Wait {
                    name: self.name.clone(),
                    source: e,
                })?;
                self.state = CmdState::Completed;
                return self.exit_result(status);
            }
        };

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| RunError::Wait {
                    name: self.name.clone(),
                    source: e,
                })?;
                self.state = CmdState::Completed;
                self.exit_result(status)
            }
            _ = tokio::time::sleep(timeout) => {
                let pid = child.id();
                debug!(name = %self.name, pid = ?pid, ?timeout, "timeout expired, terminating");
                kill_child(&mut child, SignalKind::SIGTERM);
                // The exit status must still be collected to release the
                // process-table entry.
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
                self.state = CmdState::TimedOut;
                Err(RunError::TimedOut {
                    name: self.name.clone(),
                    timeout,
                    pid,
                    source: DeadlineExceeded,
                })
            }
        }
    }

    fn exit_result(&self, status: std::process::ExitStatus) -> Result<(), RunError> {
        if status.success() {
            Ok(())
        } else {
            Err(RunError::ExitStatus {
                name: self.name.clone(),
                status,
            })
        }
    }

    /// Forward a signal to the running process. No state transition.
    pub fn signal(&mut self, signal: SignalKind) -> Result<(), RunError> {
        match &mut self.child {
            Some(child) => {
                kill_child(child, signal);
                Ok(())
            }
            None => Err(RunError::NotStarted),
        }
    }

    /// Forward SIGKILL to the running process.
    pub fn kill(&mut self) -> Result<(), RunError> {
        self.signal(SignalKind::SIGKILL)
    }
}

// ============================================================================
// Tests
// ============================================================================
