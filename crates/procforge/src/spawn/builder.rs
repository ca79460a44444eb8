//! Command construction
//!
//! `CmdSpec` is the public input contract: a declarative description of a
//! process to build. `build` assembles it into a launchable `Cmd`:
//! 1. layer the per-command environment overrides over the caller-supplied
//!    (or process) environment;
//! 2. materialize the script body, which may rewrite the program name and
//!    arguments and register temp-file cleanups;
//! 3. resolve the stdio targets;
//! 4. parse the timeout string;
//! 5. take the flattened, sorted environment snapshot.
//!
//! The first error wins; cleanups registered before the failure still run
//! before it surfaces, so a mid-construction failure never leaks a temp
//! file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::spawn::duration::parse_duration;
use crate::spawn::env::{env_strings, EnvRead, Environ, ListEnviron};
use crate::spawn::errors::BuildError;
use crate::spawn::script;
use crate::spawn::stdio::{StdioDefault, StdioKind};
use crate::spawn::supervisor::{CleanupList, Cmd, StdinSource};

/// Declarative description of a process to build.
///
/// Created once by the caller and never mutated by the builder. All fields
/// default to empty; `timeout` uses the duration string syntax (`"30s"`,
/// `"1.5h"`), with the empty string or zero meaning "no timeout".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmdSpec {
    /// Script body, optionally starting with a shebang line.
    pub script: String,
    /// Program name; overridden when a script is present.
    pub name: String,
    /// Per-command environment overrides (key unique, last write wins).
    pub env: HashMap<String, String>,
    /// Arguments appended after any script-derived arguments.
    pub args: Vec<String>,
    /// Working directory; empty inherits the builder's.
    pub dir: String,
    /// Stdout target string.
    pub stdout: String,
    /// Stderr target string.
    pub stderr: String,
    /// Stdin target string.
    pub stdin: String,
    /// Timeout duration string.
    pub timeout: String,
}

impl CmdSpec {
    /// Assemble a launchable command.
    ///
    /// `parent` is the environment the per-command overrides layer over;
    /// `None` uses the current process environment. The returned handle is
    /// in the not-started state.
    pub fn build(&self, parent: Option<Rc<dyn EnvRead>>) -> Result<Cmd, BuildError> {
        let parent: Rc<dyn EnvRead> = match parent {
            Some(parent) => parent,
            None => Rc::new(ListEnviron::from_os()),
        };
        let env = Environ::new(Some(parent));
        for (name, value) in &self.env {
            env.set_string(name.as_str(), value.as_str())?;
        }

        // Dropped on the error path, which runs anything already registered.
        let mut cleanups = CleanupList::new();

        let mut name = self.name.clone();
        let mut args = self.args.clone();
        let mut piped_body = None;
        if !self.script.is_empty() {
            let materialized = script::materialize(&self.script, &args, &env, &mut cleanups)?;
            name = materialized.name;
            args = materialized.args;
            piped_body = materialized.piped_body;
        }

        if let Some(body) = piped_body.as_mut() {
            if !self.stdin.is_empty() {
                // The body owns stdin, so a stdin target is honored by
                // wrapping the body in a subshell reading from it. The piped
                // body always runs under `sh` (no-shebang default).
                *body = format!("(\n{body}\n) < {}\n", stdin_redirect_path(&self.stdin));
            }
        }

        let stdin = match piped_body {
            Some(body) => StdinSource::Script(body),
            None => StdinSource::Handle(
                StdioKind::Stdin
                    .resolve(&self.stdin, StdioDefault::Inherit)
                    .map_err(|e| stdio_error(StdioKind::Stdin, &self.stdin, e))?,
            ),
        };
        let stdout = StdioKind::Stdout
            .resolve(&self.stdout, StdioDefault::Inherit)
            .map_err(|e| stdio_error(StdioKind::Stdout, &self.stdout, e))?;
        let stderr = StdioKind::Stderr
            .resolve(&self.stderr, StdioDefault::Inherit)
            .map_err(|e| stdio_error(StdioKind::Stderr, &self.stderr, e))?;

        let timeout = if self.timeout.is_empty() {
            Duration::ZERO
        } else {
            parse_duration(&self.timeout).map_err(|e| BuildError::InvalidTimeout {
                input: self.timeout.clone(),
                source: e,
            })?
        };

        let env_snapshot = env_strings(&env, None);
        let dir = (!self.dir.is_empty()).then(|| PathBuf::from(&self.dir));

        Ok(Cmd::new(
            name,
            args,
            env_snapshot,
            dir,
            stdin,
            stdout,
            stderr,
            timeout,
            cleanups,
        ))
    }
}

fn stdio_error(kind: StdioKind, target: &str, source: std::io::Error) -> BuildError {
    BuildError::Stdio {
        kind,
        target: target.to_string(),
        source,
    }
}

/// Path a piped script body reads its stdin target from. `-` names the
/// process's own standard input.
fn stdin_redirect_path(target: &str) -> String {
    if target == "-" {
        #[cfg(unix)]
        return format!("/proc/{}/fd/0", std::process::id());
    }
    target.to_string()
}

// ============================================================================
// Tests
// ============================================================================
