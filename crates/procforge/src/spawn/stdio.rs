//! Stdio target resolution
//!
//! Maps the symbolic or path-valued stdin/stdout/stderr target strings of a
//! command specification to open handles:
//! - `STD`/`STDIN`/`STDOUT`/`STDERR` (case-insensitive) - the process's own
//!   standard streams; `STDOUT` as a stderr target redirects stderr into
//!   stdout
//! - `_` - a discard target (the platform null device)
//! - `DEV_NULL` - explicit null-device alias
//! - `""`/`"-"` - the caller-supplied default, falling back to the process's
//!   own stream
//! - anything else - a filesystem path, created (parents included) on demand

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::process::Stdio;

// ============================================================================
// Kinds and handles
// ============================================================================

/// Which standard stream a target string describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioKind {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for StdioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StdioKind::Stdin => "stdin",
            StdioKind::Stdout => "stdout",
            StdioKind::Stderr => "stderr",
        };
        f.write_str(name)
    }
}

/// Fallback used when the target is empty or `-`.
#[derive(Debug, Default)]
pub enum StdioDefault {
    /// Use the process's own corresponding stream.
    #[default]
    Inherit,
    /// Use the discard target.
    Discard,
    /// Use an already-resolved handle.
    Handle(StdioHandle),
}

/// A resolved stdio endpoint, convertible into `std::process::Stdio`.
#[derive(Debug)]
pub enum StdioHandle {
    /// The process's own stream of the given kind. Converted by duplicating
    /// the stream's descriptor, so `Inherit(Stdout)` used as a stderr handle
    /// really shares the stdout descriptor.
    Inherit(StdioKind),
    /// Discard target (null device).
    Null,
    /// An open file.
    File(std::fs::File),
}

impl StdioHandle {
    /// Convert into a spawnable `Stdio`.
    pub fn into_stdio(self) -> io::Result<Stdio> {
        match self {
            StdioHandle::Inherit(kind) => Ok(dup_stream(kind)?.into()),
            StdioHandle::Null => Ok(Stdio::null()),
            StdioHandle::File(file) => Ok(file.into()),
        }
    }
}

/// Duplicate one of the process's own standard stream descriptors.
#[cfg(unix)]
fn dup_stream(kind: StdioKind) -> io::Result<std::fs::File> {
    use std::os::fd::AsFd;

    let fd = match kind {
        StdioKind::Stdin => io::stdin().as_fd().try_clone_to_owned()?,
        StdioKind::Stdout => io::stdout().as_fd().try_clone_to_owned()?,
        StdioKind::Stderr => io::stderr().as_fd().try_clone_to_owned()?,
    };
    Ok(std::fs::File::from(fd))
}

#[cfg(windows)]
fn dup_stream(kind: StdioKind) -> io::Result<std::fs::File> {
    use std::os::windows::io::AsHandle;

    let handle = match kind {
        StdioKind::Stdin => io::stdin().as_handle().try_clone_to_owned()?,
        StdioKind::Stdout => io::stdout().as_handle().try_clone_to_owned()?,
        StdioKind::Stderr => io::stderr().as_handle().try_clone_to_owned()?,
    };
    Ok(std::fs::File::from(handle))
}

// ============================================================================
// Resolution
// ============================================================================

impl StdioKind {
    fn is_read(self) -> bool {
        matches!(self, StdioKind::Stdin)
    }

    /// Resolve a symbolic name for this kind, if the target is one.
    fn resolve_symbolic(self, target: &str) -> Option<StdioHandle> {
        let upper = target.to_ascii_uppercase();
        match self {
            StdioKind::Stdin => match upper.as_str() {
                "STD" | "STDIN" => Some(StdioHandle::Inherit(StdioKind::Stdin)),
                "_" => Some(StdioHandle::Null),
                _ => None,
            },
            StdioKind::Stdout => match upper.as_str() {
                "STD" | "STDOUT" => Some(StdioHandle::Inherit(StdioKind::Stdout)),
                "STDERR" => Some(StdioHandle::Inherit(StdioKind::Stderr)),
                "_" => Some(StdioHandle::Null),
                _ => None,
            },
            StdioKind::Stderr => match upper.as_str() {
                "STDOUT" => Some(StdioHandle::Inherit(StdioKind::Stdout)),
                "STD" | "STDERR" => Some(StdioHandle::Inherit(StdioKind::Stderr)),
                "_" => Some(StdioHandle::Null),
                _ => None,
            },
        }
    }

    /// Resolve a target string into a handle.
    ///
    /// Filesystem errors (directory creation, open) propagate to the caller;
    /// no handle is opened when an error is returned.
    pub fn resolve(self, target: &str, default: StdioDefault) -> io::Result<StdioHandle> {
        if let Some(handle) = self.resolve_symbolic(target) {
            return Ok(handle);
        }

        match target {
            "" | "-" => {
                return Ok(match default {
                    StdioDefault::Inherit => StdioHandle::Inherit(self),
                    StdioDefault::Discard => StdioHandle::Null,
                    StdioDefault::Handle(handle) => handle,
                });
            }
            "DEV_NULL" => return Ok(StdioHandle::Null),
            _ => {}
        }

        let path = Path::new(target);
        if !path.exists() {
            if let Some(dir) = path.parent() {
                if dir != Path::new("") && dir != Path::new(".") {
                    std::fs::create_dir_all(dir)?;
                }
            }
        }

        let mut options = OpenOptions::new();
        if self.is_read() {
            options.read(true);
        } else {
            options.append(true).create(true);
        }
        Ok(StdioHandle::File(options.open(path)?))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_symbolic_names_case_insensitive() {
        for target in ["STD", "std", "Stdin", "STDIN"] {
            let handle = StdioKind::Stdin
                .resolve(target, StdioDefault::Inherit)
                .unwrap();
            assert!(matches!(handle, StdioHandle::Inherit(StdioKind::Stdin)));
        }
    }

    #[test]
    fn test_stderr_to_stdout() {
        let handle = StdioKind::Stderr
            .resolve("STDOUT", StdioDefault::Inherit)
            .unwrap();
        assert!(matches!(handle, StdioHandle::Inherit(StdioKind::Stdout)));

        let handle = StdioKind::Stdout
            .resolve("STDERR", StdioDefault::Inherit)
            .unwrap();
        assert!(matches!(handle, StdioHandle::Inherit(StdioKind::Stderr)));
    }

    #[test]
    fn test_discard_targets() {
        for (kind, target) in [
            (StdioKind::Stdin, "_"),
            (StdioKind::Stdout, "_"),
            (StdioKind::Stderr, "DEV_NULL"),
        ] {
            let handle = kind.resolve(target, StdioDefault::Inherit).unwrap();
            assert!(matches!(handle, StdioHandle::Null));
            // Must convert to a spawnable endpoint.
            handle_into_stdio_ok(kind, target);
        }
    }

    fn handle_into_stdio_ok(kind: StdioKind, target: &str) {
        let handle = kind.resolve(target, StdioDefault::Inherit).unwrap();
        handle.into_stdio().unwrap();
    }

    #[test]
    fn test_empty_uses_default() {
        let handle = StdioKind::Stdout.resolve("", StdioDefault::Inherit).unwrap();
        assert!(matches!(handle, StdioHandle::Inherit(StdioKind::Stdout)));

        let handle = StdioKind::Stdout
            .resolve("-", StdioDefault::Discard)
            .unwrap();
        assert!(matches!(handle, StdioHandle::Null));

        let handle = StdioKind::Stdout
            .resolve("", StdioDefault::Handle(StdioHandle::Null))
            .unwrap();
        assert!(matches!(handle, StdioHandle::Null));
    }

    #[test]
    fn test_path_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/nested/out.log");
        let target = path.to_string_lossy().to_string();

        let handle = StdioKind::Stdout
            .resolve(&target, StdioDefault::Inherit)
            .unwrap();
        assert!(path.exists());

        match handle {
            StdioHandle::File(mut file) => file.write_all(b"x").unwrap(),
            other => panic!("expected file handle, got {other:?}"),
        }
    }

    #[test]
    fn test_path_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, "first\n").unwrap();
        let target = path.to_string_lossy().to_string();

        let handle = StdioKind::Stdout
            .resolve(&target, StdioDefault::Inherit)
            .unwrap();
        match handle {
            StdioHandle::File(mut file) => file.write_all(b"second\n").unwrap(),
            other => panic!("expected file handle, got {other:?}"),
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_missing_stdin_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing.txt").to_string_lossy().to_string();

        let err = StdioKind::Stdin
            .resolve(&target, StdioDefault::Inherit)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
