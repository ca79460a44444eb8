//! Script materialization
//!
//! Interprets a command specification's embedded script text and decides how
//! it reaches the interpreter:
//! - a shebang whose arguments reference `${SOURCE}` gets the body written to
//!   a temp file named after the reference's suffix, with the reference
//!   replaced by the temp path;
//! - a shebang without the reference gets the body written to a default
//!   `*.sh` temp file whose path is appended to the interpreter arguments;
//! - no shebang defaults to `sh -s` with the body piped via stdin.
//!
//! Shebang script bodies are never piped: exactly one of "temp file" or
//! "stdin" carries the body per build. Every temp file registers a removal
//! callback on the cleanup list, so it is deleted exactly once even when a
//! later construction step fails.

use std::io::Write;

use tracing::debug;

use crate::fields;
use crate::spawn::env::EnvRead;
use crate::spawn::errors::BuildError;
use crate::spawn::supervisor::CleanupList;

/// Variable name scripts use to refer to their own materialized path.
pub const SOURCE_VAR: &str = "SOURCE";

/// Internal substitution marker. NUL-delimited so it cannot collide with the
/// output of ordinary variable expansion.
const SOURCE_PLACEHOLDER: &str = "\u{0}SOURCE\u{0}";

/// Outcome of materializing a script body.
#[derive(Debug)]
pub(crate) struct Materialized {
    /// Final program name.
    pub name: String,
    /// Final argument list (interpreter args, materialized path, caller args).
    pub args: Vec<String>,
    /// Script body to pipe via stdin, for the no-shebang case.
    pub piped_body: Option<String>,
}

/// Materialize `script`, combining shebang arguments with `caller_args`.
///
/// `env` resolves ordinary variable references on the shebang line; the
/// `SOURCE` token is special-cased so it survives expansion and can be
/// substituted with the temp file path afterwards.
pub(crate) fn materialize(
    script: &str,
    caller_args: &[String],
    env: &dyn EnvRead,
    cleanups: &mut CleanupList,
) -> Result<Materialized, BuildError> {
    let script = script.trim();

    let Some(rest) = script.strip_prefix("#!") else {
        // No shebang: hand the body to a POSIX shell on stdin. `-s` keeps
        // the caller arguments as positional parameters.
        let mut args = vec!["-s".to_string()];
        args.extend(caller_args.iter().cloned());
        return Ok(Materialized {
            name: "sh".to_string(),
            args,
            piped_body: Some(script.to_string()),
        });
    };

    let elpos = match rest.find('\n') {
        Some(pos) if pos > 0 => pos,
        _ => return Err(BuildError::ExpectedLineBreak),
    };
    let line = rest[..elpos].trim();
    let body = &rest[elpos + 1..];

    let lookup = |name: &str| -> Option<String> {
        if name == SOURCE_VAR {
            return Some(SOURCE_PLACEHOLDER.to_string());
        }
        let vr = env.get(name);
        vr.is_set().then(|| vr.str().to_string())
    };
    let mut args = fields::fields(line, &lookup)?;
    if args.is_empty() {
        return Err(BuildError::EmptyShebang);
    }

    let placeholder = args
        .iter()
        .position(|arg| arg.starts_with(SOURCE_PLACEHOLDER));

    match placeholder {
        Some(index) => {
            // The token's remainder names the temp file pattern, letting
            // `#!/usr/bin/env interp ${SOURCE}.ext` hand interpreters a real
            // file with the extension they require.
            let suffix = args[index][SOURCE_PLACEHOLDER.len()..].to_string();
            let path = write_temp_script(&suffix, body, cleanups)?;
            args[index] = path;
        }
        None => {
            let path = write_temp_script(".sh", body, cleanups)?;
            args.push(path);
        }
    }

    let name = args.remove(0);
    args.extend(caller_args.iter().cloned());

    Ok(Materialized {
        name,
        args,
        piped_body: None,
    })
}

/// Write `body` to a fresh uniquely-named temp file and register its removal.
fn write_temp_script(
    suffix: &str,
    body: &str,
    cleanups: &mut CleanupList,
) -> Result<String, BuildError> {
    let mut file = tempfile::Builder::new()
        .prefix("script-")
        .suffix(suffix)
        .tempfile()
        .map_err(BuildError::TempFile)?;
    file.write_all(body.as_bytes())
        .map_err(BuildError::TempFile)?;

    let (_, path) = file.keep().map_err(|e| BuildError::TempFile(e.error))?;
    debug!(path = %path.display(), "materialized script");

    let cleanup_path = path.clone();
    cleanups.push(move || {
        std::fs::remove_file(&cleanup_path)?;
        Ok(())
    });

    Ok(path.to_string_lossy().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::spawn::env::Environ;

    fn materialize_ok(script: &str, caller_args: &[&str]) -> (Materialized, CleanupList) {
        let env = Environ::new(None);
        let args: Vec<String> = caller_args.iter().map(|s| s.to_string()).collect();
        let mut cleanups = CleanupList::new();
        let m = materialize(script, &args, &env, &mut cleanups).unwrap();
        (m, cleanups)
    }

    #[test]
    fn test_placeholder_substitution() {
        let (m, mut cleanups) =
            materialize_ok("#!/usr/bin/env interpreter ${SOURCE}.txt\nBODY", &[]);

        assert_eq!(m.name, "/usr/bin/env");
        assert_eq!(m.args.len(), 2);
        assert_eq!(m.args[0], "interpreter");
        assert!(m.piped_body.is_none());

        let path = Path::new(&m.args[1]);
        assert_eq!(path.extension().unwrap(), "txt");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "BODY");

        cleanups.run();
        assert!(!path.exists(), "cleanup must remove the temp file");
    }

    #[test]
    fn test_placeholder_keeps_caller_args_last() {
        let (m, _cleanups) =
            materialize_ok("#!/usr/bin/env interp ${SOURCE}.py\nprint()", &["-x", "1"]);
        assert_eq!(m.args[0], "interp");
        assert!(m.args[1].ends_with(".py"));
        assert_eq!(&m.args[2..], ["-x", "1"]);
    }

    #[test]
    fn test_no_placeholder_uses_default_temp_file() {
        let (m, mut cleanups) = materialize_ok("#!/bin/sh -e\necho hi", &["arg"]);

        assert_eq!(m.name, "/bin/sh");
        assert_eq!(m.args[0], "-e");
        assert!(m.args[1].ends_with(".sh"));
        assert_eq!(m.args[2], "arg");
        assert!(m.piped_body.is_none());

        let path = m.args[1].clone();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "echo hi");
        cleanups.run();
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_no_shebang_pipes_via_stdin() {
        let (m, cleanups) = materialize_ok("echo hello", &["a", "b"]);

        assert_eq!(m.name, "sh");
        assert_eq!(m.args, ["-s", "a", "b"]);
        assert_eq!(m.piped_body.as_deref(), Some("echo hello"));
        assert!(cleanups.is_empty());
    }

    #[test]
    fn test_shebang_without_line_break_is_error() {
        let env = Environ::new(None);
        let mut cleanups = CleanupList::new();
        let err = materialize("#!/bin/sh", &[], &env, &mut cleanups).unwrap_err();
        assert!(matches!(err, BuildError::ExpectedLineBreak));

        let err = materialize("#!\necho hi", &[], &env, &mut cleanups).unwrap_err();
        assert!(matches!(err, BuildError::ExpectedLineBreak));
    }

    #[test]
    fn test_blank_shebang_line_is_error() {
        let env = Environ::new(None);
        let mut cleanups = CleanupList::new();
        let err = materialize("#!  \necho hi", &[], &env, &mut cleanups).unwrap_err();
        assert!(matches!(err, BuildError::EmptyShebang));
    }

    #[test]
    fn test_shebang_expands_ordinary_variables() {
        let env = Environ::new(None);
        env.set_string("INTERP", "python3").unwrap();
        let mut cleanups = CleanupList::new();
        let m = materialize(
            "#!/usr/bin/env $INTERP ${SOURCE}.py\npass",
            &[],
            &env,
            &mut cleanups,
        )
        .unwrap();

        assert_eq!(m.name, "/usr/bin/env");
        assert_eq!(m.args[0], "python3");
        assert!(m.args[1].ends_with(".py"));
    }
}
