//! Shebang word splitting
//!
//! Splits a single line of shell-like text into an ordered argument list,
//! expanding variables through a caller-supplied resolver. Supports single
//! and double quotes, backslash escapes, `$VAR`/`${VAR}` references, tilde
//! expansion and glob patterns. This is not a shell: there are no pipelines,
//! redirects or command substitution.

use monch::{ParseError, ParseErrorFailure, ParseResult};
use thiserror::Error;

/// Variable resolver used during expansion. Returning `None` expands the
/// reference to the empty string.
pub type VarLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Syntax error reported while splitting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FieldsError {
    message: String,
}

impl FieldsError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Split `input` into expanded words.
///
/// Words are separated by unquoted whitespace. Variable references are
/// resolved through `lookup`; glob patterns expand to matching paths and
/// fall back to the literal pattern when nothing matches.
pub fn fields(input: &str, lookup: VarLookup) -> Result<Vec<String>, FieldsError> {
    let mut words = Vec::new();
    let mut remaining = input.trim();

    while !remaining.is_empty() {
        match parse_word(remaining) {
            Ok((rest, word)) => {
                words.push(word);
                remaining = skip_whitespace(rest);
            }
            Err(ParseError::Backtrace) => {
                return Err(FieldsError::new(format!(
                    "expected word at: {remaining:?}"
                )));
            }
            Err(ParseError::Failure(e)) => {
                return Err(FieldsError::new(format!("{}\n  {}", e.message, e.input)));
            }
        }
    }

    let mut out = Vec::new();
    for word in &words {
        out.extend(expand_word(word, lookup));
    }
    Ok(out)
}

// ============================================================================
// Word model
// ============================================================================

/// A word composed of multiple parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

/// Parts of a word.
#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    /// Literal text
    Text(String),
    /// Single-quoted string (no expansion)
    SingleQuoted(String),
    /// Double-quoted string (allows variable expansion)
    DoubleQuoted(Vec<WordPart>),
    /// Variable reference: $VAR or ${VAR}
    Variable(String),
    /// Tilde expansion: ~, ~/path
    Tilde(Option<String>),
    /// Glob pattern part: *, ?, [...]
    Glob(GlobPart),
}

/// Glob pattern components.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobPart {
    Star,
    DoubleStar,
    Question,
    CharClass(String),
}

// ============================================================================
// Parsing
// ============================================================================

fn skip_whitespace(input: &str) -> &str {
    input.trim_start()
}

fn parse_word(input: &str) -> ParseResult<'_, Word> {
    let mut parts = Vec::new();
    let mut remaining = input;

    loop {
        if remaining.is_empty() || remaining.starts_with(char::is_whitespace) {
            break;
        }

        let first = remaining.chars().next().unwrap();

        match first {
            '\'' => {
                let (rest, text) = parse_single_quoted(remaining)?;
                parts.push(WordPart::SingleQuoted(text));
                remaining = rest;
            }
            '"' => {
                let (rest, inner_parts) = parse_double_quoted(remaining)?;
                parts.push(WordPart::DoubleQuoted(inner_parts));
                remaining = rest;
            }
            '$' => {
                let (rest, part) = parse_dollar(remaining)?;
                parts.push(part);
                remaining = rest;
            }
            '~' if parts.is_empty() => {
                let (rest, part) = parse_tilde(remaining);
                parts.push(part);
                remaining = rest;
            }
            '\\' => {
                if remaining.len() > 1 {
                    let escaped = remaining.chars().nth(1).unwrap();
                    parts.push(WordPart::Text(escaped.to_string()));
                    remaining = &remaining[1 + escaped.len_utf8()..];
                } else {
                    break;
                }
            }
            '*' => {
                if remaining.starts_with("**") {
                    parts.push(WordPart::Glob(GlobPart::DoubleStar));
                    remaining = &remaining[2..];
                } else {
                    parts.push(WordPart::Glob(GlobPart::Star));
                    remaining = &remaining[1..];
                }
            }
            '?' => {
                parts.push(WordPart::Glob(GlobPart::Question));
                remaining = &remaining[1..];
            }
            '[' => {
                let (rest, class) = parse_char_class(remaining)?;
                parts.push(WordPart::Glob(GlobPart::CharClass(class)));
                remaining = rest;
            }
            _ => {
                let (rest, text) = parse_unquoted_text(remaining);
                if !text.is_empty() {
                    parts.push(WordPart::Text(text));
                }
                remaining = rest;
            }
        }
    }

    if parts.is_empty() {
        return Err(ParseError::Backtrace);
    }

    Ok((remaining, Word { parts }))
}

fn parse_single_quoted(input: &str) -> ParseResult<'_, String> {
    if !input.starts_with('\'') {
        return Err(ParseError::Backtrace);
    }

    let content = &input[1..];
    let end = content.find('\'').ok_or_else(|| {
        ParseError::Failure(ParseErrorFailure::new(input, "Unterminated single quote"))
    })?;

    Ok((&content[end + 1..], content[..end].to_string()))
}

fn parse_double_quoted(input: &str) -> ParseResult<'_, Vec<WordPart>> {
    if !input.starts_with('"') {
        return Err(ParseError::Backtrace);
    }

    let mut parts = Vec::new();
    let mut remaining = &input[1..];
    let mut current_text = String::new();

    loop {
        let first = remaining.chars().next().ok_or_else(|| {
            ParseError::Failure(ParseErrorFailure::new(input, "Unterminated double quote"))
        })?;

        match first {
            '"' => {
                if !current_text.is_empty() {
                    parts.push(WordPart::Text(current_text));
                }
                return Ok((&remaining[1..], parts));
            }
            '$' => {
                if !current_text.is_empty() {
                    parts.push(WordPart::Text(std::mem::take(&mut current_text)));
                }
                let (rest, part) = parse_dollar(remaining)?;
                parts.push(part);
                remaining = rest;
            }
            '\\' => {
                let mut chars = remaining.chars();
                chars.next();
                match chars.next() {
                    Some(escaped) => {
                        current_text.push(escaped);
                        remaining = &remaining[1 + escaped.len_utf8()..];
                    }
                    None => {
                        return Err(ParseError::Failure(ParseErrorFailure::new(
                            input,
                            "Unterminated double quote",
                        )));
                    }
                }
            }
            c => {
                current_text.push(c);
                remaining = &remaining[c.len_utf8()..];
            }
        }
    }
}

fn parse_dollar(input: &str) -> ParseResult<'_, WordPart> {
    if !input.starts_with('$') {
        return Err(ParseError::Backtrace);
    }

    let rest = &input[1..];

    // ${NAME}
    if let Some(braced) = rest.strip_prefix('{') {
        let end = braced.find('}').ok_or_else(|| {
            ParseError::Failure(ParseErrorFailure::new(
                input,
                "Expected '}' to close variable reference",
            ))
        })?;
        let name = &braced[..end];
        if name.is_empty() || !is_var_name(name) {
            return Err(ParseError::Failure(ParseErrorFailure::new(
                input,
                format!("Invalid variable name: '{name}'"),
            )));
        }
        return Ok((&braced[end + 1..], WordPart::Variable(name.to_string())));
    }

    // $NAME
    let name_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    if name_len == 0 {
        // A lone dollar sign is literal text.
        return Ok((rest, WordPart::Text("$".to_string())));
    }

    Ok((
        &rest[name_len..],
        WordPart::Variable(rest[..name_len].to_string()),
    ))
}

fn parse_tilde(input: &str) -> (&str, WordPart) {
    let rest = &input[1..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        return (rest, WordPart::Tilde(None));
    }
    if let Some(after_slash) = rest.strip_prefix('/') {
        let end = after_slash
            .find(|c: char| c.is_whitespace() || "'\"$\\*?[".contains(c))
            .unwrap_or(after_slash.len());
        return (
            &after_slash[end..],
            WordPart::Tilde(Some(after_slash[..end].to_string())),
        );
    }
    // ~user and anything else stays literal
    (rest, WordPart::Text("~".to_string()))
}

fn parse_char_class(input: &str) -> ParseResult<'_, String> {
    if !input.starts_with('[') {
        return Err(ParseError::Backtrace);
    }

    let content = &input[1..];
    let end = content.find(']').ok_or_else(|| {
        ParseError::Failure(ParseErrorFailure::new(
            input,
            "Expected ']' to close character class",
        ))
    })?;

    Ok((&content[end + 1..], content[..end].to_string()))
}

fn parse_unquoted_text(input: &str) -> (&str, String) {
    let end = input
        .find(|c: char| c.is_whitespace() || "'\"$\\*?[".contains(c))
        .unwrap_or(input.len());
    (&input[end..], input[..end].to_string())
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Expansion
// ============================================================================

/// Expand a word to zero or more arguments (globs may match several paths).
fn expand_word(word: &Word, lookup: VarLookup) -> Vec<String> {
    let mut has_glob = false;
    let mut pattern = String::new();

    for part in &word.parts {
        if matches!(part, WordPart::Glob(_)) {
            has_glob = true;
        }
        pattern.push_str(&expand_word_part(part, lookup));
    }

    if has_glob {
        match glob::glob(&pattern) {
            Ok(paths) => {
                let matches: Vec<String> = paths
                    .filter_map(|p| p.ok())
                    .map(|p| p.to_string_lossy().to_string())
                    .collect();

                if matches.is_empty() {
                    // No matches, keep the pattern as-is
                    vec![pattern]
                } else {
                    matches
                }
            }
            Err(_) => vec![pattern],
        }
    } else {
        vec![pattern]
    }
}

fn expand_word_part(part: &WordPart, lookup: VarLookup) -> String {
    match part {
        WordPart::Text(s) => s.clone(),
        WordPart::SingleQuoted(s) => s.clone(),
        WordPart::DoubleQuoted(parts) => parts
            .iter()
            .map(|p| expand_word_part(p, lookup))
            .collect(),
        WordPart::Variable(name) => lookup(name).unwrap_or_default(),
        WordPart::Tilde(suffix) => {
            let home = lookup("HOME").unwrap_or_else(|| "~".to_string());
            match suffix {
                None => home,
                Some(s) => format!("{home}/{s}"),
            }
        }
        WordPart::Glob(glob) => match glob {
            GlobPart::Star => "*".to_string(),
            GlobPart::DoubleStar => "**".to_string(),
            GlobPart::Question => "?".to_string(),
            GlobPart::CharClass(class) => format!("[{class}]"),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_plain_words() {
        let args = fields("/usr/bin/env python3 -u", &no_vars).unwrap();
        assert_eq!(args, vec!["/usr/bin/env", "python3", "-u"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(fields("", &no_vars).unwrap().is_empty());
        assert!(fields("   ", &no_vars).unwrap().is_empty());
    }

    #[test]
    fn test_quoting() {
        let args = fields(r#"'a b' "c d" e\ f"#, &no_vars).unwrap();
        assert_eq!(args, vec!["a b", "c d", "e f"]);
    }

    #[test]
    fn test_variable_expansion() {
        let lookup = |name: &str| match name {
            "INTERP" => Some("python3".to_string()),
            "FLAGS" => Some("-u".to_string()),
            _ => None,
        };
        let args = fields("$INTERP ${FLAGS} \"$INTERP.exe\" $MISSING-x", &lookup).unwrap();
        assert_eq!(args, vec!["python3", "-u", "python3.exe", "-x"]);
    }

    #[test]
    fn test_single_quotes_suppress_expansion() {
        let lookup = |name: &str| (name == "X").then(|| "v".to_string());
        let args = fields("'$X' \"$X\"", &lookup).unwrap();
        assert_eq!(args, vec!["$X", "v"]);
    }

    #[test]
    fn test_braced_reference_keeps_suffix() {
        let lookup = |name: &str| (name == "SOURCE").then(|| "/tmp/s".to_string());
        let args = fields("interp ${SOURCE}.txt", &lookup).unwrap();
        assert_eq!(args, vec!["interp", "/tmp/s.txt"]);
    }

    #[test]
    fn test_tilde_expansion() {
        let lookup = |name: &str| (name == "HOME").then(|| "/home/me".to_string());
        let args = fields("~ ~/bin/x", &lookup).unwrap();
        assert_eq!(args, vec!["/home/me", "/home/me/bin/x"]);
    }

    #[test]
    fn test_glob_falls_back_to_literal() {
        let args = fields("*.does-not-exist-anywhere-xyz", &no_vars).unwrap();
        assert_eq!(args, vec!["*.does-not-exist-anywhere-xyz"]);
    }

    #[test]
    fn test_unterminated_quote_is_error() {
        let err = fields("'abc", &no_vars).unwrap_err();
        assert!(err.to_string().contains("Unterminated single quote"));

        let err = fields("\"abc", &no_vars).unwrap_err();
        assert!(err.to_string().contains("Unterminated double quote"));
    }

    #[test]
    fn test_unterminated_brace_is_error() {
        let err = fields("${NAME", &no_vars).unwrap_err();
        assert!(err.to_string().contains("close variable reference"));
    }
}
