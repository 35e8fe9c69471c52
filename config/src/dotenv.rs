//! `.env` reader: returns the file's key/value pairs as a plain table.
//! Precedence against the real environment is applied by the caller.

use std::collections::HashMap;
use std::path::Path;

use crate::LoadError;

/// Reads `.env` from `override_dir` (or the current directory) into a table.
/// No file, or no resolvable directory, yields an empty table.
pub(crate) fn env_table(override_dir: Option<&Path>) -> Result<HashMap<String, String>, LoadError> {
    let dir = match override_dir {
        Some(d) => d.to_path_buf(),
        None => match std::env::current_dir() {
            Ok(d) => d,
            Err(_) => return Ok(HashMap::new()),
        },
    };
    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(content.lines().filter_map(parse_line).collect())
}

/// One `KEY=VALUE` line. Blank lines and `#` comments yield nothing, as do
/// lines without `=` or with an empty key. A `#` inside a value is kept;
/// there is no multiline or continuation syntax.
fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim())))
}

/// Strips one level of surrounding quotes. Double-quoted values support `\"`
/// escapes; single-quoted values are taken literally; anything else is
/// returned as-is (empty values included).
fn unquote(raw: &str) -> String {
    if raw.len() >= 2 {
        if raw.starts_with('"') && raw.ends_with('"') {
            return raw[1..raw.len() - 1].replace("\\\"", "\"");
        }
        if raw.starts_with('\'') && raw.ends_with('\'') {
            return raw[1..raw.len() - 1].to_string();
        }
    }
    raw.to_string()
}
