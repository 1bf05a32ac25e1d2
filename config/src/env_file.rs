//! `.env` parsing: key-value pairs only, applied later in `lib.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn env_file_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    (path.is_file()).then_some(path)
}

/// Line-oriented parser for `KEY=VALUE` pairs.
///
/// * `export KEY=VALUE` is accepted, shell style.
/// * Lines that are empty or start with `#` are skipped; a `#` inside a
///   value is kept.
/// * Double-quoted values honor `\"`; single-quoted values are taken
///   verbatim between the quotes.
/// * `KEY=` and `KEY=""` both yield the empty string.
fn parse_env_file(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        let raw = v.trim();
        let value = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            raw[1..raw.len() - 1].replace("\\\"", "\"")
        } else if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            raw[1..raw.len() - 1].to_string()
        } else {
            raw.to_string()
        };
        out.insert(key.to_string(), value);
    }
    out
}

/// Reads `.env` from `override_dir` or the current directory. A missing
/// file is an empty map, not an error.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let Some(path) = env_file_path(override_dir) else {
        return Ok(HashMap::new());
    };
    let content = std::fs::read_to_string(&path)?;
    Ok(parse_env_file(&content))
}
