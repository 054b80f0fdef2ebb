//! litehub: paginated git and GitHub operations for context-constrained tool callers.
//!
//! This crate wires the `litehub-core` services into an MCP server.
//!
//! # Modules
//!
//! - [`ops`]: Operation layer; validates input, fetches full collections, paginates
//! - [`tools`]: Tool registry (names, descriptions, schemas) and dispatch
//! - [`mcp`]: MCP JSON-RPC server (stdio transport)
//! - [`tokenizer`]: Pluggable token counting for the registry budget

pub mod mcp;
pub mod ops;
pub mod tokenizer;
pub mod tools;

use std::path::{Path, PathBuf};
use std::time::Duration;

use litehub_core::backoff::BackoffPolicy;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Cross-platform path helpers
// ---------------------------------------------------------------------------

/// Platform-aware home directory: `HOME` on Unix, `USERPROFILE` on Windows.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok().map(PathBuf::from)
}

/// Platform-aware config directory: `~/.litehub` on Unix, `%APPDATA%/litehub` on Windows.
pub fn config_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        std::env::var("APPDATA").ok().map(|a| PathBuf::from(a).join("litehub"))
    } else {
        home_dir().map(|h| h.join(".litehub"))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime settings. Every field has a default; a config file only overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub git_bin: String,
    pub gh_bin: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Default `max_bytes` for `file.blob`.
    pub blob_max_bytes: u64,
    /// `per_page` for remote collection fetches (1..=100).
    pub remote_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            git_bin: "git".to_string(),
            gh_bin: "gh".to_string(),
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            blob_max_bytes: 32_768,
            remote_page_size: 100,
        }
    }
}

impl Config {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Known keys in `.litehub.toml` for config validation.
const KNOWN_CONFIG_KEYS: &[&str] = &[
    "git_bin",
    "gh_bin",
    "max_attempts",
    "base_delay_ms",
    "max_delay_ms",
    "blob_max_bytes",
    "remote_page_size",
];

/// Simple Levenshtein edit distance for typo suggestions.
fn edit_distance(a: &str, b: &str) -> usize {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn warn_unknown_key(key: &str) {
    let suggestion = KNOWN_CONFIG_KEYS.iter().min_by_key(|k| edit_distance(key, k));
    match suggestion {
        Some(suggestion) if edit_distance(key, suggestion) <= 3 => warn!(
            key,
            suggestion = *suggestion,
            "Unknown config key, did you mean '{suggestion}'?"
        ),
        _ => warn!(key, "Unknown config key (known keys: {})", KNOWN_CONFIG_KEYS.join(", ")),
    }
}

fn string_value(table: &toml::Table, key: &str, slot: &mut String) {
    match table.get(key) {
        None => {}
        Some(toml::Value::String(s)) if !s.trim().is_empty() => *slot = s.trim().to_string(),
        Some(other) => warn!(key, value = %other, "Expected a non-empty string, keeping default"),
    }
}

fn integer_value<T: TryFrom<i64>>(table: &toml::Table, key: &str, min: i64, max: i64, slot: &mut T) {
    match table.get(key) {
        None => {}
        Some(toml::Value::Integer(n)) if (min..=max).contains(n) => {
            if let Ok(v) = T::try_from(*n) {
                *slot = v;
            }
        }
        Some(other) => {
            warn!(key, value = %other, min, max, "Expected an integer in range, keeping default")
        }
    }
}

/// Parse config file contents, merging overrides onto defaults.
///
/// A file that fails to parse yields defaults with a warning. Unknown keys and
/// out-of-range values are warned about and ignored.
pub fn parse_config(content: &str) -> Config {
    let mut config = Config::default();
    let table = match content.parse::<toml::Table>() {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "Failed to parse config, using defaults");
            return config;
        }
    };

    for key in table.keys() {
        if !KNOWN_CONFIG_KEYS.contains(&key.as_str()) {
            warn_unknown_key(key);
        }
    }

    string_value(&table, "git_bin", &mut config.git_bin);
    string_value(&table, "gh_bin", &mut config.gh_bin);
    integer_value(&table, "max_attempts", 1, 20, &mut config.max_attempts);
    integer_value(&table, "base_delay_ms", 0, 600_000, &mut config.base_delay_ms);
    integer_value(&table, "max_delay_ms", 0, 3_600_000, &mut config.max_delay_ms);
    integer_value(&table, "blob_max_bytes", 1, i64::from(u32::MAX), &mut config.blob_max_bytes);
    integer_value(&table, "remote_page_size", 1, 100, &mut config.remote_page_size);
    config
}

/// Candidate config files in precedence order.
pub fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut candidates = vec![PathBuf::from(".litehub.toml")];
    if let Some(dir) = config_dir() {
        candidates.push(dir.join("config.toml"));
    }
    candidates
}

/// Load configuration from the first existing candidate file, or defaults.
pub fn load_config(explicit: Option<&Path>) -> Config {
    for path in config_candidates(explicit) {
        if !path.exists() {
            if explicit.is_some() {
                warn!(path = %path.display(), "Config file not found, using defaults");
            }
            continue;
        }
        debug!(path = %path.display(), "Loading config");
        return match std::fs::read_to_string(&path) {
            Ok(content) => parse_config(&content),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read config, using defaults");
                Config::default()
            }
        };
    }
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_defaults() {
        assert_eq!(parse_config(""), Config::default());
    }

    #[test]
    fn overrides_merge_onto_defaults() {
        let config = parse_config(
            r#"
            gh_bin = "/opt/gh/bin/gh"
            max_attempts = 5
            remote_page_size = 50
            "#,
        );
        assert_eq!(config.gh_bin, "/opt/gh/bin/gh");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.remote_page_size, 50);
        assert_eq!(config.git_bin, "git");
        assert_eq!(config.backoff_policy().max_attempts, 5);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = parse_config(
            r#"
            max_attempts = 0
            remote_page_size = 500
            git_bin = 7
            blob_max_bytes = "big"
            "#,
        );
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unparseable_file_is_defaults() {
        assert_eq!(parse_config("max_attempts = = 3"), Config::default());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = parse_config("max_atempts = 9\n");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(edit_distance("max_atempts", "max_attempts"), 1);
    }

    #[test]
    fn explicit_missing_path_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("nope.toml")));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("litehub.toml");
        std::fs::write(&path, "blob_max_bytes = 16\n").unwrap();
        assert_eq!(load_config(Some(&path)).blob_max_bytes, 16);
    }
}
