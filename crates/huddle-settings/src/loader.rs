//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::HuddleSettings;

/// Resolve the path to the settings file (`~/.huddle/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".huddle").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HuddleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a failed validation is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<HuddleSettings> {
    let mut settings = load_file(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
fn load_file(path: &Path) -> Result<HuddleSettings> {
    let defaults = serde_json::to_value(HuddleSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `lookup`.
///
/// Empty values are treated as unset. Values that fail to parse or fall
/// outside their range are ignored with a warning.
pub fn apply_overrides(settings: &mut HuddleSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env("HUDDLE_HOST") {
        settings.server.host = v;
    }
    if let Some(raw) = env("HUDDLE_PORT") {
        match parse_u16_range(&raw, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "HUDDLE_PORT", value = %raw, "invalid port env var, ignoring"),
        }
    }
    if let Some(raw) = env("HUDDLE_OUTBOUND_QUEUE") {
        match parse_usize_range(&raw, 1, 1_000_000) {
            Some(n) => settings.server.outbound_queue = n,
            None => warn!(key = "HUDDLE_OUTBOUND_QUEUE", value = %raw, "invalid usize env var, ignoring"),
        }
    }
    if let Some(raw) = env("HUDDLE_SEND_TIMEOUT_MS") {
        match parse_u64_range(&raw, 1, 600_000) {
            Some(ms) => settings.server.send_timeout_ms = ms,
            None => warn!(key = "HUDDLE_SEND_TIMEOUT_MS", value = %raw, "invalid u64 env var, ignoring"),
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env("HUDDLE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env("HUDDLE_LOG_FORMAT") {
        settings.logging.format = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env("GOOGLE_CLIENT_ID") {
        settings.auth.client_id = v;
    }
    if let Some(v) = env("GOOGLE_CLIENT_SECRET") {
        settings.auth.client_secret = v;
    }
    if let Some(v) = env("GOOGLE_REDIRECT_URL") {
        settings.auth.redirect_url = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let merged = deep_merge(
            json!({"server": {"port": 4000, "host": "0.0.0.0"}}),
            json!({"server": {"port": 9090}}),
        );
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"scopes": ["a", "b"]}), json!({"scopes": ["c"]}));
        assert_eq!(merged["scopes"], json!(["c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(json!({"a": {"nested": true}}), json!({"a": 42}));
        assert_eq!(merged["a"], 42);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, HuddleSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090, "wsPath": "/ws"}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.server.outbound_queue, 256);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert_matches!(load_file(&path), Err(SettingsError::Parse { .. }));
    }

    #[test]
    fn mistyped_value_is_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "four thousand"}}"#).unwrap();
        assert_matches!(load_file(&path), Err(SettingsError::Shape(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"wsPath": "chat"}}"#).unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut s = HuddleSettings::default();
        apply_overrides(
            &mut s,
            env_of(&[
                ("HUDDLE_HOST", "127.0.0.1"),
                ("HUDDLE_PORT", "4100"),
                ("HUDDLE_LOG_LEVEL", "debug"),
                ("GOOGLE_CLIENT_ID", "cid"),
                ("GOOGLE_CLIENT_SECRET", "csec"),
                ("GOOGLE_REDIRECT_URL", "https://chat.example.com/callback"),
            ]),
        );
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 4100);
        assert_eq!(s.logging.level, "debug");
        assert_eq!(s.auth.client_id, "cid");
        assert_eq!(s.auth.client_secret, "csec");
        assert_eq!(s.auth.redirect_url, "https://chat.example.com/callback");
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut s = HuddleSettings::default();
        apply_overrides(
            &mut s,
            env_of(&[
                ("HUDDLE_PORT", "99999"),
                ("HUDDLE_OUTBOUND_QUEUE", "0"),
                ("HUDDLE_SEND_TIMEOUT_MS", "soon"),
            ]),
        );
        assert_eq!(s.server.port, 4000);
        assert_eq!(s.server.outbound_queue, 256);
        assert_eq!(s.server.send_timeout_ms, 5000);
    }

    #[test]
    fn empty_env_values_ignored() {
        let mut s = HuddleSettings::default();
        apply_overrides(&mut s, env_of(&[("HUDDLE_HOST", "")]));
        assert_eq!(s.server.host, "0.0.0.0");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range(" 80 ", 1, 65535), Some(80));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("abc", 0, 10), None);
        assert_eq!(parse_usize_range("11", 0, 10), None);
    }
}
