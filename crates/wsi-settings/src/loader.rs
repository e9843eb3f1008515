//! Layered settings: compiled defaults, then `settings.json`, then `WSI_*`
//! environment variables.
//!
//! The file layer is overlaid on the defaults key by key. Nested objects are
//! overlaid recursively, anything else (arrays included) is taken whole from
//! the file, and an explicit `null` leaves the default in place.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::WsiSettings;

/// `~/.wsi/settings.json`, falling back to `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wsi").join("settings.json")
}

/// [`load_settings_from_path`] on [`settings_path`].
pub fn load_settings() -> Result<WsiSettings> {
    load_settings_from_path(&settings_path())
}

/// Build validated settings from `path` plus the process environment.
///
/// A missing file is not an error; an unreadable or malformed one is.
pub fn load_settings_from_path(path: &Path) -> Result<WsiSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<WsiSettings> {
    let defaults = serde_json::to_value(WsiSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Overlay `layer` onto `base` using the rules in the module docs.
pub fn deep_merge(base: Value, layer: Value) -> Value {
    match (base, layer) {
        (Value::Object(mut out), Value::Object(layer)) => {
            for (key, value) in layer.into_iter().filter(|(_, v)| !v.is_null()) {
                let value = match out.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = out.insert(key, value);
            }
            Value::Object(out)
        }
        (_, layer) => layer,
    }
}

/// [`apply_overrides`] against the real process environment.
pub fn apply_env_overrides(settings: &mut WsiSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Overwrite settings from `WSI_*` variables resolved through `lookup`.
///
/// Empty variables count as unset. A value that does not parse is logged and
/// skipped.
pub fn apply_overrides(settings: &mut WsiSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("WSI_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("WSI_PORT") {
        match parse_in_range(&v, 0..=u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "WSI_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("WSI_MAX_CONNECTIONS") {
        match parse_in_range(&v, 1..=1_000_000) {
            Some(n) => settings.server.max_connections = n,
            None => warn!(key = "WSI_MAX_CONNECTIONS", value = %v, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = read("WSI_JWT_SECRET") {
        settings.auth.secret = Some(v);
    }
    if let Some(v) = read("WSI_JWT_PUBLIC_KEY") {
        settings.auth.public_key_path = Some(v);
    }
    if let Some(v) = read("WSI_JWT_ALGORITHMS") {
        let algorithms = parse_list(&v);
        if algorithms.is_empty() {
            warn!(key = "WSI_JWT_ALGORITHMS", value = %v, "empty algorithm list, ignoring");
        } else {
            settings.auth.algorithms = algorithms;
        }
    }
    if let Some(v) = read("WSI_ORDERED_DISPATCH") {
        match parse_bool(&v) {
            Some(b) => settings.dispatch.ordered = b,
            None => warn!(key = "WSI_ORDERED_DISPATCH", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("WSI_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Case-insensitive `true`/`yes`/`on`/`1` and their negatives.
fn parse_bool(val: &str) -> Option<bool> {
    const YES: [&str; 4] = ["true", "yes", "on", "1"];
    const NO: [&str; 4] = ["false", "no", "off", "0"];
    let val = val.trim();
    if YES.iter().any(|y| val.eq_ignore_ascii_case(y)) {
        Some(true)
    } else if NO.iter().any(|n| val.eq_ignore_ascii_case(n)) {
        Some(false)
    } else {
        None
    }
}

fn parse_in_range<T: FromStr + PartialOrd>(val: &str, range: RangeInclusive<T>) -> Option<T> {
    val.trim().parse().ok().filter(|n| range.contains(n))
}

/// Comma-separated, trimmed, blanks dropped.
fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
