//! TOML configuration loading with `SHANNON_`-prefixed environment overrides.
//!
//! # Loading order
//! 1. Parse the file at `path` (or fall back to [`AppConfig::default()`] if
//!    it does not exist).
//! 2. Apply `SHANNON_*` environment variable overrides, `__`-nested (e.g.
//!    `SHANNON_LLM__MODEL` overrides `llm.model`).
//!
//! Grounded on the teacher's `config/loader.rs` load order, generalized from
//! its fixed per-field env list to a generic nested-key walk so every
//! section gains override support without a matching `if let Ok(v) = ...`
//! arm per field.

use std::{env, fs, path::Path};

use super::schema::AppConfig;

const ENV_PREFIX: &str = "SHANNON_";

/// Load [`AppConfig`] from `path`, falling back to defaults if the file does
/// not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, String> {
    let mut value = match fs::read_to_string(path) {
        Ok(content) => content
            .parse::<toml::Value>()
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            toml::Value::try_from(AppConfig::default())
                .expect("AppConfig::default() always serializes")
        }
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut value);

    value
        .try_into()
        .map_err(|e| format!("failed to apply config overrides: {e}"))
}

/// Resolve the default config path, honoring `SHANNON_CONFIG` the way the
/// teacher's `MESOCLAW_CONFIG` does.
pub fn default_config_path() -> std::path::PathBuf {
    if let Ok(v) = env::var("SHANNON_CONFIG") {
        return std::path::PathBuf::from(v);
    }
    directories::ProjectDirs::from("dev", "shannon-agent", "shannon")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| std::path::PathBuf::from("config.toml"))
}

/// Load config from the default path (honoring `SHANNON_CONFIG`), falling
/// back to defaults on any error.
pub fn load_default_config() -> AppConfig {
    load_config(&default_config_path()).unwrap_or_default()
}

/// Walk every `SHANNON_*` environment variable and apply it onto `value` as
/// a `__`-nested path, e.g. `SHANNON_AUTH__RATE_LIMIT_PER_MINUTE=5` sets
/// `value["auth"]["rate_limit_per_minute"] = 5`. Leaf values are parsed as
/// TOML scalars (bool/int/float) with a string fallback.
fn apply_env_overrides(value: &mut toml::Value) {
    for (key, raw) in env::vars() {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let path: Vec<String> = rest.split("__").map(|p| p.to_ascii_lowercase()).collect();
        set_nested(value, &path, parse_scalar(&raw));
    }
}

fn parse_scalar(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return toml::Value::Float(f);
    }
    toml::Value::String(raw.to_string())
}

fn set_nested(value: &mut toml::Value, path: &[String], leaf: toml::Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if !value.is_table() {
        *value = toml::Value::Table(toml::map::Map::new());
    }
    let table = value.as_table_mut().expect("just ensured table");

    if rest.is_empty() {
        table.insert(head.clone(), leaf);
        return;
    }

    let entry = table
        .entry(head.clone())
        .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    set_nested(entry, rest, leaf);
}
