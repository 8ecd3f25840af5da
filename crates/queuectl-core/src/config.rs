use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueueError;

/// The kind of value a configuration key holds, used both to parse
/// `config set <key> <value>` into the right JSON type and to coerce a
/// value read back out of `data/config.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValueKind {
    UInt,
    Int,
    Float,
    Str,
}

/// One recognized configuration key: its canonical name, the CLI alias it's
/// commonly set by, and the environment variable that overrides it.
/// `config get`/`config set` only ever look a key up in this fixed table —
/// the source's fuzzy "numeric key that resembles the requested name"
/// matcher is deliberately not carried forward.
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey {
    pub canonical: &'static str,
    pub alias: &'static str,
    pub env: &'static str,
    pub kind: ConfigValueKind,
}

pub const CONFIG_KEYS: &[ConfigKey] = &[
    ConfigKey {
        canonical: "default_max_retries",
        alias: "max-retries",
        env: "QUEUECTL_MAX_RETRIES",
        kind: ConfigValueKind::UInt,
    },
    ConfigKey {
        canonical: "backoff_base",
        alias: "backoff-base",
        env: "QUEUECTL_BACKOFF_BASE",
        kind: ConfigValueKind::Int,
    },
    ConfigKey {
        canonical: "poll_interval",
        alias: "poll-interval",
        env: "QUEUECTL_POLL_INTERVAL",
        kind: ConfigValueKind::Float,
    },
    ConfigKey {
        canonical: "default_timeout",
        alias: "timeout",
        env: "QUEUECTL_TIMEOUT",
        kind: ConfigValueKind::Int,
    },
    ConfigKey {
        canonical: "db_path",
        alias: "db-path",
        env: "QUEUECTL_DB_PATH",
        kind: ConfigValueKind::Str,
    },
    ConfigKey {
        canonical: "log_level",
        alias: "log-level",
        env: "QUEUECTL_LOG_LEVEL",
        kind: ConfigValueKind::Str,
    },
    ConfigKey {
        canonical: "log_file",
        alias: "log-file",
        env: "QUEUECTL_LOG_FILE",
        kind: ConfigValueKind::Str,
    },
];

fn lookup(key: &str) -> Option<&'static ConfigKey> {
    CONFIG_KEYS
        .iter()
        .find(|k| k.canonical == key || k.alias == key)
}

/// The fully-resolved runtime configuration: compiled defaults, then
/// environment variables, then `data/config.json`. CLI flags on
/// `worker start` (process-level overrides) are the highest-precedence
/// layer and are applied by the caller after `load`, since they vary per
/// subcommand invocation rather than living in this shared struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub default_max_retries: u32,
    pub backoff_base: i64,
    pub poll_interval: f64,
    pub default_timeout: i64,
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_max_retries: 3,
            backoff_base: 2,
            poll_interval: 1.0,
            default_timeout: 300,
            db_path: PathBuf::from("data/jobs.json"),
            log_level: "INFO".to_string(),
            log_file: PathBuf::from("data/queuectl.log"),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Self {
        let mut cfg = Config::default();
        cfg.apply_env();
        cfg.apply_file(config_path);
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("QUEUECTL_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                self.default_max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("QUEUECTL_BACKOFF_BASE") {
            if let Ok(n) = v.parse() {
                self.backoff_base = n;
            }
        }
        if let Ok(v) = std::env::var("QUEUECTL_POLL_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.poll_interval = n;
            }
        }
        if let Ok(v) = std::env::var("QUEUECTL_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.default_timeout = n;
            }
        }
        if let Ok(v) = std::env::var("QUEUECTL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("QUEUECTL_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("QUEUECTL_LOG_FILE") {
            self.log_file = PathBuf::from(v);
        }
    }

    fn apply_file(&mut self, path: &Path) {
        let map = match read_raw(path) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read config file; using defaults/env only");
                return;
            }
        };
        if let Some(v) = map.get("default_max_retries").and_then(as_u64) {
            self.default_max_retries = v as u32;
        }
        if let Some(v) = map.get("backoff_base").and_then(as_i64) {
            self.backoff_base = v;
        }
        if let Some(v) = map.get("poll_interval").and_then(as_f64) {
            self.poll_interval = v;
        }
        if let Some(v) = map.get("default_timeout").and_then(as_i64) {
            self.default_timeout = v;
        }
        if let Some(v) = map.get("db_path").and_then(as_string) {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = map.get("log_level").and_then(as_string) {
            self.log_level = v;
        }
        if let Some(v) = map.get("log_file").and_then(as_string) {
            self.log_file = PathBuf::from(v);
        }
    }
}

impl Config {
    /// The effective value of a canonical key under this resolved config,
    /// i.e. after defaults/env/file layering. Returns `None` only for a
    /// name outside [`CONFIG_KEYS`] — callers are expected to have already
    /// resolved aliases via [`lookup`].
    fn effective_value(&self, canonical: &str) -> Option<Value> {
        match canonical {
            "default_max_retries" => Some(Value::Number(self.default_max_retries.into())),
            "backoff_base" => Some(Value::Number(self.backoff_base.into())),
            "poll_interval" => serde_json::Number::from_f64(self.poll_interval).map(Value::Number),
            "default_timeout" => Some(Value::Number(self.default_timeout.into())),
            "db_path" => Some(Value::String(self.db_path.display().to_string())),
            "log_level" => Some(Value::String(self.log_level.clone())),
            "log_file" => Some(Value::String(self.log_file.display().to_string())),
            _ => None,
        }
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_string(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

fn read_raw(path: &Path) -> Result<BTreeMap<String, Value>, QueueError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

fn write_raw(path: &Path, map: &BTreeMap<String, Value>) -> Result<(), QueueError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(map)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

/// Persist `value` under `key`'s canonical name only — never the redundant
/// alias fan-out the source wrote. `config_get`/`config_get_all` resolve
/// aliases at read time via [`CONFIG_KEYS`].
pub fn config_set(path: &Path, key: &str, value: &str) -> Result<(), QueueError> {
    let entry = lookup(key).ok_or_else(|| QueueError::invalid_input(format!("unknown config key: {key}")))?;
    let parsed = match entry.kind {
        ConfigValueKind::UInt => value
            .parse::<u64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| QueueError::invalid_input(format!("{key} expects a non-negative integer")))?,
        ConfigValueKind::Int => value
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| QueueError::invalid_input(format!("{key} expects an integer")))?,
        ConfigValueKind::Float => serde_json::Number::from_f64(
            value
                .parse::<f64>()
                .map_err(|_| QueueError::invalid_input(format!("{key} expects a number")))?,
        )
        .map(Value::Number)
        .ok_or_else(|| QueueError::invalid_input(format!("{key} must be a finite number")))?,
        ConfigValueKind::Str => Value::String(value.to_string()),
    };

    let mut map = read_raw(path)?;
    map.insert(entry.canonical.to_string(), parsed);
    write_raw(path, &map)
}

/// Resolves `key`'s effective value under the full defaults → env →
/// `data/config.json` layering (see [`Config::load`]) — never just whatever
/// happens to be on disk, so a fresh install still reports the compiled
/// default for a key nobody has ever `config set`.
pub fn config_get(path: &Path, key: &str) -> Result<Option<Value>, QueueError> {
    let entry = lookup(key).ok_or_else(|| QueueError::invalid_input(format!("unknown config key: {key}")))?;
    let config = Config::load(path);
    Ok(config.effective_value(entry.canonical))
}

pub fn config_get_all(path: &Path) -> Result<BTreeMap<String, Value>, QueueError> {
    let config = Config::load(path);
    Ok(CONFIG_KEYS
        .iter()
        .filter_map(|k| config.effective_value(k.canonical).map(|v| (k.canonical.to_string(), v)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("queuectl-config-test-{name}-{}.json", uuid_like()));
        p
    }

    fn uuid_like() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }

    #[test]
    fn config_get_on_a_fresh_install_reports_the_compiled_default() {
        let path = temp_path("fresh");
        assert_eq!(
            config_get(&path, "timeout").unwrap(),
            Some(Value::Number(300.into()))
        );
    }

    #[test]
    fn config_get_all_on_a_fresh_install_lists_every_recognized_key() {
        let path = temp_path("fresh-all");
        let all = config_get_all(&path).unwrap();
        assert_eq!(all.len(), CONFIG_KEYS.len());
        assert_eq!(all.get("default_timeout"), Some(&Value::Number(300.into())));
    }

    #[test]
    fn config_set_then_get_reflects_the_persisted_value() {
        let path = temp_path("roundtrip");
        config_set(&path, "max-retries", "7").unwrap();
        assert_eq!(
            config_get(&path, "default_max_retries").unwrap(),
            Some(Value::Number(7.into()))
        );
        let _ = std::fs::remove_file(&path);
    }
}
