use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use trinity_agents::ObserverConfig;
use trinity_memory::config::DEFAULT_MAX_ENTRIES;
use trinity_memory::{MemoryConfig, RetentionPolicy};

use crate::duration::parse_duration;
use crate::logging::LogSettings;
use crate::trinity_home::expand_path_with_home;

pub const CONFIG_FILE_NAME: &str = "trinity.toml";
pub const MEMORY_FILE_ENV: &str = "TRINITY_MEMORY_FILE";
const DEFAULT_MEMORY_FILE: &str = "memory/shared_memory.jsonl";
const DEFAULT_LOG_FILE_NAME: &str = "trinity.log";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_ROTATE_SIZE_MB: u64 = 100;
const DEFAULT_LOG_STDOUT: bool = false;

/// Resolved runtime settings for one conf dir.
#[derive(Debug, Clone)]
pub struct Settings {
    pub memory: MemoryConfig,
    pub observer: ObserverConfig,
    pub log: LogSettings,
}

#[derive(Debug, Default, Deserialize)]
struct TrinityTomlFile {
    #[serde(default)]
    memory: TrinityTomlMemory,
    #[serde(default)]
    observer: ObserverConfig,
    #[serde(default)]
    log: TrinityTomlLog,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct TrinityTomlMemory {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    max_text_chars: Option<usize>,
    #[serde(default)]
    max_category_chars: Option<usize>,
    #[serde(default)]
    max_entries: Option<usize>,
    #[serde(default)]
    max_age: Option<String>,
    #[serde(default)]
    auto_prune: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TrinityTomlLog {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    rotate_size_mb: Option<u64>,
    #[serde(default)]
    stdout: Option<bool>,
}

pub fn config_path(conf_dir: &Path) -> PathBuf {
    conf_dir.join(CONFIG_FILE_NAME)
}

/// Load `trinity.toml` from `conf_dir`. A missing file yields defaults.
pub fn load_settings(conf_dir: &Path) -> Result<Settings, String> {
    let path = config_path(conf_dir);
    let content = if path.exists() {
        fs::read_to_string(&path)
            .map_err(|error| format!("read {} failed: {error}", path.display()))?
    } else {
        String::new()
    };
    parse_settings(conf_dir, &content, std::env::var(MEMORY_FILE_ENV).ok())
}

pub(crate) fn parse_settings(
    conf_dir: &Path,
    content: &str,
    memory_file_override: Option<String>,
) -> Result<Settings, String> {
    let parsed: TrinityTomlFile = toml::from_str(content)
        .map_err(|error| format!("parse {CONFIG_FILE_NAME} failed: {error}"))?;

    let memory = resolve_memory_config(
        conf_dir,
        &parsed.memory,
        &parsed.env,
        memory_file_override,
    )?;
    memory.validate()?;
    parsed.observer.validate()?;

    Ok(Settings {
        memory,
        observer: parsed.observer,
        log: build_log_settings(conf_dir, &parsed.log, &parsed.env),
    })
}

fn resolve_memory_config(
    conf_dir: &Path,
    memory: &TrinityTomlMemory,
    env_map: &HashMap<String, String>,
    memory_file_override: Option<String>,
) -> Result<MemoryConfig, String> {
    let path = memory_file_override
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            memory
                .path
                .as_deref()
                .and_then(|value| resolve_config_value(value, env_map))
        })
        .map(|value| resolve_conf_path(conf_dir, &value))
        .unwrap_or_else(|| conf_dir.join(DEFAULT_MEMORY_FILE));

    let mut config = MemoryConfig::new(path);
    if let Some(max_text_chars) = memory.max_text_chars {
        config.max_text_chars = max_text_chars;
    }
    if let Some(max_category_chars) = memory.max_category_chars {
        config.max_category_chars = max_category_chars;
    }
    let max_age_secs = memory
        .max_age
        .as_deref()
        .map(|value| parse_duration(value).map_err(|error| format!("memory max_age: {error}")))
        .transpose()?
        .map(|age| age.as_secs());
    config.retention = RetentionPolicy {
        // 0 turns the count bound off.
        max_entries: match memory.max_entries {
            Some(0) => None,
            Some(max_entries) => Some(max_entries),
            None => Some(DEFAULT_MAX_ENTRIES),
        },
        max_age_secs,
    };
    if let Some(auto_prune) = memory.auto_prune {
        config.auto_prune = auto_prune;
    }
    Ok(config)
}

fn build_log_settings(
    conf_dir: &Path,
    log: &TrinityTomlLog,
    env_map: &HashMap<String, String>,
) -> LogSettings {
    let dir = log
        .path
        .as_deref()
        .and_then(|value| resolve_config_value(value, env_map))
        .map(|value| resolve_conf_path(conf_dir, &value))
        .unwrap_or_else(|| conf_dir.join("logs"));
    let level = log
        .level
        .as_deref()
        .and_then(|value| resolve_config_value(value, env_map))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    let rotate_size_mb = log
        .rotate_size_mb
        .unwrap_or(DEFAULT_LOG_ROTATE_SIZE_MB)
        .max(1);

    LogSettings {
        file_path: dir.join(DEFAULT_LOG_FILE_NAME),
        level,
        rotate_size_bytes: rotate_size_mb * 1024 * 1024,
        stdout: log.stdout.unwrap_or(DEFAULT_LOG_STDOUT),
    }
}

/// `$NAME` reads from the `[env]` table, then the process environment.
fn resolve_config_value(value: &str, env_map: &HashMap<String, String>) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(env_key) = trimmed.strip_prefix('$') {
        return env_map
            .get(env_key)
            .cloned()
            .or_else(|| std::env::var(env_key).ok())
            .map(|resolved| resolved.trim().to_string())
            .filter(|resolved| !resolved.is_empty());
    }
    Some(trimmed.to_string())
}

/// Relative paths are taken from the conf dir.
fn resolve_conf_path(conf_dir: &Path, value: &str) -> PathBuf {
    let expanded = expand_path_with_home(Path::new(value.trim()));
    if expanded.is_absolute() {
        expanded
    } else {
        conf_dir.join(expanded)
    }
}
