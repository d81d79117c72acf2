//! Hierarchical configuration loading (spec §1a, §6).
//!
//! Layers, lowest to highest precedence: compiled-in [`AppConfig::default`]
//! ← an on-disk YAML file ← `CODEX_SWARM_`-prefixed environment variables ←
//! explicit dotted-key CLI overrides. Each layer deep-merges over the
//! previous one (maps merge key-by-key; scalars and arrays are replaced
//! wholesale), courtesy of `figment`.

use std::path::Path;

use figment::providers::{Env, Format, Json, Serialized, Yaml};
use figment::Figment;
use serde_json::Value;

use crate::domain::error::ConfigError;
use crate::domain::models::{AppConfig, IpcMethod};

/// Loads and validates [`AppConfig`] from the layered configuration surface.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from `path` (if it exists), environment
    /// variables, and `overrides` (dotted `key=value` pairs, e.g.
    /// `swarm.max_workers=8`), then validate the result.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadFailed`] if a layer fails to parse, or the
    /// first validation failure encountered in [`Self::validate`].
    pub fn load(path: Option<&Path>, overrides: &[String]) -> Result<AppConfig, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        if let Some(path) = path {
            if path.exists() {
                figment = figment.merge(Yaml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("CODEX_SWARM_").split("__"));

        if !overrides.is_empty() {
            let mut root = Value::Object(serde_json::Map::new());
            for pair in overrides {
                if let Some((key, value)) = pair.split_once('=') {
                    set_dotted(&mut root, key, parse_scalar(value));
                }
            }
            figment = figment.merge(Json::string(&root.to_string()));
        }

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate cross-field invariants, returning the first violation.
    ///
    /// # Errors
    /// One variant of [`ConfigError`] per violated invariant.
    pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
        if config.swarm.max_workers == 0 {
            return Err(ConfigError::InvalidMaxWorkers(config.swarm.max_workers));
        }
        if config.swarm.approval_mode.trim().is_empty() {
            return Err(ConfigError::EmptyApprovalMode);
        }
        if config.swarm.codex_binary.trim().is_empty() {
            return Err(ConfigError::EmptyCodexBinary);
        }
        if config.budget.warn_at_percent > 100 {
            return Err(ConfigError::InvalidWarnPercent(config.budget.warn_at_percent));
        }
        if config.worktree.base_dir.trim().is_empty() {
            return Err(ConfigError::EmptyBaseDir);
        }
        if !["abort", "ours", "theirs"].contains(&config.worktree.merge_strategy.as_str()) {
            return Err(ConfigError::InvalidMergeStrategy(config.worktree.merge_strategy.clone()));
        }
        if config.results.response_file.trim().is_empty() {
            return Err(ConfigError::EmptyResponseFile);
        }
        if !matches!(config.ipc.method, IpcMethod::UnixSocket | IpcMethod::FileWatch) {
            return Err(ConfigError::InvalidIpcMethod("unrecognized".to_string()));
        }
        if config.ipc.message_terminator.is_empty() {
            return Err(ConfigError::EmptyTerminator);
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if !["json", "pretty"].contains(&config.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        Ok(())
    }
}

/// Parse a raw CLI override value as a JSON scalar: booleans and numbers
/// are recognized as such, everything else is treated as a string.
fn parse_scalar(value: &str) -> Value {
    if let Ok(b) = value.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(n) = value.parse::<u64>() {
        Value::Number(n.into())
    } else if let Ok(f) = value.parse::<f64>() {
        serde_json::Number::from_f64(f).map_or_else(|| Value::String(value.to_string()), Value::Number)
    } else {
        Value::String(value.to_string())
    }
}

/// Set `root.a.b.c = value` for a dotted `key` of `"a.b.c"`, creating
/// intermediate objects as needed.
fn set_dotted(root: &mut Value, key: &str, value: Value) {
    let mut cursor = root;
    let parts: Vec<&str> = key.split('.').collect();
    for part in &parts[..parts.len() - 1] {
        if !cursor.is_object() {
            *cursor = Value::Object(serde_json::Map::new());
        }
        cursor = cursor
            .as_object_mut()
            .expect("just ensured object")
            .entry(*part)
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if let Some(last) = parts.last() {
        if let Some(obj) = cursor.as_object_mut() {
            obj.insert((*last).to_string(), value);
        }
    }
}
