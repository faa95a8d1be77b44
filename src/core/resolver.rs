//! Layered configuration resolution.
//!
//! Layout under the config directory:
//!
//! ```text
//! {config_dir}/{profile}/{config}/{config}.conf      base config
//! {config_dir}/{profile}/{config}/{plugin}.conf      one per named plugin
//! ```
//!
//! Files are YAML. Resolution reads only local files and holds no shared
//! state, so a single resolver can serve concurrent requests.

use std::path::{Component, Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use crate::domain::{Config, Parameters, PluginType};

use super::error::EngineError;
use super::naming::retention_count;

const PLUGIN_TYPES: [PluginType; 3] = [PluginType::App, PluginType::Storage, PluginType::Archive];

/// Loads and merges the files of one profile/config pair
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    config_dir: PathBuf,
}

impl ConfigResolver {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Directory holding every file of a profile/config pair
    pub fn config_path(&self, profile: &str, config: &str) -> PathBuf {
        self.config_dir.join(profile).join(config)
    }

    /// Path of the base file
    pub fn base_path(&self, profile: &str, config: &str) -> PathBuf {
        self.config_path(profile, config)
            .join(format!("{}.conf", config))
    }

    /// Path of a plugin parameter file
    pub fn plugin_path(&self, profile: &str, config: &str, plugin: &str) -> PathBuf {
        self.config_path(profile, config)
            .join(format!("{}.conf", plugin))
    }

    /// Resolve a complete Config for (profile, config, policy).
    ///
    /// Fails without returning a partial Config if the base file or any
    /// referenced plugin file is missing or malformed.
    pub fn resolve(&self, profile: &str, config: &str, policy: &str) -> Result<Config, EngineError> {
        let base_path = self.base_path(profile, config);
        for name in [profile, config] {
            if !is_plain_name(name) {
                return Err(EngineError::ConfigNotFound { path: base_path });
            }
        }

        let contents = read_file(&base_path)?;
        let mut resolved: Config = serde_yaml::from_str(&contents).map_err(|e| {
            EngineError::ConfigParse {
                path: base_path.clone(),
                reason: e.to_string(),
            }
        })?;

        resolved.profile_name = profile.to_string();
        resolved.config_name = config.to_string();

        for plugin_type in PLUGIN_TYPES {
            let plugin = resolved.plugin_name(plugin_type).to_string();
            let parameters = if plugin.is_empty() {
                Parameters::new()
            } else {
                let path = self.plugin_path(profile, config, &plugin);
                if !is_plain_name(&plugin) {
                    return Err(EngineError::ConfigNotFound { path });
                }
                debug!(plugin = %plugin, %plugin_type, path = %path.display(), "Loading plugin parameters");
                read_parameters(&path)?
            };
            *resolved.parameters_mut(plugin_type) = parameters;
        }

        resolved.selected_backup_policy = policy.to_string();
        resolved.selected_backup_retention = retention_count(policy, &resolved.backup_retentions);
        resolved.selected_archive_retention = retention_count(policy, &resolved.archive_retentions);

        Ok(resolved)
    }
}

/// A single normal path component (no separators, no `..`)
pub(crate) fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('/')
}

fn read_file(path: &Path) -> Result<String, EngineError> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            EngineError::ConfigParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })
}

/// Read a flat plugin parameter file into a string map
fn read_parameters(path: &Path) -> Result<Parameters, EngineError> {
    let contents = read_file(path)?;
    let parse_err = |reason: String| EngineError::ConfigParse {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_yaml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?;

    let mapping = match value {
        Value::Null => return Ok(Parameters::new()),
        Value::Mapping(mapping) => mapping,
        _ => return Err(parse_err("expected a map of parameters".to_string())),
    };

    let mut parameters = Parameters::new();
    for (key, value) in mapping {
        let key = scalar_to_string(&key)
            .ok_or_else(|| parse_err("parameter names must be scalars".to_string()))?;
        let value = scalar_to_string(&value)
            .ok_or_else(|| parse_err(format!("parameter '{}' must be a scalar value", key)))?;
        parameters.insert(key, value);
    }

    Ok(parameters)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
