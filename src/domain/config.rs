//! Resolved backup configuration.
//!
//! Core fields are typed; plugin parameters stay open string maps because
//! every plugin defines its own keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::plugin::PluginType;

/// Schema-less plugin parameters
pub type Parameters = BTreeMap<String, String>;

/// A named retention rule: keep `count` backups (or archives) for the policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Retention {
    pub name: String,
    pub count: u32,
}

impl Retention {
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// One backup target definition, as resolved for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Config {
    pub profile_name: String,
    pub config_name: String,

    pub workflow_id: String,
    /// Unix seconds
    pub workflow_timestamp: i64,
    /// Workflow whose backup a restore reads from
    pub selected_workflow_id: String,

    pub app_plugin: String,
    pub storage_plugin: String,
    pub archive_plugin: String,
    pub auto_discovery: bool,

    pub app_plugin_parameters: Parameters,
    pub storage_plugin_parameters: Parameters,
    pub archive_plugin_parameters: Parameters,

    pub backup_retentions: Vec<Retention>,
    pub archive_retentions: Vec<Retention>,

    pub selected_backup_policy: String,
    pub selected_backup_retention: u32,
    pub selected_archive_retention: u32,

    /// Comma separated argv run after a successful backup
    pub backup_create_cmd: String,
    /// Comma separated argv run after a successful backup delete
    pub backup_delete_cmd: String,
}

impl Config {
    /// Name of the plugin bound for a plugin type (empty if none)
    pub fn plugin_name(&self, plugin_type: PluginType) -> &str {
        match plugin_type {
            PluginType::App => &self.app_plugin,
            PluginType::Storage => &self.storage_plugin,
            PluginType::Archive => &self.archive_plugin,
        }
    }

    pub fn parameters(&self, plugin_type: PluginType) -> &Parameters {
        match plugin_type {
            PluginType::App => &self.app_plugin_parameters,
            PluginType::Storage => &self.storage_plugin_parameters,
            PluginType::Archive => &self.archive_plugin_parameters,
        }
    }

    pub fn parameters_mut(&mut self, plugin_type: PluginType) -> &mut Parameters {
        match plugin_type {
            PluginType::App => &mut self.app_plugin_parameters,
            PluginType::Storage => &mut self.storage_plugin_parameters,
            PluginType::Archive => &mut self.archive_plugin_parameters,
        }
    }

    /// Look up a parameter of one plugin, treating empty values as absent
    pub fn parameter(&self, plugin_type: PluginType, key: &str) -> Option<&str> {
        self.parameters(plugin_type)
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Environment handed to an out-of-process plugin of the given type.
    ///
    /// The plugin's own parameters come first; core fields override them.
    pub fn plugin_env(&self, plugin_type: PluginType) -> BTreeMap<String, String> {
        let mut env = self.parameters(plugin_type).clone();

        let core = [
            ("ProfileName", self.profile_name.clone()),
            ("ConfigName", self.config_name.clone()),
            ("WorkflowId", self.workflow_id.clone()),
            ("WorkflowTimestamp", self.workflow_timestamp.to_string()),
            ("SelectedWorkflowId", self.selected_workflow_id.clone()),
            ("BackupPolicy", self.selected_backup_policy.clone()),
            ("BackupRetention", self.selected_backup_retention.to_string()),
            ("ArchiveRetention", self.selected_archive_retention.to_string()),
            ("AutoDiscovery", self.auto_discovery.to_string()),
        ];
        for (key, value) in core {
            env.insert(key.to_string(), value);
        }

        env
    }
}
