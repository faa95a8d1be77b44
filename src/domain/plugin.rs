//! Plugin descriptors and the structured values plugins return.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::result::PluginResult;

/// Tier a plugin serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    App,
    Storage,
    Archive,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Storage => "storage",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" => Ok(Self::App),
            "storage" => Ok(Self::Storage),
            "archive" => Ok(Self::Archive),
            other => Err(format!(
                "invalid plugin type '{}', must be app|storage|archive",
                other
            )),
        }
    }
}

/// A named operation a plugin may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Discover,
    Quiesce,
    Unquiesce,
    PreRestore,
    PostRestore,
    Backup,
    BackupList,
    BackupDelete,
    Restore,
    Archive,
    ArchiveList,
    ArchiveDelete,
    Info,
}

impl Capability {
    pub const ALL: [Capability; 13] = [
        Self::Discover,
        Self::Quiesce,
        Self::Unquiesce,
        Self::PreRestore,
        Self::PostRestore,
        Self::Backup,
        Self::BackupList,
        Self::BackupDelete,
        Self::Restore,
        Self::Archive,
        Self::ArchiveList,
        Self::ArchiveDelete,
        Self::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Quiesce => "quiesce",
            Self::Unquiesce => "unquiesce",
            Self::PreRestore => "preRestore",
            Self::PostRestore => "postRestore",
            Self::Backup => "backup",
            Self::BackupList => "backupList",
            Self::BackupDelete => "backupDelete",
            Self::Restore => "restore",
            Self::Archive => "archive",
            Self::ArchiveList => "archiveList",
            Self::ArchiveDelete => "archiveDelete",
            Self::Info => "info",
        }
    }

    /// The single command-line flag an executable plugin receives
    pub fn flag(&self) -> String {
        format!("--{}", self.as_str())
    }

    /// Capabilities whose output is a plain message log
    pub fn returns_result(&self) -> bool {
        !matches!(
            self,
            Self::Discover | Self::BackupList | Self::ArchiveList | Self::Info
        )
    }

    /// Capabilities that change state and must follow a successful SetEnv
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Backup | Self::Restore | Self::BackupDelete | Self::Archive | Self::ArchiveDelete
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Describes a plugin and what it can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub version: String,

    #[serde(rename = "type")]
    pub plugin_type: PluginType,

    #[serde(with = "capability_list", default)]
    pub capabilities: BTreeSet<Capability>,
}

impl PluginDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
        plugin_type: PluginType,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: version.into(),
            plugin_type,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Capabilities travel as `[{"name": "backup"}, ...]`.
///
/// Plain strings are accepted on input, and names this engine does not know
/// are skipped so newer plugins still describe themselves.
mod capability_list {
    use std::collections::BTreeSet;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Capability;

    #[derive(Serialize)]
    struct Entry<'a> {
        name: &'a str,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawEntry {
        Named { name: String },
        Bare(String),
    }

    pub fn serialize<S: Serializer>(
        caps: &BTreeSet<Capability>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry<'_>> = caps.iter().map(|c| Entry { name: c.as_str() }).collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeSet<Capability>, D::Error> {
        let raw = Option::<Vec<RawEntry>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter_map(|entry| {
                let name = match entry {
                    RawEntry::Named { name } => name,
                    RawEntry::Bare(name) => name,
                };
                name.parse().ok()
            })
            .collect())
    }
}

/// A backup discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub name: String,

    #[serde(default)]
    pub policy: String,

    #[serde(default)]
    pub workflow_id: String,

    /// Unix seconds embedded in the name
    #[serde(default)]
    pub epoch: i64,

    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backups {
    #[serde(default)]
    pub result: PluginResult,

    #[serde(default)]
    pub backups: Vec<Backup>,
}

impl Backups {
    pub fn from_result(result: PluginResult) -> Self {
        Self {
            result,
            backups: Vec::new(),
        }
    }
}

/// Archives share the backup naming scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archives {
    #[serde(default)]
    pub result: PluginResult,

    #[serde(default)]
    pub archives: Vec<Backup>,
}

impl Archives {
    pub fn from_result(result: PluginResult) -> Self {
        Self {
            result,
            archives: Vec::new(),
        }
    }
}

/// Data and log locations of one application instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discover {
    pub instance: String,

    #[serde(default)]
    pub data_file_paths: Vec<String>,

    #[serde(default)]
    pub log_file_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverResult {
    #[serde(default)]
    pub result: PluginResult,

    #[serde(default)]
    pub discover_list: Vec<Discover>,
}

impl DiscoverResult {
    pub fn from_result(result: PluginResult) -> Self {
        Self {
            result,
            discover_list: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfoResult {
    #[serde(default)]
    pub result: PluginResult,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginDescriptor>,
}

impl PluginInfoResult {
    pub fn from_descriptor(plugin: PluginDescriptor) -> Self {
        Self {
            result: PluginResult::ok(),
            plugin: Some(plugin),
        }
    }

    pub fn from_result(result: PluginResult) -> Self {
        Self {
            result,
            plugin: None,
        }
    }
}

/// Service health report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub msg: String,
    pub version: String,
    #[serde(default)]
    pub running_workflows: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_flags() {
        assert_eq!(Capability::Backup.flag(), "--backup");
        assert_eq!(Capability::PreRestore.flag(), "--preRestore");
        assert_eq!(Capability::BackupDelete.flag(), "--backupDelete");
    }

    #[test]
    fn test_mutating_capabilities() {
        assert!(Capability::Backup.is_mutating());
        assert!(Capability::Restore.is_mutating());
        assert!(Capability::BackupDelete.is_mutating());
        assert!(!Capability::BackupList.is_mutating());
        assert!(!Capability::Quiesce.is_mutating());
    }

    #[test]
    fn test_descriptor_accepts_object_and_string_capabilities() {
        let json = r#"{
            "name": "sample-storage",
            "description": "A sample storage plugin",
            "version": "1.0.0",
            "type": "storage",
            "capabilities": [{"name": "backup"}, "backupList", {"name": "teleport"}]
        }"#;

        let plugin: PluginDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(plugin.plugin_type, PluginType::Storage);
        assert!(plugin.supports(Capability::Backup));
        assert!(plugin.supports(Capability::BackupList));
        assert_eq!(plugin.capabilities.len(), 2);
    }

    #[test]
    fn test_descriptor_serializes_named_capabilities() {
        let plugin = PluginDescriptor::new(
            "sample-app",
            "",
            "1.0.0",
            PluginType::App,
            [Capability::Quiesce],
        );
        let json = serde_json::to_value(&plugin).unwrap();
        assert_eq!(json["type"], "app");
        assert_eq!(json["capabilities"][0]["name"], "quiesce");
    }

    #[test]
    fn test_plugin_type_parse() {
        assert_eq!("archive".parse::<PluginType>().unwrap(), PluginType::Archive);
        assert!("database".parse::<PluginType>().is_err());
    }
}
