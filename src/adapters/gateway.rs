//! Plugin resolution.
//!
//! A name is looked up in the native registry first and then as an
//! executable at `{plugin_dir}/{type}/{name}`. Whichever is found, callers
//! get a [`PluginHandle`] and never see the difference.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::resolver::is_plain_name;
use crate::core::EngineError;
use crate::domain::{
    Archives, Backups, Capability, Config, DiscoverResult, PluginInfoResult, PluginResult,
    PluginType,
};

use super::native::NativeRegistry;
use super::process::ProcessPlugin;
use super::Plugin;

/// Where a resolved plugin runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    InProcess,
    OutOfProcess,
}

/// A resolved plugin of either kind
#[derive(Clone)]
pub enum PluginHandle {
    InProcess { name: String, plugin: Arc<dyn Plugin> },
    OutOfProcess(ProcessPlugin),
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess { name, .. } => f.debug_tuple("InProcess").field(name).finish(),
            Self::OutOfProcess(p) => f.debug_tuple("OutOfProcess").field(p).finish(),
        }
    }
}

impl PluginHandle {
    pub fn name(&self) -> &str {
        match self {
            Self::InProcess { name, .. } => name,
            Self::OutOfProcess(p) => p.name(),
        }
    }

    pub fn kind(&self) -> PluginKind {
        match self {
            Self::InProcess { .. } => PluginKind::InProcess,
            Self::OutOfProcess(_) => PluginKind::OutOfProcess,
        }
    }

    pub async fn set_env(&self, config: &Config) -> PluginResult {
        match self {
            Self::InProcess { plugin, .. } => plugin.set_env(config).await,
            Self::OutOfProcess(p) => p.set_env(config).await,
        }
    }

    /// Invoke a capability whose output is a message log
    pub async fn invoke(&self, capability: Capability, config: &Config) -> PluginResult {
        if !capability.returns_result() {
            return not_a_log(capability);
        }

        let plugin = match self {
            Self::OutOfProcess(p) => return p.run(config, capability).await,
            Self::InProcess { plugin, .. } => plugin,
        };

        match capability {
            Capability::Quiesce => plugin.quiesce(config).await,
            Capability::Unquiesce => plugin.unquiesce(config).await,
            Capability::PreRestore => plugin.pre_restore(config).await,
            Capability::PostRestore => plugin.post_restore(config).await,
            Capability::Backup => plugin.backup(config).await,
            Capability::BackupDelete => plugin.backup_delete(config).await,
            Capability::Restore => plugin.restore(config).await,
            Capability::Archive => plugin.archive(config).await,
            Capability::ArchiveDelete => plugin.archive_delete(config).await,
            Capability::Discover
            | Capability::BackupList
            | Capability::ArchiveList
            | Capability::Info => not_a_log(capability),
        }
    }

    pub async fn backup_list(&self, config: &Config) -> Backups {
        match self {
            Self::InProcess { plugin, .. } => plugin.backup_list(config).await,
            Self::OutOfProcess(p) => p.backup_list(config).await,
        }
    }

    pub async fn archive_list(&self, config: &Config) -> Archives {
        match self {
            Self::InProcess { plugin, .. } => plugin.archive_list(config).await,
            Self::OutOfProcess(p) => p.archive_list(config).await,
        }
    }

    pub async fn discover(&self, config: &Config) -> DiscoverResult {
        match self {
            Self::InProcess { plugin, .. } => plugin.discover(config).await,
            Self::OutOfProcess(p) => p.discover(config).await,
        }
    }

    pub async fn info(&self) -> PluginInfoResult {
        match self {
            Self::InProcess { plugin, .. } => PluginInfoResult::from_descriptor(plugin.info()),
            Self::OutOfProcess(p) => p.info().await,
        }
    }
}

fn not_a_log(capability: Capability) -> PluginResult {
    PluginResult::failure(format!(
        "Capability '{}' does not return a message log",
        capability
    ))
}

/// Resolves plugin names into handles
#[derive(Debug, Clone)]
pub struct PluginGateway {
    plugin_dir: PathBuf,
    native: NativeRegistry,
    timeout: Option<Duration>,
}

impl PluginGateway {
    pub fn new(plugin_dir: impl Into<PathBuf>, native: NativeRegistry) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            native,
            timeout: None,
        }
    }

    /// Limit the run time of every out-of-process invocation
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn native(&self) -> &NativeRegistry {
        &self.native
    }

    /// Path an executable plugin must live at
    pub fn executable_path(&self, name: &str, plugin_type: PluginType) -> PathBuf {
        self.plugin_dir.join(plugin_type.as_str()).join(name)
    }

    /// Resolve a plugin: native registry, then executable, then not found.
    pub fn resolve(&self, name: &str, plugin_type: PluginType) -> Result<PluginHandle, EngineError> {
        let not_found = || EngineError::PluginNotFound {
            name: name.to_string(),
            plugin_type,
        };

        if name.is_empty() || !is_plain_name(name) {
            return Err(not_found());
        }

        if let Some(loaded) = self.native.load(name, plugin_type) {
            let plugin = loaded.map_err(|reason| EngineError::PluginLoad {
                name: name.to_string(),
                reason,
            })?;

            let declared = plugin.info().plugin_type;
            if declared != plugin_type {
                return Err(EngineError::PluginLoad {
                    name: name.to_string(),
                    reason: format!("plugin is of type {}, expected {}", declared, plugin_type),
                });
            }

            debug!(plugin = %name, %plugin_type, "Resolved in-process plugin");
            return Ok(PluginHandle::InProcess {
                name: name.to_string(),
                plugin,
            });
        }

        let executable = self.executable_path(name, plugin_type);
        if executable.is_file() {
            debug!(plugin = %name, %plugin_type, executable = %executable.display(), "Resolved executable plugin");
            return Ok(PluginHandle::OutOfProcess(
                ProcessPlugin::new(name, plugin_type, executable).with_timeout(self.timeout),
            ));
        }

        Err(not_found())
    }

    /// All plugin names of a type: executables and native plugins, sorted
    pub fn list(&self, plugin_type: PluginType) -> Result<Vec<String>, EngineError> {
        let mut names: BTreeSet<String> = self.native.names(plugin_type).into_iter().collect();

        let dir = self.plugin_dir.join(plugin_type.as_str());
        match std::fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    if !entry.file_type()?.is_file() {
                        continue;
                    }
                    if let Some(name) = entry.file_name().to_str() {
                        names.insert(name.to_string());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PluginDescriptor;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Named(&'static str, PluginType);

    #[async_trait]
    impl Plugin for Named {
        fn info(&self) -> PluginDescriptor {
            PluginDescriptor::new(self.0, "", "0.1.0", self.1, [])
        }

        async fn set_env(&self, _config: &Config) -> PluginResult {
            PluginResult::ok()
        }
    }

    fn write_file(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "#!/bin/sh\n").unwrap();
    }

    #[test]
    fn test_native_wins_over_executable() {
        let temp = TempDir::new().unwrap();
        let mut native = NativeRegistry::new();
        native.register_plugin(Arc::new(Named("dup", PluginType::Storage)));
        let gateway = PluginGateway::new(temp.path(), native);
        write_file(&gateway.executable_path("dup", PluginType::Storage));

        let handle = gateway.resolve("dup", PluginType::Storage).unwrap();
        assert_eq!(handle.kind(), PluginKind::InProcess);
    }

    #[test]
    fn test_executable_fallback() {
        let temp = TempDir::new().unwrap();
        let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());
        write_file(&gateway.executable_path("tool", PluginType::App));

        let handle = gateway.resolve("tool", PluginType::App).unwrap();
        assert_eq!(handle.kind(), PluginKind::OutOfProcess);
        assert_eq!(handle.name(), "tool");
    }

    #[test]
    fn test_native_of_other_type_falls_through_to_executable() {
        let temp = TempDir::new().unwrap();
        let gateway = PluginGateway::new(temp.path(), NativeRegistry::builtin());
        write_file(&gateway.executable_path("sample-storage", PluginType::App));

        let handle = gateway.resolve("sample-storage", PluginType::App).unwrap();
        assert_eq!(handle.kind(), PluginKind::OutOfProcess);

        let handle = gateway.resolve("sample-storage", PluginType::Storage).unwrap();
        assert_eq!(handle.kind(), PluginKind::InProcess);
    }

    #[test]
    fn test_native_of_other_type_without_executable_is_not_found() {
        let temp = TempDir::new().unwrap();
        let gateway = PluginGateway::new(temp.path(), NativeRegistry::builtin());

        assert!(matches!(
            gateway.resolve("sample-storage", PluginType::App),
            Err(EngineError::PluginNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_plugin_is_not_found() {
        let temp = TempDir::new().unwrap();
        let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());

        for name in ["absent", "", "../escape"] {
            assert!(matches!(
                gateway.resolve(name, PluginType::Storage),
                Err(EngineError::PluginNotFound { .. })
            ));
        }
    }

    #[test]
    fn test_type_mismatch_is_load_error() {
        let temp = TempDir::new().unwrap();
        let mut native = NativeRegistry::new();
        native.register("odd", PluginType::Storage, |_| {
            Ok(Arc::new(Named("odd", PluginType::App)) as Arc<dyn Plugin>)
        });
        let gateway = PluginGateway::new(temp.path(), native);

        assert!(matches!(
            gateway.resolve("odd", PluginType::Storage),
            Err(EngineError::PluginLoad { .. })
        ));
    }

    #[test]
    fn test_list_merges_and_sorts() {
        let temp = TempDir::new().unwrap();
        let gateway = PluginGateway::new(temp.path(), NativeRegistry::builtin());
        write_file(&gateway.executable_path("zfs-snap", PluginType::Storage));
        write_file(&gateway.executable_path("sample-storage", PluginType::Storage));
        std::fs::create_dir_all(temp.path().join("storage/not-a-plugin")).unwrap();

        let names = gateway.list(PluginType::Storage).unwrap();
        assert_eq!(names, vec!["sample-storage", "zfs-snap"]);
        assert!(gateway.list(PluginType::Archive).unwrap().contains(&"sample-archive".to_string()));
    }
}
