//! In-process plugins.
//!
//! Native plugins are registered by type and name, so the same name may
//! still be an executable of another type. Resolving one runs its factory,
//! which may refuse to build the plugin (for example when a collaborator it
//! needs is missing); that is a load error, not a missing plugin.

pub mod postgres_dump;
pub mod sample_app;
pub mod sample_archive;
pub mod sample_storage;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::domain::PluginType;

use super::pod::PodExec;
use super::Plugin;

pub use postgres_dump::PostgresDump;
pub use sample_app::SampleApp;
pub use sample_archive::SampleArchive;
pub use sample_storage::SampleStorage;

/// Collaborators available to plugin factories
#[derive(Clone, Default)]
pub struct NativeContext {
    pub pod_exec: Option<Arc<dyn PodExec>>,
}

/// Builds a plugin instance, or explains why it cannot
pub type NativeFactory =
    Arc<dyn Fn(&NativeContext) -> Result<Arc<dyn Plugin>, String> + Send + Sync>;

/// Registry of in-process plugins keyed by (type, name)
#[derive(Clone, Default)]
pub struct NativeRegistry {
    entries: HashMap<(PluginType, String), NativeFactory>,
    context: NativeContext,
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .map(|(plugin_type, name)| format!("{}/{}", plugin_type, name))
            .collect();
        names.sort();
        f.debug_struct("NativeRegistry")
            .field("plugins", &names)
            .field("pod_exec", &self.context.pod_exec.is_some())
            .finish()
    }
}

impl NativeRegistry {
    /// Registry with no plugins
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the plugins shipped in this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SampleStorage::NAME, PluginType::Storage, |_| {
            Ok(Arc::new(SampleStorage) as Arc<dyn Plugin>)
        });
        registry.register(SampleApp::NAME, PluginType::App, |_| {
            Ok(Arc::new(SampleApp) as Arc<dyn Plugin>)
        });
        registry.register(SampleArchive::NAME, PluginType::Archive, |_| {
            Ok(Arc::new(SampleArchive) as Arc<dyn Plugin>)
        });
        registry.register(PostgresDump::NAME, PluginType::App, |ctx| {
            let exec = ctx
                .pod_exec
                .clone()
                .ok_or_else(|| "postgres-dump requires a pod executor".to_string())?;
            Ok(Arc::new(PostgresDump::new(exec)) as Arc<dyn Plugin>)
        });
        registry
    }

    /// Supply the pod executor used by cluster-aware plugins
    pub fn with_pod_exec(mut self, exec: Arc<dyn PodExec>) -> Self {
        self.context.pod_exec = Some(exec);
        self
    }

    /// Register (or replace) a plugin factory
    pub fn register<F>(&mut self, name: impl Into<String>, plugin_type: PluginType, factory: F)
    where
        F: Fn(&NativeContext) -> Result<Arc<dyn Plugin>, String> + Send + Sync + 'static,
    {
        self.entries
            .insert((plugin_type, name.into()), Arc::new(factory));
    }

    /// Register a ready-made plugin instance under its own name
    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        let info = plugin.info();
        self.register(info.name, info.plugin_type, move |_| Ok(Arc::clone(&plugin)));
    }

    /// Build a registered plugin; `None` when nothing of that type is
    /// registered under the name
    pub fn load(&self, name: &str, plugin_type: PluginType) -> Option<Result<Arc<dyn Plugin>, String>> {
        self.entries
            .get(&(plugin_type, name.to_string()))
            .map(|factory| factory(&self.context))
    }

    /// Registered names of one plugin type, sorted
    pub fn names(&self, plugin_type: PluginType) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter(|(t, _)| *t == plugin_type)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Run blocking filesystem work off the async executor
pub(crate) async fn run_blocking<T, F>(work: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Recursively copy a file or directory to `dst`, returning the file count
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> io::Result<u64> {
    let metadata = std::fs::metadata(src)?;
    if metadata.is_file() {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dst)?;
        return Ok(1);
    }

    std::fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        copied += copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
    }
    Ok(copied)
}

/// Remove a file or directory tree
pub(crate) fn remove_entry(path: &Path) -> io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Split a comma separated parameter into trimmed, non-empty items
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
