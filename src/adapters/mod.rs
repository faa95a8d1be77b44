//! Plugin interfaces.
//!
//! A plugin is either compiled into the engine (in-process, see [`native`])
//! or an executable under the plugin directory (out-of-process, see
//! [`process`]). [`gateway`] hides the difference behind one handle.

pub mod gateway;
pub mod native;
pub mod pod;
pub mod process;

use async_trait::async_trait;

use crate::domain::{
    Archives, Backups, Capability, Config, DiscoverResult, PluginDescriptor, PluginResult,
};

pub use gateway::{PluginGateway, PluginHandle};
pub use native::NativeRegistry;
pub use pod::PodExec;
pub use process::ProcessPlugin;

/// Failure returned for a capability a plugin does not implement
pub fn unsupported(plugin: &str, capability: Capability) -> PluginResult {
    PluginResult::failure(format!(
        "Plugin '{}' does not support capability '{}'",
        plugin, capability
    ))
}

/// Capability set of an in-process plugin.
///
/// Every operation receives the resolved Config. `set_env` runs first and
/// must succeed before any mutating capability is called.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Describe the plugin
    fn info(&self) -> PluginDescriptor;

    /// Validate and take in the configuration
    async fn set_env(&self, config: &Config) -> PluginResult;

    async fn discover(&self, _config: &Config) -> DiscoverResult {
        DiscoverResult::from_result(unsupported(&self.info().name, Capability::Discover))
    }

    async fn quiesce(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::Quiesce)
    }

    async fn unquiesce(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::Unquiesce)
    }

    async fn pre_restore(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::PreRestore)
    }

    async fn post_restore(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::PostRestore)
    }

    async fn backup(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::Backup)
    }

    async fn backup_list(&self, _config: &Config) -> Backups {
        Backups::from_result(unsupported(&self.info().name, Capability::BackupList))
    }

    async fn backup_delete(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::BackupDelete)
    }

    async fn restore(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::Restore)
    }

    async fn archive(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::Archive)
    }

    async fn archive_list(&self, _config: &Config) -> Archives {
        Archives::from_result(unsupported(&self.info().name, Capability::ArchiveList))
    }

    async fn archive_delete(&self, _config: &Config) -> PluginResult {
        unsupported(&self.info().name, Capability::ArchiveDelete)
    }
}
