//! Per-request ordering of plugin calls.
//!
//! Every capability except `info` runs behind `set_env`:
//!
//! 1. `set_env` is invoked and awaited.
//! 2. If it fails, its result is returned untouched and the capability is
//!    never called.
//! 3. Otherwise the capability runs. Message-log capabilities get the
//!    `set_env` messages in front of their own; listings and discovery are
//!    returned as the plugin produced them.

use tracing::{error, instrument, warn};

use crate::adapters::{PluginGateway, PluginHandle};
use crate::domain::{
    prepend_messages, Archives, Backups, Capability, Config, DiscoverResult, PluginResult,
    PluginType,
};

use super::error::EngineError;

#[derive(Debug, Clone, Copy)]
pub struct Sequencer<'a> {
    gateway: &'a PluginGateway,
}

impl<'a> Sequencer<'a> {
    pub fn new(gateway: &'a PluginGateway) -> Self {
        Self { gateway }
    }

    /// Resolve the plugin bound to `plugin_type` in the config
    pub fn plugin(&self, config: &Config, plugin_type: PluginType) -> Result<PluginHandle, EngineError> {
        self.gateway.resolve(config.plugin_name(plugin_type), plugin_type)
    }

    /// Resolve and run a message-log capability
    pub async fn run(
        &self,
        plugin_type: PluginType,
        capability: Capability,
        config: &Config,
    ) -> Result<PluginResult, EngineError> {
        let handle = self.plugin(config, plugin_type)?;
        Ok(invoke(&handle, capability, config).await)
    }

    pub async fn backup_list(&self, config: &Config) -> Result<Backups, EngineError> {
        let handle = self.plugin(config, PluginType::Storage)?;
        Ok(backup_list(&handle, config).await)
    }

    pub async fn archive_list(&self, config: &Config) -> Result<Archives, EngineError> {
        let handle = self.plugin(config, PluginType::Archive)?;
        Ok(archive_list(&handle, config).await)
    }

    pub async fn discover(&self, config: &Config) -> Result<DiscoverResult, EngineError> {
        let handle = self.plugin(config, PluginType::App)?;
        Ok(discover(&handle, config).await)
    }
}

/// `set_env`, then `capability`, then merge the two message logs
#[instrument(skip_all, fields(plugin = %handle.name(), %capability))]
pub async fn invoke(handle: &PluginHandle, capability: Capability, config: &Config) -> PluginResult {
    let setup = handle.set_env(config).await;
    if !setup.is_success() {
        warn!(code = setup.code, "Plugin setup failed, capability skipped");
        return setup;
    }

    let mut result = handle.invoke(capability, config).await;
    if !result.is_success() {
        error!(code = result.code, "Plugin capability failed");
    }
    result.messages = prepend_messages(setup.messages, result.messages);
    result
}

pub async fn backup_list(handle: &PluginHandle, config: &Config) -> Backups {
    let setup = handle.set_env(config).await;
    if !setup.is_success() {
        return Backups::from_result(setup);
    }
    handle.backup_list(config).await
}

pub async fn archive_list(handle: &PluginHandle, config: &Config) -> Archives {
    let setup = handle.set_env(config).await;
    if !setup.is_success() {
        return Archives::from_result(setup);
    }
    handle.archive_list(config).await
}

pub async fn discover(handle: &PluginHandle, config: &Config) -> DiscoverResult {
    let setup = handle.set_env(config).await;
    if !setup.is_success() {
        return DiscoverResult::from_result(setup);
    }
    handle.discover(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{NativeRegistry, Plugin};
    use crate::domain::{Level, PluginDescriptor};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        setup_code: i32,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Plugin for Counting {
        fn info(&self) -> PluginDescriptor {
            PluginDescriptor::new("counting", "", "0", PluginType::Storage, [Capability::Backup])
        }

        async fn set_env(&self, _config: &Config) -> PluginResult {
            PluginResult::new(self.setup_code, Vec::new()).with_message(Level::Info, "setup")
        }

        async fn backup(&self, _config: &Config) -> PluginResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PluginResult::ok()
                .with_message(Level::Info, "copy")
                .with_message(Level::Info, "done")
        }
    }

    fn handle(setup_code: i32) -> (Arc<Counting>, PluginHandle) {
        let plugin = Arc::new(Counting {
            setup_code,
            calls: AtomicUsize::new(0),
        });
        let handle = PluginHandle::InProcess {
            name: "counting".to_string(),
            plugin: plugin.clone(),
        };
        (plugin, handle)
    }

    #[tokio::test]
    async fn test_setup_messages_come_first() {
        let (plugin, handle) = handle(0);
        let result = invoke(&handle, Capability::Backup, &Config::default()).await;

        let texts: Vec<&str> = result.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["setup", "copy", "done"]);
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_setup_skips_capability() {
        let (plugin, handle) = handle(1);
        let result = invoke(&handle, Capability::Backup, &Config::default()).await;

        assert_eq!(result.code, 1);
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].text, "setup");
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_plugin_is_an_error() {
        let gateway = PluginGateway::new("/nonexistent", NativeRegistry::new());
        let config = Config {
            storage_plugin: "nope".to_string(),
            ..Default::default()
        };

        let outcome = Sequencer::new(&gateway)
            .run(PluginType::Storage, Capability::Backup, &config)
            .await;
        assert!(matches!(outcome, Err(EngineError::PluginNotFound { .. })));
    }
}
