//! Application plugin that only reports what it would do.
//!
//! Useful for exercising workflows without a real application. Discovery
//! reports the storage `DataFilePaths`/`LogFilePaths` parameters of the
//! config as a single instance named after the config.

use async_trait::async_trait;

use crate::adapters::Plugin;
use crate::domain::{
    Capability, Config, Discover, DiscoverResult, Level, PluginDescriptor, PluginResult,
    PluginType,
};

use super::split_list;

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleApp;

impl SampleApp {
    pub const NAME: &'static str = "sample-app";
}

fn step(text: &str) -> PluginResult {
    PluginResult::ok().with_message(Level::Info, format!("*** Application {} ***", text))
}

#[async_trait]
impl Plugin for SampleApp {
    fn info(&self) -> PluginDescriptor {
        PluginDescriptor::new(
            Self::NAME,
            "A sample application plugin",
            env!("CARGO_PKG_VERSION"),
            PluginType::App,
            [
                Capability::Discover,
                Capability::Quiesce,
                Capability::Unquiesce,
                Capability::PreRestore,
                Capability::PostRestore,
                Capability::Info,
            ],
        )
    }

    async fn set_env(&self, config: &Config) -> PluginResult {
        PluginResult::ok().with_message(
            Level::Debug,
            format!(
                "Application environment for {}/{} workflow {}",
                config.profile_name, config.config_name, config.workflow_id
            ),
        )
    }

    async fn discover(&self, config: &Config) -> DiscoverResult {
        let paths = |key: &str| {
            config
                .parameter(PluginType::App, key)
                .or_else(|| config.parameter(PluginType::Storage, key))
                .map(split_list)
                .unwrap_or_default()
        };

        let instance = Discover {
            instance: config.config_name.clone(),
            data_file_paths: paths("DataFilePaths"),
            log_file_paths: paths("LogFilePaths"),
        };

        let mut result = step("Discovery");
        result.push(
            Level::Info,
            format!(
                "Instance [{}] data files: [{}] log files: [{}]",
                instance.instance,
                instance.data_file_paths.join(" "),
                instance.log_file_paths.join(" ")
            ),
        );

        DiscoverResult {
            result,
            discover_list: vec![instance],
        }
    }

    async fn quiesce(&self, _config: &Config) -> PluginResult {
        step("quiesce")
    }

    async fn unquiesce(&self, _config: &Config) -> PluginResult {
        step("unquiesce")
    }

    async fn pre_restore(&self, _config: &Config) -> PluginResult {
        step("Pre Restore")
    }

    async fn post_restore(&self, _config: &Config) -> PluginResult {
        step("Post Restore")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discover_reports_configured_paths() {
        let mut config = Config {
            config_name: "db1".to_string(),
            ..Default::default()
        };
        config
            .app_plugin_parameters
            .insert("DataFilePaths".to_string(), "/data/a,/data/b".to_string());

        let discovered = SampleApp.discover(&config).await;
        assert!(discovered.result.is_success());
        assert_eq!(discovered.discover_list.len(), 1);
        assert_eq!(discovered.discover_list[0].instance, "db1");
        assert_eq!(discovered.discover_list[0].data_file_paths, vec!["/data/a", "/data/b"]);
        assert!(discovered.discover_list[0].log_file_paths.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_capability_fails() {
        let result = SampleApp.backup(&Config::default()).await;
        assert_eq!(result.code, 1);
        assert!(result.messages[0].text.contains("does not support"));
    }
}
