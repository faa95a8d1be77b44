//! Engine entrypoints shared by every trigger source.
//!
//! HTTP handlers, the cron dispatcher and the CLI all go through one
//! [`Engine`]: resolve the config, take a workflow slot, run, release.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{NativeRegistry, PluginGateway};
use crate::config::ServerSettings;
use crate::domain::{
    Archives, Backups, Capability, Config, PluginInfoResult, PluginResult, PluginType, Status,
};

use super::error::EngineError;
use super::guard::{WorkflowGuard, WorkflowIdentity, WorkflowKind};
use super::resolver::ConfigResolver;
use super::sequencer::Sequencer;
use super::workflow;

/// Main backup/restore engine
#[derive(Debug)]
pub struct Engine {
    resolver: ConfigResolver,
    gateway: PluginGateway,
    guard: Arc<WorkflowGuard>,
    debug: bool,
}

impl Engine {
    /// Create an engine for the given settings and in-process plugins
    pub fn new(settings: &ServerSettings, native: NativeRegistry) -> Self {
        Self::from_parts(
            ConfigResolver::new(&settings.config_dir),
            PluginGateway::new(&settings.plugin_dir, native).with_timeout(settings.plugin_timeout),
            settings.debug,
        )
    }

    pub fn from_parts(resolver: ConfigResolver, gateway: PluginGateway, debug: bool) -> Self {
        Self {
            resolver,
            gateway,
            guard: Arc::new(WorkflowGuard::new()),
            debug,
        }
    }

    pub fn guard(&self) -> &Arc<WorkflowGuard> {
        &self.guard
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn gateway(&self) -> &PluginGateway {
        &self.gateway
    }

    fn sequencer(&self) -> Sequencer<'_> {
        Sequencer::new(&self.gateway)
    }

    /// Resolve a config, logging it when debug is on
    pub fn resolve(&self, profile: &str, config: &str, policy: &str) -> Result<Config, EngineError> {
        let resolved = self.resolver.resolve(profile, config, policy)?;
        if self.debug {
            debug!(config = ?resolved, "Resolved config");
        }
        Ok(resolved)
    }

    /// Run the backup workflow of a profile/config for a policy.
    ///
    /// Without an explicit `workflow_id` a fresh one is generated.
    #[instrument(skip(self), fields(workflow_id))]
    pub async fn start_backup_workflow(
        &self,
        profile: &str,
        config: &str,
        policy: &str,
        workflow_id: Option<String>,
    ) -> Result<PluginResult, EngineError> {
        let mut resolved = self.resolve(profile, config, policy)?;
        let workflow_id = workflow_id.unwrap_or_else(generate_workflow_id);
        tracing::Span::current().record("workflow_id", workflow_id.as_str());

        let _permit = self.guard.admit(
            WorkflowIdentity::new(profile, config, workflow_id.as_str()),
            WorkflowKind::Backup,
        )?;
        stamp(&mut resolved, workflow_id);

        info!("Starting backup workflow");
        workflow::backup(&self.sequencer(), &resolved).await
    }

    /// Restore the backup written by `selected_workflow_id`
    #[instrument(skip(self), fields(workflow_id))]
    pub async fn start_restore_workflow(
        &self,
        profile: &str,
        config: &str,
        policy: &str,
        selected_workflow_id: &str,
        workflow_id: Option<String>,
    ) -> Result<PluginResult, EngineError> {
        let mut resolved = self.resolve(profile, config, policy)?;
        let workflow_id = workflow_id.unwrap_or_else(generate_workflow_id);
        tracing::Span::current().record("workflow_id", workflow_id.as_str());

        let _permit = self.guard.admit(
            WorkflowIdentity::new(profile, config, workflow_id.as_str()),
            WorkflowKind::Restore,
        )?;
        stamp(&mut resolved, workflow_id);
        resolved.selected_workflow_id = selected_workflow_id.to_string();

        info!("Starting restore workflow");
        workflow::restore(&self.sequencer(), &resolved).await
    }

    // Single-capability entrypoints. The config arrives fully formed (for
    // example as a request body), so no resolution or guard is involved.

    pub async fn backup(&self, config: &Config) -> Result<PluginResult, EngineError> {
        self.storage_call(Capability::Backup, config).await
    }

    pub async fn restore(&self, config: &Config) -> Result<PluginResult, EngineError> {
        self.storage_call(Capability::Restore, config).await
    }

    pub async fn backup_delete(&self, config: &Config) -> Result<PluginResult, EngineError> {
        self.storage_call(Capability::BackupDelete, config).await
    }

    pub async fn backup_list(&self, config: &Config) -> Result<Backups, EngineError> {
        self.sequencer().backup_list(config).await
    }

    pub async fn archive(&self, config: &Config) -> Result<PluginResult, EngineError> {
        self.sequencer()
            .run(PluginType::Archive, Capability::Archive, config)
            .await
    }

    pub async fn archive_delete(&self, config: &Config) -> Result<PluginResult, EngineError> {
        self.sequencer()
            .run(PluginType::Archive, Capability::ArchiveDelete, config)
            .await
    }

    pub async fn archive_list(&self, config: &Config) -> Result<Archives, EngineError> {
        self.sequencer().archive_list(config).await
    }

    async fn storage_call(&self, capability: Capability, config: &Config) -> Result<PluginResult, EngineError> {
        self.sequencer()
            .run(PluginType::Storage, capability, config)
            .await
    }

    /// Describe a plugin
    #[instrument(skip(self))]
    pub async fn plugin_info(&self, name: &str, plugin_type: PluginType) -> Result<PluginInfoResult, EngineError> {
        let handle = self.gateway.resolve(name, plugin_type)?;
        let info = handle.info().await;
        if !info.result.is_success() {
            warn!(code = info.result.code, "Plugin info failed");
        }
        Ok(info)
    }

    /// Names of all plugins of a type
    pub fn plugin_list(&self, plugin_type: PluginType) -> Result<Vec<String>, EngineError> {
        self.gateway.list(plugin_type)
    }

    pub fn status(&self) -> Status {
        Status {
            msg: "OK".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            running_workflows: self
                .guard
                .running()
                .into_iter()
                .map(|(identity, _)| identity.to_string())
                .collect(),
        }
    }
}

fn stamp(config: &mut Config, workflow_id: String) {
    config.workflow_id = workflow_id;
    config.workflow_timestamp = Utc::now().timestamp();
}

/// Numeric id, so it never contains the `_` used in backup names
pub fn generate_workflow_id() -> String {
    (Uuid::new_v4().as_u128() % 1_000_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_numeric() {
        for _ in 0..32 {
            let id = generate_workflow_id();
            assert!(!id.is_empty());
            assert!(id.chars().all(|c| c.is_ascii_digit()), "{}", id);
        }
    }

    #[test]
    fn test_status_lists_running_workflows() {
        let engine = Engine::from_parts(
            ConfigResolver::new("/nonexistent"),
            PluginGateway::new("/nonexistent", NativeRegistry::new()),
            false,
        );
        let identity = WorkflowIdentity::new("prod", "db1", "9");
        let _permit = engine
            .guard()
            .admit(identity, WorkflowKind::Backup)
            .unwrap();

        let status = engine.status();
        assert_eq!(status.msg, "OK");
        assert_eq!(status.running_workflows, vec!["prod/db1/9"]);
    }

    #[tokio::test]
    async fn test_unknown_config_fails_fast() {
        let temp = tempfile::TempDir::new().unwrap();
        let engine = Engine::from_parts(
            ConfigResolver::new(temp.path()),
            PluginGateway::new(temp.path(), NativeRegistry::builtin()),
            true,
        );

        let outcome = engine.start_backup_workflow("prod", "db1", "daily", None).await;
        assert!(matches!(outcome, Err(EngineError::ConfigNotFound { .. })));
        assert!(engine.guard().running().is_empty());
    }
}
