//! Backup and restore workflows composed from plugin calls.
//!
//! Backup:
//!
//! ```text
//! [discover] -> quiesce -> backup -> BackupCreateCmd -> unquiesce
//!     -> backupDelete -> BackupDeleteCmd -> [archive]
//! ```
//!
//! Restore: `preRestore -> restore -> postRestore`.
//!
//! App steps are skipped when no app plugin is configured. The first failing
//! step stops the workflow, except that unquiesce always runs once quiesce
//! succeeded. All plugins are resolved before the first one is invoked.

use tracing::{info, instrument, warn};

use crate::adapters::PluginHandle;
use crate::domain::{Capability, Config, Level, PluginResult, PluginType};

use super::error::EngineError;
use super::hooks::{run_hook, Hook};
use super::sequencer::{self, Sequencer};

const DATA_FILE_PATHS: &str = "DataFilePaths";

/// Accumulates step results in order
#[derive(Debug, Default)]
struct Steps {
    result: PluginResult,
}

impl Steps {
    /// Record a step; true when the workflow may continue
    fn record(&mut self, step: PluginResult) -> bool {
        let ok = step.is_success();
        self.result.absorb(step);
        ok
    }

    fn failed(&self) -> bool {
        !self.result.is_success()
    }
}

struct Bound {
    app: Option<PluginHandle>,
    storage: PluginHandle,
    archive: Option<PluginHandle>,
}

fn bind(seq: &Sequencer<'_>, config: &Config) -> Result<Bound, EngineError> {
    let optional = |plugin_type: PluginType| -> Result<Option<PluginHandle>, EngineError> {
        if config.plugin_name(plugin_type).is_empty() {
            Ok(None)
        } else {
            seq.plugin(config, plugin_type).map(Some)
        }
    };

    Ok(Bound {
        app: optional(PluginType::App)?,
        storage: seq.plugin(config, PluginType::Storage)?,
        archive: optional(PluginType::Archive)?,
    })
}

/// Run the full backup workflow for a resolved config
#[instrument(skip_all, fields(profile = %config.profile_name, config = %config.config_name, workflow_id = %config.workflow_id))]
pub async fn backup(seq: &Sequencer<'_>, config: &Config) -> Result<PluginResult, EngineError> {
    let bound = bind(seq, config)?;
    let mut config = config.clone();
    let mut steps = Steps::default();
    steps.result.push(
        Level::Info,
        format!(
            "Starting backup workflow [{}] for {}/{} policy [{}]",
            config.workflow_id,
            config.profile_name,
            config.config_name,
            config.selected_backup_policy
        ),
    );

    if let (Some(app), true) = (&bound.app, config.auto_discovery) {
        let discovered = sequencer::discover(app, &config).await;
        let paths: Vec<String> = discovered
            .discover_list
            .iter()
            .flat_map(|d| d.data_file_paths.iter().cloned())
            .collect();
        if !steps.record(discovered.result) {
            return Ok(steps.result);
        }
        if !paths.is_empty() {
            config
                .storage_plugin_parameters
                .insert(DATA_FILE_PATHS.to_string(), paths.join(","));
        }
    }

    let quiesced = match &bound.app {
        Some(app) => {
            let quiesce = sequencer::invoke(app, Capability::Quiesce, &config).await;
            if !steps.record(quiesce) {
                return Ok(steps.result);
            }
            true
        }
        None => false,
    };

    if steps.record(sequencer::invoke(&bound.storage, Capability::Backup, &config).await) {
        steps.record(run_hook(Hook::BackupCreate, &config.backup_create_cmd).await);
    }

    if let (Some(app), true) = (&bound.app, quiesced) {
        steps.record(sequencer::invoke(app, Capability::Unquiesce, &config).await);
    }

    if steps.failed() {
        warn!(code = steps.result.code, "Backup workflow failed");
        return Ok(steps.result);
    }

    if steps.record(sequencer::invoke(&bound.storage, Capability::BackupDelete, &config).await)
        && steps.record(run_hook(Hook::BackupDelete, &config.backup_delete_cmd).await)
    {
        if let Some(archive) = &bound.archive {
            steps.record(sequencer::invoke(archive, Capability::Archive, &config).await);
        }
    }

    if steps.failed() {
        warn!(code = steps.result.code, "Backup workflow failed");
    } else {
        info!("Backup workflow completed");
        steps.result.push(
            Level::Info,
            format!("Backup workflow [{}] completed successfully", config.workflow_id),
        );
    }
    Ok(steps.result)
}

/// Run the restore workflow for a resolved config
#[instrument(skip_all, fields(profile = %config.profile_name, config = %config.config_name, workflow_id = %config.workflow_id))]
pub async fn restore(seq: &Sequencer<'_>, config: &Config) -> Result<PluginResult, EngineError> {
    let bound = bind(seq, config)?;
    let mut steps = Steps::default();
    steps.result.push(
        Level::Info,
        format!(
            "Starting restore workflow [{}] from workflow [{}]",
            config.workflow_id, config.selected_workflow_id
        ),
    );

    if let Some(app) = &bound.app {
        if !steps.record(sequencer::invoke(app, Capability::PreRestore, config).await) {
            return Ok(steps.result);
        }
    }

    if !steps.record(sequencer::invoke(&bound.storage, Capability::Restore, config).await) {
        warn!(code = steps.result.code, "Restore workflow failed");
        return Ok(steps.result);
    }

    if let Some(app) = &bound.app {
        if !steps.record(sequencer::invoke(app, Capability::PostRestore, config).await) {
            return Ok(steps.result);
        }
    }

    info!("Restore workflow completed");
    steps.result.push(
        Level::Info,
        format!("Restore workflow [{}] completed successfully", config.workflow_id),
    );
    Ok(steps.result)
}
