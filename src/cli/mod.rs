//! Command-line interface for fossil.
//!
//! Provides commands for serving the HTTP API with cron triggers, running
//! backup and restore workflows directly, and inspecting plugins and
//! settings.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::adapters::NativeRegistry;
use crate::config::ServerSettings;
use crate::core::Engine;
use crate::domain::{PluginResult, PluginType};
use crate::scheduler::{load_schedules, CronDispatcher};
use crate::server;

/// fossil - Plugin-driven backup and restore workflow engine
#[derive(Parser, Debug)]
#[command(name = "fossil")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server and cron dispatcher
    Serve {
        /// Port to listen on (overrides settings)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not start scheduled backups
        #[arg(long)]
        no_cron: bool,
    },

    /// Run a backup workflow
    Backup {
        profile: String,
        config: String,
        policy: String,

        /// Workflow id (generated if not specified)
        #[arg(long)]
        id: Option<String>,
    },

    /// Restore the backup written by a workflow
    Restore {
        profile: String,
        config: String,
        policy: String,

        /// Workflow whose backup to restore
        workflow_id: String,

        /// Id of the restore workflow itself
        #[arg(long)]
        id: Option<String>,
    },

    /// List backups of a config for a policy
    Backups {
        profile: String,
        config: String,
        policy: String,
    },

    /// List available plugins of a type
    Plugins {
        #[arg(value_enum)]
        plugin_type: PluginTypeArg,
    },

    /// Show a plugin's descriptor
    PluginInfo {
        name: String,

        #[arg(value_enum)]
        plugin_type: PluginTypeArg,
    },

    /// Show resolved settings (debug)
    Config,
}

/// Plugin type for CLI (maps to PluginType)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PluginTypeArg {
    App,
    Storage,
    Archive,
}

impl From<PluginTypeArg> for PluginType {
    fn from(t: PluginTypeArg) -> Self {
        match t {
            PluginTypeArg::App => PluginType::App,
            PluginTypeArg::Storage => PluginType::Storage,
            PluginTypeArg::Archive => PluginType::Archive,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = ServerSettings::load()?;
        let json = self.json;

        if let Commands::Config = self.command {
            show_config(&settings);
            return Ok(());
        }

        let engine = Arc::new(Engine::new(&settings, NativeRegistry::builtin()));

        match self.command {
            Commands::Serve { port, no_cron } => {
                serve(engine, &settings, port.unwrap_or(settings.port), no_cron).await
            }
            Commands::Backup {
                profile,
                config,
                policy,
                id,
            } => {
                let result = engine
                    .start_backup_workflow(&profile, &config, &policy, id)
                    .await?;
                report(&result, json)
            }
            Commands::Restore {
                profile,
                config,
                policy,
                workflow_id,
                id,
            } => {
                let result = engine
                    .start_restore_workflow(&profile, &config, &policy, &workflow_id, id)
                    .await?;
                report(&result, json)
            }
            Commands::Backups {
                profile,
                config,
                policy,
            } => list_backups(&engine, &profile, &config, &policy, json).await,
            Commands::Plugins { plugin_type } => {
                let names = engine.plugin_list(plugin_type.into())?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&names)?);
                } else if names.is_empty() {
                    println!("No plugins found");
                } else {
                    for name in names {
                        println!("{}", name);
                    }
                }
                Ok(())
            }
            Commands::PluginInfo { name, plugin_type } => {
                let info = engine.plugin_info(&name, plugin_type.into()).await?;
                match (&info.plugin, json) {
                    (Some(plugin), false) => {
                        println!("Name:         {}", plugin.name);
                        println!("Type:         {}", plugin.plugin_type);
                        println!("Version:      {}", plugin.version);
                        println!("Description:  {}", plugin.description);
                        let caps: Vec<&str> = plugin.capabilities.iter().map(|c| c.as_str()).collect();
                        println!("Capabilities: {}", caps.join(", "));
                        Ok(())
                    }
                    (Some(_), true) => {
                        println!("{}", serde_json::to_string_pretty(&info)?);
                        Ok(())
                    }
                    (None, _) => report(&info.result, json),
                }
            }
            Commands::Config => Ok(()),
        }
    }
}

/// Print a result and fail when its code is nonzero
fn report(result: &PluginResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        for message in &result.messages {
            println!("{}", message);
        }
    }

    if !result.is_success() {
        anyhow::bail!("Operation failed with code {}", result.code);
    }
    Ok(())
}

async fn list_backups(engine: &Engine, profile: &str, config: &str, policy: &str, json: bool) -> Result<()> {
    let resolved = engine.resolve(profile, config, policy)?;
    let backups = engine.backup_list(&resolved).await?;
    if !backups.result.is_success() {
        return report(&backups.result, json);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
        return Ok(());
    }
    if backups.backups.is_empty() {
        println!("No backups found");
        return Ok(());
    }

    println!("{:<40} {:<12} {:<14} {:<20}", "NAME", "POLICY", "WORKFLOW", "CREATED");
    println!("{}", "-".repeat(88));
    for backup in &backups.backups {
        let created = chrono::DateTime::from_timestamp(backup.epoch, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| backup.epoch.to_string());
        println!(
            "{:<40} {:<12} {:<14} {:<20}",
            backup.name, backup.policy, backup.workflow_id, created
        );
    }
    Ok(())
}

async fn serve(engine: Arc<Engine>, settings: &ServerSettings, port: u16, no_cron: bool) -> Result<()> {
    settings.ensure_dirs()?;
    info!(
        config_dir = %settings.config_dir.display(),
        data_dir = %settings.data_dir.display(),
        plugin_dir = %settings.plugin_dir.display(),
        "Using directories"
    );

    if !no_cron {
        let schedules = load_schedules(&settings.config_dir).with_context(|| {
            format!("Failed to load schedules from {}", settings.config_dir.display())
        })?;
        CronDispatcher::new(Arc::clone(&engine), schedules).spawn();
    } else {
        info!("Cron dispatcher disabled");
    }

    server::serve(engine, port).await
}

/// Show the resolved settings (for debugging)
fn show_config(settings: &ServerSettings) {
    println!("Fossil Settings");
    println!();
    println!(
        "Settings file: {}",
        settings
            .settings_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Configs: {}", settings.config_dir.display());
    println!("  Data:    {}", settings.data_dir.display());
    println!("  Plugins: {}", settings.plugin_dir.display());
    println!();
    println!("Server:");
    println!("  Port:  {}", settings.port);
    println!("  Debug: {}", settings.debug);
    println!();
    println!("Plugins:");
    match settings.plugin_timeout {
        Some(limit) => println!("  Timeout: {}s", limit.as_secs()),
        None => println!("  Timeout: (none)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup_command() {
        let cli = Cli::try_parse_from(["fossil", "backup", "prod", "db1", "daily", "--id", "7"]).unwrap();
        match cli.command {
            Commands::Backup { profile, config, policy, id } => {
                assert_eq!((profile.as_str(), config.as_str(), policy.as_str()), ("prod", "db1", "daily"));
                assert_eq!(id.as_deref(), Some("7"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_plugin_type() {
        let cli = Cli::try_parse_from(["fossil", "--json", "plugins", "storage"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Plugins { plugin_type: PluginTypeArg::Storage }
        ));
        assert!(Cli::try_parse_from(["fossil", "plugins", "database"]).is_err());
    }

    #[test]
    fn test_report_fails_on_nonzero_code() {
        assert!(report(&PluginResult::ok(), false).is_ok());
        assert!(report(&PluginResult::failure("boom"), false).is_err());
    }
}
