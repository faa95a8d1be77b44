//! Local directory storage.
//!
//! Parameters:
//!
//! | key              | meaning                                        |
//! |------------------|------------------------------------------------|
//! | `BackupDestPath` | root directory holding all backups (required)  |
//! | `BackupName`     | base name of every backup (required)           |
//! | `DataFilePaths`  | comma separated files/directories to back up   |
//! | `RestorePath`    | directory a restore copies into                |

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::adapters::Plugin;
use crate::core::naming::{
    backup_dir, backup_path, list_backups, expired, restore_source, BACKUP_DEST_PATH, BACKUP_NAME,
};
use crate::domain::{Backups, Capability, Config, Level, PluginDescriptor, PluginResult, PluginType};

use super::{copy_tree, remove_entry, run_blocking, split_list};

const DATA_FILE_PATHS: &str = "DataFilePaths";
const RESTORE_PATH: &str = "RestorePath";

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleStorage;

impl SampleStorage {
    pub const NAME: &'static str = "sample-storage";
}

fn param<'a>(config: &'a Config, key: &str) -> Option<&'a str> {
    config.parameter(PluginType::Storage, key)
}

#[async_trait]
impl Plugin for SampleStorage {
    fn info(&self) -> PluginDescriptor {
        PluginDescriptor::new(
            Self::NAME,
            "Stores backups as directory copies on a local filesystem",
            env!("CARGO_PKG_VERSION"),
            PluginType::Storage,
            [
                Capability::Backup,
                Capability::BackupList,
                Capability::BackupDelete,
                Capability::Restore,
                Capability::Info,
            ],
        )
    }

    async fn set_env(&self, config: &Config) -> PluginResult {
        for key in [BACKUP_DEST_PATH, BACKUP_NAME] {
            if param(config, key).is_none() {
                return PluginResult::failure(format!("Missing required storage parameter {}", key));
            }
        }

        PluginResult::ok().with_message(
            Level::Info,
            format!("Backup directory is [{}]", backup_dir(config).display()),
        )
    }

    async fn backup(&self, config: &Config) -> PluginResult {
        let dest = backup_path(config);
        let sources = param(config, DATA_FILE_PATHS)
            .map(split_list)
            .unwrap_or_default();

        let mut result = PluginResult::ok()
            .with_message(Level::Info, format!("Creating backup [{}]", dest.display()));
        if sources.is_empty() {
            result.push(Level::Warn, "No DataFilePaths configured, backup will be empty");
        }

        let target = dest.clone();
        let copied = run_blocking(move || {
            std::fs::create_dir_all(&target)?;
            let mut copied = 0;
            for source in &sources {
                let source = Path::new(source);
                let leaf = source.file_name().unwrap_or(source.as_os_str());
                copied += copy_tree(source, &target.join(leaf))?;
            }
            Ok(copied)
        })
        .await;

        match copied {
            Ok(count) => {
                info!(backup = %dest.display(), files = count, "Backup created");
                result.push(
                    Level::Info,
                    format!("Backup [{}] created, {} files copied", dest.display(), count),
                );
            }
            Err(e) => {
                result.fail(1);
                result.push(Level::Error, format!("Backup [{}] failed: {}", dest.display(), e));
            }
        }
        result
    }

    async fn backup_list(&self, config: &Config) -> Backups {
        let dir = backup_dir(config);
        let name = param(config, BACKUP_NAME).unwrap_or_default().to_string();
        let policy = config.selected_backup_policy.clone();

        let listing = {
            let dir = dir.clone();
            run_blocking(move || list_backups(&dir, &name, &policy)).await
        };

        match listing {
            Ok(backups) => Backups {
                result: PluginResult::ok(),
                backups,
            },
            Err(e) => Backups::from_result(PluginResult::failure(format!(
                "Couldn't list backups in [{}]: {}",
                dir.display(),
                e
            ))),
        }
    }

    async fn backup_delete(&self, config: &Config) -> PluginResult {
        let count = config.selected_backup_retention;
        let policy = &config.selected_backup_policy;
        let listing = self.backup_list(config).await;
        if !listing.result.is_success() {
            return listing.result;
        }

        if count == 0 {
            warn!(%policy, "No backup retention configured, keeping all backups");
            return PluginResult::ok().with_message(
                Level::Warn,
                format!(
                    "No backup retention found for policy [{}], keeping all {} backups",
                    policy,
                    listing.backups.len()
                ),
            );
        }

        let doomed = expired(&listing.backups, count);
        let mut result = PluginResult::ok().with_message(
            Level::Info,
            format!(
                "Backup retention for policy [{}] is {}, {} backups found",
                policy,
                count,
                listing.backups.len()
            ),
        );

        for backup in doomed {
            let path = PathBuf::from(&backup.path);
            let removal = {
                let path = path.clone();
                run_blocking(move || remove_entry(&path)).await
            };
            match removal {
                Ok(()) => result.push(Level::Info, format!("Deleted backup [{}]", backup.name)),
                Err(e) => {
                    result.fail(1);
                    result.push(
                        Level::Error,
                        format!("Couldn't delete backup [{}]: {}", path.display(), e),
                    );
                }
            }
        }
        result
    }

    async fn restore(&self, config: &Config) -> PluginResult {
        let Some(restore_path) = param(config, RESTORE_PATH).map(PathBuf::from) else {
            return PluginResult::failure(format!("Missing required storage parameter {}", RESTORE_PATH));
        };

        let located = {
            let config = config.clone();
            run_blocking(move || restore_source(&config)).await
        };
        let source = match located {
            Ok(Some(source)) => source,
            Ok(None) => {
                return PluginResult::failure(format!(
                    "No backup found for workflow [{}] of policy [{}]",
                    config.selected_workflow_id, config.selected_backup_policy
                ))
            }
            Err(e) => return PluginResult::failure(format!("Couldn't search backups: {}", e)),
        };

        let mut result = PluginResult::ok().with_message(
            Level::Info,
            format!(
                "Restoring [{}] to [{}]",
                source.display(),
                restore_path.display()
            ),
        );

        let copied = {
            let (source, restore_path) = (source.clone(), restore_path.clone());
            run_blocking(move || copy_tree(&source, &restore_path)).await
        };
        match copied {
            Ok(count) => result.push(Level::Info, format!("Restore complete, {} files copied", count)),
            Err(e) => {
                result.fail(1);
                result.push(Level::Error, format!("Restore failed: {}", e));
            }
        }
        result
    }
}
