//! Archive plugin that copies backups into a second local directory.
//!
//! Archives keep the backup's name, so they are listed and expired with the
//! same naming scheme under `{ArchiveDestPath}/{profile}/{config}`.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use crate::adapters::Plugin;
use crate::core::naming::{backup_dir, config_dir_under, expired, list_backups, BACKUP_NAME};
use crate::domain::{
    Archives, Capability, Config, Level, PluginDescriptor, PluginResult, PluginType,
};

use super::{copy_tree, remove_entry, run_blocking};

const ARCHIVE_DEST_PATH: &str = "ArchiveDestPath";

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleArchive;

impl SampleArchive {
    pub const NAME: &'static str = "sample-archive";
}

fn archive_dir(config: &Config) -> PathBuf {
    let root = config
        .parameter(PluginType::Archive, ARCHIVE_DEST_PATH)
        .unwrap_or_default();
    config_dir_under(root, config)
}

fn backup_base_name(config: &Config) -> String {
    config
        .parameter(PluginType::Storage, BACKUP_NAME)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Plugin for SampleArchive {
    fn info(&self) -> PluginDescriptor {
        PluginDescriptor::new(
            Self::NAME,
            "Copies the newest backup of a policy to a local archive directory",
            env!("CARGO_PKG_VERSION"),
            PluginType::Archive,
            [
                Capability::Archive,
                Capability::ArchiveList,
                Capability::ArchiveDelete,
                Capability::Info,
            ],
        )
    }

    async fn set_env(&self, config: &Config) -> PluginResult {
        if config.parameter(PluginType::Archive, ARCHIVE_DEST_PATH).is_none() {
            return PluginResult::failure(format!(
                "Missing required archive parameter {}",
                ARCHIVE_DEST_PATH
            ));
        }
        PluginResult::ok().with_message(
            Level::Info,
            format!("Archive directory is [{}]", archive_dir(config).display()),
        )
    }

    async fn archive(&self, config: &Config) -> PluginResult {
        let source_dir = backup_dir(config);
        let name = backup_base_name(config);
        let policy = config.selected_backup_policy.clone();

        let listing = {
            let dir = source_dir.clone();
            run_blocking(move || list_backups(&dir, &name, &policy)).await
        };
        let newest = match listing {
            Ok(mut backups) => match backups.pop() {
                Some(newest) => newest,
                None => {
                    return PluginResult::failure(format!(
                        "No backups of policy [{}] in [{}] to archive",
                        config.selected_backup_policy,
                        source_dir.display()
                    ))
                }
            },
            Err(e) => return PluginResult::failure(format!("Couldn't list backups: {}", e)),
        };

        let target = archive_dir(config).join(&newest.name);
        let mut result = PluginResult::ok().with_message(
            Level::Info,
            format!("Archiving backup [{}] to [{}]", newest.name, target.display()),
        );

        let copied = {
            let (source, target) = (PathBuf::from(&newest.path), target.clone());
            run_blocking(move || copy_tree(&source, &target)).await
        };
        match copied {
            Ok(count) => result.push(Level::Info, format!("Archive created, {} files copied", count)),
            Err(e) => {
                result.fail(1);
                result.push(Level::Error, format!("Archive failed: {}", e));
            }
        }
        result
    }

    async fn archive_list(&self, config: &Config) -> Archives {
        let dir = archive_dir(config);
        let name = backup_base_name(config);
        let policy = config.selected_backup_policy.clone();

        let listing = {
            let dir = dir.clone();
            run_blocking(move || list_backups(&dir, &name, &policy)).await
        };
        match listing {
            Ok(archives) => Archives {
                result: PluginResult::ok(),
                archives,
            },
            Err(e) => Archives::from_result(PluginResult::failure(format!(
                "Couldn't list archives in [{}]: {}",
                dir.display(),
                e
            ))),
        }
    }

    async fn archive_delete(&self, config: &Config) -> PluginResult {
        let count = config.selected_archive_retention;
        let listing = self.archive_list(config).await;
        if !listing.result.is_success() {
            return listing.result;
        }

        if count == 0 {
            warn!(policy = %config.selected_backup_policy, "No archive retention configured, keeping all archives");
            return PluginResult::ok().with_message(
                Level::Warn,
                format!(
                    "No archive retention found for policy [{}], keeping all {} archives",
                    config.selected_backup_policy,
                    listing.archives.len()
                ),
            );
        }

        let mut result = PluginResult::ok().with_message(
            Level::Info,
            format!(
                "Archive retention for policy [{}] is {}, {} archives found",
                config.selected_backup_policy,
                count,
                listing.archives.len()
            ),
        );
        for archive in expired(&listing.archives, count) {
            let path = PathBuf::from(&archive.path);
            match run_blocking(move || remove_entry(&path)).await {
                Ok(()) => result.push(Level::Info, format!("Deleted archive [{}]", archive.name)),
                Err(e) => {
                    result.fail(1);
                    result.push(
                        Level::Error,
                        format!("Couldn't delete archive [{}]: {}", archive.name, e),
                    );
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::naming::BACKUP_DEST_PATH;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(root: &Path) -> Config {
        let mut config = Config {
            profile_name: "prod".to_string(),
            config_name: "db1".to_string(),
            selected_backup_policy: "daily".to_string(),
            selected_archive_retention: 1,
            ..Default::default()
        };
        config.storage_plugin_parameters.insert(
            BACKUP_DEST_PATH.to_string(),
            root.join("backups").to_string_lossy().into_owned(),
        );
        config
            .storage_plugin_parameters
            .insert(BACKUP_NAME.to_string(), "db1".to_string());
        config.archive_plugin_parameters.insert(
            ARCHIVE_DEST_PATH.to_string(),
            root.join("archives").to_string_lossy().into_owned(),
        );
        config
    }

    #[tokio::test]
    async fn test_archive_copies_newest_and_expires_old() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        for (wf, ts) in [("1", 100), ("2", 200)] {
            let dir = backup_dir(&config).join(format!("db1_daily_{}_{}", wf, ts));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("dump.sql"), wf).unwrap();
        }

        let result = SampleArchive.archive(&config).await;
        assert!(result.is_success(), "{:?}", result);
        let archived = archive_dir(&config).join("db1_daily_2_200/dump.sql");
        assert_eq!(std::fs::read_to_string(archived).unwrap(), "2");

        std::fs::create_dir_all(archive_dir(&config).join("db1_daily_0_50")).unwrap();
        let result = SampleArchive.archive_delete(&config).await;
        assert!(result.is_success());

        let remaining = SampleArchive.archive_list(&config).await.archives;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "db1_daily_2_200");
    }

    #[tokio::test]
    async fn test_archive_without_backups_fails() {
        let temp = TempDir::new().unwrap();
        let result = SampleArchive.archive(&config(temp.path())).await;
        assert_eq!(result.code, 1);
    }
}
