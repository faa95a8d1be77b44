//! Backup naming, path derivation and retention lookup.
//!
//! A backup is a directory entry named
//! `{BackupName}_{Policy}_{WorkflowId}_{Timestamp}` under
//! `{BackupDestPath}/{profile}/{config}`. Nothing else records it.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::domain::{Backup, Config, PluginType, Retention};

/// Storage parameter holding the backup root
pub const BACKUP_DEST_PATH: &str = "BackupDestPath";

/// Storage parameter holding the backup base name
pub const BACKUP_NAME: &str = "BackupName";

/// `join("_", name, policy, workflow_id, timestamp)`
pub fn backup_name(name: &str, policy: &str, workflow_id: &str, timestamp: &str) -> String {
    format!("{}_{}_{}_{}", name, policy, workflow_id, timestamp)
}

/// The four tokens of a backup name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameParts<'a> {
    pub name: &'a str,
    pub policy: &'a str,
    pub workflow_id: &'a str,
    pub timestamp: &'a str,
}

/// Split a backup name of a known base name and policy.
///
/// The base name may itself contain `_`, so the entry is matched on the
/// `{name}_{policy}_` prefix and only the remainder is split. The workflow
/// id is the token before the last `_`.
pub fn split_backup_name<'a>(full: &'a str, name: &'a str, policy: &'a str) -> Option<NameParts<'a>> {
    let rest = full
        .strip_prefix(name)?
        .strip_prefix('_')?
        .strip_prefix(policy)?
        .strip_prefix('_')?;
    let (workflow_id, timestamp) = rest.split_once('_')?;
    if workflow_id.is_empty() || timestamp.is_empty() || timestamp.contains('_') {
        return None;
    }
    Some(NameParts {
        name,
        policy,
        workflow_id,
        timestamp,
    })
}

/// `{root}/{profile}/{config}`
pub fn config_dir_under(root: &str, config: &Config) -> PathBuf {
    Path::new(root)
        .join(&config.profile_name)
        .join(&config.config_name)
}

/// Directory holding all backups of a config
pub fn backup_dir(config: &Config) -> PathBuf {
    let root = config
        .parameter(PluginType::Storage, BACKUP_DEST_PATH)
        .unwrap_or_default();
    config_dir_under(root, config)
}

/// Name of the backup the current workflow produces
pub fn current_backup_name(config: &Config) -> String {
    backup_name(
        config
            .parameter(PluginType::Storage, BACKUP_NAME)
            .unwrap_or_default(),
        &config.selected_backup_policy,
        &config.workflow_id,
        &config.workflow_timestamp.to_string(),
    )
}

/// Full path of the backup the current workflow produces
pub fn backup_path(config: &Config) -> PathBuf {
    backup_dir(config).join(current_backup_name(config))
}

/// Locate the backup written by `SelectedWorkflowId`.
///
/// Matches any entry containing `{BackupName}_{Policy}_{SelectedWorkflowId}`
/// regardless of timestamp. Entries are scanned in name order. When several
/// match, entries where the workflow id is a whole token are preferred and
/// the first one wins; the ambiguity is logged.
pub fn restore_source(config: &Config) -> std::io::Result<Option<PathBuf>> {
    let dir = backup_dir(config);
    let needle = format!(
        "{}_{}_{}",
        config
            .parameter(PluginType::Storage, BACKUP_NAME)
            .unwrap_or_default(),
        config.selected_backup_policy,
        config.selected_workflow_id
    );

    let mut names = list_names(&dir)?;
    names.sort();

    let candidates: Vec<&String> = names.iter().filter(|n| n.contains(&needle)).collect();
    if candidates.len() > 1 {
        warn!(
            search = %needle,
            candidates = ?candidates,
            "Multiple backups match restore search string"
        );
    }

    let whole_token = format!("{}_", needle);
    let chosen = candidates
        .iter()
        .find(|n| n.contains(&whole_token))
        .or_else(|| candidates.first());

    Ok(chosen.map(|name| dir.join(name.as_str())))
}

/// Find the retention rule for a policy (first exact name match)
pub fn find_retention<'a>(policy: &str, retentions: &'a [Retention]) -> Option<&'a Retention> {
    retentions.iter().find(|r| r.name == policy)
}

/// Retention count for a policy; 0 when no rule matches.
///
/// Callers treat 0 as "retain indefinitely".
pub fn retention_count(policy: &str, retentions: &[Retention]) -> u32 {
    find_retention(policy, retentions)
        .map(|r| r.count)
        .unwrap_or(0)
}

/// List backups of one name/policy pair in `dir`, oldest first.
///
/// A missing directory is an empty listing. Entries whose name does not
/// follow the naming scheme are ignored.
pub fn list_backups(dir: &Path, name: &str, policy: &str) -> std::io::Result<Vec<Backup>> {
    let mut backups: Vec<Backup> = list_names(dir)?
        .into_iter()
        .filter_map(|entry| {
            let parts = split_backup_name(&entry, name, policy)?;
            let epoch = parts.timestamp.parse::<i64>().ok()?;
            Some(Backup {
                policy: parts.policy.to_string(),
                workflow_id: parts.workflow_id.to_string(),
                epoch,
                path: dir.join(&entry).to_string_lossy().into_owned(),
                name: entry,
            })
        })
        .collect();

    backups.sort_by(|a, b| a.epoch.cmp(&b.epoch).then_with(|| a.name.cmp(&b.name)));
    Ok(backups)
}

/// The backups that fall outside a retention of `count`, oldest first.
///
/// A count of 0 keeps everything.
pub fn expired(backups: &[Backup], count: u32) -> Vec<Backup> {
    let keep = count as usize;
    if keep == 0 || backups.len() <= keep {
        return Vec::new();
    }

    let mut sorted = backups.to_vec();
    sorted.sort_by(|a, b| a.epoch.cmp(&b.epoch).then_with(|| a.name.cmp(&b.name)));
    sorted.truncate(backups.len() - keep);
    sorted
}

fn list_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
