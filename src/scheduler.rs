//! Cron trigger dispatcher.
//!
//! A schedule is a file `{config_dir}/{profile}/{config}/{policy}.cron`
//! holding one cron expression. Five-field expressions are accepted and run
//! at second 0. Each firing starts a backup workflow on its own task with
//! the fire time (unix seconds) as workflow id.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::{Engine, EngineError};

/// One scheduled backup policy
#[derive(Debug, Clone)]
pub struct CronSchedule {
    pub profile: String,
    pub config: String,
    pub policy: String,
    pub expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn new(
        profile: impl Into<String>,
        config: impl Into<String>,
        policy: impl Into<String>,
        expression: &str,
    ) -> Result<Self, cron::error::Error> {
        let expression = normalize(expression);
        let schedule = cron::Schedule::from_str(&expression)?;
        Ok(Self {
            profile: profile.into(),
            config: config.into(),
            policy: policy.into(),
            expression,
            schedule,
        })
    }

    /// Next fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Prefix a seconds field onto classic five-field expressions
fn normalize(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    }
}

/// Read every `*.cron` file under the config directory.
///
/// Unparsable expressions are logged and skipped.
pub fn load_schedules(config_dir: &Path) -> Result<Vec<CronSchedule>> {
    let mut schedules = Vec::new();
    if !config_dir.exists() {
        return Ok(schedules);
    }

    for profile in read_dirs(config_dir)? {
        for config in read_dirs(&config_dir.join(&profile))? {
            let dir = config_dir.join(&profile).join(&config);
            for entry in std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read {}", dir.display()))?
            {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("cron") {
                    continue;
                }
                let Some(policy) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };

                let expression = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                match CronSchedule::new(&profile, &config, policy, &expression) {
                    Ok(schedule) => schedules.push(schedule),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping invalid cron schedule"),
                }
            }
        }
    }

    schedules.sort_by(|a, b| {
        (&a.profile, &a.config, &a.policy).cmp(&(&b.profile, &b.config, &b.policy))
    });
    Ok(schedules)
}

fn read_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Fires backup workflows on schedule
pub struct CronDispatcher {
    engine: Arc<Engine>,
    schedules: Vec<CronSchedule>,
}

impl CronDispatcher {
    pub fn new(engine: Arc<Engine>, schedules: Vec<CronSchedule>) -> Self {
        Self { engine, schedules }
    }

    /// Start one timer task per schedule
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        info!(schedules = self.schedules.len(), "Starting cron dispatcher");
        self.schedules
            .into_iter()
            .map(|schedule| tokio::spawn(run_schedule(Arc::clone(&self.engine), schedule)))
            .collect()
    }
}

async fn run_schedule(engine: Arc<Engine>, schedule: CronSchedule) {
    info!(
        profile = %schedule.profile,
        config = %schedule.config,
        policy = %schedule.policy,
        expression = %schedule.expression,
        "Schedule registered"
    );

    let mut after = Utc::now();
    while let Some(next) = schedule.next_after(after) {
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        after = next;

        tokio::spawn(fire(Arc::clone(&engine), schedule.clone(), next));
    }
    warn!(expression = %schedule.expression, "Schedule has no further fire times");
}

/// Run one firing and log its outcome
pub async fn fire(engine: Arc<Engine>, schedule: CronSchedule, at: DateTime<Utc>) {
    let workflow_id = at.timestamp().to_string();
    let outcome = engine
        .start_backup_workflow(
            &schedule.profile,
            &schedule.config,
            &schedule.policy,
            Some(workflow_id.clone()),
        )
        .await;

    match outcome {
        Ok(result) if result.is_success() => info!(%workflow_id, "Scheduled backup completed"),
        Ok(result) => error!(%workflow_id, code = result.code, "Scheduled backup failed"),
        Err(EngineError::DuplicateWorkflow(identity)) => {
            warn!(workflow = %identity, "Scheduled backup skipped, already running")
        }
        Err(e) => error!(%workflow_id, error = %e, "Scheduled backup could not start"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_five_field_expression_is_accepted() {
        let schedule = CronSchedule::new("prod", "db1", "daily", "30 2 * * *").unwrap();
        assert_eq!(schedule.expression, "0 30 2 * * *");

        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        assert!(CronSchedule::new("prod", "db1", "daily", "not a cron").is_err());
    }

    #[test]
    fn test_load_schedules_from_config_tree() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("prod/db1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("daily.cron"), "0 0 1 * * *\n").unwrap();
        std::fs::write(dir.join("weekly.cron"), "garbage").unwrap();
        std::fs::write(dir.join("db1.conf"), "StoragePlugin: sample-storage\n").unwrap();

        let schedules = load_schedules(temp.path()).unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].profile, "prod");
        assert_eq!(schedules[0].config, "db1");
        assert_eq!(schedules[0].policy, "daily");
    }

    #[test]
    fn test_missing_config_dir_has_no_schedules() {
        let temp = TempDir::new().unwrap();
        assert!(load_schedules(&temp.path().join("absent")).unwrap().is_empty());
    }
}
