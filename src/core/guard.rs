//! In-memory guard against duplicate concurrent workflows.
//!
//! One instance is built at process start and shared by every trigger
//! source (HTTP handlers and the cron dispatcher). Admission check and
//! insert happen under a single lock. Nothing is persisted.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::EngineError;

/// Identity of a workflow: profile, config and workflow id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowIdentity {
    pub profile: String,
    pub config: String,
    pub workflow_id: String,
}

impl WorkflowIdentity {
    pub fn new(
        profile: impl Into<String>,
        config: impl Into<String>,
        workflow_id: impl Into<String>,
    ) -> Self {
        Self {
            profile: profile.into(),
            config: config.into(),
            workflow_id: workflow_id.into(),
        }
    }
}

impl fmt::Display for WorkflowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.profile, self.config, self.workflow_id)
    }
}

/// What kind of workflow holds a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Backup,
    Restore,
}

/// Status token stored for a running workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub kind: WorkflowKind,
    pub started_at: DateTime<Utc>,
}

/// Process-wide registry of running workflows
#[derive(Debug, Default)]
pub struct WorkflowGuard {
    running: Mutex<HashMap<WorkflowIdentity, WorkflowStatus>>,
}

impl WorkflowGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkflowIdentity, WorkflowStatus>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit a workflow, or reject it if the identity is already running.
    ///
    /// Never waits: a rejection returns immediately.
    pub fn try_start(
        &self,
        identity: &WorkflowIdentity,
        kind: WorkflowKind,
    ) -> Result<(), EngineError> {
        let mut running = self.lock();
        if running.contains_key(identity) {
            warn!(workflow = %identity, "Rejected duplicate workflow");
            return Err(EngineError::DuplicateWorkflow(identity.clone()));
        }

        running.insert(
            identity.clone(),
            WorkflowStatus {
                kind,
                started_at: Utc::now(),
            },
        );
        info!(workflow = %identity, ?kind, "Workflow admitted");
        Ok(())
    }

    /// Release a slot regardless of how the workflow ended
    pub fn finish(&self, identity: &WorkflowIdentity) {
        if self.lock().remove(identity).is_some() {
            info!(workflow = %identity, "Workflow finished");
        }
    }

    /// Admit a workflow and tie its release to the returned permit
    pub fn admit(
        self: &Arc<Self>,
        identity: WorkflowIdentity,
        kind: WorkflowKind,
    ) -> Result<WorkflowPermit, EngineError> {
        self.try_start(&identity, kind)?;
        Ok(WorkflowPermit {
            guard: Arc::clone(self),
            identity,
        })
    }

    pub fn is_running(&self, identity: &WorkflowIdentity) -> bool {
        self.lock().contains_key(identity)
    }

    /// Snapshot of running workflows, sorted by identity
    pub fn running(&self) -> Vec<(WorkflowIdentity, WorkflowStatus)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Holds a workflow slot; dropping it calls [`WorkflowGuard::finish`].
#[derive(Debug)]
pub struct WorkflowPermit {
    guard: Arc<WorkflowGuard>,
    identity: WorkflowIdentity,
}

impl WorkflowPermit {
    pub fn identity(&self) -> &WorkflowIdentity {
        &self.identity
    }
}

impl Drop for WorkflowPermit {
    fn drop(&mut self) {
        self.guard.finish(&self.identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_is_rejected_until_finish() {
        let guard = WorkflowGuard::new();
        let id = WorkflowIdentity::new("prod", "db1", "1");

        assert!(guard.try_start(&id, WorkflowKind::Backup).is_ok());
        assert!(matches!(
            guard.try_start(&id, WorkflowKind::Backup),
            Err(EngineError::DuplicateWorkflow(_))
        ));

        guard.finish(&id);
        assert!(guard.try_start(&id, WorkflowKind::Backup).is_ok());
    }

    #[test]
    fn test_distinct_identities_do_not_conflict() {
        let guard = WorkflowGuard::new();
        assert!(guard
            .try_start(&WorkflowIdentity::new("prod", "db1", "1"), WorkflowKind::Backup)
            .is_ok());
        assert!(guard
            .try_start(&WorkflowIdentity::new("prod", "db1", "2"), WorkflowKind::Backup)
            .is_ok());
        assert!(guard
            .try_start(&WorkflowIdentity::new("prod", "db2", "1"), WorkflowKind::Restore)
            .is_ok());
        assert_eq!(guard.running().len(), 3);
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let guard = Arc::new(WorkflowGuard::new());
        let id = WorkflowIdentity::new("prod", "db1", "1");

        {
            let permit = guard.admit(id.clone(), WorkflowKind::Backup).unwrap();
            assert_eq!(permit.identity(), &id);
            assert!(guard.is_running(&id));
        }

        assert!(!guard.is_running(&id));
    }

    #[test]
    fn test_finish_unknown_identity_is_noop() {
        let guard = WorkflowGuard::new();
        guard.finish(&WorkflowIdentity::new("a", "b", "c"));
        assert!(guard.running().is_empty());
    }
}
