//! Core engine logic.
//!
//! This module contains:
//! - ConfigResolver: layered config loading
//! - naming: backup names, paths and retention lookup
//! - WorkflowGuard: duplicate workflow protection
//! - Sequencer: SetEnv gating and message aggregation
//! - workflow / hooks: backup and restore composition
//! - Engine: entrypoints shared by all triggers

pub mod engine;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod naming;
pub mod resolver;
pub mod sequencer;
pub mod workflow;

// Re-export commonly used types
pub use engine::{generate_workflow_id, Engine};
pub use error::EngineError;
pub use guard::{WorkflowGuard, WorkflowIdentity, WorkflowKind, WorkflowPermit, WorkflowStatus};
pub use hooks::{run_hook, Hook};
pub use naming::{
    backup_dir, backup_name, backup_path, expired, find_retention, list_backups, restore_source,
    retention_count, split_backup_name,
};
pub use resolver::ConfigResolver;
pub use sequencer::Sequencer;
