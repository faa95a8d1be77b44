//! fossil - Plugin-driven backup and restore workflow engine
//!
//! fossil runs backup and restore workflows for named configurations.
//! Every concrete action (quiescing an application, copying data, pruning
//! old backups, archiving) is delegated to a plugin, either compiled in or
//! an executable speaking a small flag/stdout protocol.
//!
//! # Architecture
//!
//! - Configs are resolved from layered YAML files per profile and config
//! - Plugins are gated by a SetEnv call and return a code plus message log
//! - Workflows compose plugin calls in a fixed order
//! - A guard admits at most one workflow per profile/config/id at a time
//!
//! # Modules
//!
//! - `adapters`: Plugin gateway, process protocol, built-in plugins
//! - `core`: Resolver, sequencer, workflows and the engine
//! - `domain`: Config, results and plugin descriptors
//! - `server`: HTTP API
//! - `scheduler`: Cron triggers
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve the API with cron triggers
//! fossil serve
//!
//! # Run a backup now
//! fossil backup prod db1 daily
//!
//! # Restore what workflow 1700000000 wrote
//! fossil restore prod db1 daily 1700000000
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod scheduler;
pub mod server;

// Re-export main types at crate root for convenience
pub use adapters::{NativeRegistry, PluginGateway, PluginHandle};
pub use config::ServerSettings;
pub use core::{Engine, EngineError, WorkflowGuard, WorkflowIdentity};
pub use domain::{Capability, Config, Level, Message, PluginResult, PluginType};
