//! Domain types for the fossil engine.
//!
//! This module contains the data shapes exchanged with plugins and callers:
//! - Config: resolved backup target definition
//! - PluginResult: status code plus ordered message log
//! - Plugin descriptors and the structured values plugins return

pub mod config;
pub mod plugin;
pub mod result;

// Re-export commonly used types
pub use config::{Config, Parameters, Retention};
pub use plugin::{
    Archives, Backup, Backups, Capability, Discover, DiscoverResult, PluginDescriptor,
    PluginInfoResult, PluginType, Status,
};
pub use result::{parse_lines, prepend_message, prepend_messages, Level, Message, PluginResult};
