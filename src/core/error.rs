//! Engine error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{PluginResult, PluginType};

use super::guard::WorkflowIdentity;

/// Errors that stop a request before (or instead of) plugin work.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Config not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Couldn't parse config {}: {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("{plugin_type} plugin '{name}' not found")]
    PluginNotFound { name: String, plugin_type: PluginType },

    #[error("Failed to load plugin '{name}': {reason}")]
    PluginLoad { name: String, reason: String },

    #[error("Plugin '{name}' failed with code {code}: {reason}")]
    PluginExecution {
        name: String,
        code: i32,
        reason: String,
    },

    #[error("Workflow {0} is already running")]
    DuplicateWorkflow(WorkflowIdentity),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Code 1 with this error as the single ERROR message
    pub fn to_result(&self) -> PluginResult {
        PluginResult::failure(self.to_string())
    }
}

impl From<EngineError> for PluginResult {
    fn from(err: EngineError) -> Self {
        err.to_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Level;

    #[test]
    fn test_error_converts_to_single_error_message() {
        let err = EngineError::PluginNotFound {
            name: "missing".to_string(),
            plugin_type: PluginType::Storage,
        };
        let result: PluginResult = err.into();

        assert_eq!(result.code, 1);
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].level, Level::Error);
        assert_eq!(result.messages[0].text, "storage plugin 'missing' not found");
    }

    #[test]
    fn test_duplicate_workflow_message() {
        let identity = WorkflowIdentity::new("prod", "db1", "7");
        let err = EngineError::DuplicateWorkflow(identity);
        assert_eq!(err.to_string(), "Workflow prod/db1/7 is already running");
    }
}
