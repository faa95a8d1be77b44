//! Out-of-process plugins.
//!
//! An executable under `{plugin_dir}/{type}/{name}` is spawned with exactly
//! one capability flag (`--backup`, `--info`, ...). Config values reach it as
//! environment variables. Stdout is captured line by line:
//!
//! - message capabilities: each `<LEVEL> <text>` line becomes a message,
//!   other lines are dropped
//! - structured capabilities (`--info`, `--backupList`, `--archiveList`,
//!   `--discover`): all lines joined with a space are parsed as JSON
//!
//! The exit code becomes the result code.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::core::EngineError;
use crate::domain::{
    parse_lines, Archives, Backup, Backups, Capability, Config, DiscoverResult, Level,
    PluginDescriptor, PluginInfoResult, PluginResult, PluginType,
};

/// Raw output of one plugin invocation
#[derive(Debug)]
struct Captured {
    lines: Vec<String>,
    stderr: String,
    code: i32,
}

/// An executable plugin
#[derive(Debug, Clone)]
pub struct ProcessPlugin {
    name: String,
    plugin_type: PluginType,
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessPlugin {
    pub fn new(name: impl Into<String>, plugin_type: PluginType, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            plugin_type,
            executable: executable.into(),
            timeout: None,
        }
    }

    /// Kill the process and fail if it runs longer than `limit`
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executables read their settings from the environment at spawn time,
    /// so setup only checks the binary is still in place.
    pub async fn set_env(&self, _config: &Config) -> PluginResult {
        if tokio::fs::metadata(&self.executable).await.is_ok() {
            PluginResult::ok()
        } else {
            PluginResult::failure(format!(
                "Plugin executable {} disappeared",
                self.executable.display()
            ))
        }
    }

    /// Invoke a message capability
    pub async fn run(&self, config: &Config, capability: Capability) -> PluginResult {
        let captured = match self.capture(config, capability).await {
            Ok(captured) => captured,
            Err(e) => {
                error!(plugin = %self.name, %capability, error = %e, "Plugin invocation failed");
                return e.to_result();
            }
        };

        let mut result = PluginResult::new(captured.code, parse_lines(&captured.lines));
        if captured.code != 0 && !result.has_error_message() {
            result.push(Level::Error, self.failure_text(capability, &captured));
        }
        result
    }

    pub async fn info(&self) -> PluginInfoResult {
        match self
            .run_json::<PluginDescriptor>(&Config::default(), Capability::Info)
            .await
        {
            Ok(plugin) => PluginInfoResult::from_descriptor(plugin),
            Err(result) => PluginInfoResult::from_result(result),
        }
    }

    pub async fn backup_list(&self, config: &Config) -> Backups {
        match self.run_json::<Vec<Backup>>(config, Capability::BackupList).await {
            Ok(backups) => Backups {
                result: PluginResult::ok(),
                backups,
            },
            Err(result) => Backups::from_result(result),
        }
    }

    pub async fn archive_list(&self, config: &Config) -> Archives {
        match self.run_json::<Vec<Backup>>(config, Capability::ArchiveList).await {
            Ok(archives) => Archives {
                result: PluginResult::ok(),
                archives,
            },
            Err(result) => Archives::from_result(result),
        }
    }

    pub async fn discover(&self, config: &Config) -> DiscoverResult {
        match self.run_json::<DiscoverResult>(config, Capability::Discover).await {
            Ok(discovered) => discovered,
            Err(result) => DiscoverResult::from_result(result),
        }
    }

    /// Invoke a structured capability and parse its JSON output
    async fn run_json<T: DeserializeOwned>(
        &self,
        config: &Config,
        capability: Capability,
    ) -> Result<T, PluginResult> {
        let captured = self
            .capture(config, capability)
            .await
            .map_err(|e| e.to_result())?;

        if captured.code != 0 {
            let mut result = PluginResult::new(captured.code, parse_lines(&captured.lines));
            result.push(Level::Error, self.failure_text(capability, &captured));
            return Err(result);
        }

        let document = captured.lines.join(" ");
        serde_json::from_str(&document).map_err(|e| {
            PluginResult::failure(format!(
                "Couldn't parse {} output of plugin '{}': {}",
                capability.flag(),
                self.name,
                e
            ))
        })
    }

    fn failure_text(&self, capability: Capability, captured: &Captured) -> String {
        let mut text = format!(
            "Plugin '{}' {} failed with exit code {}",
            self.name,
            capability.flag(),
            captured.code
        );
        let stderr = captured.stderr.trim();
        if !stderr.is_empty() {
            text.push_str(": ");
            text.push_str(stderr);
        }
        text
    }

    /// Spawn the executable with one flag and collect its output
    async fn capture(&self, config: &Config, capability: Capability) -> Result<Captured, EngineError> {
        let flag = capability.flag();
        debug!(
            plugin = %self.name,
            executable = %self.executable.display(),
            %flag,
            "Spawning plugin"
        );

        let exec_err = |code: i32, reason: String| EngineError::PluginExecution {
            name: self.name.clone(),
            code,
            reason,
        };

        let mut child = Command::new(&self.executable)
            .arg(&flag)
            .envs(config.plugin_env(self.plugin_type))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                exec_err(
                    -1,
                    format!("failed to spawn {}: {}", self.executable.display(), e),
                )
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let collect = async move {
            let read_stdout = async {
                let mut lines = Vec::new();
                if let Some(out) = stdout {
                    let mut segments = BufReader::new(out).split(b'\n');
                    while let Some(segment) = segments.next_segment().await? {
                        let line = String::from_utf8_lossy(&segment);
                        lines.push(line.trim_end_matches('\r').to_string());
                    }
                }
                Ok::<_, std::io::Error>(lines)
            };
            let read_stderr = async {
                let mut buf = Vec::new();
                if let Some(mut err) = stderr {
                    err.read_to_end(&mut buf).await?;
                }
                Ok::<_, std::io::Error>(String::from_utf8_lossy(&buf).into_owned())
            };

            let (lines, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
            let status = child.wait().await?;

            Ok::<_, std::io::Error>(Captured {
                lines,
                stderr,
                code: status.code().unwrap_or(-1),
            })
        };

        // Dropping `collect` on timeout drops the child, which kills it
        let outcome = match self.timeout {
            Some(limit) => timeout(limit, collect)
                .await
                .map_err(|_| exec_err(-1, format!("{} timed out after {:?}", flag, limit)))?,
            None => collect.await,
        };

        let captured = outcome.map_err(|e| exec_err(-1, format!("failed reading output: {}", e)))?;
        debug!(plugin = %self.name, %flag, code = captured.code, lines = captured.lines.len(), "Plugin exited");
        Ok(captured)
    }
}
