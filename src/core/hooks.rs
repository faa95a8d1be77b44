//! `BackupCreateCmd` / `BackupDeleteCmd` shell-out hooks.
//!
//! A hook is a comma separated argv list, executed without a shell. Output
//! lines become CMD messages (stderr lines ERROR) and the exit code becomes
//! the result code.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error};

use crate::domain::{prepend_message, Level, Message, PluginResult};

/// Which hook is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BackupCreate,
    BackupDelete,
}

impl Hook {
    fn label(&self) -> &'static str {
        match self {
            Self::BackupCreate => "backup create",
            Self::BackupDelete => "backup delete",
        }
    }
}

/// Split a hook line into argv
pub fn split_command(command: &str) -> Vec<String> {
    command
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run a hook. An empty command is a successful no-op with no messages.
pub async fn run_hook(hook: Hook, command: &str) -> PluginResult {
    let argv = split_command(command);
    let Some((program, args)) = argv.split_first() else {
        return PluginResult::ok();
    };

    let intro = Message::new(
        Level::Info,
        format!("Performing {} command [{}]", hook.label(), command),
    );
    let mut result = execute(program, args).await;
    result.messages = prepend_message(intro, result.messages);
    result
}

async fn execute(program: &str, args: &[String]) -> PluginResult {
    debug!(%program, ?args, "Running hook command");
    let mut result = PluginResult::ok().with_message(
        Level::Cmd,
        std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" "),
    );

    let output = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            error!(%program, error = %e, "Hook command failed to start");
            result.fail(1);
            result.push(Level::Error, format!("Couldn't run [{}]: {}", program, e));
            return result;
        }
    };

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        result.push(Level::Cmd, line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        result.push(Level::Error, line);
    }

    let code = output.status.code().unwrap_or(-1);
    if code != 0 {
        result.fail(code);
        if !result.has_error_message() {
            result.push(
                Level::Error,
                format!("Command [{}] failed with exit code {}", program, code),
            );
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("echo, hello ,world"), vec!["echo", "hello", "world"]);
        assert!(split_command(" , ").is_empty());
    }

    #[tokio::test]
    async fn test_empty_hook_is_noop() {
        let result = run_hook(Hook::BackupCreate, "").await;
        assert!(result.is_success());
        assert!(result.messages.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hook_output_is_recorded() {
        let result = run_hook(Hook::BackupCreate, "echo,snapshot taken").await;
        assert!(result.is_success());

        assert_eq!(result.messages[0].level, Level::Info);
        assert_eq!(
            result.messages[0].text,
            "Performing backup create command [echo,snapshot taken]"
        );
        assert_eq!(result.messages[1].level, Level::Cmd);
        assert_eq!(result.messages[1].text, "echo snapshot taken");
        assert_eq!(result.messages[2].text, "snapshot taken");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_hook_sets_code() {
        let result = run_hook(Hook::BackupDelete, "false").await;
        assert_eq!(result.code, 1);
        assert!(result.has_error_message());
        assert!(result.messages[0].text.starts_with("Performing backup delete command"));
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let result = run_hook(Hook::BackupCreate, "/definitely/not/here").await;
        assert_eq!(result.code, 1);
    }
}
