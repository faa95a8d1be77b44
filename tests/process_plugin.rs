//! Executable plugin tests
//!
//! Each test writes a small shell script under a temporary plugin
//! directory and drives it through the gateway.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use fossil::adapters::gateway::PluginKind;
use fossil::adapters::{NativeRegistry, PluginGateway};
use fossil::core::{sequencer, EngineError};
use fossil::domain::{Capability, Config, Level, PluginType};

fn install(dir: &Path, plugin_type: PluginType, name: &str, body: &str) {
    let dir = dir.join(plugin_type.as_str());
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn config() -> Config {
    let mut config = Config {
        profile_name: "prod".to_string(),
        config_name: "db1".to_string(),
        workflow_id: "42".to_string(),
        workflow_timestamp: 1700000000,
        storage_plugin: "shell-storage".to_string(),
        selected_backup_policy: "daily".to_string(),
        ..Default::default()
    };
    config
        .storage_plugin_parameters
        .insert("BackupName".to_string(), "db1".to_string());
    config
}

#[tokio::test]
async fn test_unparsable_lines_are_dropped() {
    let temp = TempDir::new().unwrap();
    install(
        temp.path(),
        PluginType::Storage,
        "shell-storage",
        r#"printf 'INFO started\nnotaleveltoken\nERROR failed\n'"#,
    );

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());
    let handle = assert_ok!(gateway.resolve("shell-storage", PluginType::Storage));
    assert_eq!(handle.kind(), PluginKind::OutOfProcess);

    let result = handle.invoke(Capability::Backup, &config()).await;
    assert_eq!(result.code, 0);
    assert_eq!(result.messages.len(), 2);
    assert_eq!(result.messages[0].level, Level::Info);
    assert_eq!(result.messages[0].text, "started");
    assert_eq!(result.messages[1].level, Level::Error);
    assert_eq!(result.messages[1].text, "failed");
}

#[tokio::test]
async fn test_nonzero_exit_adds_error_message() {
    let temp = TempDir::new().unwrap();
    install(
        temp.path(),
        PluginType::Storage,
        "shell-storage",
        "echo 'INFO copying'\necho 'disk full' >&2\nexit 3",
    );

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());
    let handle = assert_ok!(gateway.resolve("shell-storage", PluginType::Storage));
    let result = handle.invoke(Capability::Backup, &config()).await;

    assert_eq!(result.code, 3);
    assert_eq!(result.messages.len(), 2);
    assert_eq!(result.messages[1].level, Level::Error);
    assert!(result.messages[1].text.contains("--backup"));
    assert!(result.messages[1].text.contains("disk full"));
}

#[tokio::test]
async fn test_config_reaches_plugin_environment() {
    let temp = TempDir::new().unwrap();
    install(
        temp.path(),
        PluginType::Storage,
        "shell-storage",
        r#"echo "INFO $1 $BackupName $BackupPolicy $WorkflowId""#,
    );

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());
    let handle = assert_ok!(gateway.resolve("shell-storage", PluginType::Storage));
    let result = sequencer::invoke(&handle, Capability::Backup, &config()).await;

    assert!(result.is_success());
    assert_eq!(
        result.messages.last().map(|m| m.text.as_str()),
        Some("--backup db1 daily 42")
    );
}

#[tokio::test]
async fn test_info_is_parsed_from_json() {
    let temp = TempDir::new().unwrap();
    install(
        temp.path(),
        PluginType::App,
        "shell-app",
        r#"echo '{"name": "shell-app", "description": "test app",'
echo ' "version": "2.1", "type": "app",'
echo ' "capabilities": [{"name": "quiesce"}, {"name": "unquiesce"}, {"name": "somethingNew"}]}'"#,
    );

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());
    let handle = assert_ok!(gateway.resolve("shell-app", PluginType::App));
    let info = handle.info().await;

    assert!(info.result.is_success());
    let plugin = info.plugin.unwrap();
    assert_eq!(plugin.name, "shell-app");
    assert_eq!(plugin.version, "2.1");
    assert_eq!(plugin.plugin_type, PluginType::App);
    assert!(plugin.supports(Capability::Quiesce));
    assert!(!plugin.supports(Capability::Backup));
}

#[tokio::test]
async fn test_invalid_info_json_fails() {
    let temp = TempDir::new().unwrap();
    install(temp.path(), PluginType::App, "shell-app", "echo 'INFO not json'");

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());
    let handle = assert_ok!(gateway.resolve("shell-app", PluginType::App));
    let info = handle.info().await;

    assert_eq!(info.result.code, 1);
    assert!(info.plugin.is_none());
}

#[tokio::test]
async fn test_backup_list_is_parsed_from_json() {
    let temp = TempDir::new().unwrap();
    install(
        temp.path(),
        PluginType::Storage,
        "shell-storage",
        r#"case "$1" in
  --backupList)
    echo '[{"name": "db1_daily_1_100", "policy": "daily", "workflowId": "1", "epoch": 100},'
    echo ' {"name": "db1_daily_2_200", "policy": "daily", "workflowId": "2", "epoch": 200}]'
    ;;
  *) exit 1 ;;
esac"#,
    );

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());
    let handle = assert_ok!(gateway.resolve("shell-storage", PluginType::Storage));
    let listing = sequencer::backup_list(&handle, &config()).await;

    assert!(listing.result.is_success());
    assert_eq!(listing.backups.len(), 2);
    assert_eq!(listing.backups[1].workflow_id, "2");
    assert_eq!(listing.backups[1].epoch, 200);
}

#[tokio::test]
async fn test_hung_plugin_is_killed_after_timeout() {
    let temp = TempDir::new().unwrap();
    install(temp.path(), PluginType::Storage, "shell-storage", "sleep 30");

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::new())
        .with_timeout(Some(Duration::from_millis(200)));
    let handle = assert_ok!(gateway.resolve("shell-storage", PluginType::Storage));

    let started = Instant::now();
    let result = handle.invoke(Capability::Backup, &config()).await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_ne!(result.code, 0);
    assert!(result.messages[0].text.contains("timed out"));
}

#[tokio::test]
async fn test_native_plugin_shadows_executable() {
    let temp = TempDir::new().unwrap();
    install(temp.path(), PluginType::Storage, "sample-storage", "exit 9");

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::builtin());
    let handle = assert_ok!(gateway.resolve("sample-storage", PluginType::Storage));
    assert_eq!(handle.kind(), PluginKind::InProcess);
}

#[tokio::test]
async fn test_missing_executable_is_not_found() {
    let temp = TempDir::new().unwrap();
    install(temp.path(), PluginType::App, "shell-app", "exit 0");

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::new());
    let err = assert_err!(gateway.resolve("shell-app", PluginType::Storage));
    assert!(matches!(err, EngineError::PluginNotFound { .. }));

    let err = assert_err!(gateway.resolve("../app/shell-app", PluginType::Storage));
    assert!(matches!(err, EngineError::PluginNotFound { .. }));
}

#[tokio::test]
async fn test_plugin_list_includes_executables() {
    let temp = TempDir::new().unwrap();
    install(temp.path(), PluginType::Storage, "shell-storage", "exit 0");

    let gateway = PluginGateway::new(temp.path(), NativeRegistry::builtin());
    let names = assert_ok!(gateway.list(PluginType::Storage));
    assert_eq!(names, ["sample-storage", "shell-storage"]);
}
