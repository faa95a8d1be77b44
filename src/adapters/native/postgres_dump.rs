//! PostgreSQL dump application plugin.
//!
//! Quiesce runs `pg_dump` inside the database pod into
//! `{PqDumpPath}/{WorkflowId}`, which discovery reports as the data path for
//! the storage plugin. Unquiesce removes the dump directory again.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::pod::PodExec;
use crate::adapters::Plugin;
use crate::domain::{
    Capability, Config, Discover, DiscoverResult, Level, PluginDescriptor, PluginResult,
    PluginType,
};

const REQUIRED: [&str; 8] = [
    "Namespace",
    "ServiceName",
    "ContainerName",
    "PqDb",
    "PqDumpPath",
    "PqHost",
    "PqPort",
    "PqDumpCmd",
];

pub struct PostgresDump {
    exec: Arc<dyn PodExec>,
}

impl PostgresDump {
    pub const NAME: &'static str = "postgres-dump";

    pub fn new(exec: Arc<dyn PodExec>) -> Self {
        Self { exec }
    }
}

fn param<'a>(config: &'a Config, key: &str) -> &'a str {
    config.parameter(PluginType::App, key).unwrap_or_default()
}

fn dump_path(config: &Config) -> String {
    format!("{}/{}", param(config, "PqDumpPath"), config.workflow_id)
}

fn access_mode(config: &Config) -> &str {
    param(config, "AccessWithinCluster")
}

/// Shell line running the configured dump command against the database
fn dump_command(config: &Config) -> String {
    let mut line = String::new();
    if let Some(password) = config.parameter(PluginType::App, "PqPassword") {
        line.push_str(&format!("PGPASSWORD={} ", password));
    }
    line.push_str(&format!("PGDATABASE={} ", param(config, "PqDb")));
    if let Some(library) = config.parameter(PluginType::App, "PqLibraryPath") {
        line.push_str(&format!("LD_LIBRARY_PATH={} ", library));
    }
    line.push_str(&format!(
        "{} --host {} --port {} --file {}/postgres.sql",
        param(config, "PqDumpCmd"),
        param(config, "PqHost"),
        param(config, "PqPort"),
        dump_path(config)
    ));
    line
}

impl PostgresDump {
    async fn pod(&self, config: &Config) -> Result<String, PluginResult> {
        self.exec
            .resolve_pod(
                param(config, "Namespace"),
                param(config, "ServiceName"),
                access_mode(config),
            )
            .await
            .map_err(|e| PluginResult::failure(format!("Couldn't find database pod: {:#}", e)))
    }

    async fn exec_in_pod(&self, config: &Config, pod: &str, argv: Vec<String>) -> PluginResult {
        self.exec
            .execute_in_container(
                pod,
                param(config, "ContainerName"),
                param(config, "Namespace"),
                access_mode(config),
                &argv,
            )
            .await
    }
}

#[async_trait]
impl Plugin for PostgresDump {
    fn info(&self) -> PluginDescriptor {
        PluginDescriptor::new(
            Self::NAME,
            "Backs up PostgreSQL databases using the pg_dump utility",
            env!("CARGO_PKG_VERSION"),
            PluginType::App,
            [
                Capability::Discover,
                Capability::Quiesce,
                Capability::Unquiesce,
                Capability::Info,
            ],
        )
    }

    async fn set_env(&self, config: &Config) -> PluginResult {
        let missing: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .filter(|key| config.parameter(PluginType::App, key).is_none())
            .collect();
        if missing.is_empty() {
            PluginResult::ok()
        } else {
            PluginResult::failure(format!(
                "Missing required app parameters: {}",
                missing.join(", ")
            ))
        }
    }

    async fn discover(&self, config: &Config) -> DiscoverResult {
        let path = dump_path(config);
        DiscoverResult {
            result: PluginResult::ok()
                .with_message(Level::Info, format!("Data Directory is [{}]", path)),
            discover_list: vec![Discover {
                instance: param(config, "PqDb").to_string(),
                data_file_paths: vec![path],
                log_file_paths: Vec::new(),
            }],
        }
    }

    async fn quiesce(&self, config: &Config) -> PluginResult {
        let pod = match self.pod(config).await {
            Ok(pod) => pod,
            Err(result) => return result,
        };

        let mkdir = vec!["mkdir".to_string(), "-p".to_string(), dump_path(config)];
        let mut result = self.exec_in_pod(config, &pod, mkdir).await;
        if !result.is_success() {
            return result;
        }

        let dump = vec!["/bin/sh".to_string(), "-c".to_string(), dump_command(config)];
        result.absorb(self.exec_in_pod(config, &pod, dump).await);
        result
    }

    async fn unquiesce(&self, config: &Config) -> PluginResult {
        let pod = match self.pod(config).await {
            Ok(pod) => pod,
            Err(result) => return result,
        };

        let rm = vec!["rm".to_string(), "-rf".to_string(), dump_path(config)];
        self.exec_in_pod(config, &pod, rm).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExec {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl PodExec for RecordingExec {
        async fn resolve_pod(&self, namespace: &str, service: &str, _mode: &str) -> anyhow::Result<String> {
            Ok(format!("{}-{}-0", namespace, service))
        }

        async fn execute_in_container(
            &self,
            pod: &str,
            _container: &str,
            _namespace: &str,
            _mode: &str,
            argv: &[String],
        ) -> PluginResult {
            let mut call = vec![pod.to_string()];
            call.extend(argv.iter().cloned());
            self.calls.lock().unwrap().push(call);
            PluginResult::ok().with_message(Level::Cmd, argv.join(" "))
        }
    }

    fn config() -> Config {
        let mut config = Config {
            workflow_id: "42".to_string(),
            ..Default::default()
        };
        for (k, v) in [
            ("Namespace", "db"),
            ("ServiceName", "postgres"),
            ("ContainerName", "postgres"),
            ("PqDb", "sales"),
            ("PqDumpPath", "/tmp/dumps"),
            ("PqHost", "localhost"),
            ("PqPort", "5432"),
            ("PqDumpCmd", "pg_dump"),
        ] {
            config.app_plugin_parameters.insert(k.to_string(), v.to_string());
        }
        config
    }

    #[tokio::test]
    async fn test_quiesce_creates_dir_then_dumps() {
        let exec = Arc::new(RecordingExec::default());
        let plugin = PostgresDump::new(exec.clone());

        let result = plugin.quiesce(&config()).await;
        assert!(result.is_success());
        assert_eq!(result.messages.len(), 2);

        let calls = exec.calls.lock().unwrap();
        assert_eq!(calls[0], vec!["db-postgres-0", "mkdir", "-p", "/tmp/dumps/42"]);
        assert_eq!(calls[1][1..3], ["/bin/sh".to_string(), "-c".to_string()]);
        assert_eq!(
            calls[1][3],
            "PGDATABASE=sales pg_dump --host localhost --port 5432 --file /tmp/dumps/42/postgres.sql"
        );
    }

    #[tokio::test]
    async fn test_set_env_lists_missing_parameters() {
        let plugin = PostgresDump::new(Arc::new(RecordingExec::default()));
        let mut config = config();
        config.app_plugin_parameters.remove("PqHost");

        let result = plugin.set_env(&config).await;
        assert_eq!(result.code, 1);
        assert!(result.messages[0].text.contains("PqHost"));
    }

    #[tokio::test]
    async fn test_discover_reports_dump_path() {
        let plugin = PostgresDump::new(Arc::new(RecordingExec::default()));
        let discovered = plugin.discover(&config()).await;
        assert_eq!(discovered.discover_list[0].instance, "sales");
        assert_eq!(discovered.discover_list[0].data_file_paths, vec!["/tmp/dumps/42"]);
    }
}
