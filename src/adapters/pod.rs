//! Pod lookup and remote execution, as consumed by application plugins.
//!
//! The engine does not ship an implementation; embedders that run against
//! a cluster provide one to [`NativeRegistry::with_pod_exec`](super::NativeRegistry::with_pod_exec).

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::PluginResult;

#[async_trait]
pub trait PodExec: Send + Sync {
    /// Find the pod backing a service
    async fn resolve_pod(
        &self,
        namespace: &str,
        service_selector: &str,
        access_mode: &str,
    ) -> Result<String>;

    /// Run `argv` inside a container of the pod
    async fn execute_in_container(
        &self,
        pod: &str,
        container: &str,
        namespace: &str,
        access_mode: &str,
        argv: &[String],
    ) -> PluginResult;
}
