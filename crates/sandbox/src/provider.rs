use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{ExecOutcome, Instance, InstanceConfig, InstanceMetrics, InstanceState};

/// Abstract contract a remote compute provider MUST implement.
///
/// The core assumes at-most-once semantics from the provider; retrying a
/// failed call is the caller's responsibility (`agentcore-core`'s
/// `ErrorKind::Transient` retry budget), not the provider's.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn create_instance(&self, config: &InstanceConfig) -> Result<Instance, ProviderError>;
    async fn pause(&self, instance_id: &str) -> Result<bool, ProviderError>;
    async fn resume(&self, instance_id: &str) -> Result<bool, ProviderError>;
    async fn destroy(&self, instance_id: &str) -> Result<bool, ProviderError>;
    async fn status(&self, instance_id: &str) -> Result<InstanceState, ProviderError>;

    #[allow(clippy::too_many_arguments)]
    async fn exec(
        &self,
        instance_id: &str,
        cmd: &str,
        cwd: &str,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<ExecOutcome, ProviderError>;

    async fn read_file(&self, instance_id: &str, path: &str) -> Result<Vec<u8>, ProviderError>;
    async fn write_file(&self, instance_id: &str, path: &str, content: &[u8]) -> Result<(), ProviderError>;
    async fn list_dir(&self, instance_id: &str, path: &str) -> Result<Vec<String>, ProviderError>;
    async fn metrics(&self, instance_id: &str) -> Result<InstanceMetrics, ProviderError>;
}
