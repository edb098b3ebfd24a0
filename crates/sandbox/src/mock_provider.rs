//! In-memory `Provider` test double.
//!
//! Lets tests script failure modes (auth rejection, quota exhaustion,
//! transient flakes) without touching a real sandbox vendor.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{ProviderError, ProviderErrorKind};
use crate::provider::Provider;
use crate::types::{ExecOutcome, Instance, InstanceConfig, InstanceMetrics, InstanceState};

#[derive(Default)]
struct MockState {
    instances: HashMap<String, InstanceState>,
    fail_exec_with: Option<ProviderErrorKind>,
    exec_log: Vec<String>,
    files: HashMap<String, Vec<u8>>,
}

/// A `Provider` whose behavior is fully scripted in-process.
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self { state: Mutex::new(MockState::default()) }
    }

    /// Every subsequent `exec` call fails with `kind` until cleared.
    pub fn fail_exec_with(&self, kind: ProviderErrorKind) {
        self.state.lock().unwrap().fail_exec_with = Some(kind);
    }

    pub fn clear_exec_failure(&self) {
        self.state.lock().unwrap().fail_exec_with = None;
    }

    pub fn exec_log(&self) -> Vec<String> {
        self.state.lock().unwrap().exec_log.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_instance(&self, _config: &InstanceConfig) -> Result<Instance, ProviderError> {
        let instance_id = Uuid::new_v4().to_string();
        self.state.lock().unwrap().instances.insert(instance_id.clone(), InstanceState::Running);
        Ok(Instance {
            instance_id,
            state: InstanceState::Running,
            started_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn pause(&self, instance_id: &str) -> Result<bool, ProviderError> {
        let mut guard = self.state.lock().unwrap();
        match guard.instances.get_mut(instance_id) {
            Some(s) => {
                *s = InstanceState::Paused;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn resume(&self, instance_id: &str) -> Result<bool, ProviderError> {
        let mut guard = self.state.lock().unwrap();
        match guard.instances.get_mut(instance_id) {
            Some(s) => {
                *s = InstanceState::Running;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn destroy(&self, instance_id: &str) -> Result<bool, ProviderError> {
        Ok(self.state.lock().unwrap().instances.remove(instance_id).is_some())
    }

    async fn status(&self, instance_id: &str) -> Result<InstanceState, ProviderError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .instances
            .get(instance_id)
            .copied()
            .unwrap_or(InstanceState::Dead))
    }

    async fn exec(
        &self,
        _instance_id: &str,
        cmd: &str,
        _cwd: &str,
        _env: &HashMap<String, String>,
        _timeout: Duration,
    ) -> Result<ExecOutcome, ProviderError> {
        let mut guard = self.state.lock().unwrap();
        guard.exec_log.push(cmd.to_string());
        if let Some(kind) = guard.fail_exec_with {
            return Err(ProviderError::new(kind, "scripted failure"));
        }
        Ok(ExecOutcome { exit_code: 0, stdout: format!("{cmd}\n"), stderr: String::new() })
    }

    async fn read_file(&self, _instance_id: &str, path: &str) -> Result<Vec<u8>, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::Permanent, format!("no such file: {path}")))
    }

    async fn write_file(&self, _instance_id: &str, path: &str, content: &[u8]) -> Result<(), ProviderError> {
        self.state.lock().unwrap().files.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn list_dir(&self, _instance_id: &str, path: &str) -> Result<Vec<String>, ProviderError> {
        let prefix = if path.ends_with('/') { path.to_string() } else { format!("{path}/") };
        Ok(self.state.lock().unwrap().files.keys().filter(|p| p.starts_with(&prefix)).cloned().collect())
    }

    async fn metrics(&self, _instance_id: &str) -> Result<InstanceMetrics, ProviderError> {
        Ok(InstanceMetrics::default())
    }
}
