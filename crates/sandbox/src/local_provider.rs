//! `LocalProcessProvider` — runs commands as host subprocesses.
//!
//! Spawns via `tokio::process::Command`, races the wait against a timeout,
//! and issues a raw `SIGKILL` on the child's PID when the deadline expires
//! because the `Child` handle has already been moved into the spawned wait
//! task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{ProviderError, ProviderErrorKind};
use crate::provider::Provider;
use crate::types::{ExecOutcome, Instance, InstanceConfig, InstanceMetrics, InstanceState};

/// A single local "instance" is really just the host process namespace —
/// there is nothing to create or destroy, only a liveness flag to track so
/// `status()`/`pause()`/`resume()` behave consistently with a real provider.
pub struct LocalProcessProvider {
    alive: Mutex<HashMap<String, AtomicBool>>,
}

impl LocalProcessProvider {
    pub fn new() -> Self {
        Self { alive: Mutex::new(HashMap::new()) }
    }
}

impl Default for LocalProcessProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for LocalProcessProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_instance(&self, _config: &InstanceConfig) -> Result<Instance, ProviderError> {
        let instance_id = Uuid::new_v4().to_string();
        self.alive.lock().unwrap().insert(instance_id.clone(), AtomicBool::new(true));
        Ok(Instance {
            instance_id,
            state: InstanceState::Running,
            started_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn pause(&self, instance_id: &str) -> Result<bool, ProviderError> {
        let guard = self.alive.lock().unwrap();
        match guard.get(instance_id) {
            Some(flag) => {
                flag.store(false, Ordering::Release);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn resume(&self, instance_id: &str) -> Result<bool, ProviderError> {
        let guard = self.alive.lock().unwrap();
        match guard.get(instance_id) {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn destroy(&self, instance_id: &str) -> Result<bool, ProviderError> {
        Ok(self.alive.lock().unwrap().remove(instance_id).is_some())
    }

    async fn status(&self, instance_id: &str) -> Result<InstanceState, ProviderError> {
        let guard = self.alive.lock().unwrap();
        match guard.get(instance_id) {
            Some(flag) if flag.load(Ordering::Acquire) => Ok(InstanceState::Running),
            Some(_) => Ok(InstanceState::Paused),
            None => Ok(InstanceState::Dead),
        }
    }

    async fn exec(
        &self,
        _instance_id: &str,
        cmd: &str,
        cwd: &str,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<ExecOutcome, ProviderError> {
        let mut command = tokio::process::Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .current_dir(cwd)
            .envs(env)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, format!("spawn failed: {e}")))?;

        let pid = child.id();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(child.wait_with_output().await);
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(output))) => {
                let exit_code = output.status.code().unwrap_or(-1);
                Ok(ExecOutcome {
                    exit_code,
                    stdout: strip_text(&output.stdout),
                    stderr: strip_text(&output.stderr),
                })
            }
            Ok(Ok(Err(e))) => Err(ProviderError::new(ProviderErrorKind::Transient, format!("wait failed: {e}"))),
            Ok(Err(_)) => Err(ProviderError::new(ProviderErrorKind::Transient, "wait task panicked")),
            Err(_elapsed) => {
                if let Some(raw_pid) = pid {
                    #[cfg(unix)]
                    unsafe {
                        libc::kill(raw_pid as libc::pid_t, libc::SIGKILL);
                    }
                }
                Err(ProviderError::new(
                    ProviderErrorKind::Transient,
                    format!("command timed out after {}ms", timeout.as_millis()),
                ))
            }
        }
    }

    async fn read_file(&self, _instance_id: &str, path: &str) -> Result<Vec<u8>, ProviderError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, format!("read {path}: {e}")))
    }

    async fn write_file(&self, _instance_id: &str, path: &str, content: &[u8]) -> Result<(), ProviderError> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, format!("write {path}: {e}")))
    }

    async fn list_dir(&self, _instance_id: &str, path: &str) -> Result<Vec<String>, ProviderError> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, format!("list {path}: {e}")))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn metrics(&self, _instance_id: &str) -> Result<InstanceMetrics, ProviderError> {
        Ok(InstanceMetrics::default())
    }
}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}
