use std::sync::Arc;

use agentcore_store::Store;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{Result, SandboxError};
use crate::provider::Provider;
use crate::types::{Instance, InstanceConfig, InstanceState};

/// Durable handle to shared compute.
///
/// The lease identity survives across however many times its `instance` is
/// created, paused, resumed, and destroyed. Instance transitions serialize
/// under a per-lease lock shared by every handle for the same `lease_id`,
/// so two concurrent `ensure_active_instance` calls can't both create.
pub struct SandboxLease {
    pub lease_id: String,
    pub provider: Arc<dyn Provider>,
    store: Arc<Store>,
    lock: Arc<AsyncMutex<()>>,
}

impl SandboxLease {
    pub fn new(lease_id: String, provider: Arc<dyn Provider>, store: Arc<Store>, lock: Arc<AsyncMutex<()>>) -> Self {
        Self { lease_id, provider, store, lock }
    }

    fn load_instance(&self) -> Result<Option<Instance>> {
        let row = self.store.get_lease(&self.lease_id)?;
        match row.and_then(|r| r.instance_json) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn persist_instance(&self, instance: Option<&Instance>) -> Result<()> {
        let json = instance.map(serde_json::to_string).transpose()?;
        self.store.update_lease_instance(&self.lease_id, json.as_deref())?;
        Ok(())
    }

    /// Guarantee a running instance or fail.
    ///
    /// - `running` → returned as-is.
    /// - `paused` → resumed via the provider.
    /// - `dead` or absent → a fresh instance is created via the provider.
    pub async fn ensure_active_instance(&self) -> Result<Instance> {
        let _guard = self.lock.lock().await;
        match self.load_instance()? {
            Some(instance) if instance.state == InstanceState::Running => Ok(instance),
            Some(mut instance) if instance.state == InstanceState::Paused => {
                self.provider.resume(&instance.instance_id).await?;
                instance.state = InstanceState::Running;
                self.persist_instance(Some(&instance))?;
                Ok(instance)
            }
            _ => {
                let instance = self.provider.create_instance(&InstanceConfig::default()).await?;
                self.persist_instance(Some(&instance))?;
                Ok(instance)
            }
        }
    }

    pub async fn pause_instance(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut instance = self
            .load_instance()?
            .ok_or_else(|| SandboxError::NoActiveInstance { lease_id: self.lease_id.clone() })?;
        self.provider.pause(&instance.instance_id).await?;
        instance.state = InstanceState::Paused;
        self.persist_instance(Some(&instance))?;
        Ok(())
    }

    pub async fn destroy_instance(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(instance) = self.load_instance()? {
            self.provider.destroy(&instance.instance_id).await?;
        }
        self.persist_instance(None)?;
        Ok(())
    }
}
