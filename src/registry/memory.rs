// src/registry/memory.rs
use super::{BackendRegistry, RegistryError};
use crate::config::BackendConfig;
use crate::health::BackendStatus;
use crate::proxy::Backend;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

/// Registry held in process memory, seeded from the config file.
pub struct InMemoryRegistry {
    backends: RwLock<Vec<Backend>>,
}

impl InMemoryRegistry {
    pub fn new(backends: Vec<Backend>) -> Self {
        Self {
            backends: RwLock::new(backends),
        }
    }

    pub fn from_configs(configs: &[BackendConfig]) -> Self {
        Self::new(configs.iter().map(Backend::from).collect())
    }

    pub async fn all(&self) -> Vec<Backend> {
        self.backends.read().await.clone()
    }

    pub async fn status_of(&self, backend_id: &str) -> Option<BackendStatus> {
        self.backends
            .read()
            .await
            .iter()
            .find(|b| b.id == backend_id)
            .map(Backend::status)
    }
}

#[async_trait]
impl BackendRegistry for InMemoryRegistry {
    async fn fetch_candidates(&self, status: BackendStatus) -> Result<Vec<Backend>, RegistryError> {
        let mut candidates: Vec<Backend> = self
            .backends
            .read()
            .await
            .iter()
            .filter(|b| b.status() == status)
            .cloned()
            .collect();

        // stable: equal priorities keep insertion order
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(candidates)
    }

    async fn set_status(&self, backend_id: &str, status: BackendStatus) -> Result<(), RegistryError> {
        let mut backends = self.backends.write().await;
        let backend = backends
            .iter_mut()
            .find(|b| b.id == backend_id)
            .ok_or_else(|| RegistryError::UnknownBackend(backend_id.to_string()))?;

        if backend.status() != status {
            backend.active = status.is_active();
            info!(backend = %backend.id, %status, "Backend status updated in registry");
        }

        Ok(())
    }
}
