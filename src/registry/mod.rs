// src/registry/mod.rs
//
// The backend registry is the system of record for which SMPP servers
// exist and whether they are currently considered active. The balancer
// only reads candidates from it and pushes status changes back.
//
mod memory;

pub use memory::InMemoryRegistry;

use crate::health::BackendStatus;
use crate::proxy::Backend;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait BackendRegistry: Send + Sync {
    /// Backends currently recorded with `status`, highest priority first.
    async fn fetch_candidates(&self, status: BackendStatus) -> Result<Vec<Backend>, RegistryError>;

    async fn set_status(&self, backend_id: &str, status: BackendStatus) -> Result<(), RegistryError>;
}
