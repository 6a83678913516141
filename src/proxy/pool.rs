//
// src/proxy/pool.rs
//

use super::backend::Backend;
use crate::load_balancer::LoadBalancer;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// The set of backends currently eligible for new connections.
///
/// The snapshot is replaced as a whole with a single pointer swap, so a
/// reader sees either the old list or the new one, never a mix.
pub struct BackendPool {
    snapshot: ArcSwap<Vec<Arc<Backend>>>,
    balancer: Arc<dyn LoadBalancer>,
}

impl BackendPool {
    pub fn new(balancer: Arc<dyn LoadBalancer>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            balancer,
        }
    }

    /// Select the next backend, or `None` when nothing is active.
    pub fn next(&self) -> Option<Arc<Backend>> {
        let snapshot = self.snapshot.load();
        self.balancer.select_backend(&snapshot)
    }

    pub fn publish(&self, backends: Vec<Backend>) {
        let snapshot: Vec<Arc<Backend>> = backends.into_iter().map(Arc::new).collect();
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn active(&self) -> Arc<Vec<Arc<Backend>>> {
        self.snapshot.load_full()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn algorithm(&self) -> &'static str {
        self.balancer.name()
    }
}
