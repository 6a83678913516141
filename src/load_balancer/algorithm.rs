// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use std::sync::Arc;

pub trait LoadBalancer: Send + Sync {
    /// Pick one backend from `backends`. The slice is the snapshot the
    /// caller just loaded; implementations must bound any index by its
    /// length and never by a length seen earlier.
    fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}
