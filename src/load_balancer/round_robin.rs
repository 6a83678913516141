// src/load_balancer/round_robin.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free rotation over whatever snapshot the caller hands in.
///
/// The counter only ever grows (wrapping at `usize::MAX`) and is shared
/// by every dispatch path, so concurrent selections interleave rather
/// than collide.
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(position: usize) -> Self {
        Self {
            counter: AtomicUsize::new(position),
        }
    }

    pub fn position(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % backends.len();
        Some(backends[index].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
