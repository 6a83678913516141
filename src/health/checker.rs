// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::health::BackendStatus;
use crate::metrics::{MetricsCollector, Timer};
use crate::proxy::{Backend, BackendPool};
use crate::registry::BackendRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Periodically probes every known backend and republishes the active set.
///
/// A probe is a bounded TCP connect followed by an immediate close. A
/// server that accepts the connection but never speaks SMPP still counts
/// as healthy.
pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: Arc<BackendPool>,
    registry: Arc<dyn BackendRegistry>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend_id: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// What one full probe cycle changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub active: Vec<String>,
    pub demoted: Vec<String>,
    pub promoted: Vec<String>,
    /// False when the registry could not be read and the snapshot was left alone.
    pub published: bool,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        pool: Arc<BackendPool>,
        registry: Arc<dyn BackendRegistry>,
        metrics: Option<Arc<MetricsCollector>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            pool,
            registry,
            metrics,
            shutdown_rx,
        }
    }

    /// Run until shutdown. The first cycle fires one interval from now;
    /// callers run an initial cycle themselves before accepting traffic.
    pub async fn start(self: Arc<Self>) {
        let period = self.config.interval();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let Some(first_tick) = Instant::now().checked_add(period) else {
            error!("Health check interval {:?} is out of range; periodic checks disabled", period);
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
            return;
        };
        let mut interval = interval_at(first_tick, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting health checker with interval: {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_all_backends().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn check_all_backends(&self) -> CycleSummary {
        let timer = Timer::new();
        let mut summary = CycleSummary::default();

        let active = match self.registry.fetch_candidates(BackendStatus::Active).await {
            Ok(backends) => backends,
            Err(e) => {
                error!(error = %e, "Failed to fetch active backends; keeping current snapshot");
                return summary;
            }
        };

        let mut healthy: Vec<Backend> = Vec::with_capacity(active.len());
        let mut demoted = HashSet::new();

        let results = futures::future::join_all(active.iter().map(|b| self.probe(b))).await;
        for (backend, result) in active.into_iter().zip(results) {
            if result.healthy {
                debug!(backend = %backend.id, rtt_ms = result.response_time_ms, "Backend is healthy");
                healthy.push(backend);
                continue;
            }

            warn!(
                backend = %backend.id,
                error = ?result.error,
                "Backend failed health check; demoting"
            );
            if let Err(e) = self
                .registry
                .set_status(&backend.id, BackendStatus::Inactive)
                .await
            {
                error!(backend = %backend.id, error = %e, "Failed to record demotion");
            }
            demoted.insert(backend.id.clone());
            summary.demoted.push(backend.id);
        }

        let inactive = match self.registry.fetch_candidates(BackendStatus::Inactive).await {
            Ok(backends) => backends,
            Err(e) => {
                error!(error = %e, "Failed to fetch inactive backends");
                Vec::new()
            }
        };

        // Anything demoted a moment ago waits for the next cycle.
        let retry: Vec<Backend> = inactive
            .into_iter()
            .filter(|b| !demoted.contains(&b.id))
            .collect();

        let results = futures::future::join_all(retry.iter().map(|b| self.probe(b))).await;
        for (mut backend, result) in retry.into_iter().zip(results) {
            if !result.healthy {
                debug!(backend = %backend.id, error = ?result.error, "Backend still unreachable");
                continue;
            }

            if let Err(e) = self
                .registry
                .set_status(&backend.id, BackendStatus::Active)
                .await
            {
                error!(backend = %backend.id, error = %e, "Failed to record promotion");
            }
            info!(backend = %backend.id, "Backend is healthy again; reactivated");
            backend.active = true;
            summary.promoted.push(backend.id.clone());
            healthy.push(backend);
        }

        summary.active = healthy.iter().map(|b| b.id.clone()).collect();

        info!("Refreshed backend list. Active backends: {}", healthy.len());
        for backend in &healthy {
            info!(
                "Active SMPP backend: {} (priority: {}, region: {})",
                backend.id,
                backend.priority,
                backend.region.as_deref().unwrap_or("-")
            );
        }

        let healthy_count = healthy.len();
        self.pool.publish(healthy);
        summary.published = true;

        if let Some(metrics) = &self.metrics {
            let inactive = self
                .registry
                .fetch_candidates(BackendStatus::Inactive)
                .await
                .map(|b| b.len())
                .unwrap_or(0);
            metrics.update_backend_counts(healthy_count, healthy_count + inactive);
            metrics.observe_health_cycle(timer.elapsed());
        }

        summary
    }

    pub async fn probe(&self, backend: &Backend) -> HealthCheckResult {
        let timer = Timer::new();

        let result = timeout(self.config.timeout(), TcpStream::connect(backend.address())).await;

        let (healthy, error) = match result {
            Ok(Ok(stream)) => {
                drop(stream);
                (true, None)
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some("Connect timeout".to_string())),
        };

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(&backend.id, healthy);
        }

        HealthCheckResult {
            backend_id: backend.id.clone(),
            healthy,
            response_time_ms: timer.elapsed().as_millis() as u64,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::RoundRobinBalancer;
    use crate::registry::{InMemoryRegistry, RegistryError};
    use tokio::net::TcpListener;

    async fn dead_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn checker(registry: Arc<InMemoryRegistry>) -> (HealthChecker, Arc<BackendPool>) {
        let pool = Arc::new(BackendPool::new(Arc::new(RoundRobinBalancer::new())));
        let (_tx, rx) = watch::channel(false);
        let config = HealthCheckConfig {
            interval_secs: 30,
            timeout_secs: 1,
        };
        (
            HealthChecker::new(config, pool.clone(), registry, None, rx),
            pool,
        )
    }

    #[tokio::test]
    async fn silent_listener_is_reported_healthy() {
        // Accepts TCP but never sends a byte: connectivity-only probing
        // still treats it as up.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let registry = Arc::new(InMemoryRegistry::new(vec![Backend::new("127.0.0.1", port)]));
        let (checker, pool) = checker(registry);

        let result = checker.probe(&Backend::new("127.0.0.1", port)).await;
        assert!(result.healthy);
        assert!(result.error.is_none());

        let summary = checker.check_all_backends().await;
        assert_eq!(summary.active, vec![format!("127.0.0.1:{}", port)]);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn failing_backend_is_demoted_and_excluded() {
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_port = live.local_addr().unwrap().port();
        let dead = dead_port().await;

        let registry = Arc::new(InMemoryRegistry::new(vec![
            Backend::new("127.0.0.1", live_port),
            Backend::new("127.0.0.1", dead),
        ]));
        let (checker, pool) = checker(registry.clone());

        let summary = checker.check_all_backends().await;

        assert!(summary.published);
        assert_eq!(summary.demoted, vec![format!("127.0.0.1:{}", dead)]);
        assert!(summary.promoted.is_empty());
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.next().unwrap().port, live_port);
        assert_eq!(
            registry.status_of(&format!("127.0.0.1:{}", dead)).await,
            Some(BackendStatus::Inactive)
        );
    }

    #[tokio::test]
    async fn recovered_backend_is_promoted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let id = format!("127.0.0.1:{}", port);

        let registry = Arc::new(InMemoryRegistry::new(vec![Backend {
            active: false,
            ..Backend::new("127.0.0.1", port)
        }]));
        let (checker, pool) = checker(registry.clone());

        let summary = checker.check_all_backends().await;

        assert_eq!(summary.promoted, vec![id.clone()]);
        assert_eq!(registry.status_of(&id).await, Some(BackendStatus::Active));
        let active = pool.active();
        assert_eq!(active.len(), 1);
        assert!(active[0].active);
    }

    #[tokio::test]
    async fn start_exits_on_shutdown() {
        let registry = Arc::new(InMemoryRegistry::new(Vec::new()));
        let pool = Arc::new(BackendPool::new(Arc::new(RoundRobinBalancer::new())));
        let (tx, rx) = watch::channel(false);
        let checker = Arc::new(HealthChecker::new(
            HealthCheckConfig::default(),
            pool,
            registry,
            None,
            rx,
        ));

        let task = tokio::spawn(checker.start());
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("checker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn out_of_range_interval_does_not_kill_the_task() {
        let registry = Arc::new(InMemoryRegistry::new(Vec::new()));
        let pool = Arc::new(BackendPool::new(Arc::new(RoundRobinBalancer::new())));
        let (tx, rx) = watch::channel(false);
        let config = HealthCheckConfig {
            interval_secs: u64::MAX,
            timeout_secs: 1,
        };
        let checker = Arc::new(HealthChecker::new(config, pool, registry, None, rx));

        let task = tokio::spawn(checker.start());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("checker did not stop")
            .expect("checker panicked");
    }

    struct UnreachableRegistry;

    #[async_trait::async_trait]
    impl BackendRegistry for UnreachableRegistry {
        async fn fetch_candidates(&self, _: BackendStatus) -> Result<Vec<Backend>, RegistryError> {
            Err(RegistryError::Unavailable("connection refused".to_string()))
        }

        async fn set_status(&self, _: &str, _: BackendStatus) -> Result<(), RegistryError> {
            Err(RegistryError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn registry_outage_keeps_current_snapshot() {
        let pool = Arc::new(BackendPool::new(Arc::new(RoundRobinBalancer::new())));
        pool.publish(vec![Backend::new("smpp-a", 2775)]);
        let (_tx, rx) = watch::channel(false);
        let checker = HealthChecker::new(
            HealthCheckConfig::default(),
            pool.clone(),
            Arc::new(UnreachableRegistry),
            None,
            rx,
        );

        let summary = checker.check_all_backends().await;

        assert!(!summary.published);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.next().unwrap().id, "smpp-a:2775");
    }
}
