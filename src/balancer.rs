// src/balancer.rs
//
// Wires the pieces together: one accept task, one health-check task,
// one registry sweeper and, optionally, the diagnostics listener. All
// shared state is owned here and handed to each component on
// construction.
//
use crate::clients::{ClientRegistry, ClientSnapshot};
use crate::config::Config;
use crate::health::{CycleSummary, HealthChecker};
use crate::load_balancer::create_load_balancer;
use crate::metrics::MetricsRegistry;
use crate::proxy::{BackendPool, ConnectionHandler};
use crate::registry::{BackendRegistry, InMemoryRegistry};
use crate::server::{ConnectionAcceptor, DiagnosticsHandler, ServerBuilder};
use anyhow::Result;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Balancer {
    config: Config,
    registry: Arc<dyn BackendRegistry>,
}

impl Balancer {
    /// Balancer whose backend registry is seeded from `config.backends`.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(InMemoryRegistry::from_configs(&config.backends));
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Config, registry: Arc<dyn BackendRegistry>) -> Self {
        Self { config, registry }
    }

    /// Bind, run the first health cycle, then start serving.
    ///
    /// Failing to bind either listener is returned to the caller.
    pub async fn start(self) -> Result<BalancerHandle> {
        let Balancer { config, registry } = self;

        let metrics_registry = Arc::new(MetricsRegistry::new()?);
        let metrics = metrics_registry.collector();

        let pool = Arc::new(BackendPool::new(create_load_balancer(config.algorithm)));
        let clients = Arc::new(ClientRegistry::new(
            config.clients.max_entries,
            config.clients.idle_ttl(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handler = Arc::new(ConnectionHandler::new(
            pool.clone(),
            clients.clone(),
            metrics.clone(),
            config.proxy.clone(),
            shutdown_rx.clone(),
        ));
        let acceptor = ConnectionAcceptor::bind(
            &config.listen.address(),
            handler,
            clients.clone(),
            metrics.clone(),
            shutdown_rx.clone(),
        )
        .await?;
        let local_addr = acceptor.local_addr()?;

        let checker = Arc::new(HealthChecker::new(
            config.health_check.clone(),
            pool.clone(),
            registry,
            Some(metrics.clone()),
            shutdown_rx.clone(),
        ));
        checker.check_all_backends().await;

        let mut tasks = Vec::new();

        let diagnostics_addr = if config.diagnostics.enabled {
            let server = ServerBuilder::new(config.diagnostics.address())
                .with_handler(DiagnosticsHandler::new(
                    clients.clone(),
                    pool.clone(),
                    metrics_registry.clone(),
                    &config.diagnostics.metrics_path,
                ))
                .bind()
                .await?;
            let addr = server.local_addr()?;
            tasks.push(tokio::spawn(server.serve(shutdown_rx.clone())));
            Some(addr)
        } else {
            None
        };

        tasks.push(tokio::spawn(checker.clone().start()));
        tasks.push(tokio::spawn(clients.clone().run_sweeper(
            config.clients.sweep_interval(),
            shutdown_rx.clone(),
            Some(metrics.clone()),
        )));
        tasks.push(tokio::spawn(acceptor.run()));

        info!(
            listen = %local_addr,
            algorithm = pool.algorithm(),
            active_backends = pool.len(),
            "SMPP load balancer started"
        );

        Ok(BalancerHandle {
            local_addr,
            diagnostics_addr,
            pool,
            clients,
            checker,
            metrics: metrics_registry,
            shutdown_tx,
            tasks,
        })
    }
}

/// Running balancer. Dropping it without calling `shutdown` also stops
/// the background tasks, since their shutdown channel closes.
pub struct BalancerHandle {
    local_addr: SocketAddr,
    diagnostics_addr: Option<SocketAddr>,
    pool: Arc<BackendPool>,
    clients: Arc<ClientRegistry>,
    checker: Arc<HealthChecker>,
    metrics: Arc<MetricsRegistry>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BalancerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn diagnostics_addr(&self) -> Option<SocketAddr> {
        self.diagnostics_addr
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub fn clients(&self) -> BTreeMap<IpAddr, ClientSnapshot> {
        self.clients.snapshot()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Run a health cycle now instead of waiting for the next tick.
    pub async fn refresh_now(&self) -> CycleSummary {
        self.checker.check_all_backends().await
    }

    /// Stop accepting and stop background work. In-flight links drain
    /// unless the proxy config says otherwise.
    pub fn shutdown(&self) {
        info!("Shutting down load balancer...");
        self.shutdown_tx.send_replace(true);
    }

    /// Wait for the background tasks to finish after `shutdown`.
    pub async fn stopped(self) {
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Load balancer stopped");
    }
}
