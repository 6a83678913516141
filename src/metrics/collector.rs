// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "Failed to encode metrics");
        }
        buffer
    }
}

pub struct MetricsCollector {
    // Connection metrics
    pub connections_accepted_total: IntCounter,
    pub connections_rejected_total: IntCounter,
    pub active_links: IntGauge,
    pub bytes_forwarded_total: IntCounterVec,

    // Backend metrics
    pub backend_selections_total: IntCounterVec,
    pub backend_connect_failures_total: IntCounterVec,
    pub backend_health_status: IntGaugeVec,
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,
    pub health_check_duration_seconds: Histogram,

    // Client registry
    pub client_sessions: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let connections_accepted_total = IntCounter::new(
            "smpp_lb_connections_accepted_total",
            "Total client connections accepted",
        )?;
        registry.register(Box::new(connections_accepted_total.clone()))?;

        let connections_rejected_total = IntCounter::new(
            "smpp_lb_connections_rejected_total",
            "Client connections refused because no backend was active",
        )?;
        registry.register(Box::new(connections_rejected_total.clone()))?;

        let active_links = IntGauge::new("smpp_lb_active_links", "Proxied connections in flight")?;
        registry.register(Box::new(active_links.clone()))?;

        let bytes_forwarded_total = IntCounterVec::new(
            Opts::new("smpp_lb_bytes_forwarded_total", "Bytes forwarded"),
            &["direction"],
        )?;
        registry.register(Box::new(bytes_forwarded_total.clone()))?;

        let backend_selections_total = IntCounterVec::new(
            Opts::new(
                "smpp_lb_backend_selections_total",
                "Connections routed to each backend",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_selections_total.clone()))?;

        let backend_connect_failures_total = IntCounterVec::new(
            Opts::new(
                "smpp_lb_backend_connect_failures_total",
                "Failed outbound connects per backend",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_connect_failures_total.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "smpp_lb_backend_health_status",
                "Backend health status (1=healthy, 0=unhealthy)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let healthy_backends =
            IntGauge::new("smpp_lb_healthy_backends", "Number of active backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends =
            IntGauge::new("smpp_lb_total_backends", "Number of known backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        let health_check_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "smpp_lb_health_check_duration_seconds",
            "Duration of a full health check cycle",
        ))?;
        registry.register(Box::new(health_check_duration_seconds.clone()))?;

        let client_sessions =
            IntGauge::new("smpp_lb_client_sessions", "Entries in the client registry")?;
        registry.register(Box::new(client_sessions.clone()))?;

        Ok(Self {
            connections_accepted_total,
            connections_rejected_total,
            active_links,
            bytes_forwarded_total,
            backend_selections_total,
            backend_connect_failures_total,
            backend_health_status,
            healthy_backends,
            total_backends,
            health_check_duration_seconds,
            client_sessions,
        })
    }

    pub fn record_accept(&self) {
        self.connections_accepted_total.inc();
    }

    pub fn record_rejected(&self) {
        self.connections_rejected_total.inc();
    }

    pub fn record_selection(&self, backend: &str) {
        self.backend_selections_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn record_connect_failure(&self, backend: &str) {
        self.backend_connect_failures_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn record_forwarded(&self, direction: &str, bytes: usize) {
        self.bytes_forwarded_total
            .with_label_values(&[direction])
            .inc_by(bytes as u64);
    }

    pub fn update_backend_health(&self, backend: &str, healthy: bool) {
        let value = if healthy { 1 } else { 0 };
        self.backend_health_status
            .with_label_values(&[backend])
            .set(value);
    }

    pub fn update_backend_counts(&self, healthy: usize, total: usize) {
        self.healthy_backends.set(healthy as i64);
        self.total_backends.set(total as i64);
    }

    pub fn observe_health_cycle(&self, duration: std::time::Duration) {
        self.health_check_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn link_opened(&self) {
        self.active_links.inc();
    }

    pub fn link_closed(&self) {
        self.active_links.dec();
    }

    pub fn update_client_sessions(&self, count: usize) {
        self.client_sessions.set(count as i64);
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathered_output_contains_recorded_values() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.record_accept();
        metrics.record_selection("10.0.0.1:2775");
        metrics.update_backend_counts(2, 3);

        let text = String::from_utf8(registry.gather()).unwrap();
        assert!(text.contains("smpp_lb_connections_accepted_total 1"));
        assert!(text.contains("smpp_lb_backend_selections_total{backend=\"10.0.0.1:2775\"} 1"));
        assert!(text.contains("smpp_lb_healthy_backends 2"));
        assert!(text.contains("smpp_lb_total_backends 3"));
    }

    #[test]
    fn registries_are_independent() {
        let first = MetricsRegistry::new().unwrap();
        let second = MetricsRegistry::new().unwrap();
        first.collector().record_rejected();

        assert_eq!(first.collector().connections_rejected_total.get(), 1);
        assert_eq!(second.collector().connections_rejected_total.get(), 0);
    }
}
