// src/config/models.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Payload written to a client when no backend is active.
pub const DEFAULT_NO_BACKEND_RESPONSE: &str =
    "HTTP/1.1 503 Service Unavailable\r\n\r\nNo active SMPP servers available.";

/// Upper bound for every timer and timeout setting (one week).
pub const MAX_TIMER_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for `clients.idle_ttl_secs` (ten years).
pub const MAX_IDLE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub clients: ClientRegistryConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub algorithm: LoadBalancerAlgorithm,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.host.trim().is_empty() {
                bail!("backend host must not be empty");
            }
            if backend.port == 0 {
                bail!("backend {} has port 0", backend.host);
            }
            if !seen.insert(backend.id()) {
                bail!("duplicate backend {}", backend.id());
            }
        }

        check_secs("health_check.interval_secs", self.health_check.interval_secs)?;
        check_secs("health_check.timeout_secs", self.health_check.timeout_secs)?;
        check_secs("proxy.connect_timeout_secs", self.proxy.connect_timeout_secs)?;
        if self.proxy.first_read_timeout_ms > MAX_TIMER_SECS * 1000 {
            bail!(
                "proxy.first_read_timeout_ms must be at most {}",
                MAX_TIMER_SECS * 1000
            );
        }
        if self.proxy.buffer_size == 0 {
            bail!("proxy.buffer_size must be greater than zero");
        }
        if self.clients.max_entries == 0 {
            bail!("clients.max_entries must be greater than zero");
        }
        check_secs("clients.sweep_interval_secs", self.clients.sweep_interval_secs)?;
        if self.clients.idle_ttl_secs > MAX_IDLE_TTL_SECS {
            bail!("clients.idle_ttl_secs must be at most {}", MAX_IDLE_TTL_SECS);
        }

        Ok(())
    }
}

fn check_secs(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        bail!("{} must be greater than zero", name);
    }
    if value > MAX_TIMER_SECS {
        bail!("{} must be at most {}", name, MAX_TIMER_SECS);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl ListenConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
        }
    }
}

/// One SMPP server as described by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl BackendConfig {
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            timeout_secs: default_health_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// How long to wait for the client's first PDU before forwarding blind.
    #[serde(default = "default_first_read_timeout")]
    pub first_read_timeout_ms: u64,
    /// Written verbatim when no backend is active. Empty means close silently.
    #[serde(default = "default_no_backend_response")]
    pub no_backend_response: String,
    /// When false, shutdown also cancels in-flight links.
    #[serde(default = "default_true")]
    pub drain_on_shutdown: bool,
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn first_read_timeout(&self) -> Duration {
        Duration::from_millis(self.first_read_timeout_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            buffer_size: default_buffer_size(),
            first_read_timeout_ms: default_first_read_timeout(),
            no_backend_response: default_no_backend_response(),
            drain_on_shutdown: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistryConfig {
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl ClientRegistryConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for ClientRegistryConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_diagnostics_host")]
    pub host: String,
    #[serde(default = "default_diagnostics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl DiagnosticsConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_diagnostics_host(),
            port: default_diagnostics_port(),
            metrics_path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerAlgorithm {
    #[default]
    RoundRobin,
}

fn default_true() -> bool {
    true
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    2775
}

fn default_health_interval() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_buffer_size() -> usize {
    8192
}

fn default_first_read_timeout() -> u64 {
    5000
}

fn default_no_backend_response() -> String {
    DEFAULT_NO_BACKEND_RESPONSE.to_string()
}

fn default_idle_ttl() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    10_000
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_diagnostics_host() -> String {
    "127.0.0.1".to_string()
}

fn default_diagnostics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
