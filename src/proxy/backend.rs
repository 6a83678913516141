// src/proxy/backend.rs
use crate::config::BackendConfig;
use crate::health::BackendStatus;
use serde::Serialize;

/// One pooled SMPP server. Identity is `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backend {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub priority: i32,
    pub region: Option<String>,
    pub active: bool,
}

impl Backend {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            id: format!("{}:{}", host, port),
            host,
            port,
            priority: 0,
            region: None,
            active: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus::from(self.active)
    }

    /// Address suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        self.id.clone()
    }
}

impl From<&BackendConfig> for Backend {
    fn from(config: &BackendConfig) -> Self {
        Self {
            id: config.id(),
            host: config.host.clone(),
            port: config.port,
            priority: config.priority,
            region: config.region.clone(),
            active: config.active,
        }
    }
}
