// src/health/mod.rs
mod checker;
mod status;

pub use checker::{CycleSummary, HealthCheckResult, HealthChecker};
pub use status::BackendStatus;
