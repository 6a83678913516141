// src/health/status.rs
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Active,
    Inactive,
}

impl BackendStatus {
    pub fn is_active(self) -> bool {
        self == BackendStatus::Active
    }
}

impl From<bool> for BackendStatus {
    fn from(active: bool) -> Self {
        if active {
            BackendStatus::Active
        } else {
            BackendStatus::Inactive
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStatus::Active => f.write_str("active"),
            BackendStatus::Inactive => f.write_str("inactive"),
        }
    }
}
