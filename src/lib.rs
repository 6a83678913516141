// src/lib.rs
pub mod balancer;
pub mod clients;
pub mod config;
pub mod health;
pub mod load_balancer;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod server;

pub use balancer::{Balancer, BalancerHandle};
