// src/clients/mod.rs
mod registry;

pub use registry::{ClientRegistry, ClientSnapshot};
