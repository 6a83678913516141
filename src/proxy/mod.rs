//
// src/proxy/mod.rs
//
mod backend;
mod forwarder;
mod handler;
mod link;
pub mod pdu;
mod pool;

pub use backend::Backend;
pub use forwarder::{Direction, EndReason, ForwardOutcome, StreamForwarder};
pub use handler::{ConnectionHandler, ProxyError};
pub use link::{LinkToken, ProxyLink};
pub use pool::BackendPool;
