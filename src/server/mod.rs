pub mod acceptor;
pub mod builder;
pub mod handler;
pub mod listener;

pub use acceptor::ConnectionAcceptor;
pub use builder::{BoundServer, ServerBuilder};
pub use handler::DiagnosticsHandler;
