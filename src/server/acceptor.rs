// ────────────────────────────────
// src/server/acceptor.rs
// Owns the SMPP listening socket and hands every connection to the
// ConnectionHandler on its own task.
// ────────────────────────────────
use crate::clients::ClientRegistry;
use crate::metrics::MetricsCollector;
use crate::proxy::{ConnectionHandler, ProxyError};
use crate::server::listener::bind_tcp;
use anyhow::Result;
use chrono::Utc;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

pub struct ConnectionAcceptor {
    listener: TcpListener,
    handler: Arc<ConnectionHandler>,
    clients: Arc<ClientRegistry>,
    metrics: Arc<MetricsCollector>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionAcceptor {
    pub async fn bind(
        addr: &str,
        handler: Arc<ConnectionHandler>,
        clients: Arc<ClientRegistry>,
        metrics: Arc<MetricsCollector>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let listener = bind_tcp(addr).await?;
        info!("Load balancer listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handler,
            clients,
            metrics,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until shutdown. The listener is dropped on return, so new
    /// connects are refused while links already spawned keep running.
    pub async fn run(self) {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                biased;
                _ = async {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                } => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                        // Brief sleep to avoid tight loop on persistent errors
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        info!("Acceptor stopped");
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let client_ip = peer.ip();
        self.clients.register(client_ip, Utc::now());
        self.metrics.record_accept();
        info!(client = %client_ip, "New client connection accepted");

        let handler = self.handler.clone();
        let clients = self.clients.clone();
        let metrics = self.metrics.clone();
        let span = tracing::info_span!("connection", id = %Uuid::new_v4(), peer = %peer);

        tokio::spawn(
            async move {
                match handler.handle(stream, peer).await {
                    Ok(link) => {
                        metrics.link_opened();
                        let backend = link.backend().id.clone();
                        let (upstream, downstream) = link.join().await;
                        metrics.link_closed();
                        debug!(
                            backend = %backend,
                            bytes_up = upstream.map(|o| o.bytes).unwrap_or(0),
                            bytes_down = downstream.map(|o| o.bytes).unwrap_or(0),
                            "Connection closed"
                        );
                    }
                    Err(ProxyError::NoBackendAvailable) => {}
                    Err(ProxyError::ClientClosed) => debug!("Client left before proxying"),
                    Err(e) => warn!(error = %e, "Connection failed"),
                }
                clients.release(client_ip);
            }
            .instrument(span),
        );
    }
}
