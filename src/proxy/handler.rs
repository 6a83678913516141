// ────────────────────────────────
// src/proxy/handler.rs
// Per-connection orchestration: pick a backend, connect, splice.
// ────────────────────────────────

use super::backend::Backend;
use super::forwarder::{Direction, StreamForwarder};
use super::link::{LinkToken, ProxyLink};
use super::pdu::HeaderPeek;
use super::pool::BackendPool;
use crate::clients::ClientRegistry;
use crate::config::ProxyConfig;
use crate::metrics::MetricsCollector;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, Instrument};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No active SMPP backends available")]
    NoBackendAvailable,

    #[error("Failed to connect to backend {backend}: {source}")]
    BackendConnect {
        backend: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to backend {backend} after {timeout:?}")]
    BackendConnectTimeout { backend: String, timeout: Duration },

    #[error("Client closed the connection before sending data")]
    ClientClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handles one accepted client connection.
///
/// Every failure is terminal for that connection: there is no retry and
/// no second backend is tried.
#[derive(Clone)]
pub struct ConnectionHandler {
    pool: Arc<BackendPool>,
    clients: Arc<ClientRegistry>,
    metrics: Arc<MetricsCollector>,
    config: ProxyConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionHandler {
    pub fn new(
        pool: Arc<BackendPool>,
        clients: Arc<ClientRegistry>,
        metrics: Arc<MetricsCollector>,
        config: ProxyConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            clients,
            metrics,
            config,
            shutdown_rx,
        }
    }

    pub async fn handle(&self, mut client: TcpStream, peer: SocketAddr) -> Result<ProxyLink, ProxyError> {
        let backend = match self.pool.next() {
            Some(backend) => backend,
            None => {
                error!("No active backends available; refusing client");
                self.metrics.record_rejected();
                self.refuse(client).await;
                return Err(ProxyError::NoBackendAvailable);
            }
        };

        debug!(backend = %backend.id, "Backend selected");
        self.metrics.record_selection(&backend.id);

        let mut upstream = match self.connect(&backend).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(backend = %backend.id, error = %e, "Backend connect failed; closing client");
                self.metrics.record_connect_failure(&backend.id);
                let _ = client.shutdown().await;
                return Err(e);
            }
        };

        info!(backend = %backend.id, "Connected client to backend");

        self.relay_first_chunk(&mut client, &mut upstream, peer).await?;

        Ok(self.splice(client, upstream, peer, backend))
    }

    async fn connect(&self, backend: &Backend) -> Result<TcpStream, ProxyError> {
        let connect_timeout = self.config.connect_timeout();
        match timeout(connect_timeout, TcpStream::connect(backend.address())).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ProxyError::BackendConnect {
                backend: backend.id.clone(),
                source,
            }),
            Err(_) => Err(ProxyError::BackendConnectTimeout {
                backend: backend.id.clone(),
                timeout: connect_timeout,
            }),
        }
    }

    async fn refuse(&self, mut client: TcpStream) {
        let response = self.config.no_backend_response.as_bytes();
        if !response.is_empty() {
            if let Err(e) = client.write_all(response).await {
                error!(error = %e, "Error sending service-unavailable response");
            }
        }
        let _ = client.shutdown().await;
    }

    // Read whatever the client sends first, log its SMPP header, and pass
    // it on untouched. A client that stays silent is forwarded blind.
    async fn relay_first_chunk(
        &self,
        client: &mut TcpStream,
        upstream: &mut TcpStream,
        peer: SocketAddr,
    ) -> Result<(), ProxyError> {
        let mut first = vec![0u8; self.config.buffer_size];

        let n = match timeout(self.config.first_read_timeout(), client.read(&mut first)).await {
            Ok(Ok(0)) => {
                debug!("Client closed before sending a PDU");
                let _ = upstream.shutdown().await;
                return Err(ProxyError::ClientClosed);
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                let _ = upstream.shutdown().await;
                return Err(e.into());
            }
            Err(_) => {
                debug!("No initial PDU from client; forwarding without header peek");
                return Ok(());
            }
        };

        match HeaderPeek::parse(&first[..n]) {
            Some(header) => info!(
                client = %peer.ip(),
                system_id = header.system_id.as_deref().unwrap_or("-"),
                pdu = %header,
                "SMPP client bind request"
            ),
            None => debug!(bytes = n, "First chunk shorter than an SMPP header"),
        }

        upstream.write_all(&first[..n]).await?;
        self.metrics.record_forwarded(Direction::ClientToBackend.as_str(), n);
        Ok(())
    }

    fn splice(
        &self,
        client: TcpStream,
        upstream: TcpStream,
        peer: SocketAddr,
        backend: Arc<Backend>,
    ) -> ProxyLink {
        let (client_read, client_write) = client.into_split();
        let (backend_read, backend_write) = upstream.into_split();
        let token = LinkToken::new();

        if !self.config.drain_on_shutdown {
            let token = token.clone();
            let mut shutdown_rx = self.shutdown_rx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    true = async { shutdown_rx.wait_for(|stop| *stop).await.is_ok() } => {
                        debug!("Shutdown cancelling in-flight link");
                        token.cancel();
                    }
                }
            });
        }

        let upstream_task = StreamForwarder::new(Direction::ClientToBackend, self.config.buffer_size)
            .counting(self.clients.clone(), peer.ip())
            .with_metrics(self.metrics.clone())
            .run(client_read, backend_write, token.clone());

        let downstream_task = StreamForwarder::new(Direction::BackendToClient, self.config.buffer_size)
            .with_metrics(self.metrics.clone())
            .run(backend_read, client_write, token.clone());

        ProxyLink::new(
            backend,
            token,
            tokio::spawn(upstream_task.in_current_span()),
            tokio::spawn(downstream_task.in_current_span()),
        )
    }
}
