// src/proxy/forwarder.rs
use super::link::LinkToken;
use crate::clients::ClientRegistry;
use crate::metrics::MetricsCollector;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client_to_backend",
            Direction::BackendToClient => "backend_to_client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The source reached end-of-stream.
    Eof,
    /// The paired forwarder (or shutdown) cancelled the link.
    Cancelled,
    /// Read or write failed.
    Error(io::ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOutcome {
    pub direction: Direction,
    pub bytes: u64,
    pub chunks: u64,
    pub reason: EndReason,
}

/// Copies one direction of a proxied connection in fixed-size chunks.
pub struct StreamForwarder {
    direction: Direction,
    buffer_size: usize,
    clients: Option<(Arc<ClientRegistry>, IpAddr)>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl StreamForwarder {
    pub fn new(direction: Direction, buffer_size: usize) -> Self {
        Self {
            direction,
            buffer_size,
            clients: None,
            metrics: None,
        }
    }

    /// Credit every chunk to `ip` in the client registry.
    pub fn counting(mut self, clients: Arc<ClientRegistry>, ip: IpAddr) -> Self {
        self.clients = Some((clients, ip));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pump bytes until EOF, an I/O error, or cancellation of `link`.
    ///
    /// On the way out the writer is shut down and `link` is cancelled, so
    /// the opposite direction stops too and both sockets get closed once
    /// the halves are dropped.
    pub async fn run<R, W>(self, mut reader: R, mut writer: W, link: LinkToken) -> ForwardOutcome
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.buffer_size];
        let mut bytes = 0u64;
        let mut chunks = 0u64;

        let reason = loop {
            let n = tokio::select! {
                biased;
                _ = link.cancelled() => break EndReason::Cancelled,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break EndReason::Eof,
                    Ok(n) => n,
                    Err(e) => break self.io_error(e),
                },
            };

            tokio::select! {
                biased;
                _ = link.cancelled() => break EndReason::Cancelled,
                written = writer.write_all(&buf[..n]) => {
                    if let Err(e) = written {
                        break self.io_error(e);
                    }
                }
            }

            bytes += n as u64;
            chunks += 1;
            trace!(direction = %self.direction, bytes = n, "Forwarded chunk");

            if let Some((clients, ip)) = &self.clients {
                clients.record_forward(*ip);
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_forwarded(self.direction.as_str(), n);
            }
        };

        // Errors here mean the peer is already gone.
        let _ = writer.shutdown().await;
        link.cancel();

        debug!(
            direction = %self.direction,
            bytes,
            chunks,
            reason = ?reason,
            "Forwarder finished"
        );

        ForwardOutcome {
            direction: self.direction,
            bytes,
            chunks,
            reason,
        }
    }

    fn io_error(&self, e: io::Error) -> EndReason {
        debug!(direction = %self.direction, error = %e, "Connection closed or failed");
        EndReason::Error(e.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn copies_until_eof_and_cancels_link() {
        let (mut source, reader) = duplex(64);
        let (writer, mut sink) = duplex(64);
        let link = LinkToken::new();

        let task = tokio::spawn(StreamForwarder::new(Direction::ClientToBackend, 8).run(
            reader,
            writer,
            link.clone(),
        ));

        source.write_all(b"hello world").await.unwrap();
        drop(source);

        let outcome = task.await.unwrap();
        assert_eq!(outcome.reason, EndReason::Eof);
        assert_eq!(outcome.bytes, 11);
        assert!(outcome.chunks >= 2, "8-byte buffer needs two reads");
        assert!(link.is_cancelled());

        let mut received = Vec::new();
        sink.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello world");
    }

    #[tokio::test]
    async fn cancellation_stops_a_blocked_reader() {
        let (_source, reader) = duplex(64);
        let (writer, _sink) = duplex(64);
        let link = LinkToken::new();

        let task = tokio::spawn(StreamForwarder::new(Direction::BackendToClient, 8192).run(
            reader,
            writer,
            link.clone(),
        ));

        link.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("forwarder did not stop")
            .unwrap();
        assert_eq!(outcome.reason, EndReason::Cancelled);
        assert_eq!(outcome.bytes, 0);
    }

    #[tokio::test]
    async fn one_side_ending_stops_the_other() {
        let (mut client, client_inner) = duplex(64);
        let (mut backend, backend_inner) = duplex(64);
        let (client_read, client_write) = tokio::io::split(client_inner);
        let (backend_read, backend_write) = tokio::io::split(backend_inner);
        let link = LinkToken::new();

        let up = tokio::spawn(StreamForwarder::new(Direction::ClientToBackend, 1024).run(
            client_read,
            backend_write,
            link.clone(),
        ));
        let down = tokio::spawn(StreamForwarder::new(Direction::BackendToClient, 1024).run(
            backend_read,
            client_write,
            link.clone(),
        ));

        client.write_all(b"bind").await.unwrap();
        let mut buf = [0u8; 4];
        backend.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"bind");

        // backend goes away; the client direction must notice
        drop(backend);

        let (up, down) = tokio::time::timeout(Duration::from_secs(1), async {
            (up.await.unwrap(), down.await.unwrap())
        })
        .await
        .expect("link did not tear down");

        assert_eq!(down.reason, EndReason::Eof);
        assert_eq!(up.reason, EndReason::Cancelled);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn chunks_are_credited_to_the_client() {
        let clients = Arc::new(ClientRegistry::new(10, Duration::from_secs(60)));
        let ip: IpAddr = "192.0.2.10".parse().unwrap();
        clients.register(ip, Utc::now());

        let (mut source, reader) = duplex(4);
        let (writer, mut sink) = duplex(64);

        let task = tokio::spawn(
            StreamForwarder::new(Direction::ClientToBackend, 4)
                .counting(clients.clone(), ip)
                .run(reader, writer, LinkToken::new()),
        );

        source.write_all(b"abcdefgh").await.unwrap();
        drop(source);

        let outcome = task.await.unwrap();
        let mut received = Vec::new();
        sink.read_to_end(&mut received).await.unwrap();

        assert_eq!(received, b"abcdefgh");
        assert_eq!(
            clients.get(ip).unwrap().messages_forwarded,
            outcome.chunks
        );
    }
}
