// src/proxy/link.rs
use super::backend::Backend;
use super::forwarder::ForwardOutcome;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cancellation shared by the two halves of one proxied connection.
///
/// Whichever forwarder finishes first cancels the token, which makes its
/// partner stop and drop its socket halves.
#[derive(Clone, Debug)]
pub struct LinkToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl LinkToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for LinkToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One client socket paired with one backend socket.
#[derive(Debug)]
pub struct ProxyLink {
    backend: Arc<Backend>,
    token: LinkToken,
    upstream: JoinHandle<ForwardOutcome>,
    downstream: JoinHandle<ForwardOutcome>,
}

impl ProxyLink {
    pub(crate) fn new(
        backend: Arc<Backend>,
        token: LinkToken,
        upstream: JoinHandle<ForwardOutcome>,
        downstream: JoinHandle<ForwardOutcome>,
    ) -> Self {
        Self {
            backend,
            token,
            upstream,
            downstream,
        }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Tear the link down from outside.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for both forwarders. Returns (client->backend, backend->client).
    pub async fn join(self) -> (Option<ForwardOutcome>, Option<ForwardOutcome>) {
        let (upstream, downstream) = tokio::join!(self.upstream, self.downstream);
        (upstream.ok(), downstream.ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_every_waiter() {
        let token = LinkToken::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let token = token.clone();
                tokio::spawn(async move { token.cancelled().await })
            })
            .collect();

        token.cancel();
        token.cancel();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_after_cancel() {
        let token = LinkToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn link_debug_names_its_backend() {
        use crate::proxy::forwarder::{Direction, EndReason};

        let outcome = |direction| ForwardOutcome {
            direction,
            bytes: 0,
            chunks: 0,
            reason: EndReason::Eof,
        };
        let link = ProxyLink::new(
            Arc::new(Backend::new("smpp-a", 2775)),
            LinkToken::new(),
            tokio::spawn(async move { outcome(Direction::ClientToBackend) }),
            tokio::spawn(async move { outcome(Direction::BackendToClient) }),
        );

        assert!(format!("{:?}", link).contains("smpp-a:2775"));

        let (up, down) = link.join().await;
        assert_eq!(up.unwrap().direction, Direction::ClientToBackend);
        assert_eq!(down.unwrap().direction, Direction::BackendToClient);
    }
}
