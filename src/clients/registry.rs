// src/clients/registry.rs
use crate::metrics::MetricsCollector;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Per-source-IP bookkeeping for diagnostics.
///
/// Connections from the same address share one session: reconnecting
/// refreshes the connect time and the forwarded counter keeps
/// accumulating.
#[derive(Debug)]
struct ClientSession {
    connect_time: DateTime<Utc>,
    last_seen_ms: AtomicI64,
    messages_forwarded: AtomicU64,
    active_connections: AtomicUsize,
}

impl ClientSession {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            connect_time: at,
            last_seen_ms: AtomicI64::new(at.timestamp_millis()),
            messages_forwarded: AtomicU64::new(0),
            active_connections: AtomicUsize::new(1),
        }
    }

    fn touch(&self, at_ms: i64) {
        self.last_seen_ms.fetch_max(at_ms, Ordering::Relaxed);
    }

    fn is_idle(&self) -> bool {
        self.active_connections.load(Ordering::Acquire) == 0
    }

    fn snapshot(&self) -> ClientSnapshot {
        let last_seen_ms = self.last_seen_ms.load(Ordering::Relaxed);
        ClientSnapshot {
            connect_time: self.connect_time,
            last_seen: Utc
                .timestamp_millis_opt(last_seen_ms)
                .single()
                .unwrap_or(self.connect_time),
            messages_forwarded: self.messages_forwarded.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSnapshot {
    pub connect_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub messages_forwarded: u64,
    pub active_connections: usize,
}

pub struct ClientRegistry {
    sessions: DashMap<IpAddr, ClientSession>,
    max_entries: usize,
    idle_ttl: Duration,
}

impl ClientRegistry {
    pub fn new(max_entries: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_entries,
            idle_ttl,
        }
    }

    /// Record a new connection from `ip`.
    pub fn register(&self, ip: IpAddr, at: DateTime<Utc>) {
        if !self.sessions.contains_key(&ip) && self.sessions.len() >= self.max_entries {
            self.make_room(at);
        }

        self.sessions
            .entry(ip)
            .and_modify(|session| {
                session.connect_time = at;
                session.touch(at.timestamp_millis());
                session.active_connections.fetch_add(1, Ordering::AcqRel);
            })
            .or_insert_with(|| ClientSession::new(at));
    }

    /// Count one forwarded chunk. Returns false when `ip` has no session.
    pub fn record_forward(&self, ip: IpAddr) -> bool {
        match self.sessions.get(&ip) {
            Some(session) => {
                session.messages_forwarded.fetch_add(1, Ordering::Relaxed);
                session.touch(Utc::now().timestamp_millis());
                true
            }
            None => false,
        }
    }

    /// Mark one connection from `ip` as finished.
    pub fn release(&self, ip: IpAddr) {
        if let Some(session) = self.sessions.get(&ip) {
            let _ = session.active_connections.fetch_update(
                Ordering::AcqRel,
                Ordering::Acquire,
                |n| n.checked_sub(1),
            );
            session.touch(Utc::now().timestamp_millis());
        }
    }

    pub fn get(&self, ip: IpAddr) -> Option<ClientSnapshot> {
        self.sessions.get(&ip).map(|s| s.snapshot())
    }

    pub fn snapshot(&self) -> BTreeMap<IpAddr, ClientSnapshot> {
        self.sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().snapshot()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop idle sessions not seen for longer than the configured TTL.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let ttl_ms = i64::try_from(self.idle_ttl.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.timestamp_millis().saturating_sub(ttl_ms);
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            !session.is_idle() || session.last_seen_ms.load(Ordering::Relaxed) > cutoff
        });
        before.saturating_sub(self.sessions.len())
    }

    // Called when the table is full and a new address arrives. Live
    // sessions are never evicted, so the cap can be exceeded.
    fn make_room(&self, now: DateTime<Utc>) {
        if self.sweep_at(now) > 0 {
            return;
        }

        let oldest = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle())
            .min_by_key(|entry| entry.value().last_seen_ms.load(Ordering::Relaxed))
            .map(|entry| *entry.key());

        if let Some(ip) = oldest {
            if self.sessions.remove_if(&ip, |_, s| s.is_idle()).is_some() {
                debug!(client = %ip, "Evicted oldest idle client session");
            }
        }
    }

    /// Sweep on a fixed period until shutdown.
    pub async fn run_sweeper(
        self: Arc<Self>,
        period: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        metrics: Option<Arc<MetricsCollector>>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        debug!(removed, remaining = self.len(), "Swept idle client sessions");
                    }
                    if let Some(metrics) = &metrics {
                        metrics.update_client_sessions(self.len());
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Client registry sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }
}
