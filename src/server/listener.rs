// ────────────────────────────────
// src/server/listener.rs
// Encapsulates low‑level TCP bind so both listeners fail the same way.
// ────────────────────────────────
use anyhow::{Context, Result};
use tokio::net::TcpListener;

pub async fn bind_tcp(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    Ok(listener)
}
