//! Backend connection pool.
//!
//! # Data Flow
//! ```text
//! acquire(host, port, tls)
//!     → key "host:port"
//!     → entry present, unexpired, Ready  → clone handle
//!     → entry expired or not Ready       → close, discard, dial
//!     → dial (dialer.rs) → store with fresh expiry → clone handle
//!
//! Evictor task (every eviction interval):
//!     → close and remove entries past expiry
//! ```
//!
//! # Design Decisions
//! - One channel per backend address, shared by all concurrent callers
//! - No lock is held while dialing; concurrent first acquires may each dial
//!   and the last insert wins
//! - Callers keep their own clone, so eviction never cuts an in-flight call
//! - Failed calls downgrade the channel (connection.rs), the next acquire
//!   replaces it

pub mod connection;
pub mod dialer;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::GatewayError;
use crate::observability::metrics;

pub use connection::{ConnectionId, ConnectivityState, PooledChannel};
pub use dialer::{Dialer, GrpcDialer, TlsSettings};

struct PoolEntry<C> {
    conn: PooledChannel<C>,
    expiry: Instant,
}

/// Reusable backend channels keyed by `"host:port"`.
pub struct ConnectionPool<D: Dialer> {
    dialer: D,
    entries: DashMap<String, PoolEntry<D::Channel>>,
    ttl: Duration,
}

impl<D: Dialer> ConnectionPool<D> {
    pub fn new(dialer: D, ttl: Duration) -> Self {
        Self {
            dialer,
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Hand out a ready channel to `host:port`, dialing if needed.
    pub async fn acquire(
        &self,
        host: &str,
        port: &str,
        tls: &TlsSettings,
    ) -> Result<PooledChannel<D::Channel>, GatewayError> {
        if host.is_empty() || port.is_empty() {
            return Err(GatewayError::connection(
                format!("{host}:{port}"),
                "empty host or port",
            ));
        }

        let key = format!("{host}:{port}");
        if let Some(conn) = self.reusable(&key) {
            return Ok(conn);
        }

        let channel = match self.dialer.dial(host, port, tls).await {
            Ok(channel) => channel,
            Err(e) => {
                metrics::record_pool_dial("error");
                tracing::error!(addr = %key, error = %e, "backend dial failed");
                return Err(e);
            }
        };
        metrics::record_pool_dial("ok");

        let conn = PooledChannel::ready(channel, &key);
        tracing::debug!(addr = %key, id = %conn.id(), "backend channel dialed");
        let replaced = self.entries.insert(
            key,
            PoolEntry {
                conn: conn.clone(),
                expiry: Instant::now() + self.ttl,
            },
        );
        if let Some(old) = replaced {
            old.conn.close();
        }
        metrics::record_pool_size(self.entries.len());
        Ok(conn)
    }

    fn reusable(&self, key: &str) -> Option<PooledChannel<D::Channel>> {
        let (conn, expired) = {
            let entry = self.entries.get(key)?;
            (entry.conn.clone(), Instant::now() >= entry.expiry)
        };

        if !expired && conn.is_ready() {
            return Some(conn);
        }

        tracing::debug!(
            addr = %key,
            id = %conn.id(),
            expired,
            state = ?conn.state(),
            "discarding pooled channel"
        );
        self.discard(key, conn.id());
        None
    }

    /// Remove `key` only if it still holds the channel with `id`.
    fn discard(&self, key: &str, id: ConnectionId) {
        if let Some((_, entry)) = self.entries.remove_if(key, |_, e| e.conn.id() == id) {
            entry.conn.close();
        }
    }

    /// Close and drop every expired channel. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.entries.retain(|key, entry| {
            if now >= entry.expiry {
                tracing::debug!(addr = %key, id = %entry.conn.id(), "evicting expired channel");
                entry.conn.close();
                evicted += 1;
                false
            } else {
                true
            }
        });
        metrics::record_pool_size(self.entries.len());
        evicted
    }

    /// Close everything, used on shutdown.
    pub fn close_all(&self) {
        for entry in self.entries.iter() {
            entry.conn.close();
        }
        self.entries.clear();
        metrics::record_pool_size(0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run [`ConnectionPool::evict_expired`] every `interval` until shutdown.
pub fn spawn_evictor<D: Dialer>(
    pool: Arc<ConnectionPool<D>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = pool.evict_expired();
                    if evicted > 0 {
                        tracing::info!(evicted, remaining = pool.len(), "pool eviction pass");
                    }
                }
                _ = shutdown.recv() => {
                    pool.close_all();
                    tracing::info!("pool evictor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}
