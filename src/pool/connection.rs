//! Pooled channel handle and its connectivity state.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track connectivity state (Ready → TransientFailure / Shutdown)
//! - Share one state cell between every clone of a handle

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Using relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a dialed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Connectivity state of a pooled channel.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle = 0,
    Connecting = 1,
    Ready = 2,
    TransientFailure = 3,
    Shutdown = 4,
}

impl From<u8> for ConnectivityState {
    fn from(val: u8) -> Self {
        match val {
            1 => ConnectivityState::Connecting,
            2 => ConnectivityState::Ready,
            3 => ConnectivityState::TransientFailure,
            4 => ConnectivityState::Shutdown,
            _ => ConnectivityState::Idle,
        }
    }
}

/// A channel handed out by the pool. Clones share the same state.
#[derive(Debug, Clone)]
pub struct PooledChannel<C> {
    channel: C,
    state: Arc<AtomicU8>,
    id: ConnectionId,
    addr: Arc<str>,
}

impl<C> PooledChannel<C> {
    /// Wrap a freshly dialed channel.
    pub fn ready(channel: C, addr: &str) -> Self {
        Self {
            channel,
            state: Arc::new(AtomicU8::new(ConnectivityState::Ready as u8)),
            id: ConnectionId::new(),
            addr: Arc::from(addr),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> ConnectivityState {
        ConnectivityState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectivityState::Ready
    }

    /// Passive health signal from a failed call. Shutdown is terminal.
    pub fn mark_transient_failure(&self) {
        let _ = self.state.compare_exchange(
            ConnectivityState::Ready as u8,
            ConnectivityState::TransientFailure as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Inspect a call's status and downgrade the channel on transport errors.
    pub fn observe(&self, status: &tonic::Status) {
        if status.code() == tonic::Code::Unavailable {
            tracing::debug!(addr = %self.addr, id = %self.id, "channel marked transient failure");
            self.mark_transient_failure();
        }
    }

    pub fn close(&self) {
        self.state
            .store(ConnectivityState::Shutdown as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = PooledChannel::ready((), "10.0.0.5:7001");
        let b = a.clone();
        assert!(b.is_ready());

        a.mark_transient_failure();
        assert_eq!(b.state(), ConnectivityState::TransientFailure);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn shutdown_is_not_downgraded() {
        let chan = PooledChannel::ready((), "10.0.0.5:7001");
        chan.close();
        chan.mark_transient_failure();
        assert_eq!(chan.state(), ConnectivityState::Shutdown);
    }

    #[test]
    fn only_unavailable_marks_failure() {
        let chan = PooledChannel::ready((), "10.0.0.5:7001");
        chan.observe(&tonic::Status::not_found("no such row"));
        assert!(chan.is_ready());
        chan.observe(&tonic::Status::unavailable("connection reset"));
        assert_eq!(chan.state(), ConnectivityState::TransientFailure);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
