//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track the set of live connections for graceful shutdown
//! - Release registry slots when a connection handler finishes

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
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
        write!(f, "conn-{}", self.0)
    }
}

/// Registry of live connections.
///
/// The acceptor inserts by calling [`track`](Self::track); each connection
/// handler removes itself by dropping its [`ConnectionGuard`]. The count
/// lives in a watch channel so the shutdown coordinator can await the
/// registry becoming empty without polling.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    count_tx: watch::Sender<u64>,
}

impl ConnectionTracker {
    /// Create a new, empty tracker.
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self { count_tx }
    }

    /// Record a new live connection. Returns a guard that removes the
    /// connection from the registry on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.count_tx.send_modify(|count| *count += 1);
        ConnectionGuard {
            count_tx: self.count_tx.clone(),
            id: ConnectionId::new(),
        }
    }

    /// Current number of live connections.
    pub fn active_count(&self) -> u64 {
        *self.count_tx.borrow()
    }

    /// Wait until no connections remain.
    pub async fn wait_idle(&self) {
        let mut rx = self.count_tx.subscribe();
        // The sender half lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
/// Removes the connection from the registry when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    count_tx: watch::Sender<u64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count_tx
            .send_modify(|count| *count = count.saturating_sub(1));
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
