//! Shutdown coordination.
//!
//! The [`Coordinator`] owns the process-wide [`ShutdownState`] machine and is
//! the only cancellation source in the server. Every long-running task
//! subscribes to the state watch channel; connection handlers additionally
//! subscribe to the force-close broadcast that fires when the drain deadline
//! passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::net::connection::ConnectionTracker;

/// Process-wide shutdown state.
///
/// Transitions are monotonic: `Running → Draining → Closing → Stopped`.
/// A request to move backwards is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    /// Serving traffic normally.
    Running,
    /// No new connections; in-flight requests are allowed to finish.
    Draining,
    /// Drain finished or timed out; everything remaining is force-closed.
    Closing,
    /// All sockets released.
    Stopped,
}

struct Inner {
    state_tx: watch::Sender<ShutdownState>,
    force_close_tx: broadcast::Sender<()>,
}

/// Coordinator for graceful shutdown.
///
/// Cloneable handle; all clones share the same state machine.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Create a new coordinator in the `Running` state.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ShutdownState::Running);
        let (force_close_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                state_tx,
                force_close_tx,
            }),
        }
    }

    /// Current shutdown state.
    pub fn state(&self) -> ShutdownState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to the force-close broadcast fired at the drain deadline.
    pub fn subscribe_force_close(&self) -> broadcast::Receiver<()> {
        self.inner.force_close_tx.subscribe()
    }

    /// Advance the state machine. Backward transitions are ignored.
    ///
    /// Returns true if the state actually changed.
    pub fn advance(&self, target: ShutdownState) -> bool {
        let mut changed = false;
        self.inner.state_tx.send_if_modified(|state| {
            if target > *state {
                tracing::info!(from = ?state, to = ?target, "Shutdown state advanced");
                *state = target;
                changed = true;
                true
            } else {
                false
            }
        });
        changed
    }

    /// Request shutdown.
    ///
    /// A graceful request starts draining; an immediate request (operator
    /// pressed Ctrl+C, or the platform is about to SIGKILL us) skips the
    /// drain and force-closes everything at once.
    pub fn request_shutdown(&self, graceful: bool) {
        self.advance(ShutdownState::Draining);
        if !graceful {
            self.advance(ShutdownState::Closing);
            let _ = self.inner.force_close_tx.send(());
        }
    }

    /// Wait until the state reaches at least `target`.
    pub async fn wait_for(&self, target: ShutdownState) {
        let mut rx = self.subscribe();
        // The sender half lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|state| *state >= target).await;
    }

    /// Drive the drain phase to completion.
    ///
    /// Waits for `Draining`, then lets in-flight connections finish until
    /// either the registry is empty or the drain timeout elapses, whichever
    /// comes first. Remaining connections are force-closed, and `Stopped`
    /// is reached once the registry is empty again.
    pub async fn run_drain(&self, tracker: ConnectionTracker, drain_timeout: Duration) {
        self.wait_for(ShutdownState::Draining).await;

        if self.state() < ShutdownState::Closing {
            tracing::info!(
                active_connections = tracker.active_count(),
                drain_timeout_secs = drain_timeout.as_secs(),
                "Draining connections"
            );
            tokio::select! {
                _ = tracker.wait_idle() => {
                    tracing::info!("All connections drained");
                }
                _ = tokio::time::sleep(drain_timeout) => {
                    tracing::warn!(
                        remaining = tracker.active_count(),
                        "Drain timeout reached, force-closing remaining connections"
                    );
                }
                _ = self.wait_for(ShutdownState::Closing) => {}
            }
        }

        self.advance(ShutdownState::Closing);
        let _ = self.inner.force_close_tx.send(());

        tracker.wait_idle().await;
        self.advance(ShutdownState::Stopped);
        tracing::info!("Shutdown complete");
    }

    /// Wait until shutdown has fully completed.
    ///
    /// This is the signal surfaced to the process owner.
    pub async fn wait_stopped(&self) {
        self.wait_for(ShutdownState::Stopped).await;
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
