//! Top-level server wiring.
//!
//! Binds the configured listeners, runs the acceptor and the shutdown
//! coordinator's drain phase, and surfaces completion to the process owner.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::SharedApp;
use crate::config::schema::{Protocol, ServerConfig};
use crate::lifecycle::shutdown::Coordinator;
use crate::net::acceptor::Acceptor;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{BindError, Listener, Supervisor};

/// A bound, not-yet-serving server.
pub struct Server {
    config: Arc<ServerConfig>,
    app: SharedApp,
    coordinator: Coordinator,
    tracker: ConnectionTracker,
    listeners: Vec<Listener>,
}

impl Server {
    /// Bind every configured listener. Bind failure aborts startup and names
    /// the offending spec.
    pub async fn bind(config: ServerConfig, app: SharedApp) -> Result<Self, BindError> {
        let listeners = Supervisor::bind_all(&config.listeners).await?;
        Ok(Self {
            config: Arc::new(config),
            app,
            coordinator: Coordinator::new(),
            tracker: ConnectionTracker::new(),
            listeners,
        })
    }

    /// Handle used to trigger and observe shutdown.
    pub fn coordinator(&self) -> Coordinator {
        self.coordinator.clone()
    }

    /// The live-connection registry.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Addresses actually bound (useful with port 0).
    pub fn local_addrs(&self) -> Vec<(Protocol, SocketAddr)> {
        self.listeners
            .iter()
            .map(|listener| (listener.protocol(), listener.local_addr))
            .collect()
    }

    /// Serve until shutdown completes.
    ///
    /// Returns once the shutdown coordinator reaches `Stopped`: every
    /// connection has closed and the listener sockets are released.
    pub async fn serve(self) {
        let Self {
            config,
            app,
            coordinator,
            tracker,
            listeners,
        } = self;

        tracing::info!(
            listeners = listeners.len(),
            max_connections = config.limits.max_connections,
            "Server started"
        );

        let drain_timeout = Duration::from_secs(config.timeouts.drain_secs);
        let acceptor = Acceptor::new(
            listeners,
            config,
            app,
            coordinator.clone(),
            tracker.clone(),
        );
        let accept_task = tokio::spawn(acceptor.run());

        coordinator.run_drain(tracker, drain_timeout).await;
        let _ = accept_task.await;
    }
}
