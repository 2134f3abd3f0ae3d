//! Connection acceptor.
//!
//! # Responsibilities
//! - One multiplexed wait across every listener socket (TCP and UDP)
//! - Enforce the connection-concurrency ceiling via semaphore permits:
//!   at the ceiling the accept itself is deferred, never the handler spawn
//! - Hand TCP connections to per-connection handler tasks, UDP datagrams to
//!   the stateless datagram router
//! - Refuse TCP connections once draining begins, stop entirely at Closing
//! - Replace a listener whose accept loop broke, without touching siblings

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use crate::bridge::SharedApp;
use crate::config::schema::{ListenerSpec, ServerConfig};
use crate::datagram::DatagramRouter;
use crate::http::handler::ConnectionHandler;
use crate::lifecycle::shutdown::{Coordinator, ShutdownState};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerSocket, Supervisor};

struct TcpEntry {
    spec: ListenerSpec,
    listener: TcpListener,
    local_addr: SocketAddr,
}

struct UdpEntry {
    spec: ListenerSpec,
    socket: UdpSocket,
    local_addr: SocketAddr,
}

/// Accepts connections and datagrams for the whole server.
pub struct Acceptor {
    listeners: Vec<Listener>,
    config: Arc<ServerConfig>,
    app: SharedApp,
    coordinator: Coordinator,
    tracker: ConnectionTracker,
}

impl Acceptor {
    pub fn new(
        listeners: Vec<Listener>,
        config: Arc<ServerConfig>,
        app: SharedApp,
        coordinator: Coordinator,
        tracker: ConnectionTracker,
    ) -> Self {
        Self {
            listeners,
            config,
            app,
            coordinator,
            tracker,
        }
    }

    /// Run until the shutdown coordinator reaches `Closing`. Dropping the
    /// entries on exit releases every listener socket.
    pub async fn run(self) {
        let Self {
            listeners,
            config,
            app,
            coordinator,
            tracker,
        } = self;

        let mut tcp: Vec<TcpEntry> = Vec::new();
        let mut udp: Vec<UdpEntry> = Vec::new();
        for listener in listeners {
            match listener.socket {
                ListenerSocket::Tcp(socket) => tcp.push(TcpEntry {
                    spec: listener.spec,
                    listener: socket,
                    local_addr: listener.local_addr,
                }),
                ListenerSocket::Udp(socket) => udp.push(UdpEntry {
                    spec: listener.spec,
                    socket,
                    local_addr: listener.local_addr,
                }),
            }
        }

        let router = DatagramRouter::new(Arc::clone(&app));
        let permits = Arc::new(Semaphore::new(config.limits.max_connections));
        let max_datagram = config.limits.max_datagram_bytes;
        let mut state_rx = coordinator.subscribe();
        let (rebind_tx, mut rebind_rx) = mpsc::channel::<Listener>(4);
        let mut reserved: Option<OwnedSemaphorePermit> = None;

        loop {
            let state = *state_rx.borrow();
            if state >= ShutdownState::Closing {
                break;
            }
            let draining = state >= ShutdownState::Draining;
            if draining && !udp.is_empty() {
                // Datagrams are fire-and-forget; nothing to drain.
                for entry in udp.drain(..) {
                    tracing::info!(spec = %entry.spec, "Listener stopped");
                }
            }

            tokio::select! {
                biased;
                _ = state_rx.changed() => {}

                Some(listener) = rebind_rx.recv() => {
                    match listener.socket {
                        ListenerSocket::Tcp(socket) => tcp.push(TcpEntry {
                            spec: listener.spec,
                            listener: socket,
                            local_addr: listener.local_addr,
                        }),
                        ListenerSocket::Udp(socket) => udp.push(UdpEntry {
                            spec: listener.spec,
                            socket,
                            local_addr: listener.local_addr,
                        }),
                    }
                }

                permit = Arc::clone(&permits).acquire_owned(),
                    if reserved.is_none() && !tcp.is_empty() =>
                {
                    // Holding a permit before waiting on readiness is what
                    // defers accepts at the concurrency ceiling.
                    match permit {
                        Ok(permit) => reserved = Some(permit),
                        Err(_) => break,
                    }
                }

                (index, result) = accept_any(&tcp), if reserved.is_some() && !tcp.is_empty() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if draining {
                                tracing::debug!(peer_addr = %peer_addr, "Refusing connection during drain");
                                drop(stream);
                            } else if let Some(permit) = reserved.take() {
                                let local_addr = tcp[index].local_addr;
                                spawn_connection(
                                    stream,
                                    peer_addr,
                                    local_addr,
                                    permit,
                                    Arc::clone(&config),
                                    Arc::clone(&app),
                                    &coordinator,
                                    &tracker,
                                );
                            }
                        }
                        Err(error) if is_transient_accept_error(&error) => {
                            tracing::debug!(%error, "Transient accept error");
                        }
                        Err(error) => {
                            let entry = tcp.swap_remove(index);
                            tracing::warn!(
                                spec = %entry.spec,
                                %error,
                                "Listener accept loop failed, re-binding"
                            );
                            spawn_rebind(entry.spec, rebind_tx.clone());
                        }
                    }
                }

                (index, result) = recv_any(&udp, max_datagram), if !udp.is_empty() => {
                    match result {
                        Ok((payload, peer_addr)) => {
                            router.route(payload, peer_addr, udp[index].local_addr);
                        }
                        Err(error) if is_transient_accept_error(&error) => {
                            tracing::debug!(%error, "Transient datagram receive error");
                        }
                        Err(error) => {
                            let entry = udp.swap_remove(index);
                            tracing::warn!(
                                spec = %entry.spec,
                                %error,
                                "Datagram listener failed, re-binding"
                            );
                            spawn_rebind(entry.spec, rebind_tx.clone());
                        }
                    }
                }
            }
        }

        for entry in tcp.drain(..) {
            tracing::info!(spec = %entry.spec, "Listener stopped");
        }
        for entry in udp.drain(..) {
            tracing::info!(spec = %entry.spec, "Listener stopped");
        }
        tracing::info!("Acceptor stopped");
    }
}

/// One readiness wait across all TCP listeners.
async fn accept_any(
    entries: &[TcpEntry],
) -> (usize, std::io::Result<(TcpStream, SocketAddr)>) {
    let futures = entries.iter().enumerate().map(|(index, entry)| {
        Box::pin(async move { (index, entry.listener.accept().await) })
    });
    futures_util::future::select_all(futures).await.0
}

/// One readiness wait across all UDP sockets, with a bounded read.
async fn recv_any(
    entries: &[UdpEntry],
    max_datagram: usize,
) -> (usize, std::io::Result<(Vec<u8>, SocketAddr)>) {
    let futures = entries.iter().enumerate().map(|(index, entry)| {
        Box::pin(async move {
            let mut buf = vec![0u8; max_datagram];
            let result = entry.socket.recv_from(&mut buf).await.map(|(len, peer)| {
                buf.truncate(len);
                (buf, peer)
            });
            (index, result)
        })
    });
    futures_util::future::select_all(futures).await.0
}

#[allow(clippy::too_many_arguments)]
fn spawn_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    permit: OwnedSemaphorePermit,
    config: Arc<ServerConfig>,
    app: SharedApp,
    coordinator: &Coordinator,
    tracker: &ConnectionTracker,
) {
    let _ = stream.set_nodelay(true);
    let guard = tracker.track();
    tracing::debug!(
        peer_addr = %peer_addr,
        connection_id = %guard.id(),
        active = tracker.active_count(),
        "Connection accepted"
    );

    let handler = ConnectionHandler::new(
        stream,
        peer_addr,
        local_addr,
        config,
        app,
        coordinator.subscribe(),
        coordinator.subscribe_force_close(),
    );

    tokio::spawn(async move {
        let _ = handler.run().await;
        drop(guard);
        drop(permit);
    });
}

fn spawn_rebind(spec: ListenerSpec, rebind_tx: mpsc::Sender<Listener>) {
    tokio::spawn(async move {
        if let Some(listener) = Supervisor::rebind(&spec).await {
            let _ = rebind_tx.send(listener).await;
        }
    });
}

/// Errors that poison a single accept, not the listener itself.
fn is_transient_accept_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
    )
}
