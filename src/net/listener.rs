//! Listener sockets and their supervisor.
//!
//! # Responsibilities
//! - Bind every configured listener spec at startup
//! - Treat bind failure as fatal, identifying the offending spec
//! - Re-bind an individual listener after a transient accept failure with
//!   bounded retry/backoff, without disturbing sibling listeners

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tokio::net::{TcpListener, UdpSocket};

use crate::config::schema::{ListenerSpec, Protocol};

/// Maximum re-bind attempts before a listener is retired.
const MAX_REBIND_ATTEMPTS: u32 = 5;
const REBIND_BASE_DELAY_MS: u64 = 100;
const REBIND_MAX_DELAY_MS: u64 = 5_000;

/// Fatal startup error: a listener spec could not be bound.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("invalid bind address for {spec}: {source}")]
    Address {
        spec: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {spec}: {source}")]
    Bind {
        spec: String,
        source: std::io::Error,
    },
}

/// A bound listener socket.
#[derive(Debug)]
pub enum ListenerSocket {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

/// A bound socket paired with the spec it was created from.
///
/// Owned exclusively by the supervisor/acceptor; dropped on shutdown or
/// re-bind, which closes the socket.
#[derive(Debug)]
pub struct Listener {
    pub spec: ListenerSpec,
    pub socket: ListenerSocket,
    pub local_addr: SocketAddr,
}

impl Listener {
    pub fn protocol(&self) -> Protocol {
        self.spec.protocol
    }
}

/// Binds and re-binds listener sockets.
pub struct Supervisor;

impl Supervisor {
    /// Bind every spec, failing fast on the first error.
    ///
    /// Bind failure (address in use, permission denied) is the one failure
    /// class that aborts startup entirely; the returned error names the
    /// offending spec.
    pub async fn bind_all(specs: &[ListenerSpec]) -> Result<Vec<Listener>, BindError> {
        let mut listeners = Vec::with_capacity(specs.len());
        for spec in specs {
            listeners.push(Self::bind_one(spec).await?);
        }
        Ok(listeners)
    }

    /// Bind a single spec.
    pub async fn bind_one(spec: &ListenerSpec) -> Result<Listener, BindError> {
        let addr: SocketAddr = spec.bind_address.parse().map_err(|source| {
            BindError::Address {
                spec: spec.to_string(),
                source,
            }
        })?;

        let socket = match spec.protocol {
            Protocol::Tcp => {
                let listener = TcpListener::bind(addr).await.map_err(|source| {
                    BindError::Bind {
                        spec: spec.to_string(),
                        source,
                    }
                })?;
                ListenerSocket::Tcp(listener)
            }
            Protocol::Udp => {
                let socket = UdpSocket::bind(addr).await.map_err(|source| {
                    BindError::Bind {
                        spec: spec.to_string(),
                        source,
                    }
                })?;
                ListenerSocket::Udp(socket)
            }
        };

        let local_addr = match &socket {
            ListenerSocket::Tcp(listener) => listener.local_addr(),
            ListenerSocket::Udp(socket) => socket.local_addr(),
        }
        .map_err(|source| BindError::Bind {
            spec: spec.to_string(),
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            protocol = %spec.protocol,
            backlog = spec.backlog,
            "Listener bound"
        );

        Ok(Listener {
            spec: spec.clone(),
            socket,
            local_addr,
        })
    }

    /// Re-bind a listener whose accept loop hit a transient I/O error.
    ///
    /// Retries with exponential backoff up to [`MAX_REBIND_ATTEMPTS`] times.
    /// Returns `None` if every attempt failed; the listener is then retired
    /// while its siblings keep serving.
    pub async fn rebind(spec: &ListenerSpec) -> Option<Listener> {
        for attempt in 1..=MAX_REBIND_ATTEMPTS {
            let delay = rebind_backoff(attempt);
            tokio::time::sleep(delay).await;

            match Self::bind_one(spec).await {
                Ok(listener) => {
                    tracing::info!(spec = %spec, attempt, "Listener re-bound");
                    return Some(listener);
                }
                Err(error) => {
                    tracing::warn!(spec = %spec, attempt, %error, "Re-bind attempt failed");
                }
            }
        }

        tracing::error!(
            spec = %spec,
            attempts = MAX_REBIND_ATTEMPTS,
            "Giving up on listener; siblings keep serving"
        );
        None
    }
}

/// Exponential backoff with jitter for re-bind attempts.
fn rebind_backoff(attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = REBIND_BASE_DELAY_MS.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(REBIND_MAX_DELAY_MS);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let b1 = rebind_backoff(1);
        assert!(b1.as_millis() >= 100);

        let b2 = rebind_backoff(2);
        assert!(b2.as_millis() >= 200);

        let max = rebind_backoff(12);
        assert!(max.as_millis() >= 5_000);
        assert!(max.as_millis() < 5_500 + 1);
    }

    #[tokio::test]
    async fn bind_failure_names_offending_spec() {
        let first = Supervisor::bind_one(&ListenerSpec::tcp("127.0.0.1:0"))
            .await
            .unwrap();
        let taken = first.local_addr;

        let specs = [
            ListenerSpec::udp("127.0.0.1:0"),
            ListenerSpec::tcp(taken.to_string()),
        ];
        let error = Supervisor::bind_all(&specs).await.unwrap_err();
        assert!(error.to_string().contains(&taken.to_string()));
    }

    #[tokio::test]
    async fn binds_tcp_and_udp_specs() {
        let specs = [
            ListenerSpec::tcp("127.0.0.1:0"),
            ListenerSpec::udp("127.0.0.1:0"),
        ];
        let listeners = Supervisor::bind_all(&specs).await.unwrap();
        assert_eq!(listeners.len(), 2);
        assert!(matches!(listeners[0].socket, ListenerSocket::Tcp(_)));
        assert!(matches!(listeners[1].socket, ListenerSocket::Udp(_)));
    }
}
