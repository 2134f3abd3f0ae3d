//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerSpec (config)
//!     → listener.rs (bind, re-bind with backoff)
//!     → acceptor.rs (one multiplexed wait, backpressure permits)
//!     → TCP: connection.rs registry + per-connection handler task
//!     → UDP: datagram router, no connection object
//! ```
//!
//! # Design Decisions
//! - The acceptor holds a permit before waiting: at the ceiling, accepts
//!   are deferred instead of spawning unbounded handlers
//! - Each connection is tracked for graceful shutdown
//! - A broken listener is re-bound without touching its siblings

pub mod acceptor;
pub mod connection;
pub mod listener;

pub use acceptor::Acceptor;
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{BindError, Listener, Supervisor};
