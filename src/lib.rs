//! Container-native protocol server core.
//!
//! Exposes TCP and UDP listeners speaking HTTP/1.1 with explicitly driven
//! accept loops, per-connection state machines, and graceful drain-on-shutdown.
//! The application layer plugs in through the [`bridge`] module's
//! scope/receive/send contract; routing, middleware, and business logic live
//! outside this crate.

pub mod bridge;
pub mod config;
pub mod datagram;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;

pub use bridge::{
    Application, ApplicationError, AppReceiver, AppSender, InboundEvent, OutboundEvent, Scope,
    SharedApp,
};
pub use config::schema::ServerConfig;
pub use lifecycle::shutdown::{Coordinator, ShutdownState};
pub use server::Server;
