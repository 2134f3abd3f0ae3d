//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Draining (stop accepting, finish in-flight)
//!         → Closing (force-close stragglers)
//!         → Stopped (all sockets released)
//!
//! Signals (signals.rs):
//!     SIGTERM → graceful shutdown (drain first)
//!     SIGINT  → immediate shutdown (skip drain)
//! ```
//!
//! # Design Decisions
//! - Shutdown state only moves forward; no transition is ever reversed
//! - Drain has a timeout: remaining connections are force-closed after it
//! - The coordinator is the single cancellation source in the process

pub mod shutdown;
pub mod signals;

pub use shutdown::{Coordinator, ShutdownState};
