//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via the tracing crate; every subsystem logs with
//!   field-style context (addresses, connection ids, counts)
//! - Log formatting and aggregation are the process owner's concern; this
//!   module only installs the subscriber

pub mod logging;
