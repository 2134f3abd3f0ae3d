//! HTTP/1.1 protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → handler.rs (per-connection state machine, timeouts, keep-alive)
//!     → parser.rs + body.rs (incremental request decoding, no I/O)
//!     → application bridge (scope, receive, send)
//!     → encoder.rs (status line, headers, content-length/chunked body)
//!     → Send to client
//! ```

pub mod body;
pub mod encoder;
pub mod handler;
pub mod parser;

pub use encoder::{ResponseEncoder, CONTINUE_RESPONSE};
pub use handler::{ConnectionHandler, HandlerState};
pub use parser::{Method, ProtocolError, RequestEvent, RequestHead, RequestParser, Version};
