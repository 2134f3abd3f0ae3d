//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.
//! The loaded configuration is an immutable snapshot: nothing in the server
//! mutates it after startup.

use serde::{Deserialize, Serialize};

/// Transport protocol a listener speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// A single listener to bind at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerSpec {
    /// Transport protocol (tcp or udp).
    pub protocol: Protocol,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Listen backlog hint for TCP listeners.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

fn default_backlog() -> u32 {
    2048
}

impl ListenerSpec {
    /// Convenience constructor for a TCP listener with the default backlog.
    pub fn tcp(bind_address: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Tcp,
            bind_address: bind_address.into(),
            backlog: default_backlog(),
        }
    }

    /// Convenience constructor for a UDP listener.
    pub fn udp(bind_address: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Udp,
            bind_address: bind_address.into(),
            backlog: default_backlog(),
        }
    }
}

impl std::fmt::Display for ListenerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.protocol, self.bind_address)
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Idle connection timeout in seconds (no bytes while idle or between
    /// keep-alive requests).
    pub idle_secs: u64,

    /// Header read timeout in seconds (first request byte to end of header
    /// block).
    pub header_secs: u64,

    /// Drain timeout in seconds (in-flight requests allowed to finish after
    /// shutdown begins; remaining connections are force-closed afterwards).
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            idle_secs: 5,
            header_secs: 30,
            drain_secs: 30,
        }
    }
}

/// Resource and protocol limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum concurrent TCP connections (backpressure ceiling).
    pub max_connections: usize,

    /// Maximum number of request headers.
    pub max_header_count: usize,

    /// Maximum total size of a request header block in bytes.
    pub max_header_bytes: usize,

    /// Maximum request line length in bytes.
    pub max_request_line_bytes: usize,

    /// Maximum requests served on one keep-alive connection (0 = unlimited).
    pub max_requests_per_connection: usize,

    /// Maximum UDP datagram size read per packet.
    pub max_datagram_bytes: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_header_count: 100,
            max_header_bytes: 64 * 1024,
            max_request_line_bytes: 8 * 1024,
            max_requests_per_connection: 0,
            max_datagram_bytes: 64 * 1024,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listeners to bind at startup.
    pub listeners: Vec<ListenerSpec>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Resource and protocol limits.
    pub limits: LimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listeners: vec![ListenerSpec::tcp("127.0.0.1:8000")],
            timeouts: TimeoutConfig::default(),
            limits: LimitConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
