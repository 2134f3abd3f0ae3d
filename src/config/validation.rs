//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect conflicting listeners
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// A single semantic configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no listeners configured")]
    NoListeners,

    #[error("listener {index}: invalid bind address '{address}'")]
    InvalidBindAddress { index: usize, address: String },

    #[error("listener {index}: duplicate of '{address}'")]
    DuplicateListener { index: usize, address: String },

    #[error("listener {index}: backlog must be greater than zero")]
    ZeroBacklog { index: usize },

    #[error("limits.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("limits.{field} must be greater than zero")]
    ZeroLimit { field: &'static str },

    #[error("timeouts.{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listeners.is_empty() {
        errors.push(ValidationError::NoListeners);
    }

    let mut seen = HashSet::new();
    for (index, spec) in config.listeners.iter().enumerate() {
        if spec.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidBindAddress {
                index,
                address: spec.bind_address.clone(),
            });
        }
        if !seen.insert((spec.protocol, spec.bind_address.clone())) {
            errors.push(ValidationError::DuplicateListener {
                index,
                address: spec.bind_address.clone(),
            });
        }
        if spec.backlog == 0 {
            errors.push(ValidationError::ZeroBacklog { index });
        }
    }

    if config.limits.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    for (value, field) in [
        (config.limits.max_header_count, "max_header_count"),
        (config.limits.max_header_bytes, "max_header_bytes"),
        (config.limits.max_request_line_bytes, "max_request_line_bytes"),
        (config.limits.max_datagram_bytes, "max_datagram_bytes"),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroLimit { field });
        }
    }

    for (value, field) in [
        (config.timeouts.idle_secs, "idle_secs"),
        (config.timeouts.header_secs, "header_secs"),
        (config.timeouts.drain_secs, "drain_secs"),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout { field });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
