//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ServerConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Protocol;

    #[test]
    fn parses_minimal_listener_table() {
        let raw = r#"
            [[listeners]]
            protocol = "tcp"
            bind_address = "0.0.0.0:8080"

            [[listeners]]
            protocol = "udp"
            bind_address = "0.0.0.0:9090"

            [timeouts]
            drain_secs = 10
        "#;
        let config: ServerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.listeners.len(), 2);
        assert_eq!(config.listeners[0].protocol, Protocol::Tcp);
        assert_eq!(config.listeners[0].backlog, 2048);
        assert_eq!(config.listeners[1].protocol, Protocol::Udp);
        assert_eq!(config.timeouts.drain_secs, 10);
        assert_eq!(config.timeouts.idle_secs, 5);
    }
}
