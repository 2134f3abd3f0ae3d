//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Respect `RUST_LOG` when set, fall back to the configured level
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - Log level configurable via config and environment

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::schema::ObservabilityConfig;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when present; otherwise the configured log level applies
/// to this crate and `warn` to everything else.
pub fn init(config: &ObservabilityConfig) {
    let fallback = format!("warn,hive_server={}", config.log_level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
