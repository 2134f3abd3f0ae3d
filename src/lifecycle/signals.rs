//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate signals to shutdown coordinator transitions
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGTERM (what the orchestrator sends on pod termination) drains first
//! - SIGINT (Ctrl+C) shuts down immediately, skipping the drain

use crate::lifecycle::shutdown::Coordinator;

/// Spawn a task that maps OS termination signals onto the coordinator.
///
/// This mapping is the only contract the server requires from process-level
/// signal handling; everything downstream reacts to the coordinator's state.
pub fn spawn_signal_handlers(coordinator: Coordinator) {
    tokio::spawn(async move {
        let graceful = wait_for_signal().await;
        tracing::info!(graceful, "Shutdown signal received");
        coordinator.request_shutdown(graceful);
    });
}

/// Wait for a termination signal. Returns true for a graceful request.
#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::error!(%error, "Failed to install SIGTERM handler");
            // Fall back to Ctrl+C only.
            let _ = tokio::signal::ctrl_c().await;
            return false;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => true,
        _ = tokio::signal::ctrl_c() => false,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    let _ = tokio::signal::ctrl_c().await;
    false
}
