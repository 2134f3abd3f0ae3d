//! Demo binary: a minimal echo application on top of the protocol core.
//!
//! Loads configuration (optional TOML path as the first argument), installs
//! signal handlers, and serves until shutdown completes. Anything beyond this
//! wiring — routing, middleware, business logic — belongs to an application
//! framework consuming the bridge contract, not to this crate.

use std::path::Path;
use std::sync::Arc;

use hive_server::bridge::{
    AppReceiver, AppSender, ApplicationError, InboundEvent, OutboundEvent, Scope, SharedApp,
};
use hive_server::config::loader::load_config;
use hive_server::config::ServerConfig;
use hive_server::lifecycle::signals::spawn_signal_handlers;
use hive_server::observability::logging;
use hive_server::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => ServerConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(
        listeners = config.listeners.len(),
        idle_timeout_secs = config.timeouts.idle_secs,
        drain_timeout_secs = config.timeouts.drain_secs,
        "hive-server starting"
    );

    let app: SharedApp = Arc::new(echo_app);
    let server = Server::bind(config, app).await?;
    for (protocol, addr) in server.local_addrs() {
        tracing::info!(%protocol, address = %addr, "Listening");
    }

    spawn_signal_handlers(server.coordinator());
    server.serve().await;

    Ok(())
}

/// Echoes the request method, path, and body back as plain text. Datagrams
/// are logged and dropped (no response path).
async fn echo_app(
    scope: Scope,
    mut receiver: AppReceiver,
    mut sender: AppSender,
) -> Result<(), ApplicationError> {
    let mut body = Vec::new();
    loop {
        match receiver.recv().await {
            InboundEvent::BodyChunk(chunk) => body.extend_from_slice(&chunk),
            InboundEvent::BodyEnd => break,
            InboundEvent::Disconnect => return Ok(()),
        }
    }

    match scope {
        Scope::Http(http) => {
            let mut text = format!("{} {}\n", http.method, http.path).into_bytes();
            text.extend_from_slice(&body);

            sender
                .send(OutboundEvent::Start {
                    status: 200,
                    headers: vec![
                        (b"content-type".to_vec(), b"text/plain; charset=utf-8".to_vec()),
                        (
                            b"content-length".to_vec(),
                            text.len().to_string().into_bytes(),
                        ),
                    ],
                })
                .await?;
            sender.send(OutboundEvent::BodyChunk(text)).await?;
            sender.send(OutboundEvent::BodyEnd).await?;
        }
        Scope::Datagram(datagram) => {
            tracing::info!(
                peer_addr = %datagram.client,
                size = body.len(),
                "Datagram received"
            );
        }
    }

    Ok(())
}
