//! Datagram router.
//!
//! Stateless dispatch of UDP packets to the application bridge. Each packet
//! gets a fresh scope and a fresh channel pair; nothing survives from one
//! packet to the next. UDP has no reliable response path back through this
//! layer, so outbound events from the application are discarded and a failed
//! delivery is logged and dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::bridge::{event_channels, DatagramScope, InboundEvent, Scope, SharedApp};

/// Routes each received datagram to the application, one task per packet.
pub struct DatagramRouter {
    app: SharedApp,
}

impl DatagramRouter {
    pub fn new(app: SharedApp) -> Self {
        Self { app }
    }

    /// Deliver one packet. Fire-and-forget: errors are logged, never
    /// propagated, and no state is retained for the next packet.
    pub fn route(&self, payload: Vec<u8>, peer_addr: SocketAddr, local_addr: SocketAddr) {
        let scope = Scope::Datagram(DatagramScope {
            client: peer_addr,
            server: local_addr,
        });

        let (bridge, receiver, sender) = event_channels();
        let size = payload.len();
        bridge.deliver(InboundEvent::BodyChunk(payload));
        bridge.deliver(InboundEvent::BodyEnd);
        // Dropping the inbound sender up front turns any further receive()
        // into Disconnect; the whole packet is already queued.
        let crate::bridge::BridgeHandle { mut out_rx, .. } = bridge;

        let app = Arc::clone(&self.app);
        tokio::spawn(async move {
            let discard = async {
                while out_rx.recv().await.is_some() {
                    tracing::trace!(peer_addr = %peer_addr, "Discarding response event for datagram");
                }
            };

            let (result, ()) = tokio::join!(app.call(scope, receiver, sender), discard);
            match result {
                Ok(()) => tracing::trace!(peer_addr = %peer_addr, size, "Datagram handled"),
                Err(error) => {
                    tracing::warn!(peer_addr = %peer_addr, %error, "Datagram delivery failed, packet dropped");
                }
            }
        });
    }
}
