//! Application bridge.
//!
//! The narrow seam between the protocol core and the application layer. For
//! every request (or datagram) the core constructs a read-only [`Scope`] and
//! a channel pair: [`AppReceiver::recv`] suspends until the next inbound
//! event, [`AppSender::send`] emits response events back to the connection
//! handler. Event ordering on the send side is validated here; a violation is
//! an [`ApplicationError`] rather than corrupt wire output.
//!
//! Inbound body delivery is unbounded but flow-controlled: the connection
//! handler stops reading the socket while more than [`HIGH_WATER_LIMIT`]
//! body bytes sit undelivered, and resumes once the application catches up.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use crate::http::parser::{RequestHead, Version};

/// Undelivered body bytes above which socket reads pause.
pub const HIGH_WATER_LIMIT: usize = 64 * 1024;

/// Channel depth for response events from the application.
const EVENT_CHANNEL_DEPTH: usize = 16;

/// Per-request metadata handed to the application. Read-only.
#[derive(Debug, Clone)]
pub enum Scope {
    Http(HttpScope),
    Datagram(DatagramScope),
}

impl Scope {
    pub fn client(&self) -> SocketAddr {
        match self {
            Scope::Http(scope) => scope.client,
            Scope::Datagram(scope) => scope.client,
        }
    }

    pub fn server(&self) -> SocketAddr {
        match self {
            Scope::Http(scope) => scope.server,
            Scope::Datagram(scope) => scope.server,
        }
    }
}

/// Metadata for one HTTP request.
#[derive(Debug, Clone)]
pub struct HttpScope {
    /// "1.0" or "1.1".
    pub http_version: &'static str,
    /// Request method, e.g. "GET".
    pub method: &'static str,
    /// Percent-decoded path.
    pub path: String,
    /// Raw request target as received (undecoded, including query string).
    pub target: String,
    /// Raw query string (without `?`), if any.
    pub query: Option<String>,
    /// Headers in arrival order, names lowercased, duplicates preserved.
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    /// Peer address.
    pub client: SocketAddr,
    /// Local (accepting) address.
    pub server: SocketAddr,
}

impl HttpScope {
    /// Build a scope from a parsed request head and the socket addresses.
    pub fn from_head(head: &RequestHead, client: SocketAddr, server: SocketAddr) -> Self {
        let headers = head
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();
        Self {
            http_version: match head.version {
                Version::Http10 => "1.0",
                Version::Http11 => "1.1",
            },
            method: head.method.as_str(),
            path: head.path.clone(),
            target: head.target.clone(),
            query: head.query.clone(),
            headers,
            client,
            server,
        }
    }
}

/// Metadata for one UDP datagram.
#[derive(Debug, Clone)]
pub struct DatagramScope {
    /// Peer address.
    pub client: SocketAddr,
    /// Local (receiving) address.
    pub server: SocketAddr,
}

/// Events flowing from the core to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A slice of request body bytes.
    BodyChunk(Vec<u8>),
    /// The declared end of the request body.
    BodyEnd,
    /// The peer went away (or the server force-closed the connection).
    Disconnect,
}

/// Events flowing from the application to the core.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    /// Response status and headers. Must be sent exactly once, first.
    Start {
        status: u16,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
    },
    /// A slice of response body bytes.
    BodyChunk(Vec<u8>),
    /// End of the response body.
    BodyEnd,
}

/// Bridge contract violation or application failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplicationError {
    #[error("response started twice")]
    StartAlreadySent,
    #[error("body event sent before response start")]
    BodyBeforeStart,
    #[error("event sent after response end")]
    SentAfterEnd,
    #[error("connection closed before the event could be delivered")]
    ConnectionClosed,
    #[error("application failure: {0}")]
    Failure(String),
}

/// Tracks undelivered inbound body bytes so the connection handler can pause
/// socket reads when the application falls behind.
#[derive(Debug)]
pub struct FlowControl {
    buffered: AtomicUsize,
    drained: Notify,
}

impl FlowControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            buffered: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    pub(crate) fn charge(&self, bytes: usize) {
        self.buffered.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn release(&self, bytes: usize) {
        let before = self.buffered.fetch_sub(bytes, Ordering::SeqCst);
        if before.saturating_sub(bytes) <= HIGH_WATER_LIMIT {
            self.drained.notify_waiters();
        }
    }

    /// True while reads should stay paused.
    pub fn above_high_water(&self) -> bool {
        self.buffered.load(Ordering::SeqCst) > HIGH_WATER_LIMIT
    }

    /// Wait until the buffered amount falls back under the high-water mark.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if !self.above_high_water() {
                return;
            }
            notified.await;
        }
    }
}

/// Inbound event source handed to the application.
#[derive(Debug)]
pub struct AppReceiver {
    rx: mpsc::UnboundedReceiver<InboundEvent>,
    flow: Arc<FlowControl>,
    disconnected: bool,
}

impl AppReceiver {
    /// Suspend until the next inbound event.
    ///
    /// Once the connection handler goes away (response complete, peer reset,
    /// or force-close), every subsequent call yields `Disconnect`.
    pub async fn recv(&mut self) -> InboundEvent {
        if self.disconnected {
            return InboundEvent::Disconnect;
        }
        match self.rx.recv().await {
            Some(InboundEvent::BodyChunk(chunk)) => {
                self.flow.release(chunk.len());
                InboundEvent::BodyChunk(chunk)
            }
            Some(InboundEvent::BodyEnd) => InboundEvent::BodyEnd,
            Some(InboundEvent::Disconnect) | None => {
                self.disconnected = true;
                InboundEvent::Disconnect
            }
        }
    }
}

/// Outbound event sink handed to the application.
#[derive(Debug)]
pub struct AppSender {
    tx: mpsc::Sender<OutboundEvent>,
    started: bool,
    complete: bool,
}

impl AppSender {
    /// Send a response event, validating the required ordering: one `Start`
    /// first, then body chunks, then one `BodyEnd`, then nothing.
    pub async fn send(&mut self, event: OutboundEvent) -> Result<(), ApplicationError> {
        if self.complete {
            return Err(ApplicationError::SentAfterEnd);
        }
        match &event {
            OutboundEvent::Start { .. } => {
                if self.started {
                    return Err(ApplicationError::StartAlreadySent);
                }
                self.started = true;
            }
            OutboundEvent::BodyChunk(_) => {
                if !self.started {
                    return Err(ApplicationError::BodyBeforeStart);
                }
            }
            OutboundEvent::BodyEnd => {
                if !self.started {
                    return Err(ApplicationError::BodyBeforeStart);
                }
                self.complete = true;
            }
        }

        self.tx
            .send(event)
            .await
            .map_err(|_| ApplicationError::ConnectionClosed)
    }

    /// True once the response has been started.
    pub fn response_started(&self) -> bool {
        self.started
    }

    /// True once `BodyEnd` has been sent.
    pub fn response_complete(&self) -> bool {
        self.complete
    }
}

/// The connection handler's side of the bridge channels.
#[derive(Debug)]
pub struct BridgeHandle {
    pub(crate) in_tx: mpsc::UnboundedSender<InboundEvent>,
    pub(crate) out_rx: mpsc::Receiver<OutboundEvent>,
    pub(crate) flow: Arc<FlowControl>,
}

impl BridgeHandle {
    /// Deliver an inbound event; returns false once the application stopped
    /// receiving. Body chunks are charged against the flow-control budget.
    pub fn deliver(&self, event: InboundEvent) -> bool {
        if let InboundEvent::BodyChunk(chunk) = &event {
            if self.in_tx.is_closed() {
                return false;
            }
            self.flow.charge(chunk.len());
        }
        self.in_tx.send(event).is_ok()
    }

    /// True once the application dropped its receiver.
    pub fn app_gone(&self) -> bool {
        self.in_tx.is_closed()
    }
}

/// Create the channel pair connecting a handler to its application task.
///
/// Returns `(handler side, application inbound source, application outbound sink)`.
pub fn event_channels() -> (BridgeHandle, AppReceiver, AppSender) {
    let flow = FlowControl::new();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
    (
        BridgeHandle {
            in_tx,
            out_rx,
            flow: Arc::clone(&flow),
        },
        AppReceiver {
            rx: in_rx,
            flow,
            disconnected: false,
        },
        AppSender {
            tx: out_tx,
            started: false,
            complete: false,
        },
    )
}

/// The application contract consumed by the (external) framework layer.
///
/// The core calls `call` once per request or datagram; the implementation
/// drives `receiver`/`sender` and resolves when its work is done. The
/// returned future must be self-contained (`'static`): implementations
/// clone what they need out of `&self`.
pub trait Application: Send + Sync + 'static {
    fn call(
        &self,
        scope: Scope,
        receiver: AppReceiver,
        sender: AppSender,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApplicationError>> + Send + 'static>>;
}

impl<F, Fut> Application for F
where
    F: Fn(Scope, AppReceiver, AppSender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApplicationError>> + Send + 'static,
{
    fn call(
        &self,
        scope: Scope,
        receiver: AppReceiver,
        sender: AppSender,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApplicationError>> + Send + 'static>> {
        Box::pin(self(scope, receiver, sender))
    }
}

/// Shared application handle.
pub type SharedApp = Arc<dyn Application>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_start_is_rejected() {
        let (_handle, _receiver, mut sender) = event_channels();
        let err = sender
            .send(OutboundEvent::BodyChunk(b"x".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err, ApplicationError::BodyBeforeStart);

        let err = sender.send(OutboundEvent::BodyEnd).await.unwrap_err();
        assert_eq!(err, ApplicationError::BodyBeforeStart);
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let (mut handle, _receiver, mut sender) = event_channels();
        sender
            .send(OutboundEvent::Start {
                status: 200,
                headers: Vec::new(),
            })
            .await
            .unwrap();
        assert!(handle.out_rx.recv().await.is_some());

        let err = sender
            .send(OutboundEvent::Start {
                status: 200,
                headers: Vec::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, ApplicationError::StartAlreadySent);
    }

    #[tokio::test]
    async fn send_after_end_is_rejected() {
        let (_handle, _receiver, mut sender) = event_channels();
        sender
            .send(OutboundEvent::Start {
                status: 200,
                headers: Vec::new(),
            })
            .await
            .unwrap();
        sender.send(OutboundEvent::BodyEnd).await.unwrap();
        assert!(sender.response_complete());

        let err = sender
            .send(OutboundEvent::BodyChunk(b"late".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err, ApplicationError::SentAfterEnd);
    }

    #[tokio::test]
    async fn closed_handler_reads_as_disconnect() {
        let (handle, mut receiver, mut sender) = event_channels();
        drop(handle);

        assert_eq!(receiver.recv().await, InboundEvent::Disconnect);
        // And it keeps yielding disconnect.
        assert_eq!(receiver.recv().await, InboundEvent::Disconnect);

        sender
            .send(OutboundEvent::Start {
                status: 200,
                headers: Vec::new(),
            })
            .await
            .unwrap_err();
    }

    #[tokio::test]
    async fn inbound_events_arrive_in_order() {
        let (handle, mut receiver, _sender) = event_channels();
        assert!(handle.deliver(InboundEvent::BodyChunk(b"a".to_vec())));
        assert!(handle.deliver(InboundEvent::BodyEnd));

        assert_eq!(
            receiver.recv().await,
            InboundEvent::BodyChunk(b"a".to_vec())
        );
        assert_eq!(receiver.recv().await, InboundEvent::BodyEnd);
    }

    #[tokio::test]
    async fn flow_control_charges_and_releases() {
        let (handle, mut receiver, _sender) = event_channels();

        let big = vec![0u8; HIGH_WATER_LIMIT + 1];
        assert!(handle.deliver(InboundEvent::BodyChunk(big)));
        assert!(handle.flow.above_high_water());

        // Receiving the chunk drains the budget and unblocks the waiter.
        let wait = {
            let flow = Arc::clone(&handle.flow);
            tokio::spawn(async move { flow.wait_drained().await })
        };
        receiver.recv().await;
        wait.await.unwrap();
        assert!(!handle.flow.above_high_water());
    }

    #[tokio::test]
    async fn dropped_receiver_stops_deliveries() {
        let (handle, receiver, _sender) = event_channels();
        drop(receiver);
        assert!(handle.app_gone());
        assert!(!handle.deliver(InboundEvent::BodyChunk(b"x".to_vec())));
    }
}
