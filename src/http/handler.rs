//! Per-connection request/response cycle.
//!
//! One [`ConnectionHandler`] owns each accepted TCP socket and drives it
//! through a fixed state machine:
//!
//! ```text
//! Idle → ReadingRequestLine → ReadingHeaders → ReadingBody
//!      → Dispatched → WritingResponse → KeepAliveWait → Closing
//! ```
//!
//! All per-connection mutation happens inside this one task; the application
//! runs in its own task and talks to the handler only through the bridge
//! channels. Pipelined requests stay buffered in the parser until the
//! in-flight response has been written, which makes FIFO response ordering
//! structural rather than something to enforce.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, watch};

use crate::bridge::{
    event_channels, ApplicationError, HttpScope, InboundEvent, OutboundEvent, Scope, SharedApp,
};
use crate::config::schema::ServerConfig;
use crate::http::body::{resolve_framing, BodyFraming};
use crate::http::encoder::{simple_response, EncodeError, ResponseEncoder, CONTINUE_RESPONSE};
use crate::http::parser::{
    Method, ParseLimits, ProtocolError, RequestEvent, RequestHead, RequestParser,
};
use crate::lifecycle::shutdown::ShutdownState;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    ReadingRequestLine,
    ReadingHeaders,
    ReadingBody,
    Dispatched,
    WritingResponse,
    KeepAliveWait,
    Closing,
}

/// Why a connection left its normal processing loop.
#[derive(Debug)]
enum Interrupt {
    Protocol(ProtocolError),
    Application(ApplicationError),
    Encode(EncodeError),
    Io(std::io::Error),
    PeerClosed,
    IdleTimeout,
    HeaderTimeout,
    ForceClosed,
    DrainingIdle,
    Desync,
}

enum CycleOutcome {
    KeepAlive,
    Close,
}

/// Owns one accepted TCP connection for its entire lifetime.
///
/// Generic over the stream so the state machine can be exercised against
/// in-memory duplex pipes in tests.
pub struct ConnectionHandler<S> {
    stream: S,
    client: SocketAddr,
    server: SocketAddr,
    parser: RequestParser,
    config: Arc<ServerConfig>,
    app: SharedApp,
    shutdown_rx: watch::Receiver<ShutdownState>,
    force_close_rx: broadcast::Receiver<()>,
    state: HandlerState,
    requests_served: usize,
    #[cfg(test)]
    transitions: Vec<HandlerState>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        stream: S,
        client: SocketAddr,
        server: SocketAddr,
        config: Arc<ServerConfig>,
        app: SharedApp,
        shutdown_rx: watch::Receiver<ShutdownState>,
        force_close_rx: broadcast::Receiver<()>,
    ) -> Self {
        let parser = RequestParser::new(ParseLimits::from_config(&config.limits));
        Self {
            stream,
            client,
            server,
            parser,
            config,
            app,
            shutdown_rx,
            force_close_rx,
            state: HandlerState::Idle,
            requests_served: 0,
            #[cfg(test)]
            transitions: vec![HandlerState::Idle],
        }
    }

    fn set_state(&mut self, next: HandlerState) {
        if self.state == next {
            return;
        }
        tracing::trace!(client = %self.client, from = ?self.state, to = ?next, "Connection state");
        self.state = next;
        #[cfg(test)]
        self.transitions.push(next);
    }

    /// Drive the connection until it closes. The socket is closed exactly
    /// once, when the returned handler is dropped by the caller.
    pub async fn run(mut self) -> Self {
        let result = self.drive().await;
        self.set_state(HandlerState::Closing);

        match result {
            Ok(()) | Err(Interrupt::PeerClosed) => {
                tracing::debug!(client = %self.client, "Connection closed");
            }
            Err(Interrupt::IdleTimeout) => {
                tracing::debug!(client = %self.client, "Idle timeout, closing connection");
            }
            Err(Interrupt::HeaderTimeout) => {
                tracing::info!(client = %self.client, "Header read timeout, closing connection");
            }
            Err(Interrupt::Protocol(error)) => {
                tracing::info!(client = %self.client, %error, "Invalid HTTP request received");
            }
            Err(Interrupt::Application(error)) => {
                tracing::error!(client = %self.client, %error, "Application error");
            }
            Err(Interrupt::Encode(error)) => {
                tracing::error!(client = %self.client, %error, "Response framing error, aborting");
            }
            Err(Interrupt::Io(error)) => {
                tracing::debug!(client = %self.client, %error, "Connection I/O error");
            }
            Err(Interrupt::ForceClosed) => {
                tracing::debug!(client = %self.client, "Connection force-closed by shutdown");
            }
            Err(Interrupt::DrainingIdle) => {
                tracing::debug!(client = %self.client, "Idle connection closed for drain");
            }
            Err(Interrupt::Desync) => {
                tracing::error!(client = %self.client, "Parser produced events out of order");
            }
        }

        // Send the FIN now; the socket itself is released when the handler
        // is dropped by its owner.
        let _ = self.stream.shutdown().await;
        self
    }

    async fn drive(&mut self) -> Result<(), Interrupt> {
        loop {
            let waiting = if self.requests_served == 0 {
                HandlerState::Idle
            } else {
                HandlerState::KeepAliveWait
            };
            self.set_state(waiting);

            if *self.shutdown_rx.borrow() >= ShutdownState::Draining {
                return Err(Interrupt::DrainingIdle);
            }
            if !self.parser.has_buffered_input() {
                self.await_request_bytes().await?;
            }
            if *self.shutdown_rx.borrow() >= ShutdownState::Draining {
                return Err(Interrupt::DrainingIdle);
            }

            self.set_state(HandlerState::ReadingRequestLine);
            let head = match self.read_head().await {
                Ok(head) => head,
                Err(Interrupt::Protocol(error)) => {
                    self.write_best_effort(&simple_response(400, b"Bad Request"))
                        .await;
                    return Err(Interrupt::Protocol(error));
                }
                Err(other) => return Err(other),
            };

            let outcome = self.run_cycle(head).await?;
            self.requests_served += 1;
            match outcome {
                CycleOutcome::KeepAlive => continue,
                CycleOutcome::Close => return Ok(()),
            }
        }
    }

    /// Wait in Idle/KeepAliveWait for the first bytes of a request.
    async fn await_request_bytes(&mut self) -> Result<(), Interrupt> {
        let idle = Duration::from_secs(self.config.timeouts.idle_secs);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        tokio::select! {
            biased;
            _ = self.force_close_rx.recv() => Err(Interrupt::ForceClosed),
            _ = self.shutdown_rx.wait_for(|state| *state >= ShutdownState::Draining) => {
                Err(Interrupt::DrainingIdle)
            }
            result = tokio::time::timeout(idle, self.stream.read(&mut chunk)) => match result {
                Err(_) => Err(Interrupt::IdleTimeout),
                Ok(Ok(0)) => Err(Interrupt::PeerClosed),
                Ok(Ok(n)) => {
                    self.parser.feed(&chunk[..n]);
                    Ok(())
                }
                Ok(Err(error)) => Err(Interrupt::Io(error)),
            },
        }
    }

    /// Parse the request line and header block, reading more bytes as needed
    /// under the header timeout.
    async fn read_head(&mut self) -> Result<RequestHead, Interrupt> {
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.timeouts.header_secs);

        loop {
            match self.parser.next_event().map_err(Interrupt::Protocol)? {
                Some(RequestEvent::Head(head)) => {
                    // The request line was consumed on the way here even if
                    // the whole head arrived in one read.
                    self.set_state(HandlerState::ReadingHeaders);
                    return Ok(head);
                }
                Some(_) => return Err(Interrupt::Desync),
                None => {
                    if self.parser.reading_headers() {
                        self.set_state(HandlerState::ReadingHeaders);
                    }
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            tokio::select! {
                biased;
                _ = self.force_close_rx.recv() => return Err(Interrupt::ForceClosed),
                result = tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)) => match result {
                    Err(_) => return Err(Interrupt::HeaderTimeout),
                    Ok(Ok(0)) => return Err(Interrupt::PeerClosed),
                    Ok(Ok(n)) => self.parser.feed(&chunk[..n]),
                    Ok(Err(error)) => return Err(Interrupt::Io(error)),
                },
            }
        }
    }

    /// Run one request/response cycle: spawn the application task, stream the
    /// body in, write response events out, and decide keep-alive.
    async fn run_cycle(&mut self, head: RequestHead) -> Result<CycleOutcome, Interrupt> {
        let head_request = head.method == Method::Head;
        let version = head.version;
        let max_requests = self.config.limits.max_requests_per_connection;
        let at_max = max_requests > 0 && self.requests_served + 1 >= max_requests;
        let draining = *self.shutdown_rx.borrow() >= ShutdownState::Draining;
        let keep_alive = head.keep_alive_requested() && !at_max && !draining;

        let has_body = !matches!(
            resolve_framing(&head.headers).map_err(Interrupt::Protocol)?,
            BodyFraming::None | BodyFraming::ContentLength(0)
        );

        tracing::debug!(
            client = %self.client,
            method = %head.method,
            path = %head.path,
            "Request received"
        );

        let scope = Scope::Http(HttpScope::from_head(&head, self.client, self.server));
        let (bridge, receiver, sender) = event_channels();
        let app_task = tokio::spawn(self.app.call(scope, receiver, sender));

        if head.expects_continue() && has_body {
            self.stream
                .write_all(CONTINUE_RESPONSE)
                .await
                .map_err(Interrupt::Io)?;
        }

        let crate::bridge::BridgeHandle {
            in_tx,
            mut out_rx,
            flow,
        } = bridge;
        let deliver = |event: InboundEvent| {
            if let InboundEvent::BodyChunk(chunk) = &event {
                if in_tx.is_closed() {
                    return false;
                }
                flow.charge(chunk.len());
            }
            in_tx.send(event).is_ok()
        };

        let mut body_done = false;
        let mut response_done = false;
        let mut encoder: Option<ResponseEncoder> = None;

        'cycle: loop {
            // Drain whatever body events are already decodable.
            while !body_done {
                match self.parser.next_event() {
                    Ok(Some(RequestEvent::BodyChunk(chunk))) => {
                        self.set_state(HandlerState::ReadingBody);
                        deliver(InboundEvent::BodyChunk(chunk));
                    }
                    Ok(Some(RequestEvent::BodyEnd)) => {
                        deliver(InboundEvent::BodyEnd);
                        body_done = true;
                        if encoder.is_none() {
                            self.set_state(HandlerState::Dispatched);
                        }
                    }
                    Ok(Some(RequestEvent::Head(_))) => return Err(Interrupt::Desync),
                    Ok(None) => {
                        self.set_state(HandlerState::ReadingBody);
                        break;
                    }
                    Err(error) => {
                        deliver(InboundEvent::Disconnect);
                        if encoder.is_none() {
                            self.write_best_effort(&simple_response(400, b"Bad Request"))
                                .await;
                        }
                        return Err(Interrupt::Protocol(error));
                    }
                }
            }

            let app_receiving = !in_tx.is_closed();
            if response_done && (body_done || !app_receiving) {
                break 'cycle;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            tokio::select! {
                biased;
                _ = self.force_close_rx.recv() => {
                    let _ = in_tx.send(InboundEvent::Disconnect);
                    return Err(Interrupt::ForceClosed);
                }
                event = out_rx.recv(), if !response_done => {
                    match event {
                        Some(OutboundEvent::Start { status, headers }) => {
                            self.set_state(HandlerState::WritingResponse);
                            tracing::info!(
                                client = %self.client,
                                method = %head.method,
                                path = %head.path,
                                status,
                                "Request handled"
                            );
                            let mut enc = ResponseEncoder::new(version, head_request, keep_alive);
                            let bytes = enc.start(status, &headers);
                            self.stream.write_all(&bytes).await.map_err(Interrupt::Io)?;
                            encoder = Some(enc);
                        }
                        Some(OutboundEvent::BodyChunk(data)) => {
                            let enc = encoder.as_mut().ok_or(Interrupt::Desync)?;
                            let bytes = enc.body_chunk(&data).map_err(Interrupt::Encode)?;
                            if !bytes.is_empty() {
                                self.stream.write_all(&bytes).await.map_err(Interrupt::Io)?;
                            }
                        }
                        Some(OutboundEvent::BodyEnd) => {
                            let enc = encoder.as_mut().ok_or(Interrupt::Desync)?;
                            let bytes = enc.finish().map_err(Interrupt::Encode)?;
                            if !bytes.is_empty() {
                                self.stream.write_all(&bytes).await.map_err(Interrupt::Io)?;
                            }
                            response_done = true;
                        }
                        None => {
                            // The application ended without completing a response.
                            let error = match app_task.await {
                                Ok(Ok(())) => ApplicationError::Failure(
                                    "application returned without completing the response".into(),
                                ),
                                Ok(Err(error)) => error,
                                Err(join_error) => ApplicationError::Failure(format!(
                                    "application task failed: {join_error}"
                                )),
                            };
                            if encoder.is_none() {
                                self.write_best_effort(&simple_response(
                                    500,
                                    b"Internal Server Error",
                                ))
                                .await;
                            }
                            return Err(Interrupt::Application(error));
                        }
                    }
                }
                result = self.stream.read(&mut chunk), if !body_done && !flow.above_high_water() => {
                    match result {
                        Ok(0) => {
                            let _ = in_tx.send(InboundEvent::Disconnect);
                            return Err(Interrupt::PeerClosed);
                        }
                        Ok(n) => self.parser.feed(&chunk[..n]),
                        Err(error) => {
                            let _ = in_tx.send(InboundEvent::Disconnect);
                            return Err(Interrupt::Io(error));
                        }
                    }
                }
                _ = flow.wait_drained(), if !body_done && flow.above_high_water() => {}
            }
        }

        // Close the inbound side before joining: a receive() issued after the
        // response must yield Disconnect, not block the join below.
        drop(in_tx);

        // Surface failures the application signaled after finishing the
        // response; keeping the connection would leave it in an unknown state.
        match app_task.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(Interrupt::Application(error)),
            Err(join_error) => {
                return Err(Interrupt::Application(ApplicationError::Failure(format!(
                    "application task failed: {join_error}"
                ))));
            }
        }

        let requires_close = encoder.as_ref().is_some_and(ResponseEncoder::requires_close);
        let still_running = *self.shutdown_rx.borrow() < ShutdownState::Draining;
        if keep_alive && !requires_close && still_running && self.parser.at_message_boundary() {
            Ok(CycleOutcome::KeepAlive)
        } else {
            Ok(CycleOutcome::Close)
        }
    }

    async fn write_best_effort(&mut self, bytes: &[u8]) {
        let _ = self.stream.write_all(bytes).await;
        let _ = self.stream.flush().await;
    }

    #[cfg(test)]
    fn state_transitions(&self) -> &[HandlerState] {
        &self.transitions
    }
}
