//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hive_server::bridge::{
    AppReceiver, AppSender, ApplicationError, InboundEvent, OutboundEvent, Scope, SharedApp,
};
use hive_server::config::schema::{ListenerSpec, Protocol, ServerConfig};
use hive_server::{Coordinator, Server};

/// A server running in the background for one test.
pub struct TestServer {
    pub tcp_addr: Option<SocketAddr>,
    pub udp_addr: Option<SocketAddr>,
    pub coordinator: Coordinator,
    pub task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn tcp(&self) -> SocketAddr {
        self.tcp_addr.expect("no TCP listener configured")
    }

    pub fn udp(&self) -> SocketAddr {
        self.udp_addr.expect("no UDP listener configured")
    }
}

/// Config with a single ephemeral-port TCP listener.
pub fn tcp_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listeners = vec![ListenerSpec::tcp("127.0.0.1:0")];
    config
}

/// Bind and serve in a background task.
pub async fn start_server(config: ServerConfig, app: SharedApp) -> TestServer {
    let server = Server::bind(config, app).await.expect("bind test server");
    let addrs = server.local_addrs();
    let coordinator = server.coordinator();
    let task = tokio::spawn(server.serve());

    let tcp_addr = addrs
        .iter()
        .find(|(protocol, _)| *protocol == Protocol::Tcp)
        .map(|(_, addr)| *addr);
    let udp_addr = addrs
        .iter()
        .find(|(protocol, _)| *protocol == Protocol::Udp)
        .map(|(_, addr)| *addr);

    TestServer {
        tcp_addr,
        udp_addr,
        coordinator,
        task,
    }
}

/// Application answering every request with
/// `"{method} {path} body={len}"` and a correct content-length.
pub fn echo_app() -> SharedApp {
    Arc::new(
        |scope: Scope, mut receiver: AppReceiver, mut sender: AppSender| async move {
            let mut body_len = 0usize;
            loop {
                match receiver.recv().await {
                    InboundEvent::BodyChunk(chunk) => body_len += chunk.len(),
                    InboundEvent::BodyEnd => break,
                    InboundEvent::Disconnect => return Ok(()),
                }
            }

            let Scope::Http(http) = scope else {
                return Ok(());
            };
            let text = format!("{} {} body={}", http.method, http.path, body_len);
            respond_with(&mut sender, 200, text.into_bytes()).await
        },
    )
}

/// Send `Start`/`BodyChunk`/`BodyEnd` for a fixed-length plain-text body.
pub async fn respond_with(
    sender: &mut AppSender,
    status: u16,
    body: Vec<u8>,
) -> Result<(), ApplicationError> {
    sender
        .send(OutboundEvent::Start {
            status,
            headers: vec![(
                b"content-length".to_vec(),
                body.len().to_string().into_bytes(),
            )],
        })
        .await?;
    sender.send(OutboundEvent::BodyChunk(body)).await?;
    sender.send(OutboundEvent::BodyEnd).await
}

/// Read exactly one response off the stream, using its content-length.
pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    // Read one byte at a time so we stop exactly at the end of a single
    // response and leave any following pipelined response on the stream.
    let mut chunk = [0u8; 1];
    loop {
        let n = stream.read(&mut chunk).await.expect("read response");
        assert!(n > 0, "connection closed mid-response: {buf:?}");
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let body_len = text
                .lines()
                .find(|line| line.to_ascii_lowercase().starts_with("content-length:"))
                .and_then(|line| line.split(':').nth(1))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + body_len {
                return text.into_owned();
            }
        }
    }
}

/// Connect, send one raw request, and read the connection to EOF.
pub async fn send_and_read_to_eof(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(raw).await.expect("write request");
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.expect("read to eof");
    String::from_utf8_lossy(&buf).into_owned()
}
