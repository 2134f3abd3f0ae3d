//! End-to-end HTTP behavior over real sockets.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hive_server::bridge::{
    AppReceiver, AppSender, InboundEvent, OutboundEvent, Scope, SharedApp,
};

mod common;
use common::{echo_app, read_response, respond_with, send_and_read_to_eof, start_server, tcp_config};

#[tokio::test]
async fn keep_alive_connection_serves_sequential_requests() {
    let server = start_server(tcp_config(), echo_app()).await;

    let mut stream = TcpStream::connect(server.tcp()).await.unwrap();
    stream
        .write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    let first = read_response(&mut stream).await;
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.ends_with("GET /ping body=0"));

    // Same socket, second request: the connection stayed open.
    stream
        .write_all(b"GET /again HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    let second = read_response(&mut stream).await;
    assert!(second.ends_with("GET /again body=0"));
}

#[tokio::test]
async fn content_length_body_reaches_app_exactly() {
    // The application double-checks the bridge contract: body chunks must
    // total the declared length before a single body-end arrives.
    let app: SharedApp = Arc::new(
        |scope: Scope, mut receiver: AppReceiver, mut sender: AppSender| async move {
            let mut total = 0usize;
            let mut ends = 0usize;
            loop {
                match receiver.recv().await {
                    InboundEvent::BodyChunk(chunk) => {
                        assert_eq!(ends, 0, "body chunk after body end");
                        total += chunk.len();
                    }
                    InboundEvent::BodyEnd => {
                        ends += 1;
                        break;
                    }
                    InboundEvent::Disconnect => return Ok(()),
                }
            }
            let Scope::Http(_) = scope else { return Ok(()) };
            respond_with(&mut sender, 200, format!("got={total} ends={ends}").into_bytes()).await
        },
    );
    let server = start_server(tcp_config(), app).await;

    let payload = vec![b'z'; 10_000];
    let mut stream = TcpStream::connect(server.tcp()).await.unwrap();
    stream
        .write_all(
            format!(
                "POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n",
                payload.len()
            )
            .as_bytes(),
        )
        .await
        .unwrap();
    // Dribble the body to force several read/parse rounds.
    for piece in payload.chunks(1024) {
        stream.write_all(piece).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let response = read_response(&mut stream).await;
    assert!(response.ends_with("got=10000 ends=1"));
}

#[tokio::test]
async fn chunked_request_body_is_decoded() {
    let server = start_server(tcp_config(), echo_app()).await;

    let mut stream = TcpStream::connect(server.tcp()).await.unwrap();
    stream
        .write_all(b"POST /chunks HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n")
        .await
        .unwrap();
    stream.write_all(b"4\r\nWiki\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    stream.write_all(b"5\r\npedia\r\n0\r\n\r\n").await.unwrap();

    let response = read_response(&mut stream).await;
    assert!(response.ends_with("POST /chunks body=9"));
}

#[tokio::test]
async fn pipelined_responses_preserve_request_order() {
    let server = start_server(tcp_config(), echo_app()).await;

    let mut stream = TcpStream::connect(server.tcp()).await.unwrap();
    // Both requests are on the wire before any response is read.
    stream
        .write_all(
            b"GET /first HTTP/1.1\r\nHost: x\r\n\r\nGET /second HTTP/1.1\r\nHost: x\r\n\r\n",
        )
        .await
        .unwrap();

    let first = read_response(&mut stream).await;
    assert!(first.ends_with("GET /first body=0"));
    let second = read_response(&mut stream).await;
    assert!(second.ends_with("GET /second body=0"));
}

#[tokio::test]
async fn malformed_request_line_gets_400() {
    let server = start_server(tcp_config(), echo_app()).await;
    let response = send_and_read_to_eof(server.tcp(), b"THIS IS NOT HTTP\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn ambiguous_framing_gets_400() {
    let server = start_server(tcp_config(), echo_app()).await;
    let response = send_and_read_to_eof(
        server.tcp(),
        b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn connection_close_is_honored() {
    let server = start_server(tcp_config(), echo_app()).await;
    let response = send_and_read_to_eof(
        server.tcp(),
        b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("connection: close\r\n"));
}

#[tokio::test]
async fn http10_without_keep_alive_closes() {
    let server = start_server(tcp_config(), echo_app()).await;
    let response = send_and_read_to_eof(server.tcp(), b"GET /old HTTP/1.0\r\n\r\n").await;
    assert!(response.ends_with("GET /old body=0"));
}

#[tokio::test]
async fn chunked_response_streams_to_client() {
    let app: SharedApp = Arc::new(
        |_scope: Scope, mut receiver: AppReceiver, mut sender: AppSender| async move {
            while receiver.recv().await != InboundEvent::BodyEnd {}
            // No content-length: the server frames this as chunked.
            sender
                .send(OutboundEvent::Start {
                    status: 200,
                    headers: Vec::new(),
                })
                .await?;
            sender
                .send(OutboundEvent::BodyChunk(b"first ".to_vec()))
                .await?;
            sender
                .send(OutboundEvent::BodyChunk(b"second".to_vec()))
                .await?;
            sender.send(OutboundEvent::BodyEnd).await?;
            Ok(())
        },
    );
    let server = start_server(tcp_config(), app).await;

    let mut stream = TcpStream::connect(server.tcp()).await.unwrap();
    stream
        .write_all(b"GET /stream HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf);

    assert!(response.contains("transfer-encoding: chunked\r\n"));
    assert!(response.contains("6\r\nfirst \r\n"));
    assert!(response.contains("6\r\nsecond\r\n"));
    assert!(response.ends_with("0\r\n\r\n"));
}

#[tokio::test]
async fn app_failure_before_response_gets_500() {
    let app: SharedApp = Arc::new(
        |_scope: Scope, _receiver: AppReceiver, _sender: AppSender| async move {
            Err(hive_server::ApplicationError::Failure("boom".into()))
        },
    );
    let server = start_server(tcp_config(), app).await;

    let response =
        send_and_read_to_eof(server.tcp(), b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
}

#[tokio::test]
async fn connection_ceiling_defers_new_accepts() {
    let mut config = tcp_config();
    config.limits.max_connections = 1;
    let server = start_server(config, echo_app()).await;

    // First connection occupies the only slot and stays open (keep-alive).
    let mut first = TcpStream::connect(server.tcp()).await.unwrap();
    first
        .write_all(b"GET /one HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    let _ = read_response(&mut first).await;

    // Second connection is deferred, not rejected: no response arrives while
    // the slot is taken.
    let mut second = TcpStream::connect(server.tcp()).await.unwrap();
    second
        .write_all(b"GET /two HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    let deferred =
        tokio::time::timeout(Duration::from_millis(200), read_response(&mut second)).await;
    assert!(deferred.is_err(), "second connection served over the ceiling");

    // Releasing the slot lets the deferred accept proceed.
    drop(first);
    let response = read_response(&mut second).await;
    assert!(response.ends_with("GET /two body=0"));
}
