//! HTTP/1.1 response encoder.
//!
//! Pure encode logic, no I/O. The encoder writes a status line and header
//! block, then frames the body either with the application's declared
//! Content-Length or with chunked transfer encoding when the length is not
//! known up front. HTTP/1.0 peers without a declared length get a
//! close-delimited body instead.

use crate::http::parser::Version;

/// Interim response for `Expect: 100-continue`.
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Body framing mismatch between declared headers and written chunks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("response body exceeds declared content-length")]
    BodyOverrun,
    #[error("response body ended {remaining} bytes short of declared content-length")]
    BodyUnderrun { remaining: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    /// Content-Length declared: count bytes and enforce the total.
    Fixed { remaining: u64 },
    /// Chunked transfer encoding.
    Chunked,
    /// Close-delimited (HTTP/1.0 with unknown length).
    Raw,
    /// No body bytes on the wire (HEAD, 1xx/204/304).
    Suppressed,
}

/// Encoder for a single response on a connection.
#[derive(Debug)]
pub struct ResponseEncoder {
    version: Version,
    head_request: bool,
    keep_alive: bool,
    mode: BodyMode,
}

impl ResponseEncoder {
    /// `keep_alive` is the handler's decision for this connection; it shapes
    /// the `connection` header written when the application did not set one.
    pub fn new(version: Version, head_request: bool, keep_alive: bool) -> Self {
        Self {
            version,
            head_request,
            keep_alive,
            mode: BodyMode::Suppressed,
        }
    }

    /// Encode the status line and header block.
    ///
    /// Decides the body framing from the application's headers: a declared
    /// `content-length` bounds the body; otherwise chunked framing is added
    /// for HTTP/1.1 and close-delimited framing is used for HTTP/1.0.
    pub fn start(&mut self, status: u16, headers: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
        let mut declared_length: Option<u64> = None;
        let mut has_transfer_encoding = false;
        let mut has_connection = false;

        for (name, value) in headers {
            if name.eq_ignore_ascii_case(b"content-length") {
                declared_length = std::str::from_utf8(value)
                    .ok()
                    .and_then(|v| v.trim().parse().ok());
            } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
                has_transfer_encoding = true;
            } else if name.eq_ignore_ascii_case(b"connection") {
                has_connection = true;
            }
        }

        let bodyless_status = status < 200 || status == 204 || status == 304;
        let mut add_chunked_header = false;

        self.mode = if self.head_request || bodyless_status {
            BodyMode::Suppressed
        } else if let Some(remaining) = declared_length {
            BodyMode::Fixed { remaining }
        } else if has_transfer_encoding {
            BodyMode::Chunked
        } else if self.version == Version::Http11 {
            add_chunked_header = true;
            BodyMode::Chunked
        } else {
            BodyMode::Raw
        };

        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(status.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(reason_phrase(status).as_bytes());
        out.extend_from_slice(b"\r\n");

        for (name, value) in headers {
            out.extend_from_slice(name);
            out.extend_from_slice(b": ");
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
        }

        if add_chunked_header {
            out.extend_from_slice(b"transfer-encoding: chunked\r\n");
        }
        if !has_connection {
            if !self.keep_alive || self.mode == BodyMode::Raw {
                out.extend_from_slice(b"connection: close\r\n");
            } else if self.version == Version::Http10 {
                out.extend_from_slice(b"connection: keep-alive\r\n");
            }
        }

        out.extend_from_slice(b"\r\n");
        out
    }

    /// Encode one body chunk. Empty chunks produce no bytes.
    pub fn body_chunk(&mut self, data: &[u8]) -> Result<Vec<u8>, EncodeError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match &mut self.mode {
            BodyMode::Suppressed => Ok(Vec::new()),
            BodyMode::Raw => Ok(data.to_vec()),
            BodyMode::Fixed { remaining } => {
                let len = data.len() as u64;
                if len > *remaining {
                    return Err(EncodeError::BodyOverrun);
                }
                *remaining -= len;
                Ok(data.to_vec())
            }
            BodyMode::Chunked => {
                let mut out = Vec::with_capacity(data.len() + 16);
                out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
                Ok(out)
            }
        }
    }

    /// Terminate the body. For fixed-length bodies this verifies the
    /// declared length was met; a short body means the peer would hang
    /// waiting, so the connection must be aborted instead.
    pub fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        match self.mode {
            BodyMode::Fixed { remaining } if remaining > 0 && !self.head_request => {
                Err(EncodeError::BodyUnderrun { remaining })
            }
            BodyMode::Chunked => Ok(b"0\r\n\r\n".to_vec()),
            _ => Ok(Vec::new()),
        }
    }

    /// True when the framing itself requires closing the connection after
    /// this response (close-delimited body).
    pub fn requires_close(&self) -> bool {
        self.mode == BodyMode::Raw
    }
}

/// Canonical reason phrase for a status code.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        417 => "Expectation Failed",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}

/// Encode a complete plain-text response that closes the connection.
///
/// Used for the error paths (400, 500, 503) where the application never ran.
pub fn simple_response(status: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(128 + body.len());
    out.extend_from_slice(b"HTTP/1.1 ");
    out.extend_from_slice(status.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(reason_phrase(status).as_bytes());
    out.extend_from_slice(b"\r\ncontent-type: text/plain; charset=utf-8\r\ncontent-length: ");
    out.extend_from_slice(body.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\nconnection: close\r\n\r\n");
    out.extend_from_slice(body);
    out
}
