//! Incremental HTTP/1.1 request parser.
//!
//! Pure decode logic, no I/O: bytes go in via [`RequestParser::feed`], events
//! come out via [`RequestParser::next_event`]. A request is delivered as a
//! [`RequestEvent::Head`], zero or more [`RequestEvent::BodyChunk`]s, and
//! exactly one [`RequestEvent::BodyEnd`]. Bytes beyond the declared body
//! framing stay buffered and belong to the next (pipelined) request.
//!
//! Header order is preserved and duplicate names are allowed; the parser
//! enforces configurable limits on request line length, header count, and
//! total header block size.

use std::collections::VecDeque;

use crate::config::schema::LimitConfig;
use crate::http::body::{parse_chunk_size, resolve_framing, BodyFraming};

/// Malformed request framing. The connection answers 400 (if still writable)
/// and closes; other connections are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid request line")]
    InvalidRequestLine,
    #[error("invalid HTTP method")]
    InvalidMethod,
    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),
    #[error("request line too long")]
    RequestLineTooLong,
    #[error("invalid header")]
    InvalidHeader,
    #[error("invalid header name")]
    InvalidHeaderName,
    #[error("invalid bytes in header value")]
    InvalidHeaderBytes,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("header block too large")]
    HeadersTooLarge,
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("conflicting content-length values")]
    ConflictingContentLength,
    #[error("ambiguous body framing")]
    AmbiguousFraming,
    #[error("unsupported transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error("invalid chunk delimiter")]
    InvalidChunkDelimiter,
}

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Trace,
}

impl Method {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"GET" => Some(Self::Get),
            b"HEAD" => Some(Self::Head),
            b"POST" => Some(Self::Post),
            b"PUT" => Some(Self::Put),
            b"DELETE" => Some(Self::Delete),
            b"PATCH" => Some(Self::Patch),
            b"OPTIONS" => Some(Self::Options),
            b"TRACE" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http10 => "1.0",
            Self::Http11 => "1.1",
        }
    }
}

/// A fully parsed request line plus header block.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Raw request target as received (undecoded, including query string).
    pub target: String,
    /// Percent-decoded path component.
    pub path: String,
    /// Query string (without the leading `?`), undecoded.
    pub query: Option<String>,
    pub version: Version,
    /// Headers in arrival order; names keep their original case and may
    /// repeat.
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl RequestHead {
    /// First header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| v.as_slice())
    }

    /// True if the client sent `Expect: 100-continue`.
    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|v| v.eq_ignore_ascii_case(b"100-continue"))
    }

    /// Whether the client wants the connection kept open after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close` is present;
    /// HTTP/1.0 defaults to close unless `Connection: keep-alive` is present.
    pub fn keep_alive_requested(&self) -> bool {
        let mut close = false;
        let mut keep_alive = false;
        if let Some(value) = self.header("connection") {
            if let Ok(value) = std::str::from_utf8(value) {
                for token in value.split(',') {
                    match token.trim().to_ascii_lowercase().as_str() {
                        "close" => close = true,
                        "keep-alive" => keep_alive = true,
                        _ => {}
                    }
                }
            }
        }

        if close {
            return false;
        }
        if keep_alive {
            return true;
        }
        matches!(self.version, Version::Http11)
    }
}

/// One event decoded off the request stream.
#[derive(Debug)]
pub enum RequestEvent {
    Head(RequestHead),
    BodyChunk(Vec<u8>),
    BodyEnd,
}

/// Parsing limits for request line and headers.
#[derive(Debug, Clone)]
pub struct ParseLimits {
    pub max_request_line_bytes: usize,
    pub max_header_count: usize,
    pub max_header_bytes: usize,
}

impl ParseLimits {
    pub fn from_config(limits: &LimitConfig) -> Self {
        Self {
            max_request_line_bytes: limits.max_request_line_bytes,
            max_header_count: limits.max_header_count,
            max_header_bytes: limits.max_header_bytes,
        }
    }
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from_config(&LimitConfig::default())
    }
}

#[derive(Debug)]
struct PartialHead {
    method: Method,
    target: String,
    path: String,
    query: Option<String>,
    version: Version,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    header_bytes: usize,
}

#[derive(Debug)]
enum DecodeState {
    RequestLine,
    Headers(Box<PartialHead>),
    FixedBody { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkDataDelimiter,
    Trailers { trailer_bytes: usize },
}

/// Incremental request decoder.
#[derive(Debug)]
pub struct RequestParser {
    limits: ParseLimits,
    buf: Vec<u8>,
    state: DecodeState,
    pending: VecDeque<RequestEvent>,
}

impl RequestParser {
    pub fn new(limits: ParseLimits) -> Self {
        Self {
            limits,
            buf: Vec::new(),
            state: DecodeState::RequestLine,
            pending: VecDeque::new(),
        }
    }

    /// Append raw bytes from the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// True if undecoded bytes or undelivered events remain; used to detect
    /// pipelined requests already received.
    pub fn has_buffered_input(&self) -> bool {
        !self.buf.is_empty() || !self.pending.is_empty()
    }

    /// True when the parser sits between messages (the previous request was
    /// fully consumed). Keep-alive is only safe at a message boundary.
    pub fn at_message_boundary(&self) -> bool {
        matches!(self.state, DecodeState::RequestLine) && self.pending.is_empty()
    }

    /// True while the request line has been consumed but the header block
    /// terminator has not been seen yet.
    pub fn reading_headers(&self) -> bool {
        matches!(self.state, DecodeState::Headers(_))
    }

    /// Decode the next event, or `None` if more bytes are needed.
    pub fn next_event(&mut self) -> Result<Option<RequestEvent>, ProtocolError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        loop {
            let state = std::mem::replace(&mut self.state, DecodeState::RequestLine);
            match state {
                DecodeState::RequestLine => {
                    // Tolerate blank lines before the request line (RFC 7230 §3.5).
                    while self.buf.starts_with(b"\r\n") {
                        self.buf.drain(..2);
                    }

                    let Some(line_end) = find_crlf(&self.buf) else {
                        if self.buf.len() > self.limits.max_request_line_bytes {
                            return Err(ProtocolError::RequestLineTooLong);
                        }
                        return Ok(None);
                    };
                    if line_end > self.limits.max_request_line_bytes {
                        return Err(ProtocolError::RequestLineTooLong);
                    }

                    let (method, target, path, query, version) =
                        parse_request_line(&self.buf[..line_end])?;
                    self.buf.drain(..line_end + 2);
                    self.state = DecodeState::Headers(Box::new(PartialHead {
                        method,
                        target,
                        path,
                        query,
                        version,
                        headers: Vec::new(),
                        header_bytes: 0,
                    }));
                }

                DecodeState::Headers(mut partial) => {
                    let Some(line_end) = find_crlf(&self.buf) else {
                        if partial.header_bytes + self.buf.len() > self.limits.max_header_bytes {
                            return Err(ProtocolError::HeadersTooLarge);
                        }
                        self.state = DecodeState::Headers(partial);
                        return Ok(None);
                    };

                    if line_end == 0 {
                        // Header block terminator.
                        self.buf.drain(..2);
                        let framing = resolve_framing(&partial.headers)?;
                        let head = RequestHead {
                            method: partial.method,
                            target: partial.target,
                            path: partial.path,
                            query: partial.query,
                            version: partial.version,
                            headers: partial.headers,
                        };
                        match framing {
                            BodyFraming::None | BodyFraming::ContentLength(0) => {
                                self.pending.push_back(RequestEvent::BodyEnd);
                                self.state = DecodeState::RequestLine;
                            }
                            BodyFraming::ContentLength(remaining) => {
                                self.state = DecodeState::FixedBody { remaining };
                            }
                            BodyFraming::Chunked => {
                                self.state = DecodeState::ChunkSize;
                            }
                        }
                        return Ok(Some(RequestEvent::Head(head)));
                    }

                    partial.header_bytes += line_end + 2;
                    if partial.header_bytes > self.limits.max_header_bytes {
                        return Err(ProtocolError::HeadersTooLarge);
                    }

                    let line: Vec<u8> = self.buf.drain(..line_end + 2).take(line_end).collect();
                    let (name, value) = parse_header_line(&line)?;
                    partial.headers.push((name, value));
                    if partial.headers.len() > self.limits.max_header_count {
                        return Err(ProtocolError::TooManyHeaders);
                    }
                    self.state = DecodeState::Headers(partial);
                }

                DecodeState::FixedBody { remaining } => {
                    if remaining == 0 {
                        self.state = DecodeState::RequestLine;
                        return Ok(Some(RequestEvent::BodyEnd));
                    }
                    if self.buf.is_empty() {
                        self.state = DecodeState::FixedBody { remaining };
                        return Ok(None);
                    }
                    let take = remaining.min(self.buf.len() as u64) as usize;
                    let chunk: Vec<u8> = self.buf.drain(..take).collect();
                    self.state = DecodeState::FixedBody {
                        remaining: remaining - take as u64,
                    };
                    return Ok(Some(RequestEvent::BodyChunk(chunk)));
                }

                DecodeState::ChunkSize => {
                    let Some(line_end) = find_crlf(&self.buf) else {
                        if self.buf.len() > 64 {
                            return Err(ProtocolError::InvalidChunkSize);
                        }
                        self.state = DecodeState::ChunkSize;
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&self.buf[..line_end])?;
                    self.buf.drain(..line_end + 2);
                    self.state = if size == 0 {
                        DecodeState::Trailers { trailer_bytes: 0 }
                    } else {
                        DecodeState::ChunkData { remaining: size }
                    };
                }

                DecodeState::ChunkData { remaining } => {
                    if self.buf.is_empty() {
                        self.state = DecodeState::ChunkData { remaining };
                        return Ok(None);
                    }
                    let take = remaining.min(self.buf.len() as u64) as usize;
                    let chunk: Vec<u8> = self.buf.drain(..take).collect();
                    let left = remaining - take as u64;
                    self.state = if left == 0 {
                        DecodeState::ChunkDataDelimiter
                    } else {
                        DecodeState::ChunkData { remaining: left }
                    };
                    return Ok(Some(RequestEvent::BodyChunk(chunk)));
                }

                DecodeState::ChunkDataDelimiter => {
                    if self.buf.len() < 2 {
                        self.state = DecodeState::ChunkDataDelimiter;
                        return Ok(None);
                    }
                    if &self.buf[..2] != b"\r\n" {
                        return Err(ProtocolError::InvalidChunkDelimiter);
                    }
                    self.buf.drain(..2);
                    self.state = DecodeState::ChunkSize;
                }

                DecodeState::Trailers { trailer_bytes } => {
                    let Some(line_end) = find_crlf(&self.buf) else {
                        if trailer_bytes + self.buf.len() > self.limits.max_header_bytes {
                            return Err(ProtocolError::HeadersTooLarge);
                        }
                        self.state = DecodeState::Trailers { trailer_bytes };
                        return Ok(None);
                    };
                    if line_end == 0 {
                        self.buf.drain(..2);
                        self.state = DecodeState::RequestLine;
                        return Ok(Some(RequestEvent::BodyEnd));
                    }

                    let consumed = trailer_bytes + line_end + 2;
                    if consumed > self.limits.max_header_bytes {
                        return Err(ProtocolError::HeadersTooLarge);
                    }
                    // Trailers are validated and then discarded.
                    let line: Vec<u8> = self.buf.drain(..line_end + 2).take(line_end).collect();
                    parse_header_line(&line)?;
                    self.state = DecodeState::Trailers {
                        trailer_bytes: consumed,
                    };
                }
            }
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(ParseLimits::default())
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_request_line(
    line: &[u8],
) -> Result<(Method, String, String, Option<String>, Version), ProtocolError> {
    if line.iter().any(|&b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(ProtocolError::InvalidRequestLine);
    }

    let mut parts = line.splitn(3, |&b| b == b' ');

    let method_bytes = parts.next().ok_or(ProtocolError::InvalidRequestLine)?;
    let method = Method::from_bytes(method_bytes).ok_or(ProtocolError::InvalidMethod)?;

    let target_bytes = parts.next().ok_or(ProtocolError::InvalidRequestLine)?;
    let target = std::str::from_utf8(target_bytes)
        .map_err(|_| ProtocolError::InvalidRequestLine)?
        .to_string();
    if target.is_empty() || target.contains(' ') {
        return Err(ProtocolError::InvalidRequestLine);
    }

    let version_bytes = parts.next().ok_or(ProtocolError::InvalidRequestLine)?;
    let version = match version_bytes {
        b"HTTP/1.1" => Version::Http11,
        b"HTTP/1.0" => Version::Http10,
        other if other.starts_with(b"HTTP/") => {
            return Err(ProtocolError::UnsupportedVersion(
                String::from_utf8_lossy(other).into_owned(),
            ));
        }
        _ => return Err(ProtocolError::InvalidRequestLine),
    };

    let (raw_path, query) = match target.find('?') {
        Some(pos) => (&target[..pos], Some(target[pos + 1..].to_string())),
        None => (target.as_str(), None),
    };
    let path = percent_decode(raw_path);

    Ok((method, target.clone(), path, query, version))
}

fn is_token_char(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`'
            | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

fn parse_header_line(line: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    // Obsolete line folding is rejected rather than unfolded.
    if matches!(line.first(), Some(b' ' | b'\t')) {
        return Err(ProtocolError::InvalidHeader);
    }

    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(ProtocolError::InvalidHeader)?;

    let name = &line[..colon];
    if name.is_empty() || !name.iter().all(|&b| is_token_char(b)) {
        return Err(ProtocolError::InvalidHeaderName);
    }

    let value_start = line[colon + 1..]
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .map_or(line.len(), |p| colon + 1 + p);
    let value_end = line
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(value_start, |p| p + 1)
        .max(value_start);
    let value = &line[value_start..value_end];

    if value
        .iter()
        .any(|&b| b == 0 || b == 0x7f || (b < 0x20 && b != b'\t'))
    {
        return Err(ProtocolError::InvalidHeaderBytes);
    }

    Ok((name.to_vec(), value.to_vec()))
}

/// Percent-decode a path. Invalid sequences are left as-is; plus signs are
/// preserved.
fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                    out.push(hi << 4 | lo);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> RequestParser {
        RequestParser::default()
    }

    fn head(parser: &mut RequestParser) -> RequestHead {
        match parser.next_event().unwrap() {
            Some(RequestEvent::Head(head)) => head,
            other => panic!("expected head, got {other:?}"),
        }
    }

    fn collect_body(parser: &mut RequestParser) -> Vec<u8> {
        let mut body = Vec::new();
        loop {
            match parser.next_event().unwrap() {
                Some(RequestEvent::BodyChunk(chunk)) => body.extend_from_slice(&chunk),
                Some(RequestEvent::BodyEnd) => return body,
                other => panic!("expected body event, got {other:?}"),
            }
        }
    }

    #[test]
    fn simple_get_produces_head_then_end() {
        let mut p = parser();
        p.feed(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n");

        let head = head(&mut p);
        assert_eq!(head.method, Method::Get);
        assert_eq!(head.path, "/ping");
        assert_eq!(head.version, Version::Http11);
        assert_eq!(head.header("host"), Some(&b"x"[..]));

        assert!(matches!(
            p.next_event().unwrap(),
            Some(RequestEvent::BodyEnd)
        ));
        assert!(p.at_message_boundary());
    }

    #[test]
    fn incremental_feed_is_incomplete_until_terminator() {
        let mut p = parser();
        p.feed(b"GET /a HTTP");
        assert!(p.next_event().unwrap().is_none());
        p.feed(b"/1.1\r\nHost: x");
        assert!(p.next_event().unwrap().is_none());
        assert!(p.reading_headers());
        p.feed(b"\r\n\r\n");
        let head = head(&mut p);
        assert_eq!(head.path, "/a");
    }

    #[test]
    fn content_length_body_is_exact() {
        let mut p = parser();
        p.feed(b"POST /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET");

        let head = head(&mut p);
        assert_eq!(head.method, Method::Post);
        assert_eq!(collect_body(&mut p), b"hello");
        // The trailing "GET" belongs to the next pipelined request.
        assert_eq!(p.buffered_len(), 3);
        assert!(p.at_message_boundary());
    }

    #[test]
    fn body_chunks_arrive_as_fed() {
        let mut p = parser();
        p.feed(b"POST / HTTP/1.1\r\nContent-Length: 6\r\n\r\n");
        head(&mut p);

        p.feed(b"abc");
        assert!(matches!(
            p.next_event().unwrap(),
            Some(RequestEvent::BodyChunk(chunk)) if chunk == b"abc"
        ));
        assert!(p.next_event().unwrap().is_none());

        p.feed(b"def");
        assert!(matches!(
            p.next_event().unwrap(),
            Some(RequestEvent::BodyChunk(chunk)) if chunk == b"def"
        ));
        assert!(matches!(
            p.next_event().unwrap(),
            Some(RequestEvent::BodyEnd)
        ));
    }

    #[test]
    fn chunked_body_decodes() {
        let mut p = parser();
        p.feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        head(&mut p);
        p.feed(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");
        assert_eq!(collect_body(&mut p), b"Wikipedia");
        assert!(p.at_message_boundary());
    }

    #[test]
    fn chunked_trailers_are_consumed() {
        let mut p = parser();
        p.feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        head(&mut p);
        p.feed(b"3\r\nabc\r\n0\r\nExpires: never\r\n\r\n");
        assert_eq!(collect_body(&mut p), b"abc");
        assert!(p.at_message_boundary());
    }

    #[test]
    fn chunk_missing_delimiter_is_rejected() {
        let mut p = parser();
        p.feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        head(&mut p);
        p.feed(b"3\r\nabcXX");
        assert!(matches!(p.next_event().unwrap(), Some(_)));
        assert!(matches!(
            p.next_event(),
            Err(ProtocolError::InvalidChunkDelimiter)
        ));
    }

    #[test]
    fn duplicate_headers_keep_order() {
        let mut p = parser();
        p.feed(b"GET / HTTP/1.1\r\nX-Tag: one\r\nHost: x\r\nX-Tag: two\r\n\r\n");
        let head = head(&mut p);
        let tags: Vec<_> = head
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(b"x-tag"))
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(tags, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(head.headers[1].0, b"Host".to_vec());
    }

    #[test]
    fn malformed_request_line_rejected() {
        let mut p = parser();
        p.feed(b"NOT-A-REQUEST\r\n\r\n");
        assert!(p.next_event().is_err());
    }

    #[test]
    fn unknown_method_rejected() {
        let mut p = parser();
        p.feed(b"BREW /pot HTTP/1.1\r\n\r\n");
        assert!(matches!(p.next_event(), Err(ProtocolError::InvalidMethod)));
    }

    #[test]
    fn http2_preface_rejected() {
        let mut p = parser();
        p.feed(b"PRI * HTTP/2.0\r\n\r\n");
        assert!(p.next_event().is_err());
    }

    #[test]
    fn header_count_limit_enforced() {
        let mut limits = ParseLimits::default();
        limits.max_header_count = 2;
        let mut p = RequestParser::new(limits);
        p.feed(b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n");
        assert!(matches!(p.next_event(), Err(ProtocolError::TooManyHeaders)));
    }

    #[test]
    fn request_line_limit_enforced() {
        let mut limits = ParseLimits::default();
        limits.max_request_line_bytes = 32;
        let mut p = RequestParser::new(limits);
        let long_path = "x".repeat(64);
        p.feed(format!("GET /{long_path} HTTP/1.1\r\n").as_bytes());
        assert!(matches!(
            p.next_event(),
            Err(ProtocolError::RequestLineTooLong)
        ));
    }

    #[test]
    fn obs_fold_rejected() {
        let mut p = parser();
        p.feed(b"GET / HTTP/1.1\r\nX-A: 1\r\n folded\r\n\r\n");
        assert!(matches!(p.next_event(), Err(ProtocolError::InvalidHeader)));
    }

    #[test]
    fn pipelined_requests_parse_in_order() {
        let mut p = parser();
        p.feed(b"GET /first HTTP/1.1\r\nHost: x\r\n\r\nGET /second HTTP/1.1\r\nHost: x\r\n\r\n");

        let first = head(&mut p);
        assert_eq!(first.path, "/first");
        assert!(matches!(
            p.next_event().unwrap(),
            Some(RequestEvent::BodyEnd)
        ));

        let second = head(&mut p);
        assert_eq!(second.path, "/second");
        assert!(matches!(
            p.next_event().unwrap(),
            Some(RequestEvent::BodyEnd)
        ));
        assert!(!p.has_buffered_input());
    }

    #[test]
    fn percent_decoded_path_and_query_split() {
        let mut p = parser();
        p.feed(b"GET /hello%20world?q=a%20b HTTP/1.1\r\n\r\n");
        let head = head(&mut p);
        assert_eq!(head.path, "/hello world");
        assert_eq!(head.query.as_deref(), Some("q=a%20b"));
        assert_eq!(head.target, "/hello%20world?q=a%20b");
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let mut p = parser();
        p.feed(b"GET / HTTP/1.1\r\n\r\n");
        assert!(head(&mut p).keep_alive_requested());

        let mut p = parser();
        p.feed(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(!head(&mut p).keep_alive_requested());

        let mut p = parser();
        p.feed(b"GET / HTTP/1.0\r\n\r\n");
        assert!(!head(&mut p).keep_alive_requested());

        let mut p = parser();
        p.feed(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
        assert!(head(&mut p).keep_alive_requested());
    }

    #[test]
    fn expect_continue_detected() {
        let mut p = parser();
        p.feed(b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 1\r\n\r\n");
        assert!(head(&mut p).expects_continue());
    }
}
