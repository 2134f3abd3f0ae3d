//! Request body framing.
//!
//! Resolves how a request body is delimited from its header block and parses
//! chunk-size lines for chunked transfer decoding. Pure functions, no I/O.

use crate::http::parser::ProtocolError;

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body.
    None,
    /// Exactly this many bytes follow the header block.
    ContentLength(u64),
    /// Transfer-Encoding: chunked.
    Chunked,
}

/// Resolve body framing from the header list.
///
/// Per RFC 7230: Transfer-Encoding wins over Content-Length, but a message
/// carrying both is ambiguous (request smuggling vector) and is rejected
/// outright. Duplicate Content-Length headers must agree.
pub fn resolve_framing(headers: &[(Vec<u8>, Vec<u8>)]) -> Result<BodyFraming, ProtocolError> {
    let mut content_length: Option<u64> = None;
    let mut chunked = false;
    let mut saw_transfer_encoding = false;

    for (name, value) in headers {
        if name.eq_ignore_ascii_case(b"content-length") {
            let parsed = parse_content_length(value)?;
            if let Some(existing) = content_length {
                if existing != parsed {
                    return Err(ProtocolError::ConflictingContentLength);
                }
            }
            content_length = Some(parsed);
        } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
            saw_transfer_encoding = true;
            let value =
                std::str::from_utf8(value).map_err(|_| ProtocolError::InvalidHeaderBytes)?;
            for token in value.split(',') {
                match token.trim().to_ascii_lowercase().as_str() {
                    "" => {}
                    "chunked" => chunked = true,
                    other => {
                        return Err(ProtocolError::UnsupportedTransferEncoding(
                            other.to_string(),
                        ));
                    }
                }
            }
        }
    }

    if saw_transfer_encoding && content_length.is_some() {
        return Err(ProtocolError::AmbiguousFraming);
    }

    if chunked {
        return Ok(BodyFraming::Chunked);
    }
    match content_length {
        Some(0) | None => {
            if content_length == Some(0) {
                Ok(BodyFraming::ContentLength(0))
            } else {
                Ok(BodyFraming::None)
            }
        }
        Some(len) => Ok(BodyFraming::ContentLength(len)),
    }
}

fn parse_content_length(value: &[u8]) -> Result<u64, ProtocolError> {
    let value = std::str::from_utf8(value)
        .map_err(|_| ProtocolError::InvalidContentLength)?
        .trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidContentLength);
    }
    value
        .parse::<u64>()
        .map_err(|_| ProtocolError::InvalidContentLength)
}

/// Parse a chunk-size line (hex digits, optional `;extension` suffix).
pub fn parse_chunk_size(line: &[u8]) -> Result<u64, ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidChunkSize)?;
    // Chunk extensions are permitted but ignored.
    let size_part = line.split(';').next().unwrap_or("").trim();
    if size_part.is_empty() || size_part.len() > 16 {
        return Err(ProtocolError::InvalidChunkSize);
    }
    u64::from_str_radix(size_part, 16).map_err(|_| ProtocolError::InvalidChunkSize)
}
