//! Inbound request reading and parsing.
//!
//! # Responsibilities
//! - Read one raw request off a connection in fixed-size chunks
//! - Parse the bytes as an HTTP/1.x request
//! - Turn the request-target (`/http://host/path?q`) into the real destination
//! - Prepare the request that workers replay against the destination
//!
//! # Design Decisions
//! - A short read ends the request; a read timeout after data has arrived does too
//! - `Host`, `Content-Length` and hop-by-hop headers are not replayed; the
//!   client recomputes them for the destination
//! - Only `http` and `https` destinations are accepted
//! - Chunked bodies are decoded; a body shorter than declared rejects the request

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

/// Size of each read from the connection.
pub const CHUNK_SIZE: usize = 1024;

const MAX_HEADERS: usize = 64;

const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Why an inbound request could not be turned into a task.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("read request: {0}")]
    Read(#[from] std::io::Error),

    #[error("read request: timed out before any data arrived")]
    ReadTimeout,

    #[error("malformed request: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("malformed request: unexpected EOF")]
    Incomplete,

    #[error("malformed request: body is {received} bytes, Content-Length is {expected}")]
    Truncated { expected: usize, received: usize },

    #[error("malformed request: invalid chunked body")]
    Chunked,

    #[error("parse {target:?}: {source}")]
    Destination {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported protocol scheme {0:?}")]
    Scheme(String),

    #[error("invalid method {0:?}")]
    Method(String),

    #[error("invalid header {0:?}")]
    Header(String),
}

/// Read a request until a short read (or a timeout after some data).
pub async fn read_request<R>(reader: &mut R, read_timeout: Duration) -> Result<Vec<u8>, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut request = Vec::with_capacity(CHUNK_SIZE);
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        let n = match tokio::time::timeout(read_timeout, reader.read(&mut chunk)).await {
            Ok(read) => read?,
            Err(_) if request.is_empty() => return Err(RequestError::ReadTimeout),
            Err(_) => break,
        };
        request.extend_from_slice(&chunk[..n]);
        if n < CHUNK_SIZE {
            break;
        }
    }

    Ok(request)
}

/// A parsed inbound request, before its target is resolved.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    /// Raw request-target, e.g. `/http://example.test/a?b=1`.
    pub target: String,
    /// Protocol token, e.g. `HTTP/1.1`.
    pub protocol: String,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl InboundRequest {
    /// Parse raw bytes as an HTTP/1.x request.
    pub fn parse(bytes: &[u8]) -> Result<Self, RequestError> {
        let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_buf);

        let header_len = match parsed.parse(bytes)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let (Some(method), Some(target), Some(version)) =
            (parsed.method, parsed.path, parsed.version)
        else {
            return Err(RequestError::Incomplete);
        };

        let headers: Vec<(String, Vec<u8>)> = parsed
            .headers
            .iter()
            .map(|h| (h.name.to_string(), h.value.to_vec()))
            .collect();

        let body = read_body(&headers, &bytes[header_len..])?;

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            protocol: format!("HTTP/1.{version}"),
            headers,
            body,
        })
    }

    /// Resolve the request-target into the request to forward.
    pub fn into_outbound(self) -> Result<OutboundRequest, RequestError> {
        let raw = self.target.strip_prefix('/').unwrap_or(&self.target);
        let url = Url::parse(raw).map_err(|source| RequestError::Destination {
            target: raw.to_string(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RequestError::Scheme(url.scheme().to_string()));
        }

        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|_| RequestError::Method(self.method.clone()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if SKIPPED_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s)) {
                continue;
            }
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RequestError::Header(name.clone()))?;
            let header_value = HeaderValue::from_bytes(value)
                .map_err(|_| RequestError::Header(name.clone()))?;
            headers.append(header_name, header_value);
        }

        Ok(OutboundRequest {
            method,
            url,
            protocol: self.protocol,
            headers,
            body: self.body,
        })
    }
}

fn header<'a>(headers: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_slice())
}

/// Extract the body that follows the header block.
///
/// `Transfer-Encoding` takes precedence over `Content-Length`. A body shorter
/// than declared is an error, never a shorter request.
fn read_body(headers: &[(String, Vec<u8>)], rest: &[u8]) -> Result<Vec<u8>, RequestError> {
    if let Some(coding) = header(headers, "transfer-encoding") {
        let last = coding
            .rsplit(|b| *b == b',')
            .next()
            .map(<[u8]>::trim_ascii)
            .unwrap_or_default();
        if !last.eq_ignore_ascii_case(b"chunked") {
            return Err(RequestError::Header("Transfer-Encoding".to_string()));
        }
        return decode_chunked(rest);
    }

    let Some(value) = header(headers, "content-length") else {
        return Ok(rest.to_vec());
    };
    let expected: usize = std::str::from_utf8(value)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| RequestError::Header("Content-Length".to_string()))?;
    if rest.len() < expected {
        return Err(RequestError::Truncated {
            expected,
            received: rest.len(),
        });
    }
    Ok(rest[..expected].to_vec())
}

/// Decode a `chunked` body. Trailers after the last chunk are ignored.
fn decode_chunked(mut rest: &[u8]) -> Result<Vec<u8>, RequestError> {
    let mut body = Vec::new();
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(parsed)) => parsed,
            Ok(httparse::Status::Partial) => return Err(RequestError::Incomplete),
            Err(_) => return Err(RequestError::Chunked),
        };
        rest = &rest[consumed..];
        if size == 0 {
            return Ok(body);
        }

        let size = usize::try_from(size).map_err(|_| RequestError::Chunked)?;
        let Some((data, after)) = rest.split_at_checked(size) else {
            return Err(RequestError::Incomplete);
        };
        rest = match after {
            [b'\r', b'\n', tail @ ..] => tail,
            [] | [b'\r'] => return Err(RequestError::Incomplete),
            _ => return Err(RequestError::Chunked),
        };
        body.extend_from_slice(data);
    }
}

/// The request a worker replays against the destination.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    /// Protocol the caller declared, kept for logging.
    pub protocol: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl OutboundRequest {
    /// A bodiless `GET` to `url`.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            protocol: "HTTP/1.1".to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// `METHOD PROTOCOL URL`, as written to the task log.
    pub fn summary(&self) -> String {
        format!("{} {} {}", self.method, self.protocol, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_as_destination() {
        let raw = b"GET /http://example.test/a?b=1 HTTP/1.1\r\nHost: localhost:19999\r\nX-Trace: abc\r\n\r\n";
        let inbound = InboundRequest::parse(raw).unwrap();
        assert_eq!(inbound.protocol, "HTTP/1.1");

        let outbound = inbound.into_outbound().unwrap();
        assert_eq!(outbound.method, Method::GET);
        assert_eq!(outbound.url.as_str(), "http://example.test/a?b=1");
        assert_eq!(outbound.url.host_str(), Some("example.test"));
        assert_eq!(outbound.headers.get("x-trace").unwrap(), "abc");
        assert!(outbound.headers.get("host").is_none());
        assert_eq!(outbound.summary(), "GET HTTP/1.1 http://example.test/a?b=1");
    }

    #[test]
    fn body_is_limited_to_content_length() {
        let raw = b"POST /https://example.test/hook HTTP/1.0\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello trailing";
        let inbound = InboundRequest::parse(raw).unwrap();
        assert_eq!(inbound.protocol, "HTTP/1.0");
        assert_eq!(inbound.body, b"hello");

        let outbound = inbound.into_outbound().unwrap();
        assert_eq!(outbound.method, Method::POST);
        assert!(outbound.headers.get("connection").is_none());
        assert!(outbound.headers.get("content-length").is_none());
        assert_eq!(outbound.body, b"hello");
    }

    #[test]
    fn chunked_body_is_decoded() {
        let raw = b"POST /http://example.test/hook HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let outbound = InboundRequest::parse(raw).unwrap().into_outbound().unwrap();

        assert_eq!(outbound.body, b"hello world");
        assert!(outbound.headers.get("transfer-encoding").is_none());
    }

    #[test]
    fn broken_chunked_bodies_are_rejected() {
        let cut = b"POST /http://example.test/hook HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel";
        assert!(matches!(InboundRequest::parse(cut), Err(RequestError::Incomplete)));

        let bad_size = b"POST /http://example.test/hook HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nhello\r\n0\r\n\r\n";
        assert!(matches!(InboundRequest::parse(bad_size), Err(RequestError::Chunked)));

        let gzip = b"POST /http://example.test/hook HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\nxx";
        assert!(matches!(InboundRequest::parse(gzip), Err(RequestError::Header(_))));
    }

    #[test]
    fn short_body_is_rejected() {
        let raw = b"POST /http://example.test/hook HTTP/1.1\r\nContent-Length: 10\r\n\r\nhi";
        assert!(matches!(
            InboundRequest::parse(raw),
            Err(RequestError::Truncated {
                expected: 10,
                received: 2
            })
        ));
    }

    #[test]
    fn relative_target_is_rejected() {
        let raw = b"GET /not-a-url HTTP/1.1\r\n\r\n";
        let err = InboundRequest::parse(raw).unwrap().into_outbound().unwrap_err();
        assert!(matches!(err, RequestError::Destination { .. }));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let raw = b"GET /ftp://example.test/file HTTP/1.1\r\n\r\n";
        let err = InboundRequest::parse(raw).unwrap().into_outbound().unwrap_err();
        assert!(matches!(err, RequestError::Scheme(s) if s == "ftp"));
    }

    #[test]
    fn garbage_and_truncated_input_fail_to_parse() {
        assert!(matches!(
            InboundRequest::parse(b"\x00\x01garbage\r\n\r\n"),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(
            InboundRequest::parse(b"GET /http://example.test/ HTTP/1.1\r\nHost: x"),
            Err(RequestError::Incomplete)
        ));
        assert!(matches!(InboundRequest::parse(b""), Err(RequestError::Incomplete)));
    }

    #[tokio::test]
    async fn reads_until_short_read() {
        let payload = vec![b'a'; CHUNK_SIZE + 10];
        let mut reader = &payload[..];
        let read = read_request(&mut reader, Duration::from_secs(1)).await.unwrap();
        assert_eq!(read.len(), CHUNK_SIZE + 10);
    }

    #[tokio::test]
    async fn exact_chunk_multiple_ends_on_timeout() {
        let (mut client, mut server) = tokio::io::duplex(4 * CHUNK_SIZE);
        tokio::io::AsyncWriteExt::write_all(&mut client, &[b'x'; CHUNK_SIZE])
            .await
            .unwrap();

        let read = read_request(&mut server, Duration::from_millis(50)).await.unwrap();
        assert_eq!(read.len(), CHUNK_SIZE);
        drop(client);
    }

    #[tokio::test]
    async fn silent_connection_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_request(&mut server, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, RequestError::ReadTimeout));
    }
}
