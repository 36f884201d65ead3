//! Client side of the RFC 6455 opening handshake.
//!
//! ```http
//! GET /chat HTTP/1.1
//! Host: server.example.com
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Sec-WebSocket-Version: 13
//! ```
//!
//! The server must answer `101 Switching Protocols` with
//! `Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=` for that key.

use super::error::HandshakeError;
use crate::base::neterror::NetError;
use crate::base::random::random_bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use url::Url;

/// GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the response status line and headers.
pub const MAX_RESPONSE_HEADER_SIZE: usize = 16 * 1024;

const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";
const SEC_WEBSOCKET_ACCEPT: &str = "sec-websocket-accept";
const SEC_WEBSOCKET_VERSION: &str = "sec-websocket-version";
const SEC_WEBSOCKET_PROTOCOL: &str = "sec-websocket-protocol";
const SEC_WEBSOCKET_EXTENSIONS: &str = "sec-websocket-extensions";

/// Headers the handshake writes itself. Caller-supplied copies are dropped.
const RESERVED_HEADERS: &[&str] = &[
    "host",
    "upgrade",
    "connection",
    SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION,
    SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_EXTENSIONS,
];

/// `base64(SHA-1(key ++ GUID))`.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut input = Vec::with_capacity(client_key.len() + WS_GUID.len());
    input.extend_from_slice(client_key.as_bytes());
    input.extend_from_slice(WS_GUID.as_bytes());
    STANDARD.encode(boring::sha::sha1(&input))
}

/// Fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_key() -> Result<String, NetError> {
    let nonce = random_bytes::<16>()?;
    Ok(STANDARD.encode(nonce))
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

/// Accepted `101` response.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Subprotocol the server selected, if any.
    pub subprotocol: Option<String>,
}

/// Builds the Upgrade request and validates the server's answer.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    resource: String,
    host: String,
    key: String,
    protocols: Vec<String>,
    headers: HeaderMap,
}

impl ClientHandshake {
    /// Handshake for `url` with a freshly generated key.
    pub fn new(url: &Url) -> Result<Self, NetError> {
        Ok(Self::with_key(url, generate_key()?))
    }

    /// Handshake for `url` with a fixed key.
    pub fn with_key(url: &Url, key: impl Into<String>) -> Self {
        let mut resource = url.path().to_string();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        let host = url.host_str().unwrap_or_default();
        // url reports no port when it is the scheme default (80 / 443)
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Self {
            resource,
            host,
            key: key.into(),
            protocols: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Offer these subprotocols, in preference order.
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Extra request headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Serialized HTTP/1.1 Upgrade request.
    pub fn request(&self) -> Result<Bytes, HandshakeError> {
        if let Some(bad) = self.protocols.iter().find(|p| !is_token(p)) {
            return Err(HandshakeError::InvalidRequestHeader(format!(
                "subprotocol {bad:?} is not a token"
            )));
        }

        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(format!("GET {} HTTP/1.1\r\n", self.resource).as_bytes());
        buf.put_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.put_slice(b"Upgrade: websocket\r\n");
        buf.put_slice(b"Connection: Upgrade\r\n");
        buf.put_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.put_slice(b"Sec-WebSocket-Version: 13\r\n");
        if !self.protocols.is_empty() {
            buf.put_slice(
                format!("Sec-WebSocket-Protocol: {}\r\n", self.protocols.join(", ")).as_bytes(),
            );
        }
        for (name, value) in &self.headers {
            if RESERVED_HEADERS.contains(&name.as_str()) {
                tracing::warn!(header = %name, "ignoring handshake header set by the client");
                continue;
            }
            buf.put_slice(name.as_str().as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        Ok(buf.freeze())
    }

    /// Parse and validate the server's response from the start of `buf`.
    ///
    /// Returns `Ok(None)` until the blank line ending the headers has
    /// arrived. On success also returns how many bytes the response
    /// occupied; anything after that belongs to the frame stream.
    pub fn parse_response(
        &self,
        buf: &[u8],
    ) -> Result<Option<(HandshakeResponse, usize)>, HandshakeError> {
        let Some(end) = find_header_end(buf) else {
            if buf.len() > MAX_RESPONSE_HEADER_SIZE {
                return Err(HandshakeError::ResponseTooLarge(MAX_RESPONSE_HEADER_SIZE));
            }
            return Ok(None);
        };
        if end > MAX_RESPONSE_HEADER_SIZE {
            return Err(HandshakeError::ResponseTooLarge(MAX_RESPONSE_HEADER_SIZE));
        }

        let (status, reason, headers) = parse_head(&buf[..end])?;
        let response = self.validate(status, reason, headers)?;
        Ok(Some((response, end + 4)))
    }

    fn validate(
        &self,
        status: StatusCode,
        reason: String,
        headers: HeaderMap,
    ) -> Result<HandshakeResponse, HandshakeError> {
        if status != StatusCode::SWITCHING_PROTOCOLS {
            return Err(HandshakeError::BadStatus {
                status: status.as_u16(),
                reason,
            });
        }

        let upgrade = header_str(&headers, "upgrade");
        if !upgrade.is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket")) {
            return Err(HandshakeError::InvalidHeader {
                name: "Upgrade",
                value: upgrade.map(str::to_string),
            });
        }

        let has_upgrade_token = headers
            .get_all(http::header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
        if !has_upgrade_token {
            return Err(HandshakeError::InvalidHeader {
                name: "Connection",
                value: header_str(&headers, "connection").map(str::to_string),
            });
        }

        let accept = header_str(&headers, SEC_WEBSOCKET_ACCEPT)
            .ok_or(HandshakeError::MissingAccept)?
            .trim();
        let expected = compute_accept_key(&self.key);
        if accept != expected {
            return Err(HandshakeError::AcceptMismatch {
                expected,
                actual: accept.to_string(),
            });
        }

        if let Some(ext) = header_str(&headers, SEC_WEBSOCKET_EXTENSIONS) {
            if !ext.trim().is_empty() {
                return Err(HandshakeError::UnexpectedExtension(ext.trim().to_string()));
            }
        }

        let subprotocol = match header_str(&headers, SEC_WEBSOCKET_PROTOCOL).map(str::trim) {
            None | Some("") => None,
            Some(selected) => {
                if !self.protocols.iter().any(|p| p == selected) {
                    return Err(HandshakeError::UnexpectedSubprotocol(selected.to_string()));
                }
                Some(selected.to_string())
            }
        };

        Ok(HandshakeResponse {
            status,
            headers,
            subprotocol,
        })
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    let limit = buf.len().min(MAX_RESPONSE_HEADER_SIZE + 4);
    buf[..limit].windows(4).position(|w| w == b"\r\n\r\n")
}

fn trim_ows(mut value: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = value {
        value = rest;
    }
    value
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn malformed(msg: impl Into<String>) -> HandshakeError {
    HandshakeError::MalformedResponse(msg.into())
}

/// Split the response head (without the final CRLFCRLF) into status,
/// reason phrase and headers.
fn parse_head(head: &[u8]) -> Result<(StatusCode, String, HeaderMap), HandshakeError> {
    let mut lines = head
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

    let status_line = lines.next().unwrap_or_default();
    let status_line =
        std::str::from_utf8(status_line).map_err(|_| malformed("status line is not UTF-8"))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(malformed(format!("unexpected status line {status_line:?}")));
    }
    let code = parts.next().unwrap_or_default();
    if code.len() != 3 {
        return Err(malformed(format!("invalid status code {code:?}")));
    }
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| malformed(format!("invalid status code {code:?}")))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
            return Err(malformed("obsolete header line folding"));
        }
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| malformed("header line without ':'"))?;
        let name = HeaderName::from_bytes(&line[..colon])
            .map_err(|_| malformed("invalid header name"))?;
        let value = trim_ows(&line[colon + 1..]);
        let value =
            HeaderValue::from_bytes(value).map_err(|_| malformed("invalid header value"))?;
        headers.append(name, value);
    }

    Ok((status, reason, headers))
}
