//! Per-connection settings.

use crate::socket::tls::TlsConfig;
use http::HeaderMap;
use std::time::Duration;

/// Default limit for DNS + TCP + TLS.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default wait for the `101` response.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default wait for the peer's close frame and EOF.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 20;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20;

/// Settings for one WebSocket connection.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Bound on name resolution, TCP connect and TLS handshake. `None` waits forever.
    pub connect_timeout: Option<Duration>,
    /// Bound on receiving the Upgrade response.
    pub handshake_timeout: Option<Duration>,
    /// Grace period for the closing handshake.
    pub close_timeout: Duration,
    /// Per-read limit once open. Expiry fails the connection.
    pub read_timeout: Option<Duration>,
    /// Largest reassembled message accepted.
    pub max_message_size: Option<usize>,
    /// Largest single frame payload accepted.
    pub max_frame_size: Option<usize>,
    /// Split outgoing messages into frames of at most this many bytes.
    pub write_fragment_size: Option<usize>,
    /// Bytes requested from the socket per read.
    pub read_buffer_size: usize,
    /// Subprotocols offered in `Sec-WebSocket-Protocol`, in preference order.
    pub subprotocols: Vec<String>,
    /// Extra handshake request headers.
    pub headers: HeaderMap,
    /// TLS settings for `wss://`.
    pub tls: TlsConfig,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            read_timeout: None,
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
            max_frame_size: Some(DEFAULT_MAX_FRAME_SIZE),
            write_fragment_size: None,
            read_buffer_size: crate::socket::transport::DEFAULT_READ_CHUNK,
            subprotocols: Vec::new(),
            headers: HeaderMap::new(),
            tls: TlsConfig::default(),
        }
    }
}
