use crate::ws::{HandshakeError, ProtocolError, State};
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Coarse error taxonomy for a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Name resolution, refused or timed out TCP connect, bad URL.
    Connect,
    /// TLS handshake or certificate failure.
    Tls,
    /// HTTP Upgrade exchange rejected or malformed.
    Handshake,
    /// Malformed frame or close code from the peer.
    Protocol,
    /// Sending while the connection is not open, or the write side is gone.
    Send,
}

#[derive(Debug, Error, Clone)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection to {host}:{port} failed: {source}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Name not resolved: {domain}: {source}")]
    NameNotResolvedFor {
        domain: String,
        #[source]
        source: Arc<io::Error>,
    },

    // TLS Errors
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("SSL handshake with {host} failed: {reason}")]
    SslHandshakeFailed { host: String, reason: String },
    #[error("Certificate for {host} is invalid: {reason}")]
    CertificateInvalid { host: String, reason: String },

    // URL Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,

    // WebSocket Errors
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("WebSocket protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("WebSocket is not open (state: {state:?})")]
    NotOpen { state: State },
}

impl NetError {
    /// Numeric code in the style of Chromium's `net_error_list.h`.
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionFailed => -104,
            NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolved => -105,
            NetError::NameNotResolvedFor { .. } => -105,
            NetError::SslProtocolError => -107,
            NetError::SslHandshakeFailed { .. } => -107,
            NetError::ConnectionTimedOut => -118,
            NetError::Protocol(_) => -145,
            NetError::Handshake(_) => -173,
            NetError::CertificateInvalid { .. } => -207,
            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            NetError::NotOpen { .. } => -112,
        }
    }

    /// Which part of the connection lifecycle produced this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::InvalidUrl
            | NetError::UnknownUrlScheme
            | NetError::NameNotResolved
            | NetError::NameNotResolvedFor { .. }
            | NetError::ConnectionRefused
            | NetError::ConnectionTimedOut
            | NetError::ConnectionFailed
            | NetError::ConnectionFailedTo { .. } => ErrorKind::Connect,
            NetError::SslProtocolError
            | NetError::SslHandshakeFailed { .. }
            | NetError::CertificateInvalid { .. } => ErrorKind::Tls,
            NetError::Handshake(_) => ErrorKind::Handshake,
            NetError::Protocol(_) => ErrorKind::Protocol,
            NetError::NotOpen { .. } | NetError::ConnectionClosed | NetError::ConnectionReset => {
                ErrorKind::Send
            }
        }
    }

    /// Wrap an I/O error from a TCP connect attempt with its target.
    pub fn connection_failed_to(host: &str, port: u16, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            _ => NetError::ConnectionFailedTo {
                host: host.to_string(),
                port,
                source: Arc::new(err),
            },
        }
    }

    /// Wrap an I/O error from name resolution with the domain queried.
    pub fn dns_failed(domain: &str, err: io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            source: Arc::new(err),
        }
    }

    /// Map an I/O error raised on an established socket.
    pub fn from_socket_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                NetError::ConnectionReset
            }
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            _ => NetError::ConnectionClosed,
        }
    }
}
