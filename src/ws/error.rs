//! WebSocket handshake and protocol error types.
//!
//! Both are carried inside [`NetError`](crate::base::neterror::NetError)
//! as `NetError::Handshake` and `NetError::Protocol`.

use super::message::CloseCode;
use thiserror::Error;

/// Failure of the HTTP Upgrade exchange. Terminal for the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("malformed HTTP response: {0}")]
    MalformedResponse(String),
    #[error("response headers exceed {0} bytes")]
    ResponseTooLarge(usize),
    #[error("expected 101 Switching Protocols, got {status} {reason}")]
    BadStatus { status: u16, reason: String },
    #[error("invalid {name} header: {value:?}")]
    InvalidHeader {
        name: &'static str,
        value: Option<String>,
    },
    #[error("missing Sec-WebSocket-Accept header")]
    MissingAccept,
    #[error("Sec-WebSocket-Accept mismatch: expected {expected}, got {actual}")]
    AcceptMismatch { expected: String, actual: String },
    #[error("server selected a subprotocol that was not offered: {0}")]
    UnexpectedSubprotocol(String),
    #[error("server enabled an extension that was not offered: {0}")]
    UnexpectedExtension(String),
    #[error("invalid request header: {0}")]
    InvalidRequestHeader(String),
    #[error("connection closed during handshake")]
    ConnectionClosed,
    #[error("timed out waiting for the handshake response")]
    TimedOut,
}

/// Violation of RFC 6455 framing or close rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("reserved bits set without a negotiated extension")]
    ReservedBitsSet,
    #[error("invalid opcode: 0x{0:X}")]
    InvalidOpcode(u8),
    #[error("control frame cannot be fragmented")]
    FragmentedControlFrame,
    #[error("control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),
    #[error("server frames must not be masked")]
    MaskedServerFrame,
    #[error("client frames must be masked")]
    UnmaskedClientFrame,
    #[error("64-bit payload length has its most significant bit set")]
    InvalidPayloadLength,
    #[error("frame payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u64, max: usize },
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,
    #[error("new data frame while a fragmented message is in progress")]
    ExpectedContinuation,
    #[error("invalid UTF-8 in text message")]
    InvalidUtf8,
    #[error("invalid close frame payload")]
    InvalidClosePayload,
    #[error("invalid close code: {0}")]
    InvalidCloseCode(u16),
}

impl ProtocolError {
    /// Close code to send the peer when failing the connection for this error.
    pub fn close_code(&self) -> CloseCode {
        match self {
            ProtocolError::InvalidUtf8 => CloseCode::INVALID_PAYLOAD,
            ProtocolError::PayloadTooLarge { .. } | ProtocolError::MessageTooLarge { .. } => {
                CloseCode::MESSAGE_TOO_BIG
            }
            _ => CloseCode::PROTOCOL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(ProtocolError::InvalidUtf8.close_code(), CloseCode::INVALID_PAYLOAD);
        assert_eq!(
            ProtocolError::MessageTooLarge { size: 10, max: 5 }.close_code(),
            CloseCode::MESSAGE_TOO_BIG
        );
        assert_eq!(
            ProtocolError::ReservedBitsSet.close_code(),
            CloseCode::PROTOCOL_ERROR
        );
    }

    #[test]
    fn test_handshake_error_display() {
        let err = HandshakeError::BadStatus {
            status: 403,
            reason: "Forbidden".into(),
        };
        assert_eq!(
            err.to_string(),
            "expected 101 Switching Protocols, got 403 Forbidden"
        );
    }
}
