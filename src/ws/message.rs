//! WebSocket message, close and event types.

use super::error::ProtocolError;
use crate::base::neterror::NetError;
use bytes::{BufMut, Bytes, BytesMut};

/// WebSocket message type.
///
/// Used both for outbound intents and for inbound data messages; the
/// receive side only ever produces `Text` and `Binary` inside
/// [`Event::Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text message (UTF-8)
    Text(String),
    /// Binary message
    Binary(Bytes),
    /// Ping frame
    Ping(Bytes),
    /// Pong frame
    Pong(Bytes),
    /// Close frame with optional code and reason
    Close(Option<CloseFrame>),
}

/// Close frame data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close code (RFC 6455)
    pub code: CloseCode,
    /// Close reason (optional UTF-8 string)
    pub reason: String,
}

impl CloseFrame {
    /// Longest reason that fits a 125-byte control payload after the code.
    pub const MAX_REASON_LEN: usize = 123;

    /// Create a new close frame.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Parse a received close payload.
    ///
    /// An empty payload means the peer sent no status: code 1005.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        match payload.len() {
            0 => Ok(Self::new(CloseCode::NO_STATUS, "")),
            1 => Err(ProtocolError::InvalidClosePayload),
            _ => {
                let code = CloseCode(u16::from_be_bytes([payload[0], payload[1]]));
                if !code.is_allowed() {
                    return Err(ProtocolError::InvalidCloseCode(code.0));
                }
                let reason = std::str::from_utf8(&payload[2..])
                    .map_err(|_| ProtocolError::InvalidClosePayload)?;
                Ok(Self::new(code, reason))
            }
        }
    }

    /// Encode as a close payload. Code 1005 encodes as an empty payload.
    pub fn to_payload(&self) -> Bytes {
        if self.code == CloseCode::NO_STATUS {
            return Bytes::new();
        }
        let mut buf = BytesMut::with_capacity(2 + self.reason.len());
        buf.put_u16(self.code.0);
        buf.put_slice(self.reason.as_bytes());
        buf.freeze()
    }
}

/// WebSocket close codes (RFC 6455).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure
    pub const NORMAL: Self = Self(1000);
    /// Server going down
    pub const GOING_AWAY: Self = Self(1001);
    /// Protocol error
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Unsupported data type
    pub const UNSUPPORTED: Self = Self(1003);
    /// No status received
    pub const NO_STATUS: Self = Self(1005);
    /// Abnormal closure
    pub const ABNORMAL: Self = Self(1006);
    /// Invalid payload data
    pub const INVALID_PAYLOAD: Self = Self(1007);
    /// Policy violation
    pub const POLICY_VIOLATION: Self = Self(1008);
    /// Message too big
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    /// Extension required
    pub const EXTENSION_REQUIRED: Self = Self(1010);
    /// Internal server error
    pub const INTERNAL_ERROR: Self = Self(1011);
    /// Service restart
    pub const SERVICE_RESTART: Self = Self(1012);
    /// Try again later
    pub const TRY_AGAIN_LATER: Self = Self(1013);
    /// Bad gateway
    pub const BAD_GATEWAY: Self = Self(1014);
    /// TLS handshake failure
    pub const TLS_HANDSHAKE: Self = Self(1015);

    /// Whether this code may appear on the wire.
    ///
    /// 1005, 1006 and 1015 are reserved for local reporting; 1004 and
    /// 1016-2999 are unassigned; 3000-4999 belong to libraries and
    /// applications.
    pub fn is_allowed(self) -> bool {
        matches!(self.0, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl Message {
    /// Check if this is a text message.
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Check if this is a binary message.
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Check if this is a close message.
    pub fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as binary data.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Message::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to bytes (text as UTF-8, binary as-is).
    pub fn into_data(self) -> Bytes {
        match self {
            Message::Text(s) => Bytes::from(s),
            Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b,
            Message::Close(frame) => frame.map(|f| f.to_payload()).unwrap_or_default(),
        }
    }

    /// Serialize `value` into a text message.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(Message::Text)
    }

    /// Deserialize a text or binary message as JSON.
    #[cfg(feature = "json")]
    pub fn parse_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Message::Text(s) => serde_json::from_str(s),
            Message::Binary(b) => serde_json::from_slice(b),
            _ => serde_json::from_slice(b""),
        }
    }
}

/// What the receive side of a connection produces.
#[derive(Debug, Clone)]
pub enum Event {
    /// A complete text or binary message.
    Message(Message),
    /// Ping from the peer. A pong has already been queued.
    Ping(Bytes),
    /// Pong from the peer.
    Pong(Bytes),
    /// The connection is closed. Always the last event.
    ///
    /// Carries the peer's close code, or 1006 when the connection ended
    /// without a close frame from the peer.
    Closed(CloseFrame),
    /// A protocol or transport failure. Followed by `Closed`.
    Error(NetError),
}

impl Event {
    pub fn is_closed(&self) -> bool {
        matches!(self, Event::Closed(_))
    }

    /// The message, if this is a message event.
    pub fn into_message(self) -> Option<Message> {
        match self {
            Event::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_types() {
        let text = Message::Text("hello".into());
        assert!(text.is_text());
        assert!(!text.is_binary());
        assert_eq!(text.as_text(), Some("hello"));

        let binary = Message::Binary(Bytes::from_static(b"data"));
        assert!(binary.is_binary());
        assert!(!binary.is_text());
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(CloseCode::NORMAL.0, 1000);
        assert_eq!(CloseCode::GOING_AWAY.0, 1001);

        let code: u16 = CloseCode::NORMAL.into();
        assert_eq!(code, 1000);
    }

    #[test]
    fn test_close_code_ranges() {
        for allowed in [1000, 1001, 1002, 1003, 1007, 1011, 1014, 3000, 4999] {
            assert!(CloseCode(allowed).is_allowed(), "{allowed} should be allowed");
        }
        for rejected in [0, 999, 1004, 1005, 1006, 1015, 1016, 2999, 5000] {
            assert!(!CloseCode(rejected).is_allowed(), "{rejected} should be rejected");
        }
    }

    #[test]
    fn test_close_frame_payload() {
        let frame = CloseFrame::new(CloseCode::NORMAL, "bye");
        let payload = frame.to_payload();
        assert_eq!(&payload[..], &[0x03, 0xE8, b'b', b'y', b'e']);
        assert_eq!(CloseFrame::from_payload(&payload).unwrap(), frame);
    }

    #[test]
    fn test_close_frame_empty_payload_is_no_status() {
        let frame = CloseFrame::from_payload(&[]).unwrap();
        assert_eq!(frame.code, CloseCode::NO_STATUS);
        assert!(frame.reason.is_empty());
        assert!(frame.to_payload().is_empty());
    }

    #[test]
    fn test_close_frame_invalid_payloads() {
        assert_eq!(
            CloseFrame::from_payload(&[0x03]),
            Err(ProtocolError::InvalidClosePayload)
        );
        // 1006 must never be sent
        assert_eq!(
            CloseFrame::from_payload(&[0x03, 0xEE]),
            Err(ProtocolError::InvalidCloseCode(1006))
        );
        assert_eq!(
            CloseFrame::from_payload(&[0x03, 0xE8, 0xFF, 0xFE]),
            Err(ProtocolError::InvalidClosePayload)
        );
    }

    #[test]
    fn test_into_data() {
        let text = Message::Text("test".into());
        assert_eq!(&text.into_data()[..], b"test");

        let binary = Message::Binary(Bytes::from_static(b"bin"));
        assert_eq!(&binary.into_data()[..], b"bin");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_helpers() {
        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Subscribe {
            channel: String,
            depth: u32,
        }

        let req = Subscribe {
            channel: "trades".into(),
            depth: 10,
        };
        let msg = Message::json(&req).unwrap();
        assert!(msg.is_text());
        let back: Subscribe = msg.parse_json().unwrap();
        assert_eq!(back, req);

        assert!(Message::Ping(Bytes::new()).parse_json::<Subscribe>().is_err());
    }
}
