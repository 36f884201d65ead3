//! RFC 6455 frame codec.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |                 Masking-key, if MASK set to 1                 |
//! +---------------------------------------------------------------+
//! :                         Payload Data                          :
//! +---------------------------------------------------------------+
//! ```
//!
//! [`Frame::payload`] always holds the unmasked bytes. Masking is applied
//! on encode and removed on decode.

use super::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(ProtocolError::InvalidOpcode(value)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, Ping and Pong.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// Which end of the connection a codec speaks for.
///
/// A client decodes server frames, which must be unmasked. A server
/// decodes client frames, which must be masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A single WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    /// RSV1..RSV3 in the low three bits.
    pub rsv: u8,
    pub opcode: Opcode,
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            rsv: 0,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Continuation, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    pub fn close(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Close, payload)
    }

    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    /// Size of the encoded frame in bytes.
    pub fn encoded_len(&self) -> usize {
        let len = self.payload.len();
        let ext = match len {
            0..=125 => 0,
            126..=65535 => 2,
            _ => 8,
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        2 + ext + mask + len
    }

    /// Append the wire form of this frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());

        let mut first = self.opcode.as_u8() | ((self.rsv & 0x07) << 4);
        if self.fin {
            first |= 0x80;
        }
        dst.put_u8(first);

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };
        let len = self.payload.len();
        if len <= 125 {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= 65535 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match self.mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }
}

/// XOR `buf` with the repeating 4-byte `key`. Applying it twice restores
/// the input.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        for (b, k) in chunk.iter_mut().zip(key) {
            *b ^= k;
        }
    }
    for (b, k) in chunks.into_remainder().iter_mut().zip(key) {
        *b ^= k;
    }
}

/// Incremental frame decoder.
///
/// [`FrameCodec::decode`] takes bytes out of the buffer only when a whole
/// frame is present, so it can be called again after every read.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    role: Role,
    max_payload_size: Option<usize>,
}

impl FrameCodec {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            max_payload_size: None,
        }
    }

    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    /// Reject frames whose declared payload exceeds `max`.
    pub fn with_max_payload_size(mut self, max: Option<usize>) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Decode one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Size limits are
    /// checked from the header, before the payload is buffered.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < 2 {
            return Ok(None);
        }

        let first = src[0];
        let second = src[1];
        let fin = first & 0x80 != 0;
        let rsv = (first >> 4) & 0x07;
        let masked = second & 0x80 != 0;
        let len7 = second & 0x7F;

        if rsv != 0 {
            return Err(ProtocolError::ReservedBitsSet);
        }
        let opcode = Opcode::from_u8(first & 0x0F)?;
        if opcode.is_control() {
            if !fin {
                return Err(ProtocolError::FragmentedControlFrame);
            }
            if len7 as usize > MAX_CONTROL_PAYLOAD {
                return Err(ProtocolError::ControlFrameTooLarge(len7 as usize));
            }
        }
        match (self.role, masked) {
            (Role::Client, true) => return Err(ProtocolError::MaskedServerFrame),
            (Role::Server, false) => return Err(ProtocolError::UnmaskedClientFrame),
            _ => {}
        }

        let (payload_len, mut header_len) = match len7 {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (u16::from_be_bytes([src[2], src[3]]) as u64, 4)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut ext = [0u8; 8];
                ext.copy_from_slice(&src[2..10]);
                let len = u64::from_be_bytes(ext);
                if len & (1 << 63) != 0 {
                    return Err(ProtocolError::InvalidPayloadLength);
                }
                (len, 10)
            }
            n => (n as u64, 2),
        };

        if let Some(max) = self.max_payload_size {
            if payload_len > max as u64 {
                return Err(ProtocolError::PayloadTooLarge {
                    size: payload_len,
                    max,
                });
            }
        }
        let payload_len = usize::try_from(payload_len).map_err(|_| {
            ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: usize::MAX,
            }
        })?;

        let mask = if masked {
            if src.len() < header_len + 4 {
                return Ok(None);
            }
            let key = [
                src[header_len],
                src[header_len + 1],
                src[header_len + 2],
                src[header_len + 3],
            ];
            header_len += 4;
            Some(key)
        } else {
            None
        };

        let total = header_len.saturating_add(payload_len);
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let mut payload = src.split_to(payload_len);
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        Ok(Some(Frame {
            fin,
            rsv,
            opcode,
            mask,
            payload: payload.freeze(),
        }))
    }
}
