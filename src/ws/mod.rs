//! WebSocket client support.
//!
//! RFC 6455 over the crate's own transport (DNS → TCP → BoringSSL).
//! Mirrors Chromium's net/websockets/ split between handshake, framing
//! and the channel that drives them:
//! - [`handshake`]: HTTP/1.1 Upgrade request and response validation
//! - [`frame`]: frame encoding and incremental decoding
//! - [`protocol`]: sans-I/O state machine turning bytes into events
//! - [`connection`]: async facade owning the socket
//!
//! # Example
//! ```ignore
//! use wsnet::ws::{CloseCode, Event, WebSocket};
//!
//! let ws = WebSocket::connect("wss://echo.websocket.org").await?;
//! ws.send_text("Hello").await?;
//! if let Some(Event::Message(msg)) = ws.recv().await {
//!     println!("{:?}", msg.as_text());
//! }
//! ws.close(CloseCode::NORMAL, "").await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod protocol;

pub use config::WebSocketConfig;
pub use connection::{validate_url, WebSocket, WebSocketBuilder};
pub use error::{HandshakeError, ProtocolError};
pub use frame::{apply_mask, Frame, FrameCodec, Opcode, Role};
pub use handshake::{compute_accept_key, ClientHandshake, HandshakeResponse};
pub use message::{CloseCode, CloseFrame, Event, Message};
pub use protocol::{Protocol, State, Transmit};
