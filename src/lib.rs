//! # wsnet
//!
//! A Chromium-inspired WebSocket client for Rust.
//!
//! `wsnet` speaks RFC 6455 over its own connection stack: pluggable DNS,
//! TCP, and TLS through BoringSSL. The protocol core is sans-I/O, so the
//! same state machine drives real sockets and unit tests.
//!
//! ## Features
//!
//! - **Transport**: DNS → TCP → TLS connect job with timeouts, half-close
//! - **TLS**: BoringSSL, custom CA file, SNI override, version bounds
//! - **Handshake**: HTTP/1.1 Upgrade with subprotocols and extra headers
//! - **Framing**: masking, fragmentation, control frame rules, size limits
//! - **Closing handshake**: close codes, grace period, forced shutdown
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsnet::ws::{CloseCode, Event, WebSocket};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wsnet::NetError> {
//!     let ws = WebSocket::connect("wss://echo.websocket.org").await?;
//!     ws.send_text("hello").await?;
//!     while let Some(event) = ws.recv().await {
//!         match event {
//!             Event::Message(msg) => println!("{:?}", msg.as_text()),
//!             Event::Closed(frame) => println!("closed: {}", frame.code.0),
//!             _ => {}
//!         }
//!     }
//!     ws.close(CloseCode::NORMAL, "bye").await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions and shared helpers
//! - [`dns`] - Name resolution
//! - [`socket`] - Connect job, TLS and byte transport
//! - [`ws`] - Handshake, framing, protocol engine and connection

pub mod base;
pub mod dns;
pub mod socket;
pub mod ws;

pub use base::neterror::{ErrorKind, NetError};
pub use socket::tls::TlsConfig;
pub use ws::{
    CloseCode, CloseFrame, Event, Message, State, WebSocket, WebSocketBuilder, WebSocketConfig,
};
