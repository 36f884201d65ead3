//! Socket and connection management.
//!
//! Provides the byte transport under a WebSocket, mirroring Chromium's `net/socket/`:
//! - [`connectjob`]: DNS → TCP → TLS connection flow
//! - [`stream`]: plain or TLS stream
//! - [`tls`]: TLS configuration with BoringSSL
//! - [`transport`]: send / receive / half-close over a connected stream

pub mod connectjob;
pub mod stream;
pub mod tls;
pub mod transport;
