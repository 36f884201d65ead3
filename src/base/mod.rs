//! Base types and error handling.
//!
//! Provides foundational types mirroring Chromium's `net/base/`:
//! - [`NetError`](neterror::NetError): network error codes in the style of `net_error_list.h`
//! - [`ErrorKind`](neterror::ErrorKind): connect / TLS / handshake / protocol / send taxonomy
//! - [`random`]: BoringSSL-backed randomness for handshake and mask keys

pub mod context;
pub mod neterror;
pub mod random;

#[cfg(test)]
mod tests;
