//! DNS Resolution Module
//!
//! Pluggable name resolution for the WebSocket transport:
//! - System resolver (getaddrinfo via thread pool)
//! - Host table overrides layered over any other resolver
//!
//! The `Resolve` trait mirrors Chromium's `HostResolver` concept.
//!
//! # Example
//!
//! ```rust,ignore
//! use wsnet::dns::{GaiResolver, Name, Resolve};
//!
//! let resolver = GaiResolver::new();
//! for ip in resolver.resolve(Name::new("example.com")).await? {
//!     println!("Resolved: {}", ip);
//! }
//! ```

mod gai;
mod resolve;

pub use gai::GaiResolver;
pub use resolve::{resolve_host, Addrs, Name, OverrideResolver, Resolve, Resolving};
