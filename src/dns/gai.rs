//! System DNS resolver using getaddrinfo.
//!
//! Resolution runs in `tokio::task::spawn_blocking` so it never stalls the
//! async runtime.

use super::{Addrs, Name, Resolve, Resolving};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};

/// System DNS resolver using `getaddrinfo` in a thread pool.
#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            let domain = host.clone();

            let result = tokio::task::spawn_blocking(move || {
                tracing::debug!(host = %host, "resolving via getaddrinfo");
                (host.as_str(), 0u16)
                    .to_socket_addrs()
                    .map(|iter| unique_in_order(iter.map(|addr| addr.ip())))
            })
            .await;

            let ips = result
                .map_err(|e| {
                    tracing::error!(error = %e, "DNS resolution task failed");
                    NetError::NameNotResolved
                })?
                .dns_context(&domain)?;

            if ips.is_empty() {
                return Err(NetError::dns_failed(
                    &domain,
                    io::Error::new(io::ErrorKind::NotFound, "No addresses returned by getaddrinfo"),
                ));
            }

            tracing::debug!(domain = %domain, count = ips.len(), "DNS resolution complete");
            Ok(Box::new(ips.into_iter()) as Addrs)
        })
    }
}

/// Drop repeated addresses, keeping the first occurrence of each.
///
/// getaddrinfo returns one entry per socket type, and families may interleave.
fn unique_in_order(ips: impl Iterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut seen = HashSet::new();
    ips.filter(|ip| seen.insert(*ip)).collect()
}
