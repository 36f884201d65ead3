//! Core DNS resolution types and traits.

use crate::base::neterror::NetError;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
};

/// A host name to resolve into IP addresses.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Box<str>,
}

impl Name {
    #[inline]
    pub fn new(host: impl Into<Box<str>>) -> Self {
        Self { host: host.into() }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.host
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name::new(value)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.host, f)
    }
}

/// Alias for an `Iterator` trait object over `IpAddr`.
pub type Addrs = Box<dyn Iterator<Item = IpAddr> + Send>;

/// Alias for the `Future` type returned by a DNS resolver.
pub type Resolving = Pin<Box<dyn Future<Output = Result<Addrs, NetError>> + Send>>;

/// Trait for DNS resolution, the transport's `HostResolver`.
///
/// Implementations must be thread-safe; a single resolver is shared by every
/// connection built from the same [`WebSocketBuilder`](crate::ws::WebSocketBuilder).
pub trait Resolve: Send + Sync {
    fn resolve(&self, name: Name) -> Resolving;
}

impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, name: Name) -> Resolving {
        (**self).resolve(name)
    }
}

/// Resolver that answers from a fixed host table before delegating.
///
/// Handy for pointing a `wss://` URL with a real certificate name at a local
/// test server.
///
/// ```rust,ignore
/// use wsnet::dns::{GaiResolver, OverrideResolver};
///
/// let resolver = OverrideResolver::new(Arc::new(GaiResolver::new()))
///     .with_override("echo.test", "127.0.0.1".parse()?);
/// ```
pub struct OverrideResolver {
    inner: Arc<dyn Resolve>,
    overrides: HashMap<String, Vec<IpAddr>>,
}

impl OverrideResolver {
    pub fn new(inner: Arc<dyn Resolve>) -> Self {
        Self {
            inner,
            overrides: HashMap::new(),
        }
    }

    /// Add an address for `host`. Repeated calls append.
    pub fn with_override(mut self, host: impl Into<String>, addr: IpAddr) -> Self {
        self.overrides
            .entry(host.into().to_ascii_lowercase())
            .or_default()
            .push(addr);
        self
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Resolve for OverrideResolver {
    fn resolve(&self, name: Name) -> Resolving {
        if let Some(addrs) = self.overrides.get(&name.as_str().to_ascii_lowercase()) {
            tracing::trace!(host = %name, "resolved from override table");
            let addrs: Addrs = Box::new(addrs.clone().into_iter());
            return Box::pin(std::future::ready(Ok(addrs)));
        }
        self.inner.resolve(name)
    }
}

impl fmt::Debug for OverrideResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideResolver")
            .field("override_count", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

/// Resolve `host` to socket addresses on `port`.
///
/// IP literals (including bracketed IPv6 as produced by `Url::host_str`)
/// bypass the resolver.
pub async fn resolve_host(
    resolver: &dyn Resolve,
    host: &str,
    port: u16,
) -> Result<Vec<SocketAddr>, NetError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let addrs: Vec<SocketAddr> = resolver
        .resolve(Name::new(bare))
        .await?
        .map(|ip| SocketAddr::new(ip, port))
        .collect();

    if addrs.is_empty() {
        return Err(NetError::NameNotResolved);
    }
    Ok(addrs)
}
