//! Resolver capability and the caching layer in front of it

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::core::cache::SharedCache;
use crate::error::{ProxyError, Result};
use crate::logger::log;

/// Default timeout for a system lookup
pub const DNS_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Name resolution capability
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolve `host` to socket addresses carrying `port`
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo` through tokio)
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::with_timeout(DNS_RESOLVE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let addrs = tokio::time::timeout(self.timeout, tokio::net::lookup_host((host, port)))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("DNS resolution timeout after {:?}", self.timeout),
                )
            })??;
        Ok(addrs.collect())
    }
}

/// Resolver that consults a [`SharedCache`] before the inner resolver.
///
/// The cache is keyed by hostname only; ports are applied on the way out.
pub struct CachingResolver<R> {
    inner: R,
    cache: SharedCache<IpAddr>,
}

impl<R: Resolve> CachingResolver<R> {
    pub fn new(inner: R, capacity: usize) -> Result<Self> {
        Ok(Self::with_cache(inner, SharedCache::new(capacity)?))
    }

    pub fn with_cache(inner: R, cache: SharedCache<IpAddr>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &SharedCache<IpAddr> {
        &self.cache
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Addresses for `host:port`, in resolver order.
    ///
    /// IP literals never touch the cache or the resolver.
    pub async fn lookup(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        if let Some((ips, _)) = self.cache.get(host) {
            log::resolve(host, true, ips.len());
            return Ok(with_port(&ips, port));
        }

        let addrs = self
            .inner
            .resolve(host, port)
            .await
            .map_err(|source| ProxyError::Resolve {
                host: host.to_string(),
                source,
            })?;

        let mut ips: Vec<IpAddr> = Vec::with_capacity(addrs.len());
        for addr in &addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        if ips.is_empty() {
            return Err(ProxyError::NoAddresses(host.to_string()));
        }

        log::resolve(host, false, ips.len());
        let result = with_port(&ips, port);
        self.cache.put(host, ips);
        Ok(result)
    }
}

#[async_trait]
impl<R: Resolve> Resolve for CachingResolver<R> {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        self.lookup(host, port).await.map_err(|e| match e {
            ProxyError::Resolve { source, .. } => source,
            ProxyError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::NotFound, other.to_string()),
        })
    }
}

fn with_port(ips: &[IpAddr], port: u16) -> Vec<SocketAddr> {
    ips.iter().map(|ip| SocketAddr::new(*ip, port)).collect()
}
