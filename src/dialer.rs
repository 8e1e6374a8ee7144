//! Outbound dialing for one proxied target
//!
//! parse → cache/resolve → connect, yielding a configured [`TcpTransport`].

use std::net::SocketAddr;

use crate::config::DialConfig;
use crate::core::endpoint::{self, EndpointDescriptor};
use crate::core::resolver::{CachingResolver, Resolve, SystemResolver};
use crate::error::{ProxyError, Result};
use crate::logger::log;
use crate::transport::connect::connect_any;
use crate::transport::{SocketOption, TcpTransport};

pub struct Dialer<R = SystemResolver> {
    resolver: CachingResolver<R>,
    config: DialConfig,
}

impl Dialer<SystemResolver> {
    /// Dialer backed by the system resolver
    pub fn from_config(config: DialConfig) -> Result<Self> {
        Self::new(SystemResolver::with_timeout(config.dns_timeout), config)
    }
}

impl<R: Resolve> Dialer<R> {
    pub fn new(resolver: R, config: DialConfig) -> Result<Self> {
        Ok(Self {
            resolver: CachingResolver::new(resolver, config.cache_capacity)?,
            config,
        })
    }

    pub fn resolver(&self) -> &CachingResolver<R> {
        &self.resolver
    }

    pub fn config(&self) -> &DialConfig {
        &self.config
    }

    /// Parse `target` and connect to it
    pub async fn dial(&self, target: &str) -> Result<(TcpTransport, SocketAddr)> {
        let endpoint = endpoint::parse(target)?;
        self.dial_endpoint(&endpoint).await
    }

    /// Connect to an already parsed endpoint.
    ///
    /// Hostnames are lowercased before they reach the cache.
    pub async fn dial_endpoint(
        &self,
        endpoint: &EndpointDescriptor<'_>,
    ) -> Result<(TcpTransport, SocketAddr)> {
        if endpoint.host.is_empty() {
            return Err(ProxyError::InvalidArgument("empty host".to_string()));
        }
        if endpoint.port == endpoint::NO_DEFAULT_PORT {
            let reason = match endpoint::default_port(endpoint.scheme) {
                Some(_) => "port 0 is not dialable".to_string(),
                None => format!(
                    "port 0 is not dialable (scheme {} has no default port)",
                    endpoint.scheme
                ),
            };
            return Err(ProxyError::InvalidArgument(reason));
        }

        let host = endpoint.host.to_ascii_lowercase();
        let label = endpoint.host_port();
        let addrs = self.resolver.lookup(&host, endpoint.port).await?;
        let (stream, remote) = connect_any(&label, &addrs, &self.config.connect).await?;

        let mut transport = TcpTransport::new(stream)?;
        if self.config.tcp_nodelay {
            transport.set_option(SocketOption::NoDelay(true))?;
        }
        transport.rate_limit(self.config.rate_limit);
        log::debug!(dest = %label, remote = %remote, "Dialed");
        Ok((transport, remote))
    }
}
