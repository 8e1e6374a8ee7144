//! Connect to the first reachable address of a resolved host
//!
//! Attempts run concurrently. When the list mixes families, IPv4 attempts
//! start `happy_eyeballs_delay` after the IPv6 ones. The first success wins
//! and the losers are dropped; if every attempt fails the caller sees one
//! aggregated [`ProxyError::Unreachable`].

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::logger::log;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const HAPPY_EYEBALLS_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Budget for one attempt, not counting the happy eyeballs delay
    pub connect_timeout: Duration,
    pub happy_eyeballs_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            happy_eyeballs_delay: HAPPY_EYEBALLS_DELAY,
        }
    }
}

/// Connect to one of `addrs`; `target` only labels errors and logs
pub async fn connect_any(
    target: &str,
    addrs: &[SocketAddr],
    opts: &ConnectOptions,
) -> Result<(TcpStream, SocketAddr)> {
    if addrs.is_empty() {
        return Err(ProxyError::NoAddresses(target.to_string()));
    }

    let mixed = addrs.iter().any(SocketAddr::is_ipv4) && addrs.iter().any(SocketAddr::is_ipv6);
    let mut attempts = FuturesUnordered::new();
    for &addr in addrs {
        let delay = if mixed && addr.is_ipv4() {
            opts.happy_eyeballs_delay
        } else {
            Duration::ZERO
        };
        let connect_timeout = opts.connect_timeout;
        attempts.push(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(ProxyError::from(e)),
                Err(_) => Err(ProxyError::Timeout),
            };
            (addr, result)
        });
    }

    let mut failed = 0;
    let mut last = None;
    while let Some((addr, result)) = attempts.next().await {
        match result {
            Ok(stream) => {
                log::debug!(dest = target, addr = %addr, failed = failed, "Connected");
                return Ok((stream, addr));
            }
            Err(e) => {
                failed += 1;
                if e.is_timeout() {
                    log::debug!(dest = target, addr = %addr, "Connect attempt timed out");
                } else {
                    log::debug!(dest = target, addr = %addr, error = %e, "Connect attempt failed");
                }
                last = Some(e);
            }
        }
    }

    Err(ProxyError::Unreachable {
        target: target.to_string(),
        attempts: failed,
        last: Box::new(last.unwrap_or_else(|| ProxyError::NoAddresses(target.to_string()))),
    })
}
