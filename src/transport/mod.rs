//! Transport layer abstraction
//!
//! Provides one interface over stream socket families:
//! - TCP
//! - Unix-domain sockets
//!
//! with per-direction rate limits, deadlines and cancellation.

pub mod connect;
pub mod rate;
pub mod socket;
pub mod stream;

pub use connect::{connect_any, ConnectOptions};
pub use rate::{RateLimited, RateLimiter, UNBOUNDED};
pub use socket::{SocketOption, StreamSocket};
pub use stream::{AnyTransport, Closer, TcpTransport, Transport};

#[cfg(unix)]
pub use stream::UnixTransport;

use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

/// Unified transport stream trait combining AsyncRead + AsyncWrite + Send + Unpin
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Unified transport stream type
pub type TransportStream = Pin<Box<dyn AsyncStream>>;

/// Socket family of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// TCP over IPv4 or IPv6
    Tcp,
    /// Unix-domain stream socket
    Unix,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Tcp => "tcp",
            TransportType::Unix => "unix",
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
