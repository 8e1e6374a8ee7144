//! Native stream sockets behind one capability trait

use async_trait::async_trait;
use socket2::{SockRef, Socket, TcpKeepalive};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use super::{AsyncStream, TransportType};

/// Options forwarded to the native socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    /// TCP_NODELAY
    NoDelay(bool),
    /// SO_KEEPALIVE; `Some(idle)` enables probes after `idle`, `None` disables
    KeepAlive(Option<Duration>),
    /// SO_LINGER; `Some(ZERO)` makes close send a reset
    Linger(Option<Duration>),
    /// SO_RCVBUF
    RecvBufferSize(usize),
    /// SO_SNDBUF
    SendBufferSize(usize),
    /// IP_TTL
    Ttl(u32),
}

/// A connectable, stream-oriented native socket
#[async_trait]
pub trait StreamSocket: AsyncStream + Sized + 'static {
    /// Address type the socket connects to
    type Endpoint: Clone + fmt::Debug + Send + Sync + 'static;

    const KIND: TransportType;

    async fn connect(endpoint: &Self::Endpoint) -> io::Result<Self>;

    fn set_option(&self, option: SocketOption) -> io::Result<()>;

    fn peer_endpoint(&self) -> io::Result<Self::Endpoint>;

    fn local_endpoint(&self) -> io::Result<Self::Endpoint>;

    /// Second descriptor for the same socket, used to shut it down from a [`Closer`]
    ///
    /// [`Closer`]: super::Closer
    fn try_clone_socket(&self) -> io::Result<Socket>;
}

#[async_trait]
impl StreamSocket for TcpStream {
    type Endpoint = SocketAddr;

    const KIND: TransportType = TransportType::Tcp;

    async fn connect(endpoint: &SocketAddr) -> io::Result<Self> {
        TcpStream::connect(*endpoint).await
    }

    fn set_option(&self, option: SocketOption) -> io::Result<()> {
        match option {
            SocketOption::NoDelay(on) => self.set_nodelay(on),
            SocketOption::KeepAlive(Some(idle)) => {
                let keepalive = TcpKeepalive::new().with_time(idle).with_interval(idle);
                SockRef::from(self).set_tcp_keepalive(&keepalive)
            }
            SocketOption::KeepAlive(None) => SockRef::from(self).set_keepalive(false),
            SocketOption::Linger(linger) => SockRef::from(self).set_linger(linger),
            SocketOption::RecvBufferSize(size) => SockRef::from(self).set_recv_buffer_size(size),
            SocketOption::SendBufferSize(size) => SockRef::from(self).set_send_buffer_size(size),
            SocketOption::Ttl(ttl) => self.set_ttl(ttl),
        }
    }

    fn peer_endpoint(&self) -> io::Result<SocketAddr> {
        self.peer_addr()
    }

    fn local_endpoint(&self) -> io::Result<SocketAddr> {
        self.local_addr()
    }

    fn try_clone_socket(&self) -> io::Result<Socket> {
        SockRef::from(self).try_clone()
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::path::{Path, PathBuf};
    use tokio::net::UnixStream;

    fn unsupported(kind: TransportType, option: SocketOption) -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{:?} is not supported on {} sockets", option, kind),
        )
    }

    fn path_of(addr: tokio::net::unix::SocketAddr) -> PathBuf {
        addr.as_pathname().map(Path::to_path_buf).unwrap_or_default()
    }

    #[async_trait]
    impl StreamSocket for UnixStream {
        /// Filesystem path; unnamed sockets report an empty path
        type Endpoint = PathBuf;

        const KIND: TransportType = TransportType::Unix;

        async fn connect(endpoint: &PathBuf) -> io::Result<Self> {
            UnixStream::connect(endpoint).await
        }

        fn set_option(&self, option: SocketOption) -> io::Result<()> {
            match option {
                SocketOption::Linger(linger) => SockRef::from(self).set_linger(linger),
                SocketOption::RecvBufferSize(size) => SockRef::from(self).set_recv_buffer_size(size),
                SocketOption::SendBufferSize(size) => SockRef::from(self).set_send_buffer_size(size),
                SocketOption::NoDelay(_) | SocketOption::KeepAlive(_) | SocketOption::Ttl(_) => {
                    Err(unsupported(Self::KIND, option))
                }
            }
        }

        fn peer_endpoint(&self) -> io::Result<PathBuf> {
            self.peer_addr().map(path_of)
        }

        fn local_endpoint(&self) -> io::Result<PathBuf> {
            self.local_addr().map(path_of)
        }

        fn try_clone_socket(&self) -> io::Result<Socket> {
            SockRef::from(self).try_clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_options_and_endpoints() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = <TcpStream as StreamSocket>::connect(&addr).await.unwrap();

        stream.set_option(SocketOption::NoDelay(true)).unwrap();
        assert!(stream.nodelay().unwrap());
        stream.set_option(SocketOption::Ttl(32)).unwrap();
        assert_eq!(stream.ttl().unwrap(), 32);
        stream
            .set_option(SocketOption::KeepAlive(Some(Duration::from_secs(15))))
            .unwrap();
        stream
            .set_option(SocketOption::Linger(Some(Duration::ZERO)))
            .unwrap();

        assert_eq!(stream.peer_endpoint().unwrap(), addr);
        assert!(stream.local_endpoint().unwrap().ip().is_loopback());
        assert_eq!(<TcpStream as StreamSocket>::KIND, TransportType::Tcp);
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = <TcpStream as StreamSocket>::connect(&addr).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_rejects_tcp_options() {
        let (a, _b) = tokio::net::UnixStream::pair().unwrap();
        let err = a.set_option(SocketOption::NoDelay(true)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(err.to_string().contains("unix"));
        a.set_option(SocketOption::SendBufferSize(64 * 1024)).unwrap();
        assert_eq!(a.peer_endpoint().unwrap(), std::path::PathBuf::new());
    }
}
