//! Deadline-aware, rate-limited transport handle
//!
//! [`Transport`] owns one native socket and drives the suspending operations
//! (`async_connect`, `async_read_some`, `async_write_some`, `shutdown`) under
//! an optional deadline and a cancellation token. The deadline applies to
//! every operation started while it is set. Expiry fails only the operation
//! it governs with [`ProxyError::Timeout`] and disarms the deadline; closing
//! the handle fails every outstanding and later operation with
//! [`ProxyError::Aborted`].

use parking_lot::Mutex;
use socket2::Socket;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::Shutdown;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::runtime::{Handle, Runtime};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::rate::{limit_from_rate, RateLimited, UNBOUNDED};
use super::socket::{SocketOption, StreamSocket};
use super::{TransportStream, TransportType};
use crate::error::{ProxyError, Result};
use crate::logger::log;

/// Handle that closes a transport from another task
#[derive(Debug, Clone)]
pub struct Closer {
    token: CancellationToken,
    /// Duplicate descriptor of the connected socket
    socket: Arc<Mutex<Option<Socket>>>,
}

impl Closer {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            socket: Arc::new(Mutex::new(None)),
        }
    }

    fn arm(&self, socket: Option<Socket>) {
        *self.socket.lock() = socket;
    }

    fn disarm(&self) -> Option<Socket> {
        self.socket.lock().take()
    }

    /// Abort every outstanding operation and shut the socket down.
    ///
    /// The peer sees end of stream right away; the transport drops its own
    /// descriptor the next time it is used.
    pub fn close(&self) {
        self.token.cancel();
        if let Some(socket) = self.disarm() {
            // the peer may already be gone
            let _ = socket.shutdown(Shutdown::Both);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A stream transport over socket family `S`
pub struct Transport<S> {
    stream: Option<RateLimited<S>>,
    handle: Handle,
    deadline: Option<Instant>,
    read_limit: usize,
    write_limit: usize,
    closer: Closer,
}

impl<S: fmt::Debug> fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("stream", &self.stream)
            .field("deadline", &self.deadline)
            .field("read_limit", &self.read_limit)
            .field("write_limit", &self.write_limit)
            .field("closed", &self.closer.is_closed())
            .finish()
    }
}

impl<S> Drop for Transport<S> {
    fn drop(&mut self) {
        self.closer.disarm();
        self.closer.token.cancel();
    }
}

pub type TcpTransport = Transport<TcpStream>;

#[cfg(unix)]
pub type UnixTransport = Transport<tokio::net::UnixStream>;

impl<S: StreamSocket> Transport<S> {
    /// Wrap a connected socket, bound to the current runtime
    pub fn new(socket: S) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| ProxyError::InvalidArgument(format!("no tokio runtime: {}", e)))?;
        Ok(Self::with_handle(socket, handle))
    }

    /// Wrap a connected socket, bound to `handle`
    pub fn with_handle(socket: S, handle: Handle) -> Self {
        let mut transport = Self::unconnected(handle);
        transport.attach(RateLimited::new(socket));
        transport
    }

    /// A transport with no socket yet; connect with [`Transport::async_connect`]
    pub fn unconnected(handle: Handle) -> Self {
        Self {
            stream: None,
            handle,
            deadline: None,
            read_limit: UNBOUNDED,
            write_limit: UNBOUNDED,
            closer: Closer::new(),
        }
    }

    /// A transport with no socket yet, bound to `runtime`
    pub fn from_runtime(runtime: &Runtime) -> Self {
        Self::unconnected(runtime.handle().clone())
    }

    pub fn kind(&self) -> TransportType {
        S::KIND
    }

    pub fn get_executor(&self) -> &Handle {
        &self.handle
    }

    /// The native socket, if connected and not closed
    pub fn lowest_layer(&self) -> Option<&S> {
        if self.closer.is_closed() {
            return None;
        }
        self.stream.as_ref().map(RateLimited::get_ref)
    }

    pub fn lowest_layer_mut(&mut self) -> Option<&mut S> {
        if self.closer.is_closed() {
            return None;
        }
        self.stream.as_mut().map(RateLimited::get_mut)
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some() && !self.closer.is_closed()
    }

    /// Close the socket and abort outstanding operations. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.closer.token.cancel();
        self.release();
    }

    /// A handle that closes this transport from elsewhere
    pub fn closer(&self) -> Closer {
        self.closer.clone()
    }

    pub fn set_option(&self, option: SocketOption) -> Result<()> {
        let socket = self.lowest_layer().ok_or(ProxyError::NotConnected)?;
        socket.set_option(option)?;
        Ok(())
    }

    pub fn peer_endpoint(&self) -> Result<S::Endpoint> {
        let socket = self.lowest_layer().ok_or(ProxyError::NotConnected)?;
        Ok(socket.peer_endpoint()?)
    }

    pub fn local_endpoint(&self) -> Result<S::Endpoint> {
        let socket = self.lowest_layer().ok_or(ProxyError::NotConnected)?;
        Ok(socket.local_endpoint()?)
    }

    /// Connect to `endpoint`, replacing any current socket
    pub async fn async_connect(&mut self, endpoint: &S::Endpoint) -> Result<()> {
        self.release();
        if self.closer.is_closed() {
            self.closer = Closer::new();
        }

        let res = run(self.deadline, &self.closer.token, S::connect(endpoint)).await;
        let socket = self.settle("connect", res)?;

        let mut stream = RateLimited::new(socket);
        stream.set_read_limit(self.read_limit);
        stream.set_write_limit(self.write_limit);
        self.attach(stream);
        log::transport(S::KIND.as_str(), "connected", Some(format!("{:?}", endpoint).as_str()));
        Ok(())
    }

    /// Read at least one byte into `buf`; `Ok(0)` means end of stream
    pub async fn async_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let stream = self.stream.as_mut().ok_or(ProxyError::NotConnected)?;
        let res = run(self.deadline, &self.closer.token, stream.read(buf)).await;
        self.settle("read", res)
    }

    /// Write some prefix of `buf`, returning its length
    pub async fn async_write_some(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_open()?;
        let stream = self.stream.as_mut().ok_or(ProxyError::NotConnected)?;
        let res = run(self.deadline, &self.closer.token, stream.write(buf)).await;
        self.settle("write", res)
    }

    /// Shut down the write half
    pub async fn shutdown(&mut self) -> Result<()> {
        self.check_open()?;
        let stream = self.stream.as_mut().ok_or(ProxyError::NotConnected)?;
        let res = run(self.deadline, &self.closer.token, stream.shutdown()).await;
        self.settle("shutdown", res)
    }

    /// Arm the deadline `duration` from now.
    ///
    /// The first operation to run past it fails with a timeout and disarms
    /// the deadline; later operations run unbounded until it is set again.
    pub fn expires_after(&mut self, duration: Duration) {
        self.deadline = Some(Instant::now() + duration);
    }

    pub fn expires_at(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub fn expires_never(&mut self) {
        self.deadline = None;
    }

    pub fn expiry(&self) -> Option<Instant> {
        self.deadline
    }

    /// Bytes per second for both directions; negative means unbounded
    pub fn rate_limit(&mut self, bytes_per_second: i64) {
        self.read_rate_limit(bytes_per_second);
        self.write_rate_limit(bytes_per_second);
    }

    pub fn read_rate_limit(&mut self, bytes_per_second: i64) {
        self.read_limit = limit_from_rate(bytes_per_second);
        if let Some(stream) = self.stream.as_mut() {
            stream.set_read_limit(self.read_limit);
        }
    }

    pub fn write_rate_limit(&mut self, bytes_per_second: i64) {
        self.write_limit = limit_from_rate(bytes_per_second);
        if let Some(stream) = self.stream.as_mut() {
            stream.set_write_limit(self.write_limit);
        }
    }

    /// Current (read, write) ceilings in bytes per second
    pub fn limits(&self) -> (usize, usize) {
        (self.read_limit, self.write_limit)
    }

    /// Give up the socket without closing it
    pub fn into_inner(mut self) -> Option<S> {
        self.closer.disarm();
        self.stream.take().map(RateLimited::into_inner)
    }

    /// Box into the relay stream type; rate limits still apply, deadlines do not
    pub fn into_boxed(self) -> TransportStream {
        Box::pin(self)
    }

    fn attach(&mut self, stream: RateLimited<S>) {
        let duplicate = match stream.get_ref().try_clone_socket() {
            Ok(socket) => Some(socket),
            Err(e) => {
                log::debug!(transport = S::KIND.as_str(), error = %e, "Closer cannot shut down this socket");
                None
            }
        };
        self.closer.arm(duplicate);
        self.stream = Some(stream);
    }

    /// Drop the socket, if any
    fn release(&mut self) {
        self.closer.disarm();
        if self.stream.take().is_some() {
            log::transport(S::KIND.as_str(), "closed", None);
        }
    }

    /// `Aborted` once closed, releasing a socket left behind by a [`Closer`]
    fn check_open(&mut self) -> Result<()> {
        if self.closer.is_closed() {
            self.release();
            return Err(ProxyError::Aborted);
        }
        Ok(())
    }

    fn settle<T>(&mut self, op: &str, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            trace_failure::<S>(op, e);
            if e.is_aborted() {
                self.release();
            } else if e.is_timeout() {
                self.deadline = None;
            }
        }
        res
    }
}

/// Drive `fut` until it completes, `deadline` passes or `closer` fires
async fn run<F, T>(deadline: Option<Instant>, closer: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    if closer.is_cancelled() {
        return Err(ProxyError::Aborted);
    }

    let op = async {
        match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                Ok(res) => res.map_err(ProxyError::from),
                Err(_) => Err(ProxyError::Timeout),
            },
            None => fut.await.map_err(ProxyError::from),
        }
    };

    tokio::select! {
        biased;
        _ = closer.cancelled() => Err(ProxyError::Aborted),
        res = op => res,
    }
}

fn trace_failure<S: StreamSocket>(op: &str, err: &ProxyError) {
    let transport = S::KIND.as_str();
    if err.is_timeout() {
        log::debug!(transport = transport, op = op, "Operation timed out");
    } else if err.is_aborted() {
        log::debug!(transport = transport, op = op, "Operation aborted");
    } else {
        log::debug!(transport = transport, op = op, error = %err, "Operation failed");
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "transport closed")
}

fn not_connected_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is not connected")
}

impl<S: StreamSocket> Transport<S> {
    fn poll_stream(&mut self) -> io::Result<Pin<&mut RateLimited<S>>> {
        if self.closer.is_closed() {
            self.release();
            return Err(closed_error());
        }
        self.stream
            .as_mut()
            .map(Pin::new)
            .ok_or_else(not_connected_error)
    }
}

impl<S: StreamSocket> AsyncRead for Transport<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().poll_stream() {
            Ok(stream) => stream.poll_read(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl<S: StreamSocket> AsyncWrite for Transport<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().poll_stream() {
            Ok(stream) => stream.poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().poll_stream() {
            Ok(stream) => stream.poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().poll_stream() {
            Ok(stream) => stream.poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

/// Transport selected by socket family at runtime
pub enum AnyTransport {
    Tcp(TcpTransport),
    #[cfg(unix)]
    Unix(UnixTransport),
}

macro_rules! dispatch {
    ($self:ident, $t:ident => $body:expr) => {
        match $self {
            AnyTransport::Tcp($t) => $body,
            #[cfg(unix)]
            AnyTransport::Unix($t) => $body,
        }
    };
}

impl AnyTransport {
    pub fn kind(&self) -> TransportType {
        dispatch!(self, t => t.kind())
    }

    pub fn is_open(&self) -> bool {
        dispatch!(self, t => t.is_open())
    }

    pub fn close(&mut self) {
        dispatch!(self, t => t.close())
    }

    pub fn closer(&self) -> Closer {
        dispatch!(self, t => t.closer())
    }

    pub fn set_option(&self, option: SocketOption) -> Result<()> {
        dispatch!(self, t => t.set_option(option))
    }

    pub async fn async_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        dispatch!(self, t => t.async_read_some(buf).await)
    }

    pub async fn async_write_some(&mut self, buf: &[u8]) -> Result<usize> {
        dispatch!(self, t => t.async_write_some(buf).await)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        dispatch!(self, t => t.shutdown().await)
    }

    pub fn expires_after(&mut self, duration: Duration) {
        dispatch!(self, t => t.expires_after(duration))
    }

    pub fn expires_at(&mut self, deadline: Instant) {
        dispatch!(self, t => t.expires_at(deadline))
    }

    pub fn expires_never(&mut self) {
        dispatch!(self, t => t.expires_never())
    }

    pub fn rate_limit(&mut self, bytes_per_second: i64) {
        dispatch!(self, t => t.rate_limit(bytes_per_second))
    }

    pub fn into_boxed(self) -> TransportStream {
        dispatch!(self, t => t.into_boxed())
    }
}

impl From<TcpTransport> for AnyTransport {
    fn from(t: TcpTransport) -> Self {
        AnyTransport::Tcp(t)
    }
}

#[cfg(unix)]
impl From<UnixTransport> for AnyTransport {
    fn from(t: UnixTransport) -> Self {
        AnyTransport::Unix(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let transport = TcpTransport::new(client.unwrap()).unwrap();
        (transport, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_unconnected_operations() {
        let mut transport = TcpTransport::unconnected(Handle::current());
        assert!(!transport.is_open());
        assert!(transport.lowest_layer().is_none());

        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.async_read_some(&mut buf).await,
            Err(ProxyError::NotConnected)
        ));
        assert!(matches!(
            transport.async_write_some(b"x").await,
            Err(ProxyError::NotConnected)
        ));
        assert!(matches!(
            transport.set_option(SocketOption::NoDelay(true)),
            Err(ProxyError::NotConnected)
        ));
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let stream = rt.block_on(async {
            TcpStream::connect(std_listener.local_addr().unwrap()).await.unwrap()
        });
        assert!(matches!(
            TcpTransport::new(stream),
            Err(ProxyError::InvalidArgument(_))
        ));

        let transport = TcpTransport::from_runtime(&rt);
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut transport, _peer) = connected_pair().await;
        assert!(transport.is_open());
        transport.close();
        assert!(!transport.is_open());
        transport.close();
        assert!(!transport.is_open());

        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.async_read_some(&mut buf).await,
            Err(ProxyError::Aborted)
        ));
        assert!(matches!(transport.shutdown().await, Err(ProxyError::Aborted)));
    }

    #[tokio::test]
    async fn test_closer_shuts_socket_down() {
        let (mut transport, mut peer) = connected_pair().await;
        let closer = transport.closer();
        closer.close();

        assert!(!transport.is_open());
        assert!(transport.lowest_layer().is_none());

        // the peer sees end of stream without the handle being touched
        let mut buf = [0u8; 4];
        let n = tokio::time::timeout(Duration::from_millis(500), peer.read(&mut buf))
            .await
            .expect("peer saw no shutdown")
            .unwrap();
        assert_eq!(n, 0);

        assert!(matches!(
            transport.async_write_some(b"late").await,
            Err(ProxyError::Aborted)
        ));
        assert!(transport.stream.is_none());
    }

    #[tokio::test]
    async fn test_drop_closes_closer() {
        let (transport, _peer) = connected_pair().await;
        let closer = transport.closer();
        assert!(!closer.is_closed());

        drop(transport);
        assert!(closer.is_closed());
        // nothing left to shut down
        closer.close();
    }

    #[tokio::test]
    async fn test_closer_aborts_pending_read() {
        let (mut transport, _peer) = connected_pair().await;
        let closer = transport.closer();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });

        let mut buf = [0u8; 16];
        let err = transport.async_read_some(&mut buf).await.unwrap_err();
        assert!(err.is_aborted());
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_deadline_bookkeeping() {
        let mut transport = TcpTransport::unconnected(Handle::current());
        assert_eq!(transport.expiry(), None);

        let at = Instant::now() + Duration::from_secs(5);
        transport.expires_at(at);
        assert_eq!(transport.expiry(), Some(at));

        transport.expires_after(Duration::from_secs(1));
        assert!(transport.expiry().unwrap() < at);

        transport.expires_never();
        assert_eq!(transport.expiry(), None);
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (mut transport, _peer) = connected_pair().await;
        transport.expires_after(Duration::from_millis(1));

        let mut buf = [0u8; 16];
        let err = transport.async_read_some(&mut buf).await.unwrap_err();
        assert!(err.is_timeout());
        // the handle survives a timeout
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn test_timeout_disarms_deadline() {
        let (mut transport, mut peer) = connected_pair().await;
        transport.expires_after(Duration::from_millis(1));

        let mut buf = [0u8; 16];
        assert!(transport.async_read_some(&mut buf).await.unwrap_err().is_timeout());
        assert_eq!(transport.expiry(), None);

        // the expired deadline does not fail the next operation
        assert_eq!(transport.async_write_some(b"still here").await.unwrap(), 10);
        let mut got = [0u8; 10];
        peer.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"still here");

        transport.expires_after(Duration::from_millis(1));
        assert!(transport.async_read_some(&mut buf).await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_rate_limit_negative_is_unbounded() {
        let (mut transport, _peer) = connected_pair().await;
        transport.rate_limit(-1);
        assert_eq!(transport.limits(), (UNBOUNDED, UNBOUNDED));

        transport.read_rate_limit(500);
        transport.write_rate_limit(1000);
        assert_eq!(transport.limits(), (500, 1000));
    }

    #[tokio::test]
    async fn test_rate_limit_applied_on_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = TcpTransport::unconnected(Handle::current());
        transport.rate_limit(2048);
        let (connected, accepted) = tokio::join!(transport.async_connect(&addr), listener.accept());
        connected.unwrap();
        let _peer = accepted.unwrap();

        assert!(transport.is_open());
        assert_eq!(transport.peer_endpoint().unwrap(), addr);
        assert_eq!(transport.limits(), (2048, 2048));
        assert_eq!(transport.kind(), TransportType::Tcp);
    }

    #[tokio::test]
    async fn test_echo_through_async_traits() {
        let (transport, mut peer) = connected_pair().await;
        let mut boxed = transport.into_boxed();

        boxed.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").await.unwrap();
        boxed.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_any_transport_dispatch() {
        let (transport, mut peer) = connected_pair().await;
        let mut any = AnyTransport::from(transport);
        assert_eq!(any.kind(), TransportType::Tcp);
        assert_eq!(any.async_write_some(b"abc").await.unwrap(), 3);

        let mut buf = [0u8; 3];
        peer.read_exact(&mut buf).await.unwrap();
        any.close();
        assert!(!any.is_open());
    }
}
