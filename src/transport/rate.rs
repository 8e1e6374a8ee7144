//! Per-direction throughput shaping
//!
//! Each direction owns a budget of `limit` bytes per one second window. An
//! exhausted budget parks the operation on a timer until the next window
//! opens; other streams are never affected since every stream has its own
//! limiters.

use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Instant, Sleep};

/// Sentinel for "no ceiling"
pub const UNBOUNDED: usize = usize::MAX;

/// Length of one refill window
pub const WINDOW: Duration = Duration::from_secs(1);

/// Convert a signed bytes-per-second rate; negative means unbounded
pub fn limit_from_rate(bytes_per_second: i64) -> usize {
    if bytes_per_second < 0 {
        UNBOUNDED
    } else {
        usize::try_from(bytes_per_second).unwrap_or(UNBOUNDED)
    }
}

/// Windowed byte budget for one direction
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    available: usize,
    window_start: Instant,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl RateLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            available: limit,
            window_start: Instant::now(),
            sleep: None,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(UNBOUNDED)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit == UNBOUNDED
    }

    /// Change the ceiling; the current window restarts with the new budget
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.available = limit;
        self.window_start = Instant::now();
        self.sleep = None;
    }

    /// Wait until some budget is available and return how much
    pub fn poll_acquire(&mut self, cx: &mut Context<'_>) -> Poll<usize> {
        loop {
            if self.limit == UNBOUNDED {
                return Poll::Ready(UNBOUNDED);
            }

            let window_end = self.window_start + WINDOW;
            let now = Instant::now();
            if now >= window_end {
                self.window_start = now;
                self.available = self.limit;
            }
            if self.available > 0 {
                self.sleep = None;
                return Poll::Ready(self.available);
            }

            let deadline = self.window_start + WINDOW;
            let sleep = self.sleep.get_or_insert_with(|| Box::pin(sleep_until(deadline)));
            if sleep.deadline() != deadline {
                sleep.as_mut().reset(deadline);
            }
            ready!(sleep.as_mut().poll(cx));
        }
    }

    /// Charge `n` transferred bytes against the current window
    pub fn consume(&mut self, n: usize) {
        if self.limit != UNBOUNDED {
            self.available = self.available.saturating_sub(n);
        }
    }
}

pin_project! {
    /// Stream wrapper applying independent read and write ceilings
    #[derive(Debug)]
    pub struct RateLimited<S> {
        #[pin]
        inner: S,
        read: RateLimiter,
        write: RateLimiter,
    }
}

impl<S> RateLimited<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            read: RateLimiter::unbounded(),
            write: RateLimiter::unbounded(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn set_read_limit(&mut self, limit: usize) {
        self.read.set_limit(limit);
    }

    pub fn set_write_limit(&mut self, limit: usize) {
        self.write.set_limit(limit);
    }

    pub fn read_limit(&self) -> usize {
        self.read.limit()
    }

    pub fn write_limit(&self) -> usize {
        self.write.limit()
    }
}

impl<S: AsyncRead> AsyncRead for RateLimited<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        if buf.remaining() == 0 {
            return this.inner.poll_read(cx, buf);
        }

        let allowed = ready!(this.read.poll_acquire(cx));
        if allowed >= buf.remaining() {
            let before = buf.filled().len();
            ready!(this.inner.poll_read(cx, buf))?;
            this.read.consume(buf.filled().len() - before);
            return Poll::Ready(Ok(()));
        }

        let mut limited = ReadBuf::new(buf.initialize_unfilled_to(allowed));
        ready!(this.inner.poll_read(cx, &mut limited))?;
        let n = limited.filled().len();
        buf.advance(n);
        this.read.consume(n);
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite> AsyncWrite for RateLimited<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        if buf.is_empty() {
            return this.inner.poll_write(cx, buf);
        }

        let allowed = ready!(this.write.poll_acquire(cx));
        let len = buf.len().min(allowed);
        let n = ready!(this.inner.poll_write(cx, &buf[..len]))?;
        this.write.consume(n);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
