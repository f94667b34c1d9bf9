//! Per-connection serving and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Serve HTTP/1.1 on one accepted stream
//! - Enforce read (header), write (response) and idle timeouts
//! - Close gracefully when shutdown is signalled

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tower::ServiceExt;

use crate::config::TimeoutConfig;
use crate::lifecycle::ShutdownSignal;
use crate::net::listener::ConnectionPermit;
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Shortest interval between timeout checks.
const MIN_TIMEOUT_CHECK: Duration = Duration::from_millis(50);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Transport limits applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimeouts {
    /// Time allowed to receive a request's headers once its first byte arrived.
    pub read: Duration,
    /// Time allowed to produce a response.
    pub write: Duration,
    /// Close the connection after this long with no traffic.
    pub idle: Duration,
}

impl ConnectionTimeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            read: config.read(),
            write: config.write(),
            idle: config.idle(),
        }
    }
}

/// Traffic bookkeeping for one connection.
///
/// Tracks the last time bytes moved, whether a request is being handled, and
/// when the first bytes of a not-yet-dispatched request head arrived. The
/// read timeout runs only while a head is pending; between requests the idle
/// timeout applies instead.
#[derive(Debug, Clone)]
pub struct Activity {
    origin: Instant,
    state: Arc<ActivityState>,
}

#[derive(Debug, Default)]
struct ActivityState {
    last_millis: AtomicU64,
    /// One plus the millisecond the pending head started; zero when none.
    head_since: AtomicU64,
    in_flight: AtomicBool,
}

impl Activity {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(ActivityState::default()),
        }
    }

    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Bytes were written.
    pub fn touch(&self) {
        self.state.last_millis.store(self.now_millis(), Ordering::Relaxed);
    }

    /// Bytes were read. Outside a request they start a pending head.
    pub fn received(&self) {
        let now = self.now_millis();
        self.state.last_millis.store(now, Ordering::Relaxed);
        if !self.state.in_flight.load(Ordering::Acquire) {
            let _ = self.state.head_since.compare_exchange(
                0,
                now + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
    }

    /// The head was parsed and the request dispatched.
    pub fn request_started(&self) {
        self.state.in_flight.store(true, Ordering::Release);
        self.state.head_since.store(0, Ordering::Release);
        self.touch();
    }

    pub fn request_finished(&self) {
        self.state.in_flight.store(false, Ordering::Release);
        self.touch();
    }

    pub fn in_flight(&self) -> bool {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// How long a partially received request head has been waiting.
    pub fn head_pending_for(&self) -> Option<Duration> {
        match self.state.head_since.load(Ordering::Acquire) {
            0 => None,
            since => Some(Duration::from_millis(self.now_millis().saturating_sub(since - 1))),
        }
    }

    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.state.last_millis.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that records read/write activity.
#[derive(Debug)]
pub struct TrackedStream<S> {
    inner: S,
    activity: Activity,
}

impl<S> TrackedStream<S> {
    pub fn new(inner: S, activity: Activity) -> Self {
        Self { inner, activity }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TrackedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.received();
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TrackedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            self.activity.touch();
        }
        poll
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            self.activity.touch();
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Serve one connection until the client leaves, it goes idle, or shutdown.
///
/// The permit is held for the connection's lifetime.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    permit: ConnectionPermit,
    router: Router,
    timeouts: ConnectionTimeouts,
    mut shutdown: ShutdownSignal,
) {
    let id = ConnectionId::new();
    let activity = Activity::new();
    let io = TokioIo::new(TrackedStream::new(stream, activity.clone()));
    metrics::connection_opened();
    tracing::debug!(connection_id = %id, peer = %peer, "Connection opened");

    let tracker = activity.clone();
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        let router = router.clone();
        let tracker = tracker.clone();
        tracker.request_started();
        async move {
            let result = tokio::time::timeout(timeouts.write, router.oneshot(request)).await;
            tracker.request_finished();
            match result {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(never)) => match never {},
                Err(elapsed) => {
                    tracing::warn!(
                        connection_id = %id,
                        "Write timeout elapsed, dropping connection"
                    );
                    Err(elapsed)
                }
            }
        }
    });

    // hyper's own header timer also runs between keep-alive requests, so the
    // read deadline is enforced below from the pending-head bookkeeping.
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(None)
        .keep_alive(true);
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let period = (timeouts.idle.min(timeouts.read) / 4).max(MIN_TIMEOUT_CHECK);
    let mut timeout_check = tokio::time::interval(period);
    let mut closing = false;

    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %id, error = %e, "Connection ended with error");
                }
                break;
            }
            _ = shutdown.recv(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = timeout_check.tick() => {
                if let Some(waited) = activity.head_pending_for() {
                    if waited >= timeouts.read {
                        tracing::debug!(connection_id = %id, "Read timeout elapsed, closing");
                        break;
                    }
                } else if !closing
                    && !activity.in_flight()
                    && activity.idle_for() >= timeouts.idle
                {
                    tracing::debug!(connection_id = %id, "Closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }

    metrics::connection_closed();
    tracing::debug!(connection_id = %id, "Connection closed");
    drop(permit);
}
