//! TCP listener and connection dispatcher.
//!
//! Binds the listening socket, accepts connections in a loop and hands each
//! one to its own echo handler task. Handlers share no state with each other
//! or with the dispatcher.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, debug_span, error, info, warn, Instrument};

use crate::protocols::echo;

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Pause before accepting again after running out of descriptors or buffers
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound TCP listener.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Source of accepted connections.
pub trait Accept {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Accept for Listener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        self.inner.accept()
    }
}

/// Error creating the listening socket.
#[derive(Debug)]
pub struct BindError {
    pub addr: SocketAddr,
    pub source: io::Error,
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to create listener on {}: {}", self.addr, self.source)
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// How the dispatcher reacts to a failed accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptErrorKind {
    /// Log and keep accepting.
    Transient,
    /// Out of descriptors or kernel memory; log and retry after a pause.
    Exhausted,
    /// The listening socket is unusable; stop the dispatcher.
    Terminal,
}

/// Classify an accept error.
///
/// Only errors saying the descriptor is no longer a listening socket are
/// terminal. Descriptor and memory exhaustion back off before retrying,
/// since the pending connection stays in the backlog and would fail again
/// straight away.
pub fn classify_accept_error(err: &io::Error) -> AcceptErrorKind {
    match err.raw_os_error() {
        Some(libc::EBADF) | Some(libc::EINVAL) | Some(libc::ENOTSOCK) => AcceptErrorKind::Terminal,
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM) => {
            AcceptErrorKind::Exhausted
        }
        _ => AcceptErrorKind::Transient,
    }
}

/// Bind a TCP listener on `addr`.
///
/// Binding `[::]` listens on IPv4 and IPv6 at once. When the host has no
/// IPv6 support it falls back to `0.0.0.0` on the same port.
///
/// Must be called from within a Tokio runtime.
pub fn start(addr: SocketAddr) -> Result<Listener, BindError> {
    let bind_err = |source| BindError { addr, source };

    let std_listener = match create_listener(addr) {
        Err(e) if addr.ip() == IpAddr::V6(Ipv6Addr::UNSPECIFIED) && ipv6_unavailable(&e) => {
            warn!(error = %e, "IPv6 unavailable, listening on IPv4 only");
            create_listener(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), addr.port()))
        }
        result => result,
    }
    .map_err(bind_err)?;
    let inner = TcpListener::from_std(std_listener).map_err(bind_err)?;
    let local_addr = inner.local_addr().map_err(bind_err)?;

    Ok(Listener { inner, local_addr })
}

fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    if addr.ip() == IpAddr::V6(Ipv6Addr::UNSPECIFIED) {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}

fn ipv6_unavailable(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EAFNOSUPPORT) | Some(libc::EPROTONOSUPPORT) | Some(libc::EADDRNOTAVAIL)
    )
}

/// Accept connections until `shutdown` resolves or the listener fails.
///
/// Each connection is handled on its own task; the loop never waits for a
/// handler. Returning drops, and so closes, the listener. Handlers that are
/// already running keep going until their client disconnects.
pub async fn run<A, F>(mut listener: A, shutdown: F)
where
    A: Accept,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = &mut shutdown => {
                info!("Shutdown requested, closing listener");
                break;
            }
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(peer = %peer, "New connection");

                tokio::spawn(
                    async move {
                        // The handler logs its own read and write failures.
                        let _ = echo::handle_connection(stream).await;
                        debug!("Connection closed");
                    }
                    .instrument(debug_span!("connection", peer = %peer)),
                );
            }
            Err(e) => match classify_accept_error(&e) {
                AcceptErrorKind::Transient => {
                    error!(error = %e, "Failed to accept connection");
                }
                AcceptErrorKind::Exhausted => {
                    error!(
                        error = %e,
                        backoff_ms = ACCEPT_BACKOFF.as_millis() as u64,
                        "Failed to accept connection, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        _ = &mut shutdown => {
                            info!("Shutdown requested, closing listener");
                            break;
                        }
                    }
                }
                AcceptErrorKind::Terminal => {
                    error!(error = %e, "Listener failed, stopping dispatcher");
                    break;
                }
            },
        }
    }
}
