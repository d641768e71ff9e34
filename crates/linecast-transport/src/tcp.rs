use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::NetStream;

const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// TCP listening transport.
///
/// Provides bind/accept over IPv4 or IPv6 and a bounded outbound connect.
/// The listening socket lives until [`TcpTransport::close`]; after that the
/// port refuses connections and can be bound again.
pub struct TcpTransport {
    listener: Mutex<Option<Arc<TcpListener>>>,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr`.
    ///
    /// Port `0` asks the OS for an ephemeral port; see [`TcpTransport::local_addr`].
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener: Mutex::new(Some(Arc::new(listener))),
            local_addr,
        })
    }

    fn listener(&self) -> Option<Arc<TcpListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Accept an incoming connection (blocking).
    ///
    /// Fails with [`TransportError::Closed`] once the listener is closed.
    pub fn accept(&self) -> Result<(NetStream, SocketAddr)> {
        let listener = self.listener().ok_or(TransportError::Closed)?;
        let (stream, addr) = listener.accept().map_err(TransportError::Accept)?;
        debug!(%addr, "accepted connection");
        Ok((NetStream::from_tcp(stream), addr))
    }

    /// Connect to a listening socket, giving up after `timeout`.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<NetStream> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected to tcp socket");
        Ok(NetStream::from_tcp(stream))
    }

    /// Close the listening socket. Idempotent.
    ///
    /// A thread blocked in [`TcpTransport::accept`] still holds the socket;
    /// it is woken with a throwaway loopback connection and the socket is
    /// released when that accept returns. Callers check their own shutdown
    /// state before using the woken connection.
    pub fn close(&self) {
        let taken = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(listener) = taken else {
            return;
        };

        let in_accept = Arc::strong_count(&listener) > 1;
        drop(listener);
        if in_accept {
            self.wake();
        }
        info!(local_addr = %self.local_addr, "closed tcp listener");
    }

    pub fn is_closed(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn wake(&self) {
        let target = wake_target(self.local_addr);
        match TcpStream::connect_timeout(&target, WAKE_TIMEOUT) {
            Ok(_) => debug!(%target, "woke accept loop"),
            Err(err) => debug!(%target, error = %err, "accept loop wake connection failed"),
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

fn wake_target(bound: SocketAddr) -> SocketAddr {
    match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound.port())
        }
        _ => bound,
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("local_addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
