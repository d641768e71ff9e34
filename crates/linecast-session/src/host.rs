use std::convert::Infallible;
use std::io::{ErrorKind, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use linecast_frame::{encode_to_vec, write_all, FrameReader};
use linecast_transport::{local_hostname, primary_address, NetStream, TcpTransport, TransportError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::error::{Result, SessionError};
use crate::registry::{PeerId, PeerSink, Registry};

/// Registry sink writing to one TCP peer.
struct TcpSink {
    writer: Mutex<NetStream>,
    control: NetStream,
}

impl PeerSink for TcpSink {
    fn send_frame(&self, frame: &[u8]) -> linecast_frame::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_all(&mut *writer, frame)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&self) {
        if let Err(err) = self.control.shutdown() {
            debug!(error = %err, "peer shutdown failed");
        }
    }
}

struct HostInner {
    transport: TcpTransport,
    registry: Registry<TcpSink>,
    hostname: String,
    config: SessionConfig,
    stopped: AtomicBool,
}

impl Drop for HostInner {
    fn drop(&mut self) {
        self.registry.close();
        self.transport.close();
    }
}

/// The hosting role: a listening socket plus the registry of accepted peers.
///
/// Cloning yields another handle to the same host, so the accept loop,
/// broadcasters and `stop` can run on different threads.
///
/// A peer that closes its end stays registered until a broadcast to it
/// fails or [`Host::remove_peer`] is called; read loops that see EOF should
/// call `remove_peer`. [`Host::stop`] closes the listening socket, so the
/// port refuses new connections and can be bound again while handles are
/// still alive.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    /// Bind and listen.
    ///
    /// Binds `config.bind_addr` if set, otherwise the primary address of the
    /// local host name. Every failure is reported as [`SessionError::Bind`];
    /// nothing is retried.
    pub fn bind(config: &SessionConfig) -> Result<Self> {
        let (addr, hostname) = match config.bind_addr {
            Some(ip) => (SocketAddr::new(ip, config.port), ip.to_string()),
            None => {
                let hostname = local_hostname().map_err(SessionError::Bind)?;
                let addr = primary_address(config.port).map_err(SessionError::Bind)?;
                (addr, hostname)
            }
        };

        let transport = TcpTransport::bind(addr).map_err(SessionError::Bind)?;
        info!(%hostname, local_addr = %transport.local_addr(), "hosting session");

        Ok(Self {
            inner: Arc::new(HostInner {
                transport,
                registry: Registry::new(),
                hostname,
                config: config.clone(),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// Name clients should pass to [`crate::Client::connect`].
    ///
    /// The local host name, or the configured bind address when one is set.
    pub fn hostname(&self) -> &str {
        &self.inner.hostname
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.transport.local_addr()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Accept and register the next peer (blocking).
    ///
    /// Fails with [`SessionError::RegistryClosed`] once the host is stopped.
    pub fn accept(&self) -> Result<Connection> {
        if self.is_stopped() {
            return Err(SessionError::RegistryClosed);
        }

        let (stream, addr) = match self.inner.transport.accept() {
            Ok(accepted) => accepted,
            Err(TransportError::Closed) => return Err(SessionError::RegistryClosed),
            Err(_) if self.is_stopped() => return Err(SessionError::RegistryClosed),
            Err(err) => return Err(err.into()),
        };

        if self.is_stopped() {
            // The wake-up connection from `stop`, or a peer racing it.
            if let Err(err) = stream.shutdown() {
                debug!(%addr, error = %err, "late connection shutdown failed");
            }
            return Err(SessionError::RegistryClosed);
        }

        self.register(stream, addr)
    }

    fn register(&self, stream: NetStream, addr: SocketAddr) -> Result<Connection> {
        let frame_config = self.inner.config.frame.clone();
        stream.set_write_timeout(frame_config.write_timeout)?;
        let reader = FrameReader::with_config_net(stream.try_clone()?, frame_config)?;
        let sink = TcpSink {
            control: stream.try_clone()?,
            writer: Mutex::new(stream),
        };

        let id = self.inner.registry.register(addr, sink)?;
        info!(%id, %addr, "peer connected");
        Ok(Connection::new(id, addr, reader))
    }

    /// Accept peers until the host is stopped.
    ///
    /// Each connection is handed to `handler` on its own thread. Transient
    /// accept failures are logged and skipped. Only returns once stopped,
    /// with [`SessionError::RegistryClosed`], or on a fatal accept error.
    pub fn accept_loop<F>(&self, handler: F) -> Result<Infallible>
    where
        F: Fn(Connection) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        loop {
            let connection = match self.accept() {
                Ok(connection) => connection,
                Err(SessionError::Transport(TransportError::Accept(err)))
                    if is_transient(&err) =>
                {
                    warn!(error = %err, "transient accept failure");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let id = connection.id();
            let handler = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name(format!("linecast-{id}"))
                .spawn(move || handler(connection));
            if let Err(err) = spawned {
                warn!(%id, error = %err, "failed to spawn connection thread");
                self.remove_peer(id);
            }
        }
    }

    /// Send a message to every registered peer.
    ///
    /// Peers whose write fails are silently pruned. Errors only when the
    /// message cannot be encoded. Returns how many peers received it.
    pub fn broadcast<P: Serialize + ?Sized>(&self, kind: &str, payload: &P) -> Result<usize> {
        let frame = encode_to_vec(kind, payload)?;
        Ok(self.broadcast_encoded(&frame))
    }

    /// Send an already-encoded frame to every registered peer.
    pub fn broadcast_encoded(&self, frame: &[u8]) -> usize {
        let delivered = self.inner.registry.broadcast(frame);
        debug!(delivered, bytes = frame.len(), "broadcast frame");
        delivered
    }

    /// Send a message to one peer.
    ///
    /// Unlike [`Host::broadcast`], a failed write is returned and the peer
    /// stays registered.
    pub fn send_to<P: Serialize + ?Sized>(&self, id: PeerId, kind: &str, payload: &P) -> Result<()> {
        let frame = encode_to_vec(kind, payload)?;
        self.inner.registry.send_to(id, &frame)
    }

    /// Close and deregister one peer.
    pub fn remove_peer(&self, id: PeerId) -> bool {
        self.inner.registry.remove(id)
    }

    /// Registered peers in ascending identity order.
    pub fn peers(&self) -> Vec<PeerId> {
        self.inner.registry.ids()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn peer_addr(&self, id: PeerId) -> Option<SocketAddr> {
        self.inner.registry.addr_of(id)
    }

    /// Stop hosting: close every peer and the listening socket.
    ///
    /// A blocked [`Host::accept`] returns [`SessionError::RegistryClosed`].
    /// Idempotent.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.registry.close();
        self.inner.transport.close();
        info!(hostname = %self.inner.hostname, "stopped hosting");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("hostname", &self.inner.hostname)
            .field("local_addr", &self.local_addr())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted | ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::mpsc;
    use std::time::Duration;

    use linecast_frame::Message;
    use serde_json::json;

    use super::*;
    use crate::client::Client;

    fn loopback_config() -> SessionConfig {
        SessionConfig {
            port: 0,
            bind_addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            ..SessionConfig::default()
        }
    }

    fn client_config(host: &Host) -> SessionConfig {
        SessionConfig {
            port: host.local_addr().port(),
            ..SessionConfig::default()
        }
    }

    fn connect_n(host: &Host, n: usize) -> (Vec<Client>, Vec<Connection>) {
        let mut clients = Vec::new();
        let mut connections = Vec::new();
        for _ in 0..n {
            clients.push(Client::connect(host.hostname(), &client_config(host)).unwrap());
            connections.push(host.accept().unwrap());
        }
        (clients, connections)
    }

    #[test]
    fn bind_reports_hostname_and_address() {
        let host = Host::bind(&loopback_config()).unwrap();
        assert_eq!(host.hostname(), "127.0.0.1");
        assert!(host.local_addr().ip().is_loopback());
        assert_ne!(host.local_addr().port(), 0);
        assert_eq!(host.peer_count(), 0);
    }

    #[test]
    fn bind_in_use_port_fails() {
        let first = Host::bind(&loopback_config()).unwrap();
        let config = SessionConfig {
            port: first.local_addr().port(),
            ..loopback_config()
        };
        let err = Host::bind(&config).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Bind(TransportError::Bind { ref source, .. })
                if source.kind() == ErrorKind::AddrInUse
        ));
    }

    #[test]
    fn accept_assigns_distinct_ids() {
        let host = Host::bind(&loopback_config()).unwrap();
        let (_clients, connections) = connect_n(&host, 3);

        let ids: Vec<PeerId> = connections.iter().map(Connection::id).collect();
        assert_eq!(host.peers(), ids);
        assert_eq!(ids.iter().collect::<std::collections::HashSet<_>>().len(), 3);
        for connection in &connections {
            assert_eq!(
                host.peer_addr(connection.id()),
                Some(connection.peer_addr())
            );
        }
    }

    #[test]
    fn broadcast_reaches_every_client_with_exact_bytes() {
        let host = Host::bind(&loopback_config()).unwrap();
        let (clients, _connections) = connect_n(&host, 3);

        let delivered = host.broadcast("chat", &json!({"msg": "hi"})).unwrap();
        assert_eq!(delivered, 3);

        for mut client in clients {
            let frame = client.recv_frame().unwrap();
            assert_eq!(frame.as_ref(), b"{\"PT\":\"chat\",\"DATA\":{\"msg\":\"hi\"}}");
        }
    }

    #[test]
    fn broadcast_prunes_disconnected_peer() {
        let host = Host::bind(&loopback_config()).unwrap();
        let (mut clients, connections) = connect_n(&host, 3);
        let gone = connections[1].id();

        let dropped = clients.remove(1);
        drop(dropped);

        // The first write after the peer closes may still succeed locally.
        let mut attempts = 0;
        while host.peers().contains(&gone) && attempts < 50 {
            host.broadcast("tick", &attempts).unwrap();
            attempts += 1;
            thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(
            host.peers(),
            vec![connections[0].id(), connections[2].id()]
        );
        for client in &mut clients {
            assert_eq!(client.recv().unwrap(), Message::new("tick", json!(0)));
        }
    }

    #[test]
    fn send_to_targets_one_peer() {
        let host = Host::bind(&loopback_config()).unwrap();
        let (mut clients, connections) = connect_n(&host, 2);

        host.send_to(connections[1].id(), "direct", &json!("only you"))
            .unwrap();
        host.broadcast("all", &json!(null)).unwrap();

        assert_eq!(clients[0].recv().unwrap().kind, "all");
        assert_eq!(clients[1].recv().unwrap().kind, "direct");
        assert_eq!(clients[1].recv().unwrap().kind, "all");
    }

    #[test]
    fn connection_receives_client_messages() {
        let host = Host::bind(&loopback_config()).unwrap();
        let (mut clients, mut connections) = connect_n(&host, 1);

        clients[0].send("move", &json!({"x": 1})).unwrap();
        clients[0].send("move", &json!({"x": 2})).unwrap();

        assert_eq!(
            connections[0].recv().unwrap(),
            Message::new("move", json!({"x": 1}))
        );
        assert_eq!(connections[0].recv().unwrap().payload, json!({"x": 2}));
    }

    #[test]
    fn remove_peer_ends_its_read_loop() {
        let host = Host::bind(&loopback_config()).unwrap();
        let (_clients, mut connections) = connect_n(&host, 1);
        let id = connections[0].id();

        assert!(host.remove_peer(id));
        let err = connections[0].recv().unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(host.peer_count(), 0);
    }

    #[test]
    fn accept_loop_runs_handlers_concurrently_and_stops() {
        let host = Host::bind(&loopback_config()).unwrap();
        let (tx, rx) = mpsc::channel();

        let acceptor = {
            let host = host.clone();
            thread::spawn(move || {
                host.accept_loop(move |mut connection| {
                    while let Ok(message) = connection.recv() {
                        tx.send((connection.id(), message)).unwrap();
                    }
                })
            })
        };

        let mut clients: Vec<Client> = (0..3)
            .map(|_| Client::connect(host.hostname(), &client_config(&host)).unwrap())
            .collect();
        for (i, client) in clients.iter_mut().enumerate() {
            client.send("hello", &json!({"client": i})).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let (id, message) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(message.kind, "hello");
            seen.push(id);
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);

        host.stop();
        host.stop();
        let result = acceptor.join().unwrap();
        assert!(matches!(result, Err(SessionError::RegistryClosed)));
        assert_eq!(host.peer_count(), 0);

        // Peers were shut down by stop.
        for client in &mut clients {
            assert!(client.recv().unwrap_err().is_disconnect());
        }
    }

    #[test]
    fn accept_after_stop_fails() {
        let host = Host::bind(&loopback_config()).unwrap();
        host.stop();
        assert!(host.is_stopped());
        assert!(matches!(host.accept(), Err(SessionError::RegistryClosed)));
        assert_eq!(host.broadcast("late", &json!(null)).unwrap(), 0);
    }

    fn assert_refused(addr: SocketAddr) {
        let err = std::net::TcpStream::connect_timeout(&addr, Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
    }

    #[test]
    fn stop_releases_port_while_handles_live() {
        let host = Host::bind(&loopback_config()).unwrap();
        let kept = host.clone();
        let addr = host.local_addr();

        host.stop();
        assert!(kept.is_stopped());
        assert_refused(addr);

        let config = SessionConfig {
            port: addr.port(),
            ..loopback_config()
        };
        let again = Host::bind(&config).unwrap();
        assert_eq!(again.local_addr(), addr);
        drop(kept);
    }

    #[test]
    fn stop_during_accept_loop_releases_port() {
        let host = Host::bind(&loopback_config()).unwrap();
        let addr = host.local_addr();
        let acceptor = {
            let host = host.clone();
            thread::spawn(move || host.accept_loop(|_| {}))
        };

        // One accepted peer proves the loop is running.
        let mut client = Client::connect(host.hostname(), &client_config(&host)).unwrap();
        while host.peer_count() == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        host.stop();
        let result = acceptor.join().unwrap();
        assert!(matches!(result, Err(SessionError::RegistryClosed)));
        assert!(client.recv().unwrap_err().is_disconnect());
        assert!(matches!(host.accept(), Err(SessionError::RegistryClosed)));

        assert_refused(addr);
        let config = SessionConfig {
            port: addr.port(),
            ..loopback_config()
        };
        Host::bind(&config).unwrap();
    }

    #[test]
    fn broadcast_rejects_empty_kind() {
        let host = Host::bind(&loopback_config()).unwrap();
        assert!(matches!(
            host.broadcast("", &json!(null)),
            Err(SessionError::Frame(linecast_frame::FrameError::EmptyKind))
        ));
    }
}
