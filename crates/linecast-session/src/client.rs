use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use linecast_frame::{FrameReader, FrameWriter, Message};
use linecast_transport::{resolve, NetStream, TcpTransport, TransportError};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// The client role: exactly one connection to a host.
pub struct Client {
    reader: FrameReader<NetStream>,
    writer: FrameWriter<NetStream>,
    hostname: String,
    peer_addr: SocketAddr,
}

impl Client {
    /// Connect to the host published under `hostname` on `config.port`.
    ///
    /// Every resolved address is tried in turn, each bounded by
    /// `config.connect_timeout`; the last failure is returned. A failed
    /// attempt leaves no socket behind, so the caller may simply retry.
    pub fn connect(hostname: &str, config: &SessionConfig) -> Result<Self> {
        let addrs = resolve(hostname, config.port).map_err(|err| match err {
            TransportError::Resolve { host, source } => SessionError::Resolution { host, source },
            other => SessionError::Transport(other),
        })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpTransport::connect(addr, config.connect_timeout) {
                Ok(stream) => return Self::from_stream(stream, hostname, addr, config),
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = Some(connect_error(err, config.connect_timeout));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| SessionError::Resolution {
            host: hostname.to_string(),
            source: std::io::Error::new(ErrorKind::NotFound, "no addresses found"),
        }))
    }

    fn from_stream(
        stream: NetStream,
        hostname: &str,
        addr: SocketAddr,
        config: &SessionConfig,
    ) -> Result<Self> {
        let writer_stream = stream.try_clone()?;
        let reader = FrameReader::with_config_net(stream, config.frame.clone())?;
        let writer = FrameWriter::with_config_net(writer_stream, config.frame.clone())?;
        info!(hostname, %addr, "connected to host");

        Ok(Self {
            reader,
            writer,
            hostname: hostname.to_string(),
            peer_addr: addr,
        })
    }

    /// Send a message to the host.
    pub fn send<P: Serialize + ?Sized>(&mut self, kind: &str, payload: &P) -> Result<()> {
        self.writer.send(kind, payload)?;
        Ok(())
    }

    pub fn send_message(&mut self, message: &Message) -> Result<()> {
        self.writer.write_message(message)?;
        Ok(())
    }

    /// Receive the next message (blocking).
    ///
    /// A corrupt frame is reported with [`SessionError::is_frame_local`] set
    /// and does not end the connection.
    pub fn recv(&mut self) -> Result<Message> {
        Ok(self.reader.read_message()?)
    }

    /// Receive the next message that decodes, skipping corrupt frames.
    pub fn recv_valid(&mut self) -> Result<Message> {
        Ok(self.reader.next_valid_message()?)
    }

    /// Receive the next raw frame body without decoding it.
    pub fn recv_frame(&mut self) -> Result<Bytes> {
        Ok(self.reader.read_frame()?)
    }

    /// The name this client connected with.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Split into independent read and write halves for use on two threads.
    pub fn into_parts(self) -> (FrameReader<NetStream>, FrameWriter<NetStream>) {
        (self.reader, self.writer)
    }

    /// Close the connection in both directions.
    pub fn shutdown(&self) -> Result<()> {
        self.writer.get_ref().shutdown()?;
        Ok(())
    }

    /// A handle that can close this connection from another thread,
    /// unblocking a pending `recv`.
    pub fn shutdown_handle(&self) -> Result<NetStream> {
        Ok(self.writer.get_ref().try_clone()?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("hostname", &self.hostname)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

fn connect_error(err: TransportError, timeout: Duration) -> SessionError {
    match err {
        TransportError::Connect { addr, source } => match source.kind() {
            ErrorKind::ConnectionRefused => SessionError::ConnectionRefused { addr },
            ErrorKind::TimedOut | ErrorKind::WouldBlock => SessionError::Timeout { addr, timeout },
            _ => SessionError::Transport(TransportError::Connect { addr, source }),
        },
        other => SessionError::Transport(other),
    }
}
