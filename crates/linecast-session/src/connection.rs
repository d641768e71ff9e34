use std::net::SocketAddr;

use bytes::Bytes;
use linecast_frame::{FrameReader, Message};
use linecast_transport::NetStream;

use crate::error::Result;
use crate::registry::PeerId;

/// Read side of one peer accepted by a [`crate::Host`].
///
/// The write side lives in the host's registry; replies go through
/// [`crate::Host::send_to`] or [`crate::Host::broadcast`]. Owns the
/// reassembly state for this connection alone.
pub struct Connection {
    id: PeerId,
    addr: SocketAddr,
    reader: FrameReader<NetStream>,
}

impl Connection {
    pub(crate) fn new(id: PeerId, addr: SocketAddr, reader: FrameReader<NetStream>) -> Self {
        Self { id, addr, reader }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Receive the next message (blocking).
    ///
    /// Check [`crate::SessionError::is_frame_local`] on errors: a corrupt
    /// frame does not end the connection.
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
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("pending", &self.reader.pending().len())
            .finish()
    }
}
