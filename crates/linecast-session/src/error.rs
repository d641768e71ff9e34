use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::PeerId;
use crate::session::Role;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] linecast_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] linecast_frame::FrameError),

    /// The host could not bind its listening socket.
    #[error("failed to host: {0}")]
    Bind(#[source] linecast_transport::TransportError),

    /// The host name given to connect could not be resolved.
    #[error("failed to resolve {host}: {source}")]
    Resolution {
        host: String,
        source: std::io::Error,
    },

    /// Nothing is listening at the resolved address.
    #[error("connection refused by {addr}")]
    ConnectionRefused { addr: SocketAddr },

    /// The connect attempt did not complete in time.
    #[error("connecting to {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },

    /// The host has been stopped.
    #[error("registry closed")]
    RegistryClosed,

    /// The session already holds a role.
    #[error("session is already active as {0}")]
    AlreadyActive(Role),

    /// The session's role was fixed by an earlier host/connect.
    #[error("session role is fixed to {fixed}; cannot act as {requested}")]
    RoleConflict { fixed: Role, requested: Role },

    /// The session is neither hosting nor connected.
    #[error("session is not connected")]
    NotConnected,

    /// No registered peer has this identity.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
}

impl SessionError {
    /// Whether the error means the connection is gone, closed cleanly or reset.
    pub fn is_disconnect(&self) -> bool {
        use linecast_frame::FrameError;
        use std::io::ErrorKind;

        match self {
            SessionError::Frame(FrameError::ConnectionClosed) => true,
            SessionError::Frame(FrameError::Io(err)) => matches!(
                err.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Whether the error is confined to a single undecodable frame.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, SessionError::Frame(err) if err.is_frame_local())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
