//! Host and client sessions over newline-delimited JSON frames.
//!
//! One process hosts: it listens, registers every accepted peer and can
//! broadcast a message to all of them. Others connect as clients to a
//! single host by name. [`Session`] ties the two roles together behind one
//! `send` call.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod registry;
pub mod session;

pub use client::Client;
pub use config::{SessionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT};
pub use connection::Connection;
pub use error::{Result, SessionError};
pub use host::Host;
pub use registry::{PeerId, PeerSink, Registry};
pub use session::{Role, Session};
