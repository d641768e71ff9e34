//! TCP transport abstraction for linecast.
//!
//! Provides the blocking socket primitives everything else is built on:
//! - a listening [`TcpTransport`] with bind/accept and a bounded connect
//! - the connected [`NetStream`] type (`Read + Write`)
//! - host name resolution and the local machine's host name
//!
//! This is the lowest layer of linecast and knows nothing about frames.

pub mod error;
pub mod resolve;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use resolve::{local_hostname, primary_address, resolve};
pub use stream::NetStream;
pub use tcp::TcpTransport;
