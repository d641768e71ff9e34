//! Newline-delimited JSON messaging between one host and many clients.
//!
//! A host listens on a well-known TCP port and can broadcast to every
//! connected client; clients connect by host name and exchange
//! `{"PT":kind,"DATA":payload}` messages, one per line.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and stream wrapper, name resolution
//! - [`frame`]: message codec, stream reassembly, frame reader and writer
//! - [`session`]: host, client, peer registry and the session state machine
//!   (behind the `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use linecast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linecast_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use linecast_session::*;
}
