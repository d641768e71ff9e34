use std::net::IpAddr;
use std::time::Duration;

use linecast_frame::FrameConfig;

/// Well-known port shared by every host and client.
pub const DEFAULT_PORT: u16 = 40_000;

/// Default bound on establishing a client connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration shared by the host and client roles.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Port hosts listen on and clients connect to. Default: 40000.
    pub port: u16,
    /// Address the host binds. `None` binds the primary address of the
    /// local host name.
    pub bind_addr: Option<IpAddr>,
    /// Bound on a client connect attempt. Accepts and reads have no timeout.
    pub connect_timeout: Duration,
    /// Frame reading/writing limits applied to every connection.
    pub frame: FrameConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_addr: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            frame: FrameConfig::default(),
        }
    }
}
