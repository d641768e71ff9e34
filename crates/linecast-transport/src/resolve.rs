use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Resolve `host` to socket addresses on `port`.
///
/// IPv4 addresses are ordered before IPv6 ones; order within each family is
/// whatever the system resolver returned. An empty answer is an error.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let mut addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::Resolve {
            host: host.to_string(),
            source: std::io::Error::new(ErrorKind::NotFound, "no addresses found"),
        });
    }

    addrs.sort_by_key(|addr| !addr.is_ipv4());
    debug!(host, ?addrs, "resolved host");
    Ok(addrs)
}

/// The machine's primary resolvable address: the first address the local
/// host name resolves to, on `port`.
pub fn primary_address(port: u16) -> Result<SocketAddr> {
    let hostname = local_hostname()?;
    let addrs = resolve(&hostname, port)?;
    Ok(addrs[0])
}

/// The local machine's host name.
#[cfg(unix)]
pub fn local_hostname() -> Result<String> {
    let mut buf = [0u8; 256];

    // SAFETY: `buf` is a valid writable buffer of the given length for the
    // duration of the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return Err(TransportError::Hostname(std::io::Error::last_os_error()));
    }

    let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..len]).into_owned();
    if name.is_empty() {
        return Err(TransportError::Hostname(std::io::Error::new(
            ErrorKind::NotFound,
            "host name is empty",
        )));
    }
    Ok(name)
}

/// The local machine's host name.
///
/// Read from `COMPUTERNAME` on platforms without `gethostname(2)`.
#[cfg(not(unix))]
pub fn local_hostname() -> Result<String> {
    std::env::var("COMPUTERNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            TransportError::Hostname(std::io::Error::new(
                ErrorKind::NotFound,
                "COMPUTERNAME is not set",
            ))
        })
}
