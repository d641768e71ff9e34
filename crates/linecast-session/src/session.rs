use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::client::Client;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::host::Host;

/// The networking role of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Idle,
    Host,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Idle => "idle",
            Role::Host => "host",
            Role::Client => "client",
        })
    }
}

enum State {
    Idle,
    Hosting(Host),
    Connected(Client),
}

/// A process's networking role: idle, hosting many peers, or connected to
/// one host.
///
/// ```text
/// Idle --host()--> Hosting --stop()--> Idle
/// Idle --connect()--> Connected --stop()--> Idle
/// ```
///
/// The first successful `host` or `connect` fixes the role for the life of
/// the session. Failed attempts leave the session idle and retryable.
pub struct Session {
    state: State,
    fixed: Option<Role>,
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            state: State::Idle,
            fixed: None,
            config,
        }
    }

    /// Start hosting. Returns the host name to hand to clients.
    pub fn host(&mut self) -> Result<String> {
        self.check_can_enter(Role::Host)?;
        let host = Host::bind(&self.config)?;
        let hostname = host.hostname().to_string();
        self.state = State::Hosting(host);
        self.fixed = Some(Role::Host);
        Ok(hostname)
    }

    /// Connect to the host published under `hostname`.
    pub fn connect(&mut self, hostname: &str) -> Result<()> {
        self.check_can_enter(Role::Client)?;
        let client = Client::connect(hostname, &self.config)?;
        self.state = State::Connected(client);
        self.fixed = Some(Role::Client);
        Ok(())
    }

    fn check_can_enter(&self, requested: Role) -> Result<()> {
        if let Some(fixed) = self.fixed {
            if fixed != requested {
                return Err(SessionError::RoleConflict { fixed, requested });
            }
        }
        match self.role() {
            Role::Idle => Ok(()),
            current => Err(SessionError::AlreadyActive(current)),
        }
    }

    /// Send a message: broadcast when hosting, direct when connected.
    pub fn send<P: Serialize + ?Sized>(&mut self, kind: &str, payload: &P) -> Result<()> {
        match &mut self.state {
            State::Hosting(host) => {
                host.broadcast(kind, payload)?;
                Ok(())
            }
            State::Connected(client) => client.send(kind, payload),
            State::Idle => Err(SessionError::NotConnected),
        }
    }

    /// Leave the current role and return to idle. Idempotent.
    pub fn stop(&mut self) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Hosting(host) => host.stop(),
            State::Connected(client) => {
                if let Err(err) = client.shutdown() {
                    debug!(error = %err, "client shutdown failed");
                }
            }
            State::Idle => {}
        }
    }

    /// The role currently held.
    pub fn role(&self) -> Role {
        match self.state {
            State::Idle => Role::Idle,
            State::Hosting(_) => Role::Host,
            State::Connected(_) => Role::Client,
        }
    }

    /// The role fixed by the first successful `host`/`connect`, if any.
    pub fn fixed_role(&self) -> Option<Role> {
        self.fixed
    }

    pub fn as_host(&self) -> Option<&Host> {
        match &self.state {
            State::Hosting(host) => Some(host),
            _ => None,
        }
    }

    pub fn as_client_mut(&mut self) -> Option<&mut Client> {
        match &mut self.state {
            State::Connected(client) => Some(client),
            _ => None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
