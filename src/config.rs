//! Engine configuration.
//!
//! [`EngineConfig`] carries everything the engine needs to reach the rover and
//! to bound how long a caller may wait. Binaries fill it from command-line
//! arguments; library users build it directly or start from [`Default`].
use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

use crate::protocol::TransportError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 42001;
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do when a request arrives while a conflicting one is outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail the new request immediately.
    #[default]
    Reject,
    /// Hold the new request until the outstanding one resolves.
    Queue,
    /// Release the outstanding request with `Superseded` and take its place.
    Supersede,
}

impl TryFrom<&str> for ConflictPolicy {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "reject" => Ok(ConflictPolicy::Reject),
            "queue" => Ok(ConflictPolicy::Queue),
            "supersede" => Ok(ConflictPolicy::Supersede),
            other => Err(format!(
                "unknown conflict policy '{other}', expected reject, queue or supersede"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub reconnect_interval: Duration,
    pub command_timeout: Duration,
    pub query_timeout: Duration,
    pub conflict_policy: ConflictPolicy,
    /// Send `reset` every time the link opens.
    pub reset_on_connect: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            conflict_policy: ConflictPolicy::default(),
            reset_on_connect: true,
        }
    }
}

impl EngineConfig {
    /// Resolve `host:port` to the first matching socket address.
    pub fn address(&self) -> Result<SocketAddr, TransportError> {
        let target = format!("{}:{}", self.host, self.port);
        target
            .to_socket_addrs()
            .map_err(|_| TransportError::AddressResolution(target.clone()))?
            .next()
            .ok_or(TransportError::AddressResolution(target))
    }
}
