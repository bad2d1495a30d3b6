use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 10 MiB, enough for a full block.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Options for starting the network actor.
///
/// Addresses are kept as strings so the struct can be filled from any config
/// source; they are parsed when the actor is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Multiaddr to listen on, e.g. `/ip4/0.0.0.0/tcp/30333`
    pub listen_addr: String,
    /// Hex-encoded 32 byte ed25519 secret key. A fresh key is generated if unset.
    pub secret_key: Option<String>,
    /// Multiaddrs dialed on startup
    pub bootstrap_peers: Vec<String>,
    pub enable_mdns: bool,
    /// Largest accepted gossip payload in bytes
    pub max_message_size: usize,
    pub heartbeat_interval_secs: u64,
    pub idle_connection_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/30333".to_string(),
            secret_key: None,
            bootstrap_peers: Vec::new(),
            enable_mdns: true,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            heartbeat_interval_secs: 10,
            idle_connection_timeout_secs: 60,
        }
    }
}

impl NetworkConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn idle_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_connection_timeout_secs)
    }
}
