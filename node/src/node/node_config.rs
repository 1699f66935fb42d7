use std::{default::Default, time::Duration};

use remora_shared::{ConnectionConfig, PROTOCOL_VERSION};

/// Contains Config properties which will be used by a Node
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// How often each valid replica pings its source. A Ping still
    /// unanswered one interval later drops the channel. Zero disables
    /// heartbeats.
    pub heartbeat_interval: Duration,
    /// How long to wait between attempts to reopen a lost channel
    pub retry_interval: Duration,
    /// Must match the peer's version string exactly
    pub protocol_version: String,
    /// Used to configure every channel the node opens or accepts
    pub connection: ConnectionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::ZERO,
            retry_interval: Duration::from_millis(250),
            protocol_version: PROTOCOL_VERSION.to_string(),
            connection: ConnectionConfig::default(),
        }
    }
}
