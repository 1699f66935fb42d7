use std::{default::Default, time::Duration};

/// Largest frame accepted from a peer unless configured otherwise.
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 64 * 1024 * 1024;

/// Contains Config properties which will be used by every Channel
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Frames announcing a larger length are treated as a protocol error
    pub max_packet_size: u32,
    /// Size of each read from the underlying byte stream
    pub read_chunk_size: usize,
    /// How long a stream transport may take to establish a connection
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            read_chunk_size: 4096,
            connect_timeout: Duration::from_secs(1),
        }
    }
}
