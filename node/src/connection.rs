use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use url::Url;

use remora_shared::{
    encode_packet, CodecError, ConnectionConfig, FrameBuffer, IoDevice, IoNotification,
    ObjectInfo, Packet, TransportError,
};

use crate::type_table::TypeRef;

/// Identifies one channel owned by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(u64);

impl ChannelKey {
    pub(crate) fn new(key: u64) -> Self {
        Self(key)
    }

    pub fn to_u64(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Handshaking,
    Ready,
    Disconnecting,
    Closed,
    ProtocolMismatch,
}

/// Which end of the handshake this node plays on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionRole {
    /// Opened by this node; replicas subscribe over it
    Client { url: Option<Url> },
    /// Accepted by this node; sources are served over it
    Host,
}

#[derive(Default)]
pub(crate) struct PollResult {
    pub packets: Vec<Packet>,
    pub transport_error: Option<TransportError>,
    pub codec_error: Option<CodecError>,
}

/// One framed byte stream between two nodes.
pub(crate) struct Connection {
    pub key: ChannelKey,
    pub role: ConnectionRole,
    pub state: ChannelState,
    device: Box<dyn IoDevice>,
    frames: FrameBuffer,
    read_buffer: Vec<u8>,
    /// Objects the peer announced in its ObjectList (client side)
    pub announced: HashMap<String, ObjectInfo>,
    /// Object names the peer subscribed to (host side)
    pub subscriptions: HashSet<String>,
    /// Dynamic types this channel holds in the node's type table
    pub dynamic_types: Vec<TypeRef>,
}

impl Connection {
    pub fn new(
        key: ChannelKey,
        role: ConnectionRole,
        device: Box<dyn IoDevice>,
        config: &ConnectionConfig,
    ) -> Self {
        let state = match role {
            ConnectionRole::Client { .. } => ChannelState::Handshaking,
            ConnectionRole::Host => ChannelState::Connecting,
        };
        Self {
            key,
            role,
            state,
            device,
            frames: FrameBuffer::new(config.max_packet_size),
            read_buffer: vec![0; config.read_chunk_size.max(1)],
            announced: HashMap::new(),
            subscriptions: HashSet::new(),
            dynamic_types: Vec::new(),
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self.role, ConnectionRole::Client { .. })
    }

    pub fn url(&self) -> Option<&Url> {
        match &self.role {
            ConnectionRole::Client { url } => url.as_ref(),
            ConnectionRole::Host => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ChannelState::Ready
    }

    pub fn is_open(&self) -> bool {
        !matches!(
            self.state,
            ChannelState::Closed | ChannelState::ProtocolMismatch
        ) && self.device.is_open()
    }

    pub fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        debug!("channel {} -> {:?}", self.key.to_u64(), packet.packet_type());
        self.device.write(&encode_packet(packet))
    }

    /// Reads every available byte and decodes the complete frames. Decoding
    /// stops at the first malformed frame.
    pub fn poll(&mut self) -> PollResult {
        let mut result = PollResult::default();

        for notification in self.device.take_notifications() {
            match notification {
                IoNotification::ReadyRead => {}
                IoNotification::Disconnected => {
                    result.transport_error.get_or_insert(TransportError::Closed);
                }
                IoNotification::Error(error) => {
                    result.transport_error.get_or_insert(error);
                }
            }
        }

        while self.device.bytes_available() > 0 {
            match self.device.read(&mut self.read_buffer) {
                Ok(0) => break,
                Ok(count) => self.frames.push(&self.read_buffer[..count]),
                Err(error) => {
                    result.transport_error.get_or_insert(error);
                    break;
                }
            }
        }

        loop {
            match self.frames.next_packet() {
                Ok(Some(packet)) => {
                    debug!("channel {} <- {:?}", self.key.to_u64(), packet.packet_type());
                    result.packets.push(packet);
                }
                Ok(None) => break,
                Err(error) => {
                    warn!("channel {}: {}", self.key.to_u64(), error);
                    self.frames.clear();
                    result.codec_error = Some(error);
                    break;
                }
            }
        }

        if result.transport_error.is_none() && !self.device.is_open() {
            result.transport_error = Some(TransportError::Closed);
        }

        result
    }

    pub fn close(&mut self, state: ChannelState) {
        if matches!(self.state, ChannelState::Closed | ChannelState::ProtocolMismatch) {
            return;
        }
        self.state = ChannelState::Disconnecting;
        self.device.close();
        self.frames.clear();
        self.state = state;
    }
}
