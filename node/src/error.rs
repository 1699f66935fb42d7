use remora_shared::{CodecError, DescriptorError, PacketType, TransportError};
use thiserror::Error;

use crate::{replica::ReplicaState, source::SourceError};

/// Errors surfaced by a [`Node`](crate::Node) and its replicas
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// A URL could not be parsed
    #[error("Invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Object names are routing keys and must not be empty
    #[error("Object name must not be empty")]
    EmptyObjectName,

    /// Another source already uses this name on the node
    #[error("A source named '{name}' is already enabled on this node")]
    SourceAlreadyRegistered { name: String },

    /// No source uses this name on the node
    #[error("No source named '{name}' is enabled on this node")]
    SourceNotFound { name: String },

    /// The replica cannot forward requests in its current state
    #[error("Replica '{name}' is not valid (state {state:?})")]
    ReplicaNotValid { name: String, state: ReplicaState },

    /// A property, method or event index does not exist on the replica
    #[error("Replica '{name}' has no {kind} at index {index}")]
    IndexOutOfRange {
        name: String,
        kind: &'static str,
        index: usize,
    },

    /// Call arguments do not match the declared parameter types
    #[error("Arguments for '{member}' on '{name}' do not match its declaration")]
    ArgumentMismatch { name: String, member: String },

    /// The name is already acquired with an incompatible descriptor
    #[error("Replica '{name}' is already acquired with a different type")]
    ReplicaTypeConflict { name: String },

    /// The peer speaks a different protocol version (fatal for the channel)
    #[error("Protocol version mismatch: expected '{expected}', peer sent '{received}'")]
    ProtocolMismatch { expected: String, received: String },

    /// A packet arrived that this side of the channel never accepts (fatal for the channel)
    #[error("Unexpected {packet_type:?} packet on a {role} channel")]
    UnexpectedPacket {
        packet_type: PacketType,
        role: &'static str,
    },

    /// An Init snapshot does not match the learned descriptor (fatal for the channel)
    #[error("Snapshot for '{name}' has {received} values but the descriptor declares {expected}")]
    InvalidSnapshot {
        name: String,
        expected: usize,
        received: usize,
    },

    /// An InitDynamic snapshot holds values its own descriptor rejects (fatal for the channel)
    #[error("Snapshot for '{name}' holds values that do not match its descriptor")]
    MistypedSnapshot { name: String },

    /// A Ping went unanswered for a whole heartbeat interval
    #[error("Heartbeat for '{name}' was not answered")]
    HeartbeatTimeout { name: String },

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Framing or payload decoding error (fatal for the channel)
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Invalid capability descriptor
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// The live object behind a source could not serve a request
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

impl NodeError {
    /// Whether this error ends the channel without scheduling a reconnect
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            NodeError::ProtocolMismatch { .. }
                | NodeError::UnexpectedPacket { .. }
                | NodeError::InvalidSnapshot { .. }
                | NodeError::MistypedSnapshot { .. }
                | NodeError::Codec(_)
                | NodeError::Descriptor(_)
        )
    }
}
