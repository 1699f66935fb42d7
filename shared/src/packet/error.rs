use remora_serde::SerdeErr;
use thiserror::Error;

use super::PacketType;

/// Errors that can occur while framing or unframing packets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame header announced a packet type id with no meaning (SECURITY: potentially malicious packet)
    #[error("Invalid packet type id {id} received. This may indicate a malformed or malicious packet")]
    InvalidPacketType { id: u16 },

    /// Frame length is too small to hold a packet type
    #[error("Frame length {length} is too short to contain a packet type")]
    FrameTooShort { length: u32 },

    /// Frame length exceeds the configured maximum
    #[error("Frame length {length} exceeds the maximum packet size of {max} bytes")]
    FrameTooLarge { length: u32, max: u32 },

    /// Payload could not be decoded as the announced packet type
    #[error("Failed to decode {packet_type:?} payload: {source}")]
    MalformedPayload {
        packet_type: PacketType,
        source: SerdeErr,
    },

    /// Payload decoded but bytes were left over in the frame
    #[error("{packet_type:?} payload left {remaining} unread bytes in its frame")]
    TrailingBytes {
        packet_type: PacketType,
        remaining: usize,
    },
}
