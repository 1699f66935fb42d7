use remora_serde::{ByteReader, ByteWriter, Serde};

use super::{CodecError, Packet, PacketType};

const LENGTH_PREFIX: usize = 4;

/// Frames a packet as `[u32 length][u16 type][payload]`.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut body = ByteWriter::new();
    packet.packet_type().ser(&mut body);
    packet.ser_payload(&mut body);

    let body = body.to_bytes();
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Accumulates stream bytes and yields whole packets.
///
/// A frame is only consumed once all of its bytes have arrived, so the
/// transport may deliver data in arbitrarily small pieces.
pub struct FrameBuffer {
    buffer: Vec<u8>,
    max_packet_size: u32,
}

impl FrameBuffer {
    pub fn new(max_packet_size: u32) -> Self {
        Self {
            buffer: Vec::new(),
            max_packet_size,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet part of a decoded packet
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Returns the next complete packet, `Ok(None)` if more bytes are needed.
    /// Errors are fatal for the stream: framing cannot resynchronize.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, CodecError> {
        if self.buffer.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX]);
        let length = u32::from_be_bytes(prefix);

        if length < 2 {
            return Err(CodecError::FrameTooShort { length });
        }
        if length > self.max_packet_size {
            return Err(CodecError::FrameTooLarge {
                length,
                max: self.max_packet_size,
            });
        }

        let frame_end = LENGTH_PREFIX + length as usize;
        if self.buffer.len() < frame_end {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..frame_end).collect();
        decode_frame_body(&frame[LENGTH_PREFIX..]).map(Some)
    }
}

fn decode_frame_body(body: &[u8]) -> Result<Packet, CodecError> {
    let id = u16::from_be_bytes([body[0], body[1]]);
    let packet_type = match PacketType::from_id(id) {
        Some(packet_type) => packet_type,
        None => return Err(CodecError::InvalidPacketType { id }),
    };

    let mut reader = ByteReader::new(&body[2..]);
    let packet = Packet::de_payload(packet_type, &mut reader)
        .map_err(|source| CodecError::MalformedPayload {
            packet_type,
            source,
        })?;

    if reader.remaining() > 0 {
        return Err(CodecError::TrailingBytes {
            packet_type,
            remaining: reader.remaining(),
        });
    }
    Ok(packet)
}
