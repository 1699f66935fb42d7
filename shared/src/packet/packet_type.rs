// An enum representing the different types of packets that can be
// sent/received. Discriminants are the u16 wire ids.

use remora_serde::{ByteReader, ByteWrite, Serde, SerdeErr};

#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum PacketType {
    // Reserved, never valid on the wire
    Invalid = 0,
    // Sent by the hosting side first, carries the protocol version
    Handshake = 1,
    // Full property snapshot for a statically typed replica
    Init = 2,
    // Descriptor plus property snapshot for a dynamically typed replica
    InitDynamic = 3,
    // A replica subscribes to a source
    AddObject = 4,
    // A replica unsubscribes, or a host withdraws a source
    RemoveObject = 5,
    // Method call, property write, or event emission
    Invoke = 6,
    // Return value for an Invoke that carried a serial id
    InvokeReply = 7,
    // A notifying property changed on the source
    PropertyChange = 8,
    // The sources a host offers
    ObjectList = 9,
    // Liveness probe from a replica. Must be answered with a Pong
    Ping = 10,
    // Answer to a Ping
    Pong = 11,
}

impl PacketType {
    pub fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            1 => PacketType::Handshake,
            2 => PacketType::Init,
            3 => PacketType::InitDynamic,
            4 => PacketType::AddObject,
            5 => PacketType::RemoveObject,
            6 => PacketType::Invoke,
            7 => PacketType::InvokeReply,
            8 => PacketType::PropertyChange,
            9 => PacketType::ObjectList,
            10 => PacketType::Ping,
            11 => PacketType::Pong,
            _ => return None,
        })
    }

    pub fn id(&self) -> u16 {
        *self as u16
    }
}

impl Serde for PacketType {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.id().ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let id = u16::de(reader)?;
        // SECURITY: Malicious or malformed packets could send invalid ids.
        // Return error instead of panicking.
        PacketType::from_id(id).ok_or(SerdeErr::InvalidTag {
            what: "packet type",
            tag: i64::from(id),
        })
    }

    fn byte_length(&self) -> usize {
        2
    }
}
