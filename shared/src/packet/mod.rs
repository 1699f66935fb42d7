//! The packets exchanged between nodes and their framing.
//!
//! Every frame is `[u32 length][u16 type][payload]`, big-endian, where the
//! length counts the type and payload but not itself.

mod error;
mod frame_buffer;
mod packet_type;

pub use error::CodecError;
pub use frame_buffer::{encode_packet, FrameBuffer};
pub use packet_type::PacketType;

use remora_serde::{ByteReader, ByteWrite, Serde, SerdeErr};

use crate::{descriptor::Descriptor, value::Value};

/// Serial id carried by invocations that expect no reply.
pub const NO_SERIAL_ID: i32 = -1;

/// What an Invoke packet asks the receiver to do.
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum InvokeCall {
    /// Call a method on a source, or (source to replica) fire an event
    InvokeMethod = 0,
    ReadProperty = 1,
    WriteProperty = 2,
}

impl Serde for InvokeCall {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        (*self as i32).ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        match i32::de(reader)? {
            0 => Ok(InvokeCall::InvokeMethod),
            1 => Ok(InvokeCall::ReadProperty),
            2 => Ok(InvokeCall::WriteProperty),
            other => Err(SerdeErr::InvalidTag {
                what: "invoke call",
                tag: i64::from(other),
            }),
        }
    }
}

/// One entry of an ObjectList: a source a host offers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectInfo {
    pub name: String,
    pub type_name: String,
    pub signature: String,
}

impl Serde for ObjectInfo {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.name.ser(writer);
        self.type_name.ser(writer);
        self.signature.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            name: String::de(reader)?,
            type_name: String::de(reader)?,
            signature: String::de(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Handshake {
        protocol_version: String,
    },
    Init {
        name: String,
        values: Vec<Value>,
    },
    InitDynamic {
        name: String,
        descriptor: Descriptor,
        values: Vec<Value>,
    },
    AddObject {
        name: String,
        dynamic: bool,
    },
    RemoveObject {
        name: String,
    },
    Invoke {
        name: String,
        call: InvokeCall,
        index: i32,
        args: Vec<Value>,
        serial_id: i32,
        property_index: i32,
    },
    InvokeReply {
        name: String,
        serial_id: i32,
        value: Value,
    },
    PropertyChange {
        name: String,
        index: i32,
        value: Value,
    },
    ObjectList {
        objects: Vec<ObjectInfo>,
    },
    Ping {
        name: String,
    },
    Pong {
        name: String,
    },
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Handshake { .. } => PacketType::Handshake,
            Packet::Init { .. } => PacketType::Init,
            Packet::InitDynamic { .. } => PacketType::InitDynamic,
            Packet::AddObject { .. } => PacketType::AddObject,
            Packet::RemoveObject { .. } => PacketType::RemoveObject,
            Packet::Invoke { .. } => PacketType::Invoke,
            Packet::InvokeReply { .. } => PacketType::InvokeReply,
            Packet::PropertyChange { .. } => PacketType::PropertyChange,
            Packet::ObjectList { .. } => PacketType::ObjectList,
            Packet::Ping { .. } => PacketType::Ping,
            Packet::Pong { .. } => PacketType::Pong,
        }
    }

    /// Name of the object this packet is addressed to, if it has one
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Packet::Handshake { .. } | Packet::ObjectList { .. } => None,
            Packet::Init { name, .. }
            | Packet::InitDynamic { name, .. }
            | Packet::AddObject { name, .. }
            | Packet::RemoveObject { name }
            | Packet::Invoke { name, .. }
            | Packet::InvokeReply { name, .. }
            | Packet::PropertyChange { name, .. }
            | Packet::Ping { name }
            | Packet::Pong { name } => Some(name),
        }
    }

    /// Writes the payload only; the frame header is added by `encode_packet`.
    pub fn ser_payload(&self, writer: &mut dyn ByteWrite) {
        match self {
            Packet::Handshake { protocol_version } => protocol_version.ser(writer),
            Packet::Init { name, values } => {
                name.ser(writer);
                values.ser(writer);
            }
            Packet::InitDynamic {
                name,
                descriptor,
                values,
            } => {
                name.ser(writer);
                descriptor.ser(writer);
                values.ser(writer);
            }
            Packet::AddObject { name, dynamic } => {
                name.ser(writer);
                dynamic.ser(writer);
            }
            Packet::RemoveObject { name } | Packet::Ping { name } | Packet::Pong { name } => {
                name.ser(writer)
            }
            Packet::Invoke {
                name,
                call,
                index,
                args,
                serial_id,
                property_index,
            } => {
                name.ser(writer);
                call.ser(writer);
                index.ser(writer);
                args.ser(writer);
                serial_id.ser(writer);
                property_index.ser(writer);
            }
            Packet::InvokeReply {
                name,
                serial_id,
                value,
            } => {
                name.ser(writer);
                serial_id.ser(writer);
                value.ser(writer);
            }
            Packet::PropertyChange { name, index, value } => {
                name.ser(writer);
                index.ser(writer);
                value.ser(writer);
            }
            Packet::ObjectList { objects } => objects.ser(writer),
        }
    }

    pub fn de_payload(packet_type: PacketType, reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(match packet_type {
            PacketType::Invalid => {
                return Err(SerdeErr::InvalidTag {
                    what: "packet type",
                    tag: 0,
                })
            }
            PacketType::Handshake => Packet::Handshake {
                protocol_version: String::de(reader)?,
            },
            PacketType::Init => Packet::Init {
                name: String::de(reader)?,
                values: Vec::de(reader)?,
            },
            PacketType::InitDynamic => Packet::InitDynamic {
                name: String::de(reader)?,
                descriptor: Descriptor::de(reader)?,
                values: Vec::de(reader)?,
            },
            PacketType::AddObject => Packet::AddObject {
                name: String::de(reader)?,
                dynamic: bool::de(reader)?,
            },
            PacketType::RemoveObject => Packet::RemoveObject {
                name: String::de(reader)?,
            },
            PacketType::Invoke => Packet::Invoke {
                name: String::de(reader)?,
                call: InvokeCall::de(reader)?,
                index: i32::de(reader)?,
                args: Vec::de(reader)?,
                serial_id: i32::de(reader)?,
                property_index: i32::de(reader)?,
            },
            PacketType::InvokeReply => Packet::InvokeReply {
                name: String::de(reader)?,
                serial_id: i32::de(reader)?,
                value: Value::de(reader)?,
            },
            PacketType::PropertyChange => Packet::PropertyChange {
                name: String::de(reader)?,
                index: i32::de(reader)?,
                value: Value::de(reader)?,
            },
            PacketType::ObjectList => Packet::ObjectList {
                objects: Vec::de(reader)?,
            },
            PacketType::Ping => Packet::Ping {
                name: String::de(reader)?,
            },
            PacketType::Pong => Packet::Pong {
                name: String::de(reader)?,
            },
        })
    }
}
