//! # Remora Shared
//! Wire packets, capability descriptors, values and transport traits shared
//! by every remora node.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use remora_serde::{ByteCounter, ByteReader, ByteWrite, ByteWriter, Serde, SerdeErr};

mod connection_config;
mod constants;
mod descriptor;
mod location;
mod packet;
mod timer;
mod transport;
mod value;

pub use connection_config::{ConnectionConfig, DEFAULT_MAX_PACKET_SIZE};
pub use constants::{PROTOCOL_VERSION, REGISTRY_NAME};
pub use descriptor::{
    Descriptor, DescriptorBuilder, DescriptorError, EnumDescriptor, EventDescriptor,
    FieldDescriptor, GadgetDescriptor, MethodDescriptor, MethodKind, PropertyDescriptor,
    MAX_DESCRIPTOR_DEPTH,
};
pub use location::SourceLocation;
pub use packet::{
    encode_packet, CodecError, FrameBuffer, InvokeCall, ObjectInfo, Packet, PacketType,
    NO_SERIAL_ID,
};
pub use timer::Timer;
pub use transport::{IoDevice, IoNotification, IoServer, TransportError, TransportFactory};
pub use value::{Value, ValueType, MAX_VALUE_DEPTH};
