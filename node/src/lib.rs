//! # Remora
//! A node that shares live objects with other processes. Sources expose an
//! object's properties, events and methods; replicas on other nodes mirror
//! them over framed byte streams and forward calls back.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

#[macro_use]
extern crate cfg_if;

pub mod registry;
pub mod transport;
pub mod shared {
    pub use remora_shared::{
        encode_packet, ByteReader, ByteWrite, ByteWriter, CodecError, ConnectionConfig,
        FrameBuffer, IoDevice, IoNotification, IoServer, ObjectInfo, Packet, PacketType, Serde,
        SerdeErr, TransportError, TransportFactory, NO_SERIAL_ID, PROTOCOL_VERSION,
    };
}

mod connection;
mod error;
mod events;
mod node;
mod pending_call;
mod replica;
mod source;
mod type_table;

pub use remora_shared::{
    Descriptor, DescriptorBuilder, DescriptorError, EnumDescriptor, EventDescriptor,
    FieldDescriptor, GadgetDescriptor, InvokeCall, MethodDescriptor, MethodKind,
    PropertyDescriptor, SourceLocation, Value, ValueType,
};

pub use connection::{ChannelKey, ChannelState};
pub use error::NodeError;
pub use events::{Events, NodeEvent};
pub use node::{Node, NodeConfig};
pub use pending_call::{CallError, PendingCall};
pub use registry::RegistrySource;
pub use replica::{Replica, ReplicaState};
pub use source::{DeferredReply, MethodResult, SourceError, SourceNotifier, SourceObject};
pub use type_table::DynamicTypeTable;
