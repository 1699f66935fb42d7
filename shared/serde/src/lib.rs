//! Big-endian byte serialization for the remora wire protocol.
//!
//! Every wire type implements [`Serde`]: it writes itself into any
//! [`ByteWrite`] and reads itself back out of a [`ByteReader`]. Readers never
//! trust lengths taken from the stream; a truncated or oversized payload
//! yields a [`SerdeErr`] instead of a panic or a huge allocation.

mod collections;
mod error;
mod integer;
mod reader;
mod serde;
mod string;
mod writer;

pub use error::SerdeErr;
pub use reader::ByteReader;
pub use serde::Serde;
pub use writer::{ByteCounter, ByteWrite, ByteWriter};
