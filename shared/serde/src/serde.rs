use crate::{
    error::SerdeErr,
    reader::ByteReader,
    writer::{ByteCounter, ByteWrite},
};

/// A type that can be written to and read from the wire
pub trait Serde: Sized + Clone + PartialEq {
    /// Serialize Self to a ByteWrite
    fn ser(&self, writer: &mut dyn ByteWrite);

    /// Parse Self from a ByteReader
    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr>;

    /// Return the length in bytes of Self once serialized
    fn byte_length(&self) -> usize {
        let mut counter = ByteCounter::new();
        self.ser(&mut counter);
        counter.count()
    }
}
