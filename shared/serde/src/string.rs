use crate::{error::SerdeErr, reader::ByteReader, serde::Serde, writer::ByteWrite};

// Strings are a u32 byte count followed by UTF-8.
impl Serde for String {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        (self.len() as u32).ser(writer);
        writer.write_bytes(self.as_bytes());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let length = u32::de(reader)? as usize;
        let bytes = reader.read_bytes(length)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| SerdeErr::InvalidUtf8)
    }

    fn byte_length(&self) -> usize {
        4 + self.len()
    }
}
