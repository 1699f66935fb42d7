use crate::{error::SerdeErr, reader::ByteReader, serde::Serde, writer::ByteWrite};

// All fixed-width numbers travel big-endian.
macro_rules! impl_serde_for_number {
    ($($ty:ty),*) => {
        $(
            impl Serde for $ty {
                fn ser(&self, writer: &mut dyn ByteWrite) {
                    writer.write_bytes(&self.to_be_bytes());
                }

                fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
                    Ok(<$ty>::from_be_bytes(reader.read_array()?))
                }

                fn byte_length(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }
            }
        )*
    };
}

impl_serde_for_number!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Serde for bool {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        writer.write_byte(u8::from(*self));
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        match reader.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SerdeErr::InvalidTag {
                what: "bool",
                tag: i64::from(other),
            }),
        }
    }

    fn byte_length(&self) -> usize {
        1
    }
}
