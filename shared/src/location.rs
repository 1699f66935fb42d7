use std::fmt;

use remora_serde::{ByteReader, ByteWrite, Serde, SerdeErr};

/// Where a source can be reached: its object name, its type and the URL of
/// the node hosting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub name: String,
    pub type_name: String,
    pub url: String,
}

impl SourceLocation {
    pub fn new(name: &str, type_name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            url: url.to_string(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.name, self.type_name, self.url)
    }
}

impl Serde for SourceLocation {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.name.ser(writer);
        self.type_name.ser(writer);
        self.url.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            name: String::de(reader)?,
            type_name: String::de(reader)?,
            url: String::de(reader)?,
        })
    }
}
