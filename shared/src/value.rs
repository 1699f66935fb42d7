use std::collections::BTreeMap;

use remora_serde::{ByteReader, ByteWrite, Serde, SerdeErr};

use crate::location::SourceLocation;

/// Values nested deeper than this are refused when decoding.
pub const MAX_VALUE_DEPTH: usize = 64;

/// The declared type of a property, parameter or return slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// No value; used as the return type of methods that return nothing
    Null,
    Bool,
    Int,
    UInt,
    Double,
    String,
    Bytes,
    List,
    Map,
    /// An enumeration declared in the owning descriptor
    Enum(String),
    /// A structured value type declared in the owning descriptor
    Gadget(String),
    /// A nested object whose descriptor is declared in the owning descriptor
    Object(String),
    Location,
    /// Accepts any value
    Any,
}

impl ValueType {
    fn tag(&self) -> u8 {
        match self {
            ValueType::Null => 0,
            ValueType::Bool => 1,
            ValueType::Int => 2,
            ValueType::UInt => 3,
            ValueType::Double => 4,
            ValueType::String => 5,
            ValueType::Bytes => 6,
            ValueType::List => 7,
            ValueType::Map => 8,
            ValueType::Enum(_) => 9,
            ValueType::Gadget(_) => 10,
            ValueType::Location => 11,
            ValueType::Any => 12,
            ValueType::Object(_) => 13,
        }
    }

    /// Name of the enumeration, gadget or nested object this type refers to,
    /// if any
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            ValueType::Enum(name) | ValueType::Gadget(name) | ValueType::Object(name) => Some(name),
            _ => None,
        }
    }
}

impl Serde for ValueType {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.tag().ser(writer);
        if let Some(name) = self.referenced_type() {
            name.to_string().ser(writer);
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let tag = u8::de(reader)?;
        Ok(match tag {
            0 => ValueType::Null,
            1 => ValueType::Bool,
            2 => ValueType::Int,
            3 => ValueType::UInt,
            4 => ValueType::Double,
            5 => ValueType::String,
            6 => ValueType::Bytes,
            7 => ValueType::List,
            8 => ValueType::Map,
            9 => ValueType::Enum(String::de(reader)?),
            10 => ValueType::Gadget(String::de(reader)?),
            11 => ValueType::Location,
            12 => ValueType::Any,
            13 => ValueType::Object(String::de(reader)?),
            other => {
                return Err(SerdeErr::InvalidTag {
                    what: "value type",
                    tag: i64::from(other),
                })
            }
        })
    }
}

/// A dynamically typed property value, argument or return value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Enum { type_name: String, value: i64 },
    Gadget { type_name: String, fields: Vec<Value> },
    Location(SourceLocation),
    /// Property values of a nested object, in its descriptor's order
    Object { type_name: String, values: Vec<Value> },
}

impl Value {
    /// The zero value a freshly created replica holds for a slot of this type.
    /// A nested object gets no values; `Descriptor::default_value` fills them.
    pub fn default_for(value_type: &ValueType) -> Value {
        match value_type {
            ValueType::Null | ValueType::Any => Value::Null,
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::UInt => Value::UInt(0),
            ValueType::Double => Value::Double(0.0),
            ValueType::String => Value::String(String::new()),
            ValueType::Bytes => Value::Bytes(Vec::new()),
            ValueType::List => Value::List(Vec::new()),
            ValueType::Map => Value::Map(BTreeMap::new()),
            ValueType::Enum(type_name) => Value::Enum {
                type_name: type_name.clone(),
                value: 0,
            },
            ValueType::Gadget(type_name) => Value::Gadget {
                type_name: type_name.clone(),
                fields: Vec::new(),
            },
            ValueType::Location => Value::Location(SourceLocation::default()),
            ValueType::Object(type_name) => Value::Object {
                type_name: type_name.clone(),
                values: Vec::new(),
            },
        }
    }

    /// Whether this value may be stored in a slot declared as `value_type`.
    /// Only the outer type is checked; `Descriptor::accepts` also checks the
    /// values of nested objects.
    pub fn matches(&self, value_type: &ValueType) -> bool {
        match (self, value_type) {
            (_, ValueType::Any) => true,
            (Value::Null, ValueType::Null) => true,
            (Value::Bool(_), ValueType::Bool) => true,
            (Value::Int(_), ValueType::Int) => true,
            (Value::UInt(_), ValueType::UInt) => true,
            (Value::Double(_), ValueType::Double) => true,
            (Value::String(_), ValueType::String) => true,
            (Value::Bytes(_), ValueType::Bytes) => true,
            (Value::List(_), ValueType::List) => true,
            (Value::Map(_), ValueType::Map) => true,
            (Value::Enum { type_name, .. }, ValueType::Enum(expected)) => type_name == expected,
            (Value::Gadget { type_name, .. }, ValueType::Gadget(expected)) => {
                type_name == expected
            }
            (Value::Location(_), ValueType::Location) => true,
            (Value::Object { type_name, .. }, ValueType::Object(expected)) => {
                type_name == expected
            }
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Enum { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&SourceLocation> {
        match self {
            Value::Location(location) => Some(location),
            _ => None,
        }
    }

    /// Type name and property values of a nested object
    pub fn as_object(&self) -> Option<(&str, &[Value])> {
        match self {
            Value::Object { type_name, values } => Some((type_name, values)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::UInt(_) => 3,
            Value::Double(_) => 4,
            Value::String(_) => 5,
            Value::Bytes(_) => 6,
            Value::List(_) => 7,
            Value::Map(_) => 8,
            Value::Enum { .. } => 9,
            Value::Gadget { .. } => 10,
            Value::Location(_) => 11,
            Value::Object { .. } => 12,
        }
    }

    fn de_nested(reader: &mut ByteReader, depth: usize) -> Result<Self, SerdeErr> {
        if depth > MAX_VALUE_DEPTH {
            return Err(SerdeErr::NestingTooDeep {
                max: MAX_VALUE_DEPTH,
            });
        }
        let tag = u8::de(reader)?;
        Ok(match tag {
            0 => Value::Null,
            1 => Value::Bool(bool::de(reader)?),
            2 => Value::Int(i64::de(reader)?),
            3 => Value::UInt(u64::de(reader)?),
            4 => Value::Double(f64::de(reader)?),
            5 => Value::String(String::de(reader)?),
            6 => {
                let length = u32::de(reader)? as usize;
                Value::Bytes(reader.read_bytes(length)?.to_vec())
            }
            7 => Value::List(Self::de_list(reader, depth)?),
            8 => {
                let count = u32::de(reader)?;
                let mut map = BTreeMap::new();
                for _ in 0..count {
                    let key = String::de(reader)?;
                    let value = Self::de_nested(reader, depth + 1)?;
                    map.insert(key, value);
                }
                Value::Map(map)
            }
            9 => Value::Enum {
                type_name: String::de(reader)?,
                value: i64::de(reader)?,
            },
            10 => Value::Gadget {
                type_name: String::de(reader)?,
                fields: Self::de_list(reader, depth)?,
            },
            11 => Value::Location(SourceLocation::de(reader)?),
            12 => Value::Object {
                type_name: String::de(reader)?,
                values: Self::de_list(reader, depth)?,
            },
            other => {
                return Err(SerdeErr::InvalidTag {
                    what: "value",
                    tag: i64::from(other),
                })
            }
        })
    }

    fn de_list(reader: &mut ByteReader, depth: usize) -> Result<Vec<Value>, SerdeErr> {
        let count = u32::de(reader)? as usize;
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(Self::de_nested(reader, depth + 1)?);
        }
        Ok(items)
    }
}

impl Serde for Value {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.tag().ser(writer);
        match self {
            Value::Null => {}
            Value::Bool(value) => value.ser(writer),
            Value::Int(value) => value.ser(writer),
            Value::UInt(value) => value.ser(writer),
            Value::Double(value) => value.ser(writer),
            Value::String(value) => value.ser(writer),
            Value::Bytes(bytes) => {
                (bytes.len() as u32).ser(writer);
                writer.write_bytes(bytes);
            }
            Value::List(items) => items.ser(writer),
            Value::Map(map) => {
                (map.len() as u32).ser(writer);
                for (key, value) in map {
                    key.ser(writer);
                    value.ser(writer);
                }
            }
            Value::Enum { type_name, value } => {
                type_name.ser(writer);
                value.ser(writer);
            }
            Value::Gadget { type_name, fields } => {
                type_name.ser(writer);
                fields.ser(writer);
            }
            Value::Location(location) => location.ser(writer),
            Value::Object { type_name, values } => {
                type_name.ser(writer);
                values.ser(writer);
            }
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Self::de_nested(reader, 0)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<SourceLocation> for Value {
    fn from(value: SourceLocation) -> Self {
        Value::Location(value)
    }
}
