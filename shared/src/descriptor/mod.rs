//! Capability descriptors: the ordered property, event and method slots an
//! object exposes, plus the enumerations, structured value types and nested
//! object types they use.
//!
//! Indices into these lists are what travel on the wire, so the order of
//! every list is part of the contract between a source and its replicas.

mod builder;
mod error;

pub use builder::DescriptorBuilder;
pub use error::DescriptorError;

use std::collections::HashSet;

use remora_serde::{ByteReader, ByteWrite, ByteWriter, Serde, SerdeErr};
use sha2::{Digest, Sha256};

use crate::value::{Value, ValueType};

/// Nested object descriptors deeper than this are refused when decoding.
pub const MAX_DESCRIPTOR_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value_type: ValueType,
    /// Index of the event fired when this property changes
    pub notify: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub name: String,
    pub params: Vec<ValueType>,
}

/// Whether a method replies as soon as it returns or may defer its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Sync,
    Async,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ValueType>,
    pub return_type: ValueType,
    pub kind: MethodKind,
}

impl MethodDescriptor {
    pub fn has_return_value(&self) -> bool {
        self.return_type != ValueType::Null
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub name: String,
    pub is_flag: bool,
    pub is_scoped: bool,
    pub keys: Vec<(String, i64)>,
}

impl EnumDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_flag: false,
            is_scoped: false,
            keys: Vec::new(),
        }
    }

    pub fn flag(mut self) -> Self {
        self.is_flag = true;
        self
    }

    pub fn scoped(mut self) -> Self {
        self.is_scoped = true;
        self
    }

    pub fn key(mut self, key: &str, value: i64) -> Self {
        self.keys.push((key.to_string(), value));
        self
    }

    pub fn value_of(&self, key: &str) -> Option<i64> {
        self.keys
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub value_type: ValueType,
}

/// A structured value type: an ordered list of typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GadgetDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl GadgetDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, value_type: ValueType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            value_type,
        });
        self
    }
}

/// Everything a replica needs to know about an object's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    type_name: String,
    enums: Vec<EnumDescriptor>,
    gadgets: Vec<GadgetDescriptor>,
    /// Descriptors of the object types nested in properties, each one
    /// self-contained
    objects: Vec<Descriptor>,
    events: Vec<EventDescriptor>,
    methods: Vec<MethodDescriptor>,
    properties: Vec<PropertyDescriptor>,
}

impl Descriptor {
    pub fn builder(type_name: &str) -> DescriptorBuilder {
        DescriptorBuilder::new(type_name)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn events(&self) -> &[EventDescriptor] {
        &self.events
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn enums(&self) -> &[EnumDescriptor] {
        &self.enums
    }

    pub fn gadgets(&self) -> &[GadgetDescriptor] {
        &self.gadgets
    }

    pub fn objects(&self) -> &[Descriptor] {
        &self.objects
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn property(&self, index: usize) -> Option<&PropertyDescriptor> {
        self.properties.get(index)
    }

    pub fn event(&self, index: usize) -> Option<&EventDescriptor> {
        self.events.get(index)
    }

    pub fn method(&self, index: usize) -> Option<&MethodDescriptor> {
        self.methods.get(index)
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    pub fn event_index(&self, name: &str) -> Option<usize> {
        self.events.iter().position(|e| e.name == name)
    }

    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn gadget(&self, name: &str) -> Option<&GadgetDescriptor> {
        self.gadgets.iter().find(|g| g.name == name)
    }

    pub fn object(&self, type_name: &str) -> Option<&Descriptor> {
        self.objects.iter().find(|o| o.type_name == type_name)
    }

    /// The zero value of a slot, with nested objects filled in from their
    /// descriptors
    pub fn default_value(&self, value_type: &ValueType) -> Value {
        match value_type {
            ValueType::Object(name) => match self.object(name) {
                Some(nested) => Value::Object {
                    type_name: name.clone(),
                    values: nested.default_values(),
                },
                None => Value::default_for(value_type),
            },
            _ => Value::default_for(value_type),
        }
    }

    /// Zero values of every property, in order
    pub fn default_values(&self) -> Vec<Value> {
        self.properties
            .iter()
            .map(|p| self.default_value(&p.value_type))
            .collect()
    }

    /// Whether `value` fits a slot of `value_type`. Nested objects must carry
    /// one well typed value per property of their descriptor.
    pub fn accepts(&self, value_type: &ValueType, value: &Value) -> bool {
        match (value_type, value) {
            (ValueType::Object(name), Value::Object { type_name, values }) => {
                type_name == name
                    && self
                        .object(name)
                        .map_or(false, |nested| nested.accepts_values(values))
            }
            _ => value.matches(value_type),
        }
    }

    /// Whether `values` is a well typed snapshot of every property
    pub fn accepts_values(&self, values: &[Value]) -> bool {
        values.len() == self.properties.len()
            && self
                .properties
                .iter()
                .zip(values)
                .all(|(p, value)| self.accepts(&p.value_type, value))
    }

    /// Hex encoded SHA-256 of the canonical wire form. Two nodes that agree on
    /// a descriptor agree on its signature.
    pub fn signature(&self) -> String {
        let mut writer = ByteWriter::new();
        self.ser(&mut writer);
        hex::encode(Sha256::digest(writer.as_slice()))
    }

    /// Checks the internal references of a descriptor, whether it was built
    /// locally or received from a peer.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.type_name.is_empty() {
            return Err(DescriptorError::EmptyTypeName);
        }

        self.check_unique("enum", self.enums.iter().map(|e| e.name.as_str()))?;
        self.check_unique("gadget", self.gadgets.iter().map(|g| g.name.as_str()))?;
        self.check_unique("object", self.objects.iter().map(|o| o.type_name.as_str()))?;
        self.check_unique("event", self.events.iter().map(|e| e.name.as_str()))?;
        self.check_unique("method", self.methods.iter().map(|m| m.name.as_str()))?;
        self.check_unique("property", self.properties.iter().map(|p| p.name.as_str()))?;

        for property in &self.properties {
            if let Some(index) = property.notify {
                if index >= self.events.len() {
                    return Err(DescriptorError::UnknownNotifyEvent {
                        property: property.name.clone(),
                        index,
                        event_count: self.events.len(),
                    });
                }
            }
        }

        let referenced = self
            .properties
            .iter()
            .map(|p| &p.value_type)
            .chain(self.events.iter().flat_map(|e| e.params.iter()))
            .chain(
                self.methods
                    .iter()
                    .flat_map(|m| m.params.iter().chain(std::iter::once(&m.return_type))),
            )
            .chain(
                self.gadgets
                    .iter()
                    .flat_map(|g| g.fields.iter().map(|f| &f.value_type)),
            );
        for value_type in referenced {
            let declared = match value_type {
                ValueType::Enum(name) => self.enumeration(name).is_some(),
                ValueType::Gadget(name) => self.gadget(name).is_some(),
                ValueType::Object(name) => self.object(name).is_some(),
                _ => true,
            };
            if !declared {
                return Err(DescriptorError::UnknownType {
                    type_name: self.type_name.clone(),
                    name: value_type.referenced_type().unwrap_or_default().to_string(),
                });
            }
        }

        for nested in &self.objects {
            nested.validate()?;
        }

        Ok(())
    }

    fn check_unique<'a>(
        &self,
        kind: &'static str,
        names: impl Iterator<Item = &'a str>,
    ) -> Result<(), DescriptorError> {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(DescriptorError::DuplicateName {
                    type_name: self.type_name.clone(),
                    kind,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn ser_index(index: Option<usize>, writer: &mut dyn ByteWrite) {
    index.map_or(-1, |index| index as i32).ser(writer);
}

fn de_index(reader: &mut ByteReader) -> Result<Option<usize>, SerdeErr> {
    let index = i32::de(reader)?;
    match index {
        -1 => Ok(None),
        index if index >= 0 => Ok(Some(index as usize)),
        index => Err(SerdeErr::InvalidTag {
            what: "notify index",
            tag: i64::from(index),
        }),
    }
}

impl Serde for MethodKind {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        let tag: u8 = match self {
            MethodKind::Sync => 0,
            MethodKind::Async => 1,
        };
        tag.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        match u8::de(reader)? {
            0 => Ok(MethodKind::Sync),
            1 => Ok(MethodKind::Async),
            other => Err(SerdeErr::InvalidTag {
                what: "method kind",
                tag: i64::from(other),
            }),
        }
    }
}

impl Serde for EnumDescriptor {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.name.ser(writer);
        self.is_flag.ser(writer);
        self.is_scoped.ser(writer);
        (self.keys.len() as u32).ser(writer);
        for (key, value) in &self.keys {
            key.ser(writer);
            value.ser(writer);
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let name = String::de(reader)?;
        let is_flag = bool::de(reader)?;
        let is_scoped = bool::de(reader)?;
        let count = u32::de(reader)? as usize;
        let mut keys = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            keys.push((String::de(reader)?, i64::de(reader)?));
        }
        Ok(Self {
            name,
            is_flag,
            is_scoped,
            keys,
        })
    }
}

impl Serde for FieldDescriptor {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.name.ser(writer);
        self.value_type.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            name: String::de(reader)?,
            value_type: ValueType::de(reader)?,
        })
    }
}

impl Serde for GadgetDescriptor {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.name.ser(writer);
        self.fields.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            name: String::de(reader)?,
            fields: Vec::de(reader)?,
        })
    }
}

impl Serde for EventDescriptor {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.name.ser(writer);
        self.params.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            name: String::de(reader)?,
            params: Vec::de(reader)?,
        })
    }
}

impl Serde for MethodDescriptor {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.name.ser(writer);
        self.params.ser(writer);
        self.return_type.ser(writer);
        self.kind.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            name: String::de(reader)?,
            params: Vec::de(reader)?,
            return_type: ValueType::de(reader)?,
            kind: MethodKind::de(reader)?,
        })
    }
}

impl Serde for PropertyDescriptor {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.name.ser(writer);
        self.value_type.ser(writer);
        ser_index(self.notify, writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            name: String::de(reader)?,
            value_type: ValueType::de(reader)?,
            notify: de_index(reader)?,
        })
    }
}

impl Descriptor {
    fn de_nested(reader: &mut ByteReader, depth: usize) -> Result<Self, SerdeErr> {
        if depth > MAX_DESCRIPTOR_DEPTH {
            return Err(SerdeErr::NestingTooDeep {
                max: MAX_DESCRIPTOR_DEPTH,
            });
        }
        let type_name = String::de(reader)?;
        let enums = Vec::de(reader)?;
        let gadgets = Vec::de(reader)?;
        let count = u32::de(reader)? as usize;
        let mut objects = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            objects.push(Self::de_nested(reader, depth + 1)?);
        }
        Ok(Self {
            type_name,
            enums,
            gadgets,
            objects,
            events: Vec::de(reader)?,
            methods: Vec::de(reader)?,
            properties: Vec::de(reader)?,
        })
    }
}

// Wire order: type name, enums, gadgets, nested objects, events, methods,
// properties.
impl Serde for Descriptor {
    fn ser(&self, writer: &mut dyn ByteWrite) {
        self.type_name.ser(writer);
        self.enums.ser(writer);
        self.gadgets.ser(writer);
        self.objects.ser(writer);
        self.events.ser(writer);
        self.methods.ser(writer);
        self.properties.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Self::de_nested(reader, 0)
    }
}
