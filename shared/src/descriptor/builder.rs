use crate::value::ValueType;

use super::{
    Descriptor, DescriptorError, EnumDescriptor, EventDescriptor, GadgetDescriptor, MethodDescriptor,
    MethodKind, PropertyDescriptor,
};

enum Notify {
    None,
    Auto,
    Event(String),
}

/// Assembles a [`Descriptor`] for a statically known type.
///
/// `property` declares a notifying property; unless an event was named with
/// `property_with_notify`, a `<name>Changed` event carrying the new value is
/// appended after the explicitly declared events.
pub struct DescriptorBuilder {
    type_name: String,
    enums: Vec<EnumDescriptor>,
    gadgets: Vec<GadgetDescriptor>,
    objects: Vec<Descriptor>,
    events: Vec<EventDescriptor>,
    methods: Vec<MethodDescriptor>,
    properties: Vec<(String, ValueType, Notify)>,
}

impl DescriptorBuilder {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            enums: Vec::new(),
            gadgets: Vec::new(),
            objects: Vec::new(),
            events: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn enumeration(mut self, descriptor: EnumDescriptor) -> Self {
        self.enums.push(descriptor);
        self
    }

    pub fn gadget(mut self, descriptor: GadgetDescriptor) -> Self {
        self.gadgets.push(descriptor);
        self
    }

    /// Declares an object type that properties can hold with
    /// `ValueType::Object`.
    pub fn object(mut self, descriptor: Descriptor) -> Self {
        self.objects.push(descriptor);
        self
    }

    pub fn event(mut self, name: &str, params: Vec<ValueType>) -> Self {
        self.events.push(EventDescriptor {
            name: name.to_string(),
            params,
        });
        self
    }

    pub fn property(mut self, name: &str, value_type: ValueType) -> Self {
        self.properties
            .push((name.to_string(), value_type, Notify::Auto));
        self
    }

    pub fn property_with_notify(mut self, name: &str, value_type: ValueType, event: &str) -> Self {
        self.properties
            .push((name.to_string(), value_type, Notify::Event(event.to_string())));
        self
    }

    /// A property that never changes after initialization.
    pub fn constant(mut self, name: &str, value_type: ValueType) -> Self {
        self.properties
            .push((name.to_string(), value_type, Notify::None));
        self
    }

    pub fn method(self, name: &str, params: Vec<ValueType>, return_type: ValueType) -> Self {
        self.push_method(name, params, return_type, MethodKind::Sync)
    }

    /// A method whose reply may be deferred until a later `receive()`.
    pub fn async_method(self, name: &str, params: Vec<ValueType>, return_type: ValueType) -> Self {
        self.push_method(name, params, return_type, MethodKind::Async)
    }

    fn push_method(
        mut self,
        name: &str,
        params: Vec<ValueType>,
        return_type: ValueType,
        kind: MethodKind,
    ) -> Self {
        self.methods.push(MethodDescriptor {
            name: name.to_string(),
            params,
            return_type,
            kind,
        });
        self
    }

    pub fn build(self) -> Result<Descriptor, DescriptorError> {
        let mut events = self.events;
        let mut properties = Vec::with_capacity(self.properties.len());

        for (name, value_type, notify) in self.properties {
            let notify = match notify {
                Notify::None => None,
                Notify::Auto => {
                    let event_name = format!("{}Changed", name);
                    let index = match events.iter().position(|e| e.name == event_name) {
                        Some(index) => index,
                        None => {
                            events.push(EventDescriptor {
                                name: event_name,
                                params: vec![value_type.clone()],
                            });
                            events.len() - 1
                        }
                    };
                    Some(index)
                }
                Notify::Event(event_name) => {
                    let Some(index) = events.iter().position(|e| e.name == event_name) else {
                        return Err(DescriptorError::UnknownNotifyEvent {
                            property: name,
                            index: events.len(),
                            event_count: events.len(),
                        });
                    };
                    Some(index)
                }
            };
            properties.push(PropertyDescriptor {
                name,
                value_type,
                notify,
            });
        }

        let descriptor = Descriptor {
            type_name: self.type_name,
            enums: self.enums,
            gadgets: self.gadgets,
            objects: self.objects,
            events,
            methods: self.methods,
            properties,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}
