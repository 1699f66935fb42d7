use std::{collections::HashMap, rc::Rc};

use log::warn;

use remora_shared::{Descriptor, EnumDescriptor, GadgetDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TypeKind {
    Object,
    Enum,
    Gadget,
}

/// One reference a channel holds into the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TypeRef {
    pub kind: TypeKind,
    pub name: String,
}

struct Counted<T> {
    value: T,
    refs: usize,
}

fn retain<T: PartialEq + Clone>(map: &mut HashMap<String, Counted<T>>, name: &str, value: T) -> T {
    match map.get_mut(name) {
        Some(entry) if entry.value == value => {
            entry.refs += 1;
            entry.value.clone()
        }
        Some(entry) => {
            warn!("type '{}' was redefined by a peer, replacing it", name);
            entry.value = value.clone();
            entry.refs += 1;
            value
        }
        None => {
            map.insert(name.to_string(), Counted { value: value.clone(), refs: 1 });
            value
        }
    }
}

fn release<T>(map: &mut HashMap<String, Counted<T>>, name: &str) {
    if let Some(entry) = map.get_mut(name) {
        entry.refs -= 1;
        if entry.refs == 0 {
            map.remove(name);
        }
    }
}

/// Types learned from InitDynamic packets, shared by every replica of the
/// same type and reference counted per channel.
#[derive(Default)]
pub struct DynamicTypeTable {
    objects: HashMap<String, Counted<Rc<Descriptor>>>,
    enums: HashMap<String, Counted<EnumDescriptor>>,
    gadgets: HashMap<String, Counted<GadgetDescriptor>>,
}

impl DynamicTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor with its enums, gadgets and nested object
    /// types, reusing equal entries already in the table. Returns the shared
    /// descriptor and the references the caller must release later.
    pub(crate) fn register(&mut self, descriptor: Descriptor) -> (Rc<Descriptor>, Vec<TypeRef>) {
        let mut refs = Vec::new();
        self.register_members(&descriptor, &mut refs);

        let type_name = descriptor.type_name().to_string();
        let shared = retain(&mut self.objects, &type_name, Rc::new(descriptor));
        refs.push(TypeRef {
            kind: TypeKind::Object,
            name: type_name,
        });

        (shared, refs)
    }

    fn register_members(&mut self, descriptor: &Descriptor, refs: &mut Vec<TypeRef>) {
        for enumeration in descriptor.enums() {
            retain(&mut self.enums, &enumeration.name, enumeration.clone());
            refs.push(TypeRef {
                kind: TypeKind::Enum,
                name: enumeration.name.clone(),
            });
        }
        for gadget in descriptor.gadgets() {
            retain(&mut self.gadgets, &gadget.name, gadget.clone());
            refs.push(TypeRef {
                kind: TypeKind::Gadget,
                name: gadget.name.clone(),
            });
        }
        for nested in descriptor.objects() {
            self.register_members(nested, refs);
            retain(&mut self.objects, nested.type_name(), Rc::new(nested.clone()));
            refs.push(TypeRef {
                kind: TypeKind::Object,
                name: nested.type_name().to_string(),
            });
        }
    }

    pub(crate) fn release(&mut self, type_ref: &TypeRef) {
        match type_ref.kind {
            TypeKind::Object => release(&mut self.objects, &type_ref.name),
            TypeKind::Enum => release(&mut self.enums, &type_ref.name),
            TypeKind::Gadget => release(&mut self.gadgets, &type_ref.name),
        }
    }

    pub fn object(&self, type_name: &str) -> Option<Rc<Descriptor>> {
        self.objects.get(type_name).map(|entry| entry.value.clone())
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name).map(|entry| &entry.value)
    }

    pub fn gadget(&self, name: &str) -> Option<&GadgetDescriptor> {
        self.gadgets.get(name).map(|entry| &entry.value)
    }

    pub fn object_ref_count(&self, type_name: &str) -> usize {
        self.objects.get(type_name).map_or(0, |entry| entry.refs)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.enums.is_empty() && self.gadgets.is_empty()
    }
}
