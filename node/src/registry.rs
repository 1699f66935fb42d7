//! The built-in discovery source.
//!
//! A registry node serves a [`RegistrySource`] under [`REGISTRY_NAME`];
//! other nodes hold a replica of it, publish their sources through
//! `addSource`/`removeSource` and learn where to connect from its
//! `remoteObjectAdded`/`remoteObjectRemoved` events.

use std::collections::BTreeMap;

use log::{info, warn};

use remora_shared::{Descriptor, DescriptorError, SourceLocation, Value, ValueType};

use crate::source::{MethodResult, SourceNotifier, SourceObject};

pub use remora_shared::REGISTRY_NAME;

/// Property index of `sourceLocations`
pub const SOURCE_LOCATIONS: usize = 0;
/// Event index of `remoteObjectAdded`
pub const REMOTE_OBJECT_ADDED: usize = 0;
/// Event index of `remoteObjectRemoved`
pub const REMOTE_OBJECT_REMOVED: usize = 1;
/// Method index of `addSource`
pub const ADD_SOURCE: usize = 0;
/// Method index of `removeSource`
pub const REMOVE_SOURCE: usize = 1;

pub fn registry_descriptor() -> Result<Descriptor, DescriptorError> {
    Descriptor::builder(REGISTRY_NAME)
        .event("remoteObjectAdded", vec![ValueType::Location])
        .event("remoteObjectRemoved", vec![ValueType::Location])
        .property("sourceLocations", ValueType::Map)
        .method("addSource", vec![ValueType::Location], ValueType::Null)
        .method("removeSource", vec![ValueType::Location], ValueType::Null)
        .build()
}

/// Reads the locations out of a `sourceLocations` value. Entries that are
/// not locations are skipped.
pub fn locations_from_value(value: &Value) -> Vec<SourceLocation> {
    value
        .as_map()
        .map(|map| {
            map.values()
                .filter_map(|entry| entry.as_location().cloned())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LocationChange {
    Added(SourceLocation),
    Removed(SourceLocation),
}

/// Object name to location, as served by a registry node.
#[derive(Default)]
pub struct RegistrySource {
    locations: BTreeMap<String, SourceLocation>,
    notifier: Option<SourceNotifier>,
    changes: Vec<LocationChange>,
}

impl RegistrySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locations(&self) -> Vec<SourceLocation> {
        self.locations.values().cloned().collect()
    }

    pub fn location(&self, name: &str) -> Option<&SourceLocation> {
        self.locations.get(name)
    }

    /// Returns false if the name is already registered.
    pub fn add_source(&mut self, location: SourceLocation) -> bool {
        if let Some(existing) = self.locations.get(&location.name) {
            warn!(
                "registry already has '{}' at {}, ignoring {}",
                location.name, existing.url, location.url
            );
            return false;
        }
        info!("registry added {}", location);
        self.locations
            .insert(location.name.clone(), location.clone());
        self.announce(REMOTE_OBJECT_ADDED, &location);
        self.changes.push(LocationChange::Added(location));
        true
    }

    /// Removes the location only if it is registered at the same URL.
    pub fn remove_source(&mut self, location: &SourceLocation) -> bool {
        match self.locations.get(&location.name) {
            Some(existing) if existing.url == location.url => {}
            _ => return false,
        }
        if let Some(removed) = self.locations.remove(&location.name) {
            info!("registry removed {}", removed);
            self.announce(REMOTE_OBJECT_REMOVED, &removed);
            self.changes.push(LocationChange::Removed(removed));
        }
        true
    }

    /// Drops every location hosted at `url`, returning them.
    pub fn remove_server(&mut self, url: &str) -> Vec<SourceLocation> {
        let gone: Vec<SourceLocation> = self
            .locations
            .values()
            .filter(|location| location.url == url)
            .cloned()
            .collect();
        for location in &gone {
            self.remove_source(location);
        }
        gone
    }

    pub(crate) fn take_changes(&mut self) -> Vec<LocationChange> {
        std::mem::take(&mut self.changes)
    }

    fn locations_value(&self) -> Value {
        Value::Map(
            self.locations
                .iter()
                .map(|(name, location)| (name.clone(), Value::Location(location.clone())))
                .collect(),
        )
    }

    fn announce(&self, event: usize, location: &SourceLocation) {
        if let Some(notifier) = &self.notifier {
            notifier.emit(event, vec![Value::Location(location.clone())]);
            notifier.property_changed(SOURCE_LOCATIONS);
        }
    }
}

impl SourceObject for RegistrySource {
    fn attach(&mut self, notifier: SourceNotifier) {
        self.notifier = Some(notifier);
    }

    fn property(&self, index: usize) -> Value {
        match index {
            SOURCE_LOCATIONS => self.locations_value(),
            _ => Value::Null,
        }
    }

    fn set_property(&mut self, index: usize, _value: Value) -> bool {
        warn!("registry property {} is read-only", index);
        false
    }

    fn invoke(&mut self, index: usize, args: Vec<Value>) -> MethodResult {
        let Some(location) = args.first().and_then(Value::as_location).cloned() else {
            warn!("registry method {} called without a location", index);
            return Value::Null.into();
        };
        match index {
            ADD_SOURCE => {
                self.add_source(location);
            }
            REMOVE_SOURCE => {
                self.remove_source(&location);
            }
            _ => warn!("registry has no method {}", index),
        }
        Value::Null.into()
    }
}
