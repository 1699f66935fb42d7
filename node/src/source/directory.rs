use std::collections::BTreeMap;

use remora_shared::ObjectInfo;

use crate::{connection::ChannelKey, error::NodeError};

use super::root_source::RootSource;

/// The sources enabled on one node, by name.
#[derive(Default)]
pub(crate) struct SourceDirectory {
    sources: BTreeMap<String, RootSource>,
}

impl SourceDirectory {
    pub fn register(&mut self, source: RootSource) -> Result<(), NodeError> {
        if self.sources.contains_key(source.name()) {
            return Err(NodeError::SourceAlreadyRegistered {
                name: source.name().to_string(),
            });
        }
        self.sources.insert(source.name().to_string(), source);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<RootSource> {
        self.sources.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RootSource> {
        self.sources.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RootSource> {
        self.sources.get_mut(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn object_list(&self) -> Vec<ObjectInfo> {
        self.sources.values().map(RootSource::object_info).collect()
    }

    pub fn remove_listener_everywhere(&mut self, key: ChannelKey) {
        for source in self.sources.values_mut() {
            source.remove_listener(key);
        }
    }

    /// Sources whose live object has been dropped
    pub fn dead_sources(&self) -> Vec<String> {
        self.sources
            .values()
            .filter(|source| !source.is_alive())
            .map(|source| source.name().to_string())
            .collect()
    }
}
