use log::{debug, info, warn};

use remora_shared::{SourceLocation, Value};

use crate::{
    connection::ChannelKey,
    events::NodeEvent,
    registry::{
        locations_from_value, LocationChange, ADD_SOURCE, REGISTRY_NAME, REMOTE_OBJECT_ADDED,
        REMOTE_OBJECT_REMOVED, REMOVE_SOURCE, SOURCE_LOCATIONS,
    },
};

use super::node::Node;

impl Node {
    /// Feeds changes of a hosted registry into this node and publishes
    /// sources enabled since the last pass
    pub(crate) fn sync_registry(&mut self) {
        let changes = match &self.registry.hosted {
            Some(hosted) => hosted.borrow_mut().take_changes(),
            None => Vec::new(),
        };
        for change in changes {
            match change {
                LocationChange::Added(location) => self.learn_location(location),
                LocationChange::Removed(location) => self.forget_location(&location),
            }
        }

        self.publish_sources();
    }

    fn publish_sources(&mut self) {
        let Some(host_url) = self.host_url.as_ref().map(|url| url.to_string()) else {
            return;
        };
        let registry_valid = self
            .registry
            .replica
            .as_ref()
            .map_or(false, |replica| replica.is_valid());
        if self.registry.hosted.is_none() && !registry_valid {
            return;
        }

        for name in self.sources.names() {
            if name == REGISTRY_NAME || self.registry.published.contains_key(&name) {
                continue;
            }
            let Some(location) = self.sources.get(&name).map(|source| source.location(&host_url))
            else {
                continue;
            };

            if let Some(hosted) = &self.registry.hosted {
                hosted.borrow_mut().add_source(location.clone());
            } else if let Some(replica) = &self.registry.replica {
                if let Err(error) =
                    replica.invoke(ADD_SOURCE, vec![Value::Location(location.clone())])
                {
                    warn!("cannot publish '{}': {}", name, error);
                    continue;
                }
            }
            info!("published {}", location);
            self.registry.published.insert(name, location);
        }
    }

    /// Withdraws a disabled source from the registry
    pub(crate) fn unpublish_source(&mut self, name: &str) {
        let Some(location) = self.registry.published.remove(name) else {
            return;
        };
        if let Some(hosted) = &self.registry.hosted {
            hosted.borrow_mut().remove_source(&location);
        } else if let Some(replica) = &self.registry.replica {
            if let Err(error) = replica.invoke(REMOVE_SOURCE, vec![Value::Location(location)]) {
                debug!("cannot withdraw '{}' from the registry: {}", name, error);
            }
        }
    }

    /// Remembers which host URLs a channel published to the hosted registry
    pub(crate) fn record_published_url(&mut self, key: ChannelKey, args: &[Value]) {
        if self.registry.hosted.is_none() {
            return;
        }
        if let Some(location) = args.first().and_then(Value::as_location) {
            self.registry
                .host_urls
                .entry(key)
                .or_default()
                .insert(location.url.clone());
        }
    }

    /// Drops every location published over a host channel that closed
    pub(crate) fn host_channel_closed(&mut self, key: ChannelKey) {
        let Some(urls) = self.registry.host_urls.remove(&key) else {
            return;
        };
        let Some(hosted) = &self.registry.hosted else {
            return;
        };
        for url in urls {
            let gone = hosted.borrow_mut().remove_server(&url);
            if !gone.is_empty() {
                info!("registry dropped {} sources of {}", gone.len(), url);
            }
        }
    }

    /// Registry snapshot arrived: reconcile known locations, republish and
    /// dial for waiting replicas
    pub(crate) fn replica_initialized(&mut self, name: &str, values: &[Value]) {
        if !self.is_registry_replica(name) {
            return;
        }
        let snapshot = values
            .get(SOURCE_LOCATIONS)
            .map(locations_from_value)
            .unwrap_or_default();

        let stale: Vec<SourceLocation> = self
            .registry
            .locations
            .values()
            .filter(|known| !snapshot.contains(known))
            .cloned()
            .collect();
        for location in stale {
            self.forget_location(&location);
        }
        for location in snapshot {
            self.learn_location(location);
        }

        self.registry.published.clear();
        let waiting: Vec<String> = self
            .replicas
            .iter()
            .filter(|(_, slot)| slot.is_waiting())
            .map(|(name, _)| name.clone())
            .collect();
        for name in waiting {
            self.bind_waiting_replica(&name);
        }
    }

    pub(crate) fn replica_event(&mut self, name: &str, index: usize, args: &[Value]) {
        if !self.is_registry_replica(name) {
            return;
        }
        let Some(location) = args.first().and_then(Value::as_location).cloned() else {
            return;
        };
        match index {
            REMOTE_OBJECT_ADDED => self.learn_location(location),
            REMOTE_OBJECT_REMOVED => self.forget_location(&location),
            _ => {}
        }
    }

    fn is_registry_replica(&self, name: &str) -> bool {
        name == REGISTRY_NAME && self.registry.replica.is_some() && self.registry.hosted.is_none()
    }

    fn learn_location(&mut self, location: SourceLocation) {
        if self.registry.locations.get(&location.name) == Some(&location) {
            return;
        }
        debug!("learned {}", location);
        let name = location.name.clone();
        self.registry
            .locations
            .insert(name.clone(), location.clone());
        self.push_event(NodeEvent::SourceLocationAdded(location));
        self.bind_waiting_replica(&name);
    }

    fn forget_location(&mut self, location: &SourceLocation) {
        let known = self
            .registry
            .locations
            .get(&location.name)
            .map_or(false, |known| known.url == location.url);
        if !known {
            return;
        }
        if let Some(removed) = self.registry.locations.remove(&location.name) {
            debug!("forgot {}", removed);
            self.push_event(NodeEvent::SourceLocationRemoved(removed));
        }
    }
}
