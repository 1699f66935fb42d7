use log::{debug, info, warn};
use url::Url;

use remora_shared::{Descriptor, InvokeCall, ObjectInfo, Packet, TransportError, Value};

use crate::{
    connection::{ChannelKey, ChannelState, ConnectionRole},
    error::NodeError,
    events::NodeEvent,
    pending_call::CallError,
    replica::{PropertyUpdate, ReplicaState},
};

use super::node::Node;

impl Node {
    pub(crate) fn open_client(&mut self, url: &Url) -> Result<ChannelKey, TransportError> {
        let device = self.transports.connect(url, &self.config.connection)?;
        let key = self.insert_connection(
            ConnectionRole::Client {
                url: Some(url.clone()),
            },
            device,
        );
        info!("channel {} connecting to {}", key.to_u64(), url);
        Ok(key)
    }

    /// An open channel this node opened to `url`
    pub(crate) fn client_channel_for(&self, url: &Url) -> Option<ChannelKey> {
        self.connections
            .values()
            .find(|connection| connection.url() == Some(url) && connection.is_open())
            .map(|connection| connection.key)
    }

    pub(crate) fn handle_client_packet(
        &mut self,
        key: ChannelKey,
        packet: Packet,
    ) -> Result<(), NodeError> {
        let handshaking = self
            .connections
            .get(&key)
            .map_or(false, |connection| connection.state == ChannelState::Handshaking);
        if handshaking {
            return self.complete_handshake(key, packet);
        }

        match packet {
            Packet::ObjectList { objects } => {
                self.receive_object_list(key, objects);
                Ok(())
            }
            Packet::Init { name, values } => self.receive_init(key, name, values),
            Packet::InitDynamic {
                name,
                descriptor,
                values,
            } => self.receive_init_dynamic(key, name, descriptor, values),
            Packet::PropertyChange { name, index, value } => {
                self.receive_property_change(key, name, index, value);
                Ok(())
            }
            Packet::Invoke {
                name,
                call,
                index,
                args,
                ..
            } => {
                self.receive_event(key, name, call, index, args);
                Ok(())
            }
            Packet::InvokeReply {
                name,
                serial_id,
                value,
            } => {
                self.receive_reply(name, serial_id, value);
                Ok(())
            }
            Packet::Pong { name } => {
                if let Some(slot) = self.replicas.get_mut(&name) {
                    if slot.channel == Some(key) {
                        slot.ping_outstanding = false;
                    }
                }
                Ok(())
            }
            Packet::RemoveObject { name } => {
                self.receive_remove_object(key, &name);
                Ok(())
            }
            other => Err(NodeError::UnexpectedPacket {
                packet_type: other.packet_type(),
                role: "client",
            }),
        }
    }

    fn complete_handshake(&mut self, key: ChannelKey, packet: Packet) -> Result<(), NodeError> {
        let Packet::Handshake { protocol_version } = packet else {
            return Err(NodeError::UnexpectedPacket {
                packet_type: packet.packet_type(),
                role: "client",
            });
        };
        if protocol_version != self.config.protocol_version {
            return Err(NodeError::ProtocolMismatch {
                expected: self.config.protocol_version.clone(),
                received: protocol_version,
            });
        }

        let Some(connection) = self.connections.get_mut(&key) else {
            return Ok(());
        };
        connection.state = ChannelState::Ready;
        let url = connection.url().cloned();
        info!("channel {} ready", key.to_u64());
        if let Some(url) = &url {
            self.pending_reconnect.retain(|pending| pending != url);
        }
        self.push_event(NodeEvent::Connected { url });
        Ok(())
    }

    fn receive_object_list(&mut self, key: ChannelKey, objects: Vec<ObjectInfo>) {
        let Some(connection) = self.connections.get_mut(&key) else {
            return;
        };
        let mut names = Vec::new();
        for info in objects {
            debug!("channel {} announced '{}'", key.to_u64(), info.name);
            names.push(info.name.clone());
            connection.announced.insert(info.name.clone(), info);
        }
        let url = connection.url().cloned();
        if let Some(url) = url {
            self.announced_by_url
                .entry(url)
                .or_default()
                .extend(names.iter().cloned());
        }
        for name in names {
            let waiting = self
                .replicas
                .get(&name)
                .map_or(false, |slot| slot.is_waiting());
            if waiting {
                self.bind_replica(&name, key);
            }
        }
    }

    /// Binds a waiting replica to any ready channel announcing its name, or
    /// dials the location the registry knows for it.
    pub(crate) fn bind_waiting_replica(&mut self, name: &str) {
        let waiting = self
            .replicas
            .get(name)
            .map_or(false, |slot| slot.is_waiting());
        if !waiting {
            return;
        }

        let announced = self
            .connections
            .values()
            .find(|connection| {
                connection.is_client()
                    && connection.is_ready()
                    && connection.announced.contains_key(name)
            })
            .map(|connection| connection.key);
        if let Some(key) = announced {
            self.bind_replica(name, key);
            return;
        }

        let location = self.registry.locations.get(name).cloned();
        if let Some(location) = location {
            self.dial(&location.url);
        }
    }

    /// Opens a channel to `url` unless one is already open or pending retry
    pub(crate) fn dial(&mut self, url: &str) {
        let Ok(url) = super::node::parse_url(url) else {
            warn!("cannot dial invalid url '{}'", url);
            return;
        };
        if self.client_channel_for(&url).is_some() {
            return;
        }
        if let Err(error) = self.open_client(&url) {
            debug!("connecting to {} failed: {}", url, error);
            self.schedule_reconnect(url);
        }
    }

    /// Subscribes a waiting replica over `key`. A static replica whose
    /// signature differs from the announced one stops here for good.
    fn bind_replica(&mut self, name: &str, key: ChannelKey) {
        let Some(inner) = self.replica_impl(name) else {
            return;
        };
        let Some(info) = self
            .connections
            .get(&key)
            .and_then(|connection| connection.announced.get(name))
            .cloned()
        else {
            return;
        };

        let (dynamic, signature) = {
            let replica = inner.borrow();
            (
                replica.is_dynamic(),
                replica.descriptor().map(|descriptor| descriptor.signature()),
            )
        };
        if !dynamic && signature.as_deref() != Some(info.signature.as_str()) {
            warn!(
                "replica '{}' does not match the signature announced on channel {}",
                name,
                key.to_u64()
            );
            self.transition(name, ReplicaState::SignatureMismatch);
            return;
        }

        if let Some(slot) = self.replicas.get_mut(name) {
            slot.channel = Some(key);
            slot.ping_outstanding = false;
        }
        debug!("replica '{}' subscribing on channel {}", name, key.to_u64());
        self.send_to(
            key,
            &Packet::AddObject {
                name: name.to_string(),
                dynamic,
            },
        );
    }

    /// The replica named `name` if it is bound to `key`
    fn bound_replica(&self, key: ChannelKey, name: &str) -> bool {
        let bound = self
            .replicas
            .get(name)
            .map_or(false, |slot| slot.channel == Some(key));
        if !bound {
            debug!("channel {}: no replica bound for '{}'", key.to_u64(), name);
        }
        bound && self.replica_impl(name).is_some()
    }

    fn receive_init(
        &mut self,
        key: ChannelKey,
        name: String,
        values: Vec<Value>,
    ) -> Result<(), NodeError> {
        if !self.bound_replica(key, &name) {
            return Ok(());
        }
        let Some(inner) = self.replica_impl(&name) else {
            return Ok(());
        };
        let expected = inner
            .borrow()
            .descriptor()
            .map(|descriptor| descriptor.property_count());
        let well_typed = inner.borrow().accepts_snapshot(&values);

        match expected {
            Some(_) if well_typed => {
                self.initialize_replica(&name, values);
                Ok(())
            }
            Some(expected) if expected != values.len() => {
                warn!(
                    "snapshot for '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    expected
                );
                self.mismatch_replica(&name);
                Ok(())
            }
            Some(_) => {
                warn!("snapshot for '{}' does not match the declared property types", name);
                self.mismatch_replica(&name);
                Ok(())
            }
            None => Err(NodeError::InvalidSnapshot {
                name,
                expected: 0,
                received: values.len(),
            }),
        }
    }

    fn receive_init_dynamic(
        &mut self,
        key: ChannelKey,
        name: String,
        descriptor: Descriptor,
        values: Vec<Value>,
    ) -> Result<(), NodeError> {
        descriptor.validate()?;
        if descriptor.property_count() != values.len() {
            return Err(NodeError::InvalidSnapshot {
                name,
                expected: descriptor.property_count(),
                received: values.len(),
            });
        }
        if !descriptor.accepts_values(&values) {
            return Err(NodeError::MistypedSnapshot { name });
        }
        if !self.bound_replica(key, &name) {
            return Ok(());
        }
        let Some(inner) = self.replica_impl(&name) else {
            return Ok(());
        };

        let dynamic = inner.borrow().is_dynamic();
        if !dynamic {
            let signature = inner
                .borrow()
                .descriptor()
                .map(|current| current.signature());
            if signature != Some(descriptor.signature()) {
                self.mismatch_replica(&name);
            } else {
                self.initialize_replica(&name, values);
            }
            return Ok(());
        }

        let (shared, refs) = self.type_table.register(descriptor);
        if let Some(connection) = self.connections.get_mut(&key) {
            connection.dynamic_types.extend(refs);
        }
        let accepted = inner.borrow_mut().set_descriptor(shared);
        if accepted {
            self.initialize_replica(&name, values);
        } else {
            warn!("source '{}' changed its type between initializations", name);
            self.mismatch_replica(&name);
        }
        Ok(())
    }

    /// Applies a full snapshot and reports it: state change, Initialized,
    /// one PropertyChanged per differing value, then Notified.
    fn initialize_replica(&mut self, name: &str, values: Vec<Value>) {
        let Some(inner) = self.replica_impl(name) else {
            return;
        };
        let changed = inner.borrow_mut().initialize(values.clone());
        self.transition(name, ReplicaState::Valid);
        if let Some(slot) = self.replicas.get_mut(name) {
            slot.heartbeat.reset();
            slot.ping_outstanding = false;
        }

        self.push_event(NodeEvent::Initialized {
            name: name.to_string(),
            values: values.clone(),
        });
        for index in changed {
            if let Some(value) = values.get(index) {
                self.push_event(NodeEvent::PropertyChanged {
                    name: name.to_string(),
                    index,
                    value: value.clone(),
                });
            }
        }
        self.push_event(NodeEvent::Notified {
            name: name.to_string(),
        });

        self.replica_initialized(name, &values);
    }

    /// Unbinds a replica for good after a signature check failed
    fn mismatch_replica(&mut self, name: &str) {
        let key = self.replicas.get_mut(name).and_then(|slot| slot.channel.take());
        if let Some(key) = key {
            self.send_to(
                key,
                &Packet::RemoveObject {
                    name: name.to_string(),
                },
            );
        }
        if let Some(inner) = self.replica_impl(name) {
            inner.borrow_mut().fail_pending(CallError::Disconnected);
        }
        self.transition(name, ReplicaState::SignatureMismatch);
    }

    fn receive_property_change(&mut self, key: ChannelKey, name: String, index: i32, value: Value) {
        if !self.bound_replica(key, &name) {
            return;
        }
        let Some(inner) = self.replica_impl(&name) else {
            return;
        };
        let Ok(slot) = usize::try_from(index) else {
            warn!("property change for '{}' has invalid index {}", name, index);
            return;
        };
        let update = {
            let mut replica = inner.borrow_mut();
            if replica.state() != ReplicaState::Valid {
                debug!("property change for '{}' before initialization dropped", name);
                return;
            }
            replica.apply_property_change(slot, value.clone())
        };
        match update {
            PropertyUpdate::Applied => {}
            PropertyUpdate::UnknownIndex => {
                warn!("property change for '{}' has unknown index {}", name, index);
                return;
            }
            PropertyUpdate::WrongType => {
                warn!("property change for '{}' index {} has the wrong type, dropped", name, index);
                return;
            }
        }
        self.push_event(NodeEvent::PropertyChanged {
            name,
            index: slot,
            value,
        });
    }

    fn receive_event(
        &mut self,
        key: ChannelKey,
        name: String,
        call: InvokeCall,
        index: i32,
        args: Vec<Value>,
    ) {
        if call != InvokeCall::InvokeMethod {
            warn!("channel {}: {:?} sent to a replica dropped", key.to_u64(), call);
            return;
        }
        if !self.bound_replica(key, &name) {
            return;
        }
        let known = usize::try_from(index).ok().filter(|slot| {
            self.replica_impl(&name).map_or(false, |inner| {
                let replica = inner.borrow();
                replica
                    .descriptor()
                    .map_or(false, |descriptor| descriptor.event(*slot).is_some())
            })
        });
        let Some(index) = known else {
            warn!("event {} of '{}' is unknown, dropped", index, name);
            return;
        };

        self.replica_event(&name, index, &args);
        self.push_event(NodeEvent::EventEmitted { name, index, args });
    }

    fn receive_reply(&mut self, name: String, serial_id: i32, value: Value) {
        let Some(inner) = self.replica_impl(&name) else {
            debug!("reply {} for dropped replica '{}' discarded", serial_id, name);
            return;
        };
        let resolved = inner.borrow_mut().resolve_reply(serial_id, value);
        if resolved {
            self.push_event(NodeEvent::CallFinished { name, serial_id });
        } else {
            debug!("reply {} for '{}' has no waiting call, discarded", serial_id, name);
        }
    }

    fn receive_remove_object(&mut self, key: ChannelKey, name: &str) {
        if let Some(connection) = self.connections.get_mut(&key) {
            connection.announced.remove(name);
        }
        let bound = self
            .replicas
            .get_mut(name)
            .filter(|slot| slot.channel == Some(key))
            .map(|slot| {
                slot.channel = None;
                slot.ping_outstanding = false;
            })
            .is_some();
        if !bound {
            return;
        }
        info!("source '{}' went away", name);
        self.suspect_replica(name);
        self.bind_waiting_replica(name);
    }

    /// Marks a replica that lost its source. It keeps its cached values.
    pub(crate) fn suspect_replica(&mut self, name: &str) {
        let Some(inner) = self.replica_impl(name) else {
            return;
        };
        inner.borrow_mut().fail_pending(CallError::Disconnected);
        let state = inner.borrow().state();
        if state == ReplicaState::Valid {
            self.transition(name, ReplicaState::Suspect);
        }
    }
}
