use log::{debug, info, warn};

use remora_shared::{InvokeCall, IoDevice, Packet, Value};

use crate::{
    connection::{ChannelKey, ChannelState, ConnectionRole},
    error::NodeError,
    events::NodeEvent,
    registry::{ADD_SOURCE, REGISTRY_NAME},
    source::InvokeOutcome,
};

use super::node::{DeferredCall, Node};

impl Node {
    pub(crate) fn accept_connections(&mut self) {
        let mut accepted = Vec::new();
        for server in self.servers.iter_mut() {
            while let Some(device) = server.accept() {
                accepted.push(device);
            }
        }
        for device in accepted {
            self.accept_device(device);
        }
    }

    /// Registers an accepted device and greets the peer with the handshake
    /// and the list of enabled sources.
    pub(crate) fn accept_device(&mut self, device: Box<dyn IoDevice>) -> ChannelKey {
        let key = self.insert_connection(ConnectionRole::Host, device);
        info!("channel {} accepted", key.to_u64());

        let handshake = Packet::Handshake {
            protocol_version: self.config.protocol_version.clone(),
        };
        let objects = Packet::ObjectList {
            objects: self.sources.object_list(),
        };
        self.send_to(key, &handshake);
        self.send_to(key, &objects);
        if let Some(connection) = self.connections.get_mut(&key) {
            connection.state = ChannelState::Ready;
        }
        key
    }

    /// Sends `packet` to every channel this node accepted
    pub(crate) fn broadcast_to_hosts(&mut self, packet: &Packet) {
        let keys: Vec<ChannelKey> = self
            .connections
            .values()
            .filter(|connection| !connection.is_client() && connection.is_ready())
            .map(|connection| connection.key)
            .collect();
        for key in keys {
            self.send_to(key, packet);
        }
    }

    pub(crate) fn handle_host_packet(
        &mut self,
        key: ChannelKey,
        packet: Packet,
    ) -> Result<(), NodeError> {
        match packet {
            Packet::AddObject { name, dynamic } => {
                self.subscribe(key, &name, dynamic);
                Ok(())
            }
            Packet::RemoveObject { name } => {
                if let Some(source) = self.sources.get_mut(&name) {
                    let remaining = source.remove_listener(key);
                    debug!("source '{}' has {} listeners left", name, remaining);
                }
                if let Some(connection) = self.connections.get_mut(&key) {
                    connection.subscriptions.remove(&name);
                }
                Ok(())
            }
            Packet::Invoke {
                name,
                call,
                index,
                args,
                serial_id,
                ..
            } => {
                self.serve_invoke(key, name, call, index, args, serial_id);
                Ok(())
            }
            Packet::Ping { name } => {
                self.send_to(key, &Packet::Pong { name });
                Ok(())
            }
            other => Err(NodeError::UnexpectedPacket {
                packet_type: other.packet_type(),
                role: "host",
            }),
        }
    }

    /// Changes queued before the subscription go to the existing listeners
    /// only, since the snapshot already holds them.
    fn subscribe(&mut self, key: ChannelKey, name: &str, dynamic: bool) {
        if !self.sources.contains(name) {
            warn!("channel {} subscribed to unknown source '{}'", key.to_u64(), name);
            return;
        }
        self.flush_source_signals(name);
        let Some(source) = self.sources.get_mut(name) else {
            return;
        };
        match source.add_listener(key, dynamic) {
            Ok(init) => {
                if let Some(connection) = self.connections.get_mut(&key) {
                    connection.subscriptions.insert(name.to_string());
                }
                self.send_to(key, &init);
            }
            Err(error) => {
                warn!("cannot subscribe channel {} to '{}': {}", key.to_u64(), name, error);
                self.push_event(NodeEvent::Error(error.into()));
            }
        }
    }

    fn serve_invoke(
        &mut self,
        key: ChannelKey,
        name: String,
        call: InvokeCall,
        index: i32,
        args: Vec<Value>,
        serial_id: i32,
    ) {
        if name == REGISTRY_NAME && call == InvokeCall::InvokeMethod && index == ADD_SOURCE as i32 {
            self.record_published_url(key, &args);
        }

        let Some(source) = self.sources.get_mut(&name) else {
            warn!("invoke on unknown source '{}' dropped", name);
            return;
        };
        let outcome = match source.handle_invoke(call, index, args) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!("invoke on '{}' dropped: {}", name, error);
                self.push_event(NodeEvent::Error(error.into()));
                return;
            }
        };

        if serial_id < 0 {
            return;
        }
        match outcome {
            InvokeOutcome::Reply(value) => {
                let reply = Packet::InvokeReply {
                    name,
                    serial_id,
                    value,
                };
                self.send_to(key, &reply);
            }
            InvokeOutcome::Deferred(reply) => self.deferred_replies.push(DeferredCall {
                channel: key,
                name,
                serial_id,
                reply,
            }),
            InvokeOutcome::None => {
                let reply = Packet::InvokeReply {
                    name,
                    serial_id,
                    value: Value::Null,
                };
                self.send_to(key, &reply);
            }
        }
    }

    /// Forwards queued property changes and events of every source to its
    /// listeners
    pub(crate) fn broadcast_source_signals(&mut self) {
        for name in self.sources.names() {
            self.flush_source_signals(&name);
        }
    }

    fn flush_source_signals(&mut self, name: &str) {
        let Some(source) = self.sources.get_mut(name) else {
            return;
        };
        let packets = match source.take_signal_packets() {
            Ok(packets) => packets,
            Err(error) => {
                debug!("skipping signals of '{}': {}", name, error);
                return;
            }
        };
        if packets.is_empty() {
            return;
        }
        let listeners = source.listeners().to_vec();
        for key in listeners {
            for packet in &packets {
                self.send_to(key, packet);
            }
        }
    }

    pub(crate) fn send_deferred_replies(&mut self) {
        let mut ready = Vec::new();
        self.deferred_replies.retain(|call| {
            if let Some(value) = call.reply.take() {
                ready.push((call.channel, call.name.clone(), call.serial_id, value));
                return false;
            }
            if call.reply.is_abandoned() {
                warn!(
                    "reply {} of '{}' was abandoned before completing",
                    call.serial_id, call.name
                );
                return false;
            }
            true
        });
        for (key, name, serial_id, value) in ready {
            self.send_to(
                key,
                &Packet::InvokeReply {
                    name,
                    serial_id,
                    value,
                },
            );
        }
    }
}
