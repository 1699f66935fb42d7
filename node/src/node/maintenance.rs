use log::{debug, info, warn};
use url::Url;

use remora_shared::Packet;

use crate::{
    connection::{ChannelKey, ChannelState},
    error::NodeError,
    events::NodeEvent,
    pending_call::CallError,
    replica::ReplicaState,
};

use super::node::Node;

impl Node {
    /// One pass of the event loop
    pub(crate) fn update(&mut self) {
        self.accept_connections();
        self.read_connections();
        self.close_failed_channels();
        self.reap_replicas();
        self.reap_sources();
        self.sync_registry();
        self.broadcast_source_signals();
        self.send_deferred_replies();
        self.flush_replicas();
        self.send_heartbeats();
        self.close_failed_channels();
        self.retry_connections();
    }

    fn read_connections(&mut self) {
        let keys: Vec<ChannelKey> = self.connections.keys().copied().collect();
        for key in keys {
            let Some(connection) = self.connections.get_mut(&key) else {
                continue;
            };
            let client = connection.is_client();
            let result = connection.poll();

            let mut fatal = None;
            for packet in result.packets {
                let handled = match client {
                    true => self.handle_client_packet(key, packet),
                    false => self.handle_host_packet(key, packet),
                };
                match handled {
                    Ok(()) => {}
                    Err(error) if error.is_protocol_error() => {
                        fatal = Some(error);
                        break;
                    }
                    Err(error) => self.push_event(NodeEvent::Error(error)),
                }
            }

            if let Some(error) = fatal.or(result.codec_error.map(NodeError::Codec)) {
                self.fail_connection(key, error);
            } else if let Some(error) = result.transport_error {
                debug!("channel {} lost: {}", key.to_u64(), error);
                self.connection_lost(key);
            }
        }
    }

    pub(crate) fn close_failed_channels(&mut self) {
        for key in std::mem::take(&mut self.failed_channels) {
            if self.connections.contains_key(&key) {
                self.connection_lost(key);
            }
        }
    }

    /// Ends a channel after a protocol error. Its URL is not retried.
    pub(crate) fn fail_connection(&mut self, key: ChannelKey, error: NodeError) {
        warn!("channel {} closed: {}", key.to_u64(), error);
        let url = self.teardown_connection(key, ChannelState::ProtocolMismatch);
        if let Some(url) = &url {
            self.pending_reconnect.retain(|pending| pending != url);
        }
        self.push_event(NodeEvent::Error(error));
        self.push_event(NodeEvent::Disconnected { url });
    }

    /// Ends a channel after a transport failure and schedules a reconnect
    pub(crate) fn connection_lost(&mut self, key: ChannelKey) {
        let url = self.teardown_connection(key, ChannelState::Closed);
        info!("channel {} disconnected", key.to_u64());
        if let Some(url) = &url {
            self.schedule_reconnect(url.clone());
        }
        self.push_event(NodeEvent::Disconnected { url });
    }

    /// Closes and forgets a channel, releasing everything bound to it.
    /// Returns the URL if this node opened it.
    fn teardown_connection(&mut self, key: ChannelKey, state: ChannelState) -> Option<Url> {
        let mut connection = self.connections.remove(&key)?;
        connection.close(state);

        for type_ref in &connection.dynamic_types {
            self.type_table.release(type_ref);
        }

        // client side
        let bound: Vec<String> = self
            .replicas
            .iter_mut()
            .filter(|(_, slot)| slot.channel == Some(key))
            .map(|(name, slot)| {
                slot.channel = None;
                slot.ping_outstanding = false;
                name.clone()
            })
            .collect();
        for name in &bound {
            self.suspect_replica(name);
        }

        // host side
        self.sources.remove_listener_everywhere(key);
        self.deferred_replies.retain(|call| call.channel != key);
        self.host_channel_closed(key);

        connection.url().cloned()
    }

    /// Drops the slots of replicas whose last handle is gone and
    /// unsubscribes them
    fn reap_replicas(&mut self) {
        let dead: Vec<(String, Option<ChannelKey>)> = self
            .replicas
            .iter()
            .filter(|(_, slot)| slot.replica.strong_count() == 0)
            .map(|(name, slot)| (name.clone(), slot.channel))
            .collect();
        for (name, channel) in dead {
            self.replicas.remove(&name);
            debug!("replica '{}' released", name);
            if let Some(key) = channel {
                self.send_to(key, &Packet::RemoveObject { name });
            }
        }
    }

    fn reap_sources(&mut self) {
        for name in self.sources.dead_sources() {
            info!("live object behind '{}' was dropped", name);
            self.remove_source(&name);
        }
    }

    /// Sends the requests queued on replica handles
    fn flush_replicas(&mut self) {
        let names: Vec<String> = self.replicas.keys().cloned().collect();
        for name in names {
            let Some(inner) = self.replica_impl(&name) else {
                continue;
            };
            let packets = inner.borrow_mut().take_outbox();
            if packets.is_empty() {
                continue;
            }
            let channel = self
                .replicas
                .get(&name)
                .and_then(|slot| slot.channel)
                .filter(|key| self.connections.contains_key(key));

            match channel {
                Some(key) => {
                    for packet in &packets {
                        self.send_to(key, packet);
                    }
                }
                None => {
                    warn!("replica '{}' lost its channel, dropping {} requests", name, packets.len());
                    let mut replica = inner.borrow_mut();
                    for packet in packets {
                        if let Packet::Invoke { serial_id, .. } = packet {
                            if serial_id > 0 {
                                replica.fail_call(serial_id, CallError::Disconnected);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Pings the source of every valid replica once per heartbeat interval.
    /// A ping still unanswered at the next interval drops the channel.
    fn send_heartbeats(&mut self) {
        if self.config.heartbeat_interval.is_zero() {
            return;
        }
        let mut timed_out = Vec::new();
        let mut pings = Vec::new();

        for (name, slot) in self.replicas.iter_mut() {
            let Some(key) = slot.channel else {
                continue;
            };
            let Some(inner) = slot.replica.upgrade() else {
                continue;
            };
            let valid = inner.borrow().state() == ReplicaState::Valid;
            if !valid || !slot.heartbeat.ringing() {
                continue;
            }
            slot.heartbeat.reset();
            if slot.ping_outstanding {
                warn!("heartbeat of '{}' was not answered", name);
                timed_out.push((key, name.clone()));
            } else {
                slot.ping_outstanding = true;
                pings.push((key, name.clone()));
            }
        }

        for (key, name) in pings {
            self.send_to(key, &Packet::Ping { name });
        }
        for (key, name) in timed_out {
            self.push_event(NodeEvent::Error(NodeError::HeartbeatTimeout { name }));
            if self.connections.contains_key(&key) {
                self.connection_lost(key);
            }
        }
    }

    pub(crate) fn schedule_reconnect(&mut self, url: Url) {
        if !self.pending_reconnect.contains(&url) {
            debug!("{} scheduled for reconnect", url);
            if self.pending_reconnect.is_empty() {
                self.retry_timer.reset();
            }
            self.pending_reconnect.push(url);
        }
    }

    /// A URL is worth retrying while it is the registry or while a waiting
    /// replica may find its source there: the registry locates it at this
    /// URL, the node there announced it before, or that node was never
    /// reached and nobody knows what it serves yet.
    fn should_retry(&self, url: &Url) -> bool {
        if self.registry.url.as_ref() == Some(url) {
            return true;
        }
        let announced = self.announced_by_url.get(url);
        self.replicas
            .iter()
            .filter(|(_, slot)| slot.is_waiting())
            .any(|(name, _)| {
                let located_here = self
                    .registry
                    .locations
                    .get(name)
                    .and_then(|location| Url::parse(&location.url).ok())
                    .map_or(false, |located| &located == url);
                located_here || announced.map_or(true, |names| names.contains(name))
            })
    }

    fn retry_connections(&mut self) {
        if self.pending_reconnect.is_empty() || !self.retry_timer.ringing() {
            return;
        }
        self.retry_timer.reset();

        for url in std::mem::take(&mut self.pending_reconnect) {
            if !self.should_retry(&url) {
                debug!("no waiting replica needs {}, not retrying", url);
                continue;
            }
            if self.client_channel_for(&url).is_some() {
                continue;
            }
            match self.open_client(&url) {
                Ok(_) => info!("reconnecting to {}", url),
                Err(error) => {
                    debug!("reconnect to {} failed: {}", url, error);
                    self.pending_reconnect.push(url);
                }
            }
        }
    }
}
