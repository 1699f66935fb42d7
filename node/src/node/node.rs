use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
    rc::{Rc, Weak},
    thread,
    time::{Duration, Instant},
};

use log::{info, warn};
use url::Url;

use remora_shared::{
    Descriptor, IoDevice, IoServer, Packet, SourceLocation, Timer, TransportError,
    TransportFactory,
};

use crate::{
    connection::{ChannelKey, Connection, ConnectionRole},
    error::NodeError,
    events::{Events, NodeEvent},
    pending_call::{CallError, PendingCall},
    registry::{registry_descriptor, RegistrySource, REGISTRY_NAME},
    replica::{Replica, ReplicaImpl, ReplicaState},
    source::{DeferredReply, RootSource, SourceDirectory, SourceObject},
    transport::TransportRegistry,
    type_table::DynamicTypeTable,
};

use super::NodeConfig;

/// Bookkeeping for one acquired replica name. The node never keeps a
/// replica alive.
pub(crate) struct ReplicaSlot {
    pub replica: Weak<RefCell<ReplicaImpl>>,
    pub channel: Option<ChannelKey>,
    pub heartbeat: Timer,
    pub ping_outstanding: bool,
}

impl ReplicaSlot {
    /// Alive, unbound and still able to bind
    pub fn is_waiting(&self) -> bool {
        let Some(replica) = self.replica.upgrade() else {
            return false;
        };
        let state = replica.borrow().state();
        self.channel.is_none() && !state.is_terminal()
    }
}

/// A method reply the source completes on a later `receive()`
pub(crate) struct DeferredCall {
    pub channel: ChannelKey,
    pub name: String,
    pub serial_id: i32,
    pub reply: DeferredReply,
}

/// Discovery state: the registry this node talks to and what it learned
#[derive(Default)]
pub(crate) struct RegistryLink {
    pub url: Option<Url>,
    pub replica: Option<Replica>,
    pub hosted: Option<Rc<RefCell<RegistrySource>>>,
    pub locations: BTreeMap<String, SourceLocation>,
    /// Sources this node has published to the registry
    pub published: BTreeMap<String, SourceLocation>,
    /// Locations each host channel published to the hosted registry
    pub host_urls: HashMap<ChannelKey, HashSet<String>>,
}

/// A process-local coordinator of channels, sources and replicas.
///
/// The node does nothing on its own: call [`Node::receive`] regularly to
/// accept peers, read packets, broadcast source changes, send queued replica
/// requests, run heartbeats and retry lost channels.
pub struct Node {
    pub(crate) config: NodeConfig,
    pub(crate) transports: TransportRegistry,
    pub(crate) connections: BTreeMap<ChannelKey, Connection>,
    next_channel_key: u64,
    pub(crate) servers: Vec<Box<dyn IoServer>>,
    pub(crate) host_url: Option<Url>,
    pub(crate) sources: SourceDirectory,
    pub(crate) deferred_replies: Vec<DeferredCall>,
    pub(crate) replicas: HashMap<String, ReplicaSlot>,
    pub(crate) type_table: DynamicTypeTable,
    pub(crate) retry_timer: Timer,
    pub(crate) pending_reconnect: Vec<Url>,
    /// Every source name a node we dialed has announced, by URL
    pub(crate) announced_by_url: HashMap<Url, HashSet<String>>,
    pub(crate) failed_channels: Vec<ChannelKey>,
    pub(crate) registry: RegistryLink,
    pub(crate) incoming_events: Events,
}

impl Node {
    /// Create a new Node with the `tcp` and (on unix) `local` transports
    pub fn new(config: NodeConfig) -> Self {
        let retry_timer = Timer::new(config.retry_interval);
        Self {
            config,
            transports: TransportRegistry::with_defaults(),
            connections: BTreeMap::new(),
            next_channel_key: 0,
            servers: Vec::new(),
            host_url: None,
            sources: SourceDirectory::default(),
            deferred_replies: Vec::new(),
            replicas: HashMap::new(),
            type_table: DynamicTypeTable::new(),
            retry_timer,
            pending_reconnect: Vec::new(),
            announced_by_url: HashMap::new(),
            failed_channels: Vec::new(),
            registry: RegistryLink::default(),
            incoming_events: Events::new(),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Makes URLs with this scheme reachable, replacing any previous backend
    pub fn register_transport(&mut self, scheme: &str, factory: Box<dyn TransportFactory>) {
        self.transports.register(scheme, factory);
    }

    // Hosting

    /// Starts accepting peers at `url`. Returns the bound URL, with any
    /// wildcard port resolved. The first bound URL is the one published to
    /// the registry.
    pub fn listen(&mut self, url: &str) -> Result<Url, NodeError> {
        let url = parse_url(url)?;
        let server = self.transports.listen(&url, &self.config.connection)?;
        let bound = server.url().clone();
        info!("node listening on {}", bound);
        self.servers.push(server);
        if self.host_url.is_none() {
            self.host_url = Some(bound.clone());
        }
        Ok(bound)
    }

    pub fn host_url(&self) -> Option<&Url> {
        self.host_url.as_ref()
    }

    /// Serves an already connected device as if it had been accepted
    pub fn add_host_device(&mut self, device: Box<dyn IoDevice>) -> ChannelKey {
        self.accept_device(device)
    }

    /// Exposes `object` to remote replicas under `name`.
    ///
    /// The node holds the object weakly: dropping the last `Rc` tears the
    /// source down on the next `receive()`.
    pub fn enable_remoting<T: SourceObject + 'static>(
        &mut self,
        name: &str,
        object: &Rc<RefCell<T>>,
        descriptor: Descriptor,
    ) -> Result<(), NodeError> {
        if name.is_empty() {
            return Err(NodeError::EmptyObjectName);
        }
        if self.sources.contains(name) {
            return Err(NodeError::SourceAlreadyRegistered {
                name: name.to_string(),
            });
        }
        descriptor.validate()?;

        let object: Rc<RefCell<dyn SourceObject>> = object.clone();
        let source = RootSource::new(name, descriptor, &object)?;
        let info = source.object_info();
        self.sources.register(source)?;
        info!("source '{}' ({}) enabled", name, info.type_name);

        self.broadcast_to_hosts(&Packet::ObjectList {
            objects: vec![info],
        });
        Ok(())
    }

    /// Stops serving `name`. Subscribed replicas become suspect.
    pub fn disable_remoting(&mut self, name: &str) -> Result<(), NodeError> {
        match self.remove_source(name) {
            true => Ok(()),
            false => Err(NodeError::SourceNotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn is_remoting(&self, name: &str) -> bool {
        self.sources.contains(name)
    }

    /// Names of the enabled sources, sorted
    pub fn source_names(&self) -> Vec<String> {
        self.sources.names()
    }

    pub(crate) fn remove_source(&mut self, name: &str) -> bool {
        if self.sources.remove(name).is_none() {
            return false;
        }
        info!("source '{}' disabled", name);
        self.deferred_replies.retain(|call| call.name != name);
        self.broadcast_to_hosts(&Packet::RemoveObject {
            name: name.to_string(),
        });
        for connection in self.connections.values_mut() {
            connection.subscriptions.remove(name);
        }
        self.unpublish_source(name);
        true
    }

    // Replicas

    /// Opens a channel to the node at `url`. Replicas bind to it once the
    /// peer announces their name.
    ///
    /// A transport failure is returned, but the URL is retried every
    /// `retry_interval` while a replica waits for a source it may serve.
    pub fn connect_to_node(&mut self, url: &str) -> Result<ChannelKey, NodeError> {
        let url = parse_url(url)?;
        if let Some(key) = self.client_channel_for(&url) {
            return Ok(key);
        }
        match self.open_client(&url) {
            Ok(key) => Ok(key),
            Err(error) => {
                if !matches!(error, TransportError::UnsupportedScheme { .. }) {
                    self.schedule_reconnect(url);
                }
                Err(error.into())
            }
        }
    }

    /// Drives an already connected device as if this node had opened it.
    /// Such channels are not retried when lost.
    pub fn add_client_device(&mut self, device: Box<dyn IoDevice>) -> ChannelKey {
        self.insert_connection(ConnectionRole::Client { url: None }, device)
    }

    /// Acquires a replica whose type is known up front. The source must
    /// announce the same descriptor signature.
    ///
    /// Acquiring a name again returns a handle to the same replica.
    pub fn acquire(&mut self, name: &str, descriptor: Descriptor) -> Result<Replica, NodeError> {
        descriptor.validate()?;
        let wanted = descriptor.signature();
        self.acquire_with(name, |existing| match existing {
            Some(existing) => match existing.descriptor() {
                Some(current) if !existing.is_dynamic() && current.signature() == wanted => Ok(None),
                _ => Err(()),
            },
            None => Ok(Some(ReplicaImpl::new_static(name, descriptor))),
        })
    }

    /// Acquires a replica whose descriptor is learned from the source
    pub fn acquire_dynamic(&mut self, name: &str) -> Result<Replica, NodeError> {
        self.acquire_with(name, |existing| match existing {
            Some(existing) if existing.is_dynamic() => Ok(None),
            Some(_) => Err(()),
            None => Ok(Some(ReplicaImpl::new_dynamic(name))),
        })
    }

    /// `create` sees the live replica under `name`, if any, and returns a new
    /// implementation, `None` to share the existing one, or `Err` on a type
    /// conflict.
    fn acquire_with(
        &mut self,
        name: &str,
        create: impl FnOnce(Option<&ReplicaImpl>) -> Result<Option<ReplicaImpl>, ()>,
    ) -> Result<Replica, NodeError> {
        if name.is_empty() {
            return Err(NodeError::EmptyObjectName);
        }

        let existing = self
            .replicas
            .get(name)
            .and_then(|slot| slot.replica.upgrade());
        let conflict = || NodeError::ReplicaTypeConflict {
            name: name.to_string(),
        };
        let created = match &existing {
            Some(inner) => create(Some(&*inner.borrow())).map_err(|_| conflict())?,
            None => create(None).map_err(|_| conflict())?,
        };

        let inner = match (existing, created) {
            (Some(inner), None) => return Ok(Replica::new(inner)),
            (_, Some(created)) => Rc::new(RefCell::new(created)),
            (None, None) => return Err(conflict()),
        };

        info!("replica '{}' acquired", name);
        self.replicas.insert(
            name.to_string(),
            ReplicaSlot {
                replica: Rc::downgrade(&inner),
                channel: None,
                heartbeat: Timer::new(self.config.heartbeat_interval),
                ping_outstanding: false,
            },
        );
        self.bind_waiting_replica(name);
        Ok(Replica::new(inner))
    }

    // Discovery

    /// Serves the registry from this node. Sources enabled here are published
    /// to it directly.
    pub fn host_registry(&mut self) -> Result<(), NodeError> {
        if self.registry.hosted.is_some() {
            return Ok(());
        }
        let registry = Rc::new(RefCell::new(RegistrySource::new()));
        self.enable_remoting(REGISTRY_NAME, &registry, registry_descriptor()?)?;
        self.registry.hosted = Some(registry);
        self.registry.url = self.host_url.clone();
        self.registry.published.clear();
        Ok(())
    }

    /// Uses the registry at `url` to publish this node's sources and to find
    /// the sources that acquired replicas are waiting for.
    pub fn set_registry_url(&mut self, url: &str) -> Result<(), NodeError> {
        let parsed = parse_url(url)?;
        if self.registry.url.as_ref() == Some(&parsed) && self.registry.replica.is_some() {
            return Ok(());
        }
        let replica = self.acquire(REGISTRY_NAME, registry_descriptor()?)?;
        self.registry.replica = Some(replica);
        self.registry.url = Some(parsed);
        self.registry.published.clear();

        if let Err(error) = self.connect_to_node(url) {
            warn!("registry at {} is not reachable yet: {}", url, error);
        }
        Ok(())
    }

    pub fn registry_url(&self) -> Option<&Url> {
        self.registry.url.as_ref()
    }

    /// Every source location currently known through the registry
    pub fn registry_locations(&self) -> Vec<SourceLocation> {
        match &self.registry.hosted {
            Some(hosted) => hosted.borrow().locations(),
            None => self.registry.locations.values().cloned().collect(),
        }
    }

    // Event loop

    /// Runs one iteration of the node and returns what happened
    pub fn receive(&mut self) -> Events {
        self.update();
        std::mem::take(&mut self.incoming_events)
    }

    /// Runs the node until `replica` is valid or `timeout` elapses. Events
    /// seen meanwhile are kept for the next `receive()`.
    pub fn wait_for_source(&mut self, replica: &Replica, timeout: Duration) -> bool {
        self.run_until(timeout, |_| replica.is_valid())
    }

    /// Runs the node until `call` finishes or `timeout` elapses. On timeout
    /// the call fails with [`CallError::Timeout`] and a later reply is
    /// discarded.
    pub fn wait_for_finished(&mut self, call: &PendingCall, timeout: Duration) -> bool {
        if self.run_until(timeout, |_| call.is_finished()) {
            return true;
        }
        call.fail(CallError::Timeout);
        if let Some(inner) = self
            .replicas
            .get(call.replica_name())
            .and_then(|slot| slot.replica.upgrade())
        {
            inner.borrow_mut().forget_call(call.serial_id());
        }
        false
    }

    fn run_until(&mut self, timeout: Duration, done: impl Fn(&Node) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.update();
            if done(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// URLs waiting for the next reconnect attempt
    pub fn pending_reconnects(&self) -> Vec<Url> {
        self.pending_reconnect.clone()
    }

    pub fn channel_count(&self) -> usize {
        self.connections.len()
    }

    /// Types learned from dynamic replicas, shared across channels
    pub fn type_table(&self) -> &DynamicTypeTable {
        &self.type_table
    }

    // Internals shared by the other node modules

    pub(crate) fn insert_connection(
        &mut self,
        role: ConnectionRole,
        device: Box<dyn IoDevice>,
    ) -> ChannelKey {
        let key = ChannelKey::new(self.next_channel_key);
        self.next_channel_key += 1;
        let connection = Connection::new(key, role, device, &self.config.connection);
        self.connections.insert(key, connection);
        key
    }

    pub(crate) fn send_to(&mut self, key: ChannelKey, packet: &Packet) {
        let Some(connection) = self.connections.get_mut(&key) else {
            return;
        };
        if let Err(error) = connection.send(packet) {
            warn!("channel {}: send failed: {}", key.to_u64(), error);
            if !self.failed_channels.contains(&key) {
                self.failed_channels.push(key);
            }
        }
    }

    pub(crate) fn push_event(&mut self, event: NodeEvent) {
        self.incoming_events.push(event);
    }

    pub(crate) fn replica_impl(&self, name: &str) -> Option<Rc<RefCell<ReplicaImpl>>> {
        self.replicas.get(name).and_then(|slot| slot.replica.upgrade())
    }

    /// Moves a replica to `state`, reporting the transition
    pub(crate) fn transition(&mut self, name: &str, state: ReplicaState) {
        let Some(inner) = self.replica_impl(name) else {
            return;
        };
        let transition = inner.borrow_mut().set_state(state);
        if let Some((old, new)) = transition {
            self.push_event(NodeEvent::StateChanged {
                name: name.to_string(),
                old,
                new,
            });
        }
    }
}

pub(crate) fn parse_url(url: &str) -> Result<Url, NodeError> {
    Url::parse(url).map_err(|error| NodeError::InvalidUrl {
        url: url.to_string(),
        reason: error.to_string(),
    })
}
