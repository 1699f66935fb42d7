use std::{
    thread,
    time::{Duration, Instant},
};

use log::debug;

use remora::{transport::MemoryNetwork, Node, NodeConfig, NodeEvent};

/// Index of a node in a [`Cluster`]
pub type NodeId = usize;

pub fn mem_url(name: &str) -> String {
    format!("mem:{}", name)
}

struct Member {
    name: String,
    node: Node,
    events: Vec<NodeEvent>,
}

/// Nodes sharing one in-memory network, stepped together on the test thread.
/// Every event a node produces is kept until taken.
pub struct Cluster {
    pub network: MemoryNetwork,
    members: Vec<Option<Member>>,
}

impl Cluster {
    pub const HOST: NodeId = 0;
    pub const CLIENT: NodeId = 1;

    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
            members: Vec::new(),
        }
    }

    /// A host listening on `mem:host` and a client connected to it
    pub fn pair() -> Self {
        Self::pair_with(NodeConfig::default(), NodeConfig::default())
    }

    pub fn pair_with(host_config: NodeConfig, client_config: NodeConfig) -> Self {
        let mut cluster = Self::new();
        cluster.add_listening_node("host", host_config);
        cluster.add_node("client", client_config);
        cluster
            .node(Self::CLIENT)
            .connect_to_node(&mem_url("host"))
            .expect("host is listening");
        cluster
    }

    pub fn add_node(&mut self, name: &str, config: NodeConfig) -> NodeId {
        let mut node = Node::new(config);
        node.register_transport("mem", Box::new(self.network.clone()));
        self.members.push(Some(Member {
            name: name.to_string(),
            node,
            events: Vec::new(),
        }));
        self.members.len() - 1
    }

    /// Adds a node listening on `mem:<name>`
    pub fn add_listening_node(&mut self, name: &str, config: NodeConfig) -> NodeId {
        let id = self.add_node(name, config);
        self.node(id)
            .listen(&mem_url(name))
            .expect("address is free");
        id
    }

    pub fn node(&mut self, id: NodeId) -> &mut Node {
        &mut self.member(id).node
    }

    /// Drops a node with all its channels and sources
    pub fn remove_node(&mut self, id: NodeId) {
        if let Some(member) = self.members.get_mut(id).and_then(Option::take) {
            debug!("removing node '{}'", member.name);
        }
    }

    pub fn events(&mut self, id: NodeId) -> &[NodeEvent] {
        &self.member(id).events
    }

    pub fn take_events(&mut self, id: NodeId) -> Vec<NodeEvent> {
        std::mem::take(&mut self.member(id).events)
    }

    /// Runs `receive()` once on every node
    pub fn step(&mut self) {
        for member in self.members.iter_mut().flatten() {
            let events = member.node.receive();
            member.events.extend(events);
        }
    }

    pub fn step_n(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.step();
        }
    }

    /// Steps until `done` holds or `timeout` elapses
    pub fn run_until(&mut self, timeout: Duration, mut done: impl FnMut(&mut Cluster) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.step();
            if done(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Steps for at least `duration`
    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(duration, |_| false);
    }

    fn member(&mut self, id: NodeId) -> &mut Member {
        self.members
            .get_mut(id)
            .and_then(Option::as_mut)
            .expect("node exists")
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}
