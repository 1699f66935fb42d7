use remora_shared::{SourceLocation, Value};
use url::Url;

use crate::{error::NodeError, replica::ReplicaState};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// A channel this node opened completed its handshake; `url` is unset
    /// for externally supplied devices
    Connected { url: Option<Url> },
    /// A channel closed; `url` is set for channels this node opened
    Disconnected { url: Option<Url> },
    StateChanged {
        name: String,
        old: ReplicaState,
        new: ReplicaState,
    },
    /// A replica received its full snapshot. Always precedes the
    /// PropertyChanged events of the same initialization.
    Initialized { name: String, values: Vec<Value> },
    PropertyChanged {
        name: String,
        index: usize,
        value: Value,
    },
    /// Marks the end of an initialization burst
    Notified { name: String },
    EventEmitted {
        name: String,
        index: usize,
        args: Vec<Value>,
    },
    /// A reply arrived for a call made with `invoke_with_reply`
    CallFinished { name: String, serial_id: i32 },
    SourceLocationAdded(SourceLocation),
    SourceLocationRemoved(SourceLocation),
    Error(NodeError),
}

/// Everything that happened during one call to `Node::receive`, in order.
#[derive(Debug, Default)]
pub struct Events {
    events: Vec<NodeEvent>,
}

impl Events {
    pub(crate) fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub(crate) fn push(&mut self, event: NodeEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeEvent> {
        self.events.iter()
    }

    /// Events concerning the replica or source with this name
    pub fn for_object<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a NodeEvent> + 'a {
        self.events.iter().filter(move |event| match event {
            NodeEvent::StateChanged { name: n, .. }
            | NodeEvent::Initialized { name: n, .. }
            | NodeEvent::PropertyChanged { name: n, .. }
            | NodeEvent::Notified { name: n }
            | NodeEvent::EventEmitted { name: n, .. }
            | NodeEvent::CallFinished { name: n, .. } => n == name,
            _ => false,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &NodeError> {
        self.events.iter().filter_map(|event| match event {
            NodeEvent::Error(error) => Some(error),
            _ => None,
        })
    }
}

impl IntoIterator for Events {
    type Item = NodeEvent;
    type IntoIter = std::vec::IntoIter<NodeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
