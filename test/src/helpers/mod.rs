pub mod cluster;
pub mod fake_peer;

pub use cluster::{mem_url, Cluster, NodeId};
pub use fake_peer::FakePeer;

use remora::NodeEvent;

/// Position of the first event matching `predicate`
pub fn position_of(events: &[NodeEvent], predicate: impl Fn(&NodeEvent) -> bool) -> Option<usize> {
    events.iter().position(predicate)
}

pub fn count_of(events: &[NodeEvent], predicate: impl Fn(&NodeEvent) -> bool) -> usize {
    events.iter().filter(|event| predicate(event)).count()
}
