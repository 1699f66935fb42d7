use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use remora::{NodeConfig, NodeError, NodeEvent, ReplicaState, Value};
use remora_test::{counter, counter_descriptor, mem_url, Cluster, Counter};

const TIMEOUT: Duration = Duration::from_secs(2);
const HOST: usize = Cluster::HOST;
const CLIENT: usize = Cluster::CLIENT;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fast_config() -> NodeConfig {
    NodeConfig {
        heartbeat_interval: Duration::from_millis(20),
        retry_interval: Duration::from_millis(30),
        ..NodeConfig::default()
    }
}

fn hosted_counter(cluster: &mut Cluster) -> Rc<RefCell<Counter>> {
    let object = Rc::new(RefCell::new(Counter::new(0)));
    cluster
        .node(HOST)
        .enable_remoting("counter", &object, counter_descriptor())
        .unwrap();
    object
}

#[test]
fn healthy_heartbeat_keeps_replica_valid() {
    init();
    let mut cluster = Cluster::pair_with(fast_config(), fast_config());
    let _object = hosted_counter(&mut cluster);
    let replica = cluster
        .node(CLIENT)
        .acquire("counter", counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));

    cluster.run_for(Duration::from_millis(150));
    assert!(replica.is_valid());
    assert!(!cluster
        .events(CLIENT)
        .iter()
        .any(|event| matches!(event, NodeEvent::Disconnected { .. })));
}

#[test]
fn unanswered_heartbeat_suspects_and_reconnects() {
    init();
    let mut cluster = Cluster::pair_with(fast_config(), fast_config());
    let object = hosted_counter(&mut cluster);
    let replica = cluster
        .node(CLIENT)
        .acquire("counter", counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));
    cluster.take_events(CLIENT);

    assert_eq!(cluster.network.freeze("host"), 1);
    let frozen_at = Instant::now();
    assert!(cluster.run_until(TIMEOUT, |_| replica.state() == ReplicaState::Suspect));
    // one interval to send the ping, one more to miss its pong
    let interval = fast_config().heartbeat_interval;
    assert!(frozen_at.elapsed() <= interval * 3);
    let timeout = NodeEvent::Error(NodeError::HeartbeatTimeout {
        name: "counter".to_string(),
    });
    assert!(cluster.events(CLIENT).contains(&timeout));

    // the frozen link stays frozen, the reconnect opens a fresh one
    object.borrow_mut().set_count(6);
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(6)));
}

#[test]
fn severed_channel_is_reopened() {
    init();
    let mut cluster = Cluster::pair_with(NodeConfig::default(), fast_config());
    let _object = hosted_counter(&mut cluster);
    let replica = cluster
        .node(CLIENT)
        .acquire("counter", counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));

    cluster.network.sever("host");
    assert!(cluster.run_until(TIMEOUT, |_| replica.state() == ReplicaState::Suspect));
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(0)));

    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));
    assert_eq!(cluster.network.connection_count("host"), 1);
}

#[test]
fn protocol_mismatch_is_not_retried() {
    init();
    let host_config = NodeConfig {
        protocol_version: "remora-0".to_string(),
        ..NodeConfig::default()
    };
    let mut cluster = Cluster::pair_with(host_config, fast_config());
    let _object = hosted_counter(&mut cluster);
    let replica = cluster
        .node(CLIENT)
        .acquire("counter", counter_descriptor())
        .unwrap();

    cluster.run_for(Duration::from_millis(150));
    assert_eq!(replica.state(), ReplicaState::Default);
    assert!(cluster.node(CLIENT).pending_reconnects().is_empty());
    assert!(cluster
        .events(CLIENT)
        .iter()
        .any(|event| matches!(event, NodeEvent::Error(NodeError::ProtocolMismatch { .. }))));
    assert_eq!(cluster.network.connection_count("host"), 0);
}

#[test]
fn unreachable_node_is_retried_while_replica_waits() {
    init();
    let mut cluster = Cluster::new();
    let client = cluster.add_node("client", fast_config());
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    assert!(cluster.node(client).connect_to_node(&mem_url("host")).is_err());
    assert_eq!(cluster.node(client).pending_reconnects().len(), 1);

    cluster.run_for(Duration::from_millis(100));
    assert_eq!(cluster.node(client).pending_reconnects().len(), 1);

    let host = cluster.add_listening_node("host", NodeConfig::default());
    let object = Rc::new(RefCell::new(Counter::new(11)));
    cluster
        .node(host)
        .enable_remoting("counter", &object, counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(11)));
    assert!(cluster.node(client).pending_reconnects().is_empty());
}

#[test]
fn retry_stops_once_nothing_waits() {
    init();
    let mut cluster = Cluster::new();
    let client = cluster.add_node("client", fast_config());
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    assert!(cluster.node(client).connect_to_node(&mem_url("host")).is_err());

    drop(replica);
    cluster.run_for(Duration::from_millis(100));
    assert!(cluster.node(client).pending_reconnects().is_empty());
}

#[test]
fn lost_node_that_never_served_the_waiting_replica_is_not_retried() {
    init();
    let mut cluster = Cluster::pair_with(NodeConfig::default(), fast_config());
    let _object = hosted_counter(&mut cluster);
    let replica = cluster.node(CLIENT).acquire_dynamic("elsewhere").unwrap();
    cluster.step_n(3);
    assert_eq!(replica.state(), ReplicaState::Uninitialized);

    assert_eq!(cluster.network.sever("host"), 1);
    cluster.run_for(Duration::from_millis(100));
    assert!(cluster.node(CLIENT).pending_reconnects().is_empty());
    assert_eq!(cluster.network.connection_count("host"), 0);
    assert_eq!(cluster.node(CLIENT).channel_count(), 0);
}
