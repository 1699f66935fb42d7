use std::{cell::RefCell, rc::Rc, time::Duration};

use remora::{NodeConfig, NodeEvent, ReplicaState, SourceLocation, Value};
use remora_test::{count_of, counter, counter_descriptor, mem_url, Cluster, Counter, NodeId};

const TIMEOUT: Duration = Duration::from_secs(2);

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Discovery {
    cluster: Cluster,
    registry: NodeId,
    source: NodeId,
    client: NodeId,
}

/// A registry node, a source node publishing to it and a client looking
/// sources up through it
fn discovery() -> Discovery {
    let mut cluster = Cluster::new();
    let registry = cluster.add_listening_node("registry", NodeConfig::default());
    cluster.node(registry).host_registry().unwrap();

    let source = cluster.add_listening_node("source", NodeConfig::default());
    cluster
        .node(source)
        .set_registry_url(&mem_url("registry"))
        .unwrap();

    let client = cluster.add_node("client", NodeConfig::default());
    cluster
        .node(client)
        .set_registry_url(&mem_url("registry"))
        .unwrap();

    Discovery {
        cluster,
        registry,
        source,
        client,
    }
}

fn counter_location(url: &str) -> SourceLocation {
    SourceLocation::new("counter", "Counter", url)
}

#[test]
fn replica_finds_source_through_registry() {
    init();
    let Discovery {
        mut cluster,
        registry,
        source,
        client,
    } = discovery();

    let object = Rc::new(RefCell::new(Counter::new(4)));
    cluster
        .node(source)
        .enable_remoting("counter", &object, counter_descriptor())
        .unwrap();
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();

    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(4)));

    let location = counter_location(&mem_url("source"));
    assert_eq!(cluster.node(registry).registry_locations(), vec![location.clone()]);
    assert!(cluster.node(client).registry_locations().contains(&location));
    assert!(cluster
        .events(client)
        .contains(&NodeEvent::SourceLocationAdded(location)));
}

#[test]
fn source_enabled_later_is_announced() {
    init();
    let Discovery {
        mut cluster,
        source,
        client,
        ..
    } = discovery();

    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    cluster.run_for(Duration::from_millis(50));
    assert_eq!(replica.state(), ReplicaState::Default);

    let object = Rc::new(RefCell::new(Counter::new(0)));
    cluster
        .node(source)
        .enable_remoting("counter", &object, counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));
}

#[test]
fn disabled_source_is_withdrawn() {
    init();
    let Discovery {
        mut cluster,
        registry,
        source,
        client,
    } = discovery();

    let object = Rc::new(RefCell::new(Counter::new(0)));
    cluster
        .node(source)
        .enable_remoting("counter", &object, counter_descriptor())
        .unwrap();
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));

    cluster.node(source).disable_remoting("counter").unwrap();
    let removed = NodeEvent::SourceLocationRemoved(counter_location(&mem_url("source")));
    assert!(cluster.run_until(TIMEOUT, |cluster| cluster.events(client).contains(&removed)));
    assert_eq!(replica.state(), ReplicaState::Suspect);
    assert!(cluster.node(registry).registry_locations().is_empty());
    assert!(cluster.node(client).registry_locations().is_empty());
}

#[test]
fn vanished_source_node_is_withdrawn() {
    init();
    let Discovery {
        mut cluster,
        registry,
        source,
        client,
    } = discovery();

    let object = Rc::new(RefCell::new(Counter::new(0)));
    cluster
        .node(source)
        .enable_remoting("counter", &object, counter_descriptor())
        .unwrap();
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));

    cluster.remove_node(source);
    let removed = NodeEvent::SourceLocationRemoved(counter_location(&mem_url("source")));
    assert!(cluster.run_until(TIMEOUT, |cluster| cluster.events(client).contains(&removed)));
    assert!(cluster.node(registry).registry_locations().is_empty());
    assert_eq!(replica.state(), ReplicaState::Suspect);
}

#[test]
fn duplicate_publication_keeps_first() {
    init();
    let Discovery {
        mut cluster,
        registry,
        source,
        client,
    } = discovery();
    let second = cluster.add_listening_node("second", NodeConfig::default());
    cluster
        .node(second)
        .set_registry_url(&mem_url("registry"))
        .unwrap();

    let first_object = Rc::new(RefCell::new(Counter::new(1)));
    cluster
        .node(source)
        .enable_remoting("counter", &first_object, counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |cluster| {
        !cluster.node(registry).registry_locations().is_empty()
    }));

    let second_object = Rc::new(RefCell::new(Counter::new(2)));
    cluster
        .node(second)
        .enable_remoting("counter", &second_object, counter_descriptor())
        .unwrap();
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));
    cluster.step_n(5);

    assert_eq!(
        cluster.node(registry).registry_locations(),
        vec![counter_location(&mem_url("source"))]
    );
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(1)));
    let added = count_of(cluster.events(client), |event| {
        matches!(event, NodeEvent::SourceLocationAdded(location) if location.name == "counter")
    });
    assert_eq!(added, 1);
}
