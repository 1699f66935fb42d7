use std::{cell::RefCell, rc::Rc, time::Duration};

use remora::{
    shared::{CodecError, IoServer, ObjectInfo, Packet, NO_SERIAL_ID, PROTOCOL_VERSION},
    InvokeCall, NodeConfig, NodeError, NodeEvent, ReplicaState, SourceError, Value,
};
use remora_test::{counter, counter_descriptor, mem_url, Cluster, Counter, FakePeer, NodeId};

const TIMEOUT: Duration = Duration::from_secs(2);

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A host node serving a counter, and a fake replica-side peer connected to it
fn host_with_peer() -> (Cluster, NodeId, Rc<RefCell<Counter>>, FakePeer) {
    let mut cluster = Cluster::new();
    let host = cluster.add_listening_node("host", NodeConfig::default());
    let object = Rc::new(RefCell::new(Counter::new(0)));
    cluster
        .node(host)
        .enable_remoting("counter", &object, counter_descriptor())
        .unwrap();
    let mut peer = FakePeer::connect(&cluster.network, &mem_url("host"));
    cluster.step();

    let greeting = peer.receive();
    assert_eq!(
        greeting[0],
        Packet::Handshake {
            protocol_version: PROTOCOL_VERSION.to_string()
        }
    );
    assert!(matches!(&greeting[1], Packet::ObjectList { objects } if objects.len() == 1));
    (cluster, host, object, peer)
}

/// A client node connected to a fake host-side peer
fn client_with_peer() -> (Cluster, NodeId, Box<dyn IoServer>, FakePeer) {
    let mut cluster = Cluster::new();
    let mut server = FakePeer::listen(&cluster.network, &mem_url("fake"));
    let client = cluster.add_node("client", NodeConfig::default());
    cluster
        .node(client)
        .connect_to_node(&mem_url("fake"))
        .unwrap();
    let device = server.accept().expect("client connected");
    (cluster, client, server, FakePeer::from_device(device))
}

fn greet(peer: &mut FakePeer) {
    peer.send(&Packet::Handshake {
        protocol_version: PROTOCOL_VERSION.to_string(),
    });
    peer.send(&Packet::ObjectList {
        objects: vec![ObjectInfo {
            name: "counter".to_string(),
            type_name: "Counter".to_string(),
            signature: counter_descriptor().signature(),
        }],
    });
}

fn invoke(index: i32, args: Vec<Value>, serial_id: i32) -> Packet {
    Packet::Invoke {
        name: "counter".to_string(),
        call: InvokeCall::InvokeMethod,
        index,
        args,
        serial_id,
        property_index: -1,
    }
}

fn ping() -> Packet {
    Packet::Ping {
        name: "counter".to_string(),
    }
}

fn pong() -> Packet {
    Packet::Pong {
        name: "counter".to_string(),
    }
}

// ========== Host Side ==========

#[test]
fn ping_is_answered() {
    init();
    let (mut cluster, _host, _object, mut peer) = host_with_peer();
    peer.send(&ping());
    cluster.step();
    assert_eq!(peer.receive(), vec![pong()]);
}

#[test]
fn invalid_packet_type_closes_channel() {
    init();
    let (mut cluster, host, _object, mut peer) = host_with_peer();
    peer.send_bytes(&[0, 0, 0, 2, 0, 99]);
    cluster.step();

    assert!(!peer.is_open());
    let error = NodeEvent::Error(NodeError::Codec(CodecError::InvalidPacketType { id: 99 }));
    assert!(cluster.events(host).contains(&error));
    assert_eq!(cluster.node(host).channel_count(), 0);
}

#[test]
fn oversized_frame_closes_channel() {
    init();
    let mut cluster = Cluster::new();
    let mut config = NodeConfig::default();
    config.connection.max_packet_size = 64;
    let host = cluster.add_listening_node("host", config);
    let mut peer = FakePeer::connect(&cluster.network, &mem_url("host"));
    cluster.step();
    peer.receive();

    peer.send_bytes(&1000u32.to_be_bytes());
    cluster.step();
    assert!(!peer.is_open());
    assert!(cluster.events(host).iter().any(|event| matches!(
        event,
        NodeEvent::Error(NodeError::Codec(CodecError::FrameTooLarge { length: 1000, .. }))
    )));
}

#[test]
fn init_sent_to_host_closes_channel() {
    init();
    let (mut cluster, host, _object, mut peer) = host_with_peer();
    peer.send(&Packet::Init {
        name: "counter".to_string(),
        values: vec![],
    });
    cluster.step();

    assert!(!peer.is_open());
    assert!(cluster
        .events(host)
        .iter()
        .any(|event| matches!(event, NodeEvent::Error(NodeError::UnexpectedPacket { .. }))));
}

#[test]
fn repeated_subscription_delivers_once() {
    init();
    let (mut cluster, _host, object, mut peer) = host_with_peer();
    let add = Packet::AddObject {
        name: "counter".to_string(),
        dynamic: false,
    };
    peer.send(&add);
    peer.send(&add);
    cluster.step();
    let snapshot = Packet::Init {
        name: "counter".to_string(),
        values: vec![Value::Int(0), Value::String(String::new())],
    };
    assert_eq!(peer.receive(), vec![snapshot.clone(), snapshot]);

    object.borrow_mut().set_count(3);
    cluster.step();
    let changes: Vec<Packet> = peer
        .receive()
        .into_iter()
        .filter(|packet| matches!(packet, Packet::PropertyChange { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![Packet::PropertyChange {
            name: "counter".to_string(),
            index: counter::COUNT as i32,
            value: Value::Int(3),
        }]
    );
}

#[test]
fn unknown_method_keeps_channel_open() {
    init();
    let (mut cluster, host, _object, mut peer) = host_with_peer();
    peer.send(&invoke(99, vec![], 5));
    peer.send(&ping());
    cluster.step();

    assert!(peer.is_open());
    assert_eq!(peer.receive(), vec![pong()]);
    assert!(cluster.events(host).iter().any(|event| matches!(
        event,
        NodeEvent::Error(NodeError::Source(SourceError::IndexOutOfRange { index: 99, .. }))
    )));
}

#[test]
fn events_carry_no_serial() {
    init();
    let (mut cluster, _host, object, mut peer) = host_with_peer();
    object.borrow_mut().set_count(2);
    peer.send(&Packet::AddObject {
        name: "counter".to_string(),
        dynamic: false,
    });
    cluster.step();
    peer.receive();

    peer.send(&invoke(counter::RESET as i32, vec![], 3));
    cluster.step();
    let packets = peer.receive();

    assert!(packets.contains(&Packet::InvokeReply {
        name: "counter".to_string(),
        serial_id: 3,
        value: Value::Null,
    }));
    assert!(packets.contains(&invoke(counter::RESET_EVENT as i32, vec![], NO_SERIAL_ID)));
    assert!(packets.contains(&invoke(
        counter::COUNT_CHANGED as i32,
        vec![Value::Int(0)],
        NO_SERIAL_ID
    )));
}

#[test]
fn change_queued_before_subscription_is_only_in_snapshot() {
    init();
    let (mut cluster, _host, object, mut watcher) = host_with_peer();
    let add = Packet::AddObject {
        name: "counter".to_string(),
        dynamic: false,
    };
    watcher.send(&add);
    cluster.step();
    watcher.receive();

    let mut late = FakePeer::connect(&cluster.network, &mem_url("host"));
    cluster.step();
    late.receive();

    object.borrow_mut().set_count(5);
    late.send(&add);
    cluster.step();

    assert_eq!(
        late.receive(),
        vec![Packet::Init {
            name: "counter".to_string(),
            values: vec![Value::Int(5), Value::String(String::new())],
        }]
    );
    assert_eq!(
        watcher.receive(),
        vec![
            Packet::PropertyChange {
                name: "counter".to_string(),
                index: counter::COUNT as i32,
                value: Value::Int(5),
            },
            invoke(counter::COUNT_CHANGED as i32, vec![Value::Int(5)], NO_SERIAL_ID),
        ]
    );

    object.borrow_mut().set_count(6);
    cluster.step();
    assert!(late.receive().contains(&Packet::PropertyChange {
        name: "counter".to_string(),
        index: counter::COUNT as i32,
        value: Value::Int(6),
    }));
}

// ========== Client Side ==========

#[test]
fn packet_before_handshake_closes_channel() {
    init();
    let (mut cluster, client, _server, mut peer) = client_with_peer();
    peer.send(&Packet::ObjectList { objects: vec![] });
    cluster.step();

    assert!(!peer.is_open());
    assert!(cluster
        .events(client)
        .iter()
        .any(|event| matches!(event, NodeEvent::Error(NodeError::UnexpectedPacket { .. }))));
    assert!(cluster.node(client).pending_reconnects().is_empty());
}

#[test]
fn replica_waits_for_snapshot() {
    init();
    let (mut cluster, client, _server, mut peer) = client_with_peer();
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    greet(&mut peer);
    cluster.step();
    assert_eq!(
        peer.receive(),
        vec![Packet::AddObject {
            name: "counter".to_string(),
            dynamic: false,
        }]
    );

    peer.send(&Packet::PropertyChange {
        name: "counter".to_string(),
        index: 0,
        value: Value::Int(5),
    });
    cluster.step();
    assert_eq!(replica.state(), ReplicaState::Default);
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(0)));

    peer.send(&Packet::Init {
        name: "counter".to_string(),
        values: vec![Value::Int(1), Value::from("one")],
    });
    cluster.step();
    assert!(replica.is_valid());
    assert_eq!(replica.property(counter::LABEL), Some(Value::from("one")));

    peer.send(&Packet::PropertyChange {
        name: "counter".to_string(),
        index: 9,
        value: Value::Int(5),
    });
    cluster.step();
    assert!(peer.is_open());
    assert!(replica.is_valid());
}

#[test]
fn short_snapshot_is_a_signature_mismatch() {
    init();
    let (mut cluster, client, _server, mut peer) = client_with_peer();
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    greet(&mut peer);
    cluster.step();
    peer.receive();

    peer.send(&Packet::Init {
        name: "counter".to_string(),
        values: vec![Value::Int(1)],
    });
    cluster.step();

    assert_eq!(replica.state(), ReplicaState::SignatureMismatch);
    assert_eq!(
        peer.receive(),
        vec![Packet::RemoveObject {
            name: "counter".to_string()
        }]
    );
    assert!(peer.is_open());
}

#[test]
fn mistyped_snapshot_is_a_signature_mismatch() {
    init();
    let (mut cluster, client, _server, mut peer) = client_with_peer();
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    greet(&mut peer);
    cluster.step();
    peer.receive();

    peer.send(&Packet::Init {
        name: "counter".to_string(),
        values: vec![Value::from("not an int"), Value::Int(7)],
    });
    cluster.step();

    assert_eq!(replica.state(), ReplicaState::SignatureMismatch);
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(0)));
    assert_eq!(
        peer.receive(),
        vec![Packet::RemoveObject {
            name: "counter".to_string()
        }]
    );
}

#[test]
fn mistyped_change_is_dropped() {
    init();
    let (mut cluster, client, _server, mut peer) = client_with_peer();
    let replica = cluster
        .node(client)
        .acquire("counter", counter_descriptor())
        .unwrap();
    greet(&mut peer);
    cluster.step();
    peer.receive();
    peer.send(&Packet::Init {
        name: "counter".to_string(),
        values: vec![Value::Int(1), Value::from("one")],
    });
    cluster.step();
    assert!(replica.is_valid());
    cluster.take_events(client);

    peer.send(&Packet::PropertyChange {
        name: "counter".to_string(),
        index: counter::COUNT as i32,
        value: Value::Bool(true),
    });
    cluster.step();

    assert!(peer.is_open());
    assert!(replica.is_valid());
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(1)));
    assert!(!cluster
        .events(client)
        .iter()
        .any(|event| matches!(event, NodeEvent::PropertyChanged { .. })));
}

#[test]
fn mistyped_dynamic_snapshot_closes_channel() {
    init();
    let (mut cluster, client, _server, mut peer) = client_with_peer();
    let replica = cluster.node(client).acquire_dynamic("counter").unwrap();
    greet(&mut peer);
    cluster.step();
    peer.receive();

    peer.send(&Packet::InitDynamic {
        name: "counter".to_string(),
        descriptor: counter_descriptor(),
        values: vec![Value::Bool(true), Value::Int(2)],
    });
    cluster.step();

    assert!(!peer.is_open());
    assert_eq!(replica.state(), ReplicaState::Uninitialized);
    let error = NodeEvent::Error(NodeError::MistypedSnapshot {
        name: "counter".to_string(),
    });
    assert!(cluster.events(client).contains(&error));
    assert!(cluster.node(client).type_table().is_empty());
}

#[test]
fn short_dynamic_snapshot_closes_channel() {
    init();
    let (mut cluster, client, _server, mut peer) = client_with_peer();
    let replica = cluster.node(client).acquire_dynamic("counter").unwrap();
    greet(&mut peer);
    cluster.step();
    peer.receive();

    peer.send(&Packet::InitDynamic {
        name: "counter".to_string(),
        descriptor: counter_descriptor(),
        values: vec![],
    });
    cluster.step();

    assert!(!peer.is_open());
    assert_eq!(replica.state(), ReplicaState::Uninitialized);
    assert!(cluster.events(client).iter().any(|event| matches!(
        event,
        NodeEvent::Error(NodeError::InvalidSnapshot {
            expected: 2,
            received: 0,
            ..
        })
    )));
}

#[test]
fn fragmented_stream_is_reassembled() {
    init();
    let mut cluster = Cluster::pair();
    cluster.network.set_fragment_size(Some(3));
    let object = Rc::new(RefCell::new(Counter::new(7)));
    cluster
        .node(Cluster::HOST)
        .enable_remoting("counter", &object, counter_descriptor())
        .unwrap();
    let replica = cluster
        .node(Cluster::CLIENT)
        .acquire("counter", counter_descriptor())
        .unwrap();

    assert!(cluster.run_until(TIMEOUT, |_| replica.is_valid()));
    assert_eq!(replica.property(counter::COUNT), Some(Value::Int(7)));
    object.borrow_mut().set_label("pieces");
    assert!(cluster.run_until(TIMEOUT, |_| {
        replica.property(counter::LABEL) == Some(Value::from("pieces"))
    }));
}
