/// PROPERTY-BASED TESTS: codec and replication invariants
///
/// Key invariants:
/// 1. Descriptors survive the wire unchanged, signature included
/// 2. Frames decode identically however the stream is split
/// 3. A replica converges on the last value its source held

use std::{cell::RefCell, rc::Rc, time::Duration};

use proptest::prelude::*;
use remora::{
    shared::{encode_packet, ByteReader, ByteWriter, FrameBuffer, Packet, Serde},
    Descriptor, Value, ValueType,
};
use remora_test::{counter, counter_descriptor, Cluster, Counter};

fn value_type_strategy() -> impl Strategy<Value = ValueType> {
    prop_oneof![
        Just(ValueType::Bool),
        Just(ValueType::Int),
        Just(ValueType::Double),
        Just(ValueType::String),
        Just(ValueType::Bytes),
    ]
}

fn descriptor_from(types: &[ValueType], methods: usize) -> Descriptor {
    let mut builder = Descriptor::builder("Generated");
    for (index, value_type) in types.iter().enumerate() {
        builder = builder.property(&format!("p{}", index), value_type.clone());
    }
    for index in 0..methods {
        builder = builder.method(&format!("m{}", index), types.to_vec(), ValueType::Null);
    }
    builder.build().unwrap()
}

proptest! {
    /// Serialized descriptors decode to an equal descriptor with the same signature
    #[test]
    fn prop_descriptor_round_trip(
        types in prop::collection::vec(value_type_strategy(), 0..8),
        methods in 0usize..4,
    ) {
        let descriptor = descriptor_from(&types, methods);
        let mut writer = ByteWriter::new();
        descriptor.ser(&mut writer);
        let bytes = writer.to_bytes();

        let mut reader = ByteReader::new(&bytes);
        let decoded = Descriptor::de(&mut reader).unwrap();
        prop_assert_eq!(reader.remaining(), 0);
        prop_assert_eq!(decoded.signature(), descriptor.signature());
        prop_assert_eq!(decoded, descriptor);
    }

    /// Changing any property type changes the signature
    #[test]
    fn prop_signature_tracks_property_types(
        types in prop::collection::vec(value_type_strategy(), 1..6),
        replacement in value_type_strategy(),
        position in any::<prop::sample::Index>(),
    ) {
        let slot = position.index(types.len());
        prop_assume!(types[slot] != replacement);
        let mut changed = types.clone();
        changed[slot] = replacement;

        prop_assert_ne!(
            descriptor_from(&types, 0).signature(),
            descriptor_from(&changed, 0).signature()
        );
    }

    /// A frame split into arbitrary pieces decodes to exactly one equal packet
    #[test]
    fn prop_frames_survive_any_chunking(
        label in ".{0,64}",
        index in 0i32..16,
        chunk in 1usize..9,
    ) {
        let packet = Packet::PropertyChange {
            name: "counter".to_string(),
            index,
            value: Value::String(label),
        };
        let bytes = encode_packet(&packet);
        let mut frames = FrameBuffer::new(1024);

        let mut decoded = Vec::new();
        for piece in bytes.chunks(chunk) {
            frames.push(piece);
            while let Some(packet) = frames.next_packet().unwrap() {
                decoded.push(packet);
            }
        }
        prop_assert_eq!(decoded, vec![packet]);
        prop_assert_eq!(frames.buffered(), 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// However many writes happen between passes, the replica ends on the last one
    #[test]
    fn prop_replica_converges_on_last_write(
        writes in prop::collection::vec(-1000i64..1000, 1..20),
        steps_between in 0usize..3,
    ) {
        let mut cluster = Cluster::pair();
        let object = Rc::new(RefCell::new(Counter::new(0)));
        cluster
            .node(Cluster::HOST)
            .enable_remoting("counter", &object, counter_descriptor())
            .unwrap();
        let replica = cluster
            .node(Cluster::CLIENT)
            .acquire("counter", counter_descriptor())
            .unwrap();
        prop_assert!(cluster.run_until(Duration::from_secs(2), |_| replica.is_valid()));

        for count in &writes {
            object.borrow_mut().set_count(*count);
            cluster.step_n(steps_between);
        }
        let last = Value::Int(*writes.last().unwrap());
        let converged = cluster.run_until(Duration::from_secs(2), |_| {
            replica.property(counter::COUNT) == Some(last.clone())
        });
        prop_assert!(converged);
        cluster.step_n(3);
        prop_assert_eq!(replica.property(counter::COUNT), Some(last));
    }
}
