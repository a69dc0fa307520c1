#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Resource limits, cancellation and malformed input.
//! Every limit is checked on the decode side against frames a permissive writer produced.

use afrs::config::{DeserializeOptions, SerializeOptions};
use afrs::core::header::HEADER_SIZE;
use afrs::core::value::{Object, Value};
use afrs::core::SerializationMode;
use afrs::error::ErrorCode;
use afrs::metadata::{MemberSpec, TypeCode, TypeRef, TypeRegistration, TypeRegistry};
use afrs::policy::guard::MAX_DEPTH;
use afrs::policy::{CancellationToken, OutOfRangeHandling};
use afrs::transform::ChecksumAlgorithm;
use afrs::utils::global_metrics;
use afrs::{binary_object, BinarySerializer};
use rand::RngCore;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Default)]
struct Leaf {
    value: u32,
}

binary_object! {
    Leaf => "edge.Leaf", schema = 1 {
        value: u32 = 0,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Bag {
    leaves: Vec<Leaf>,
    names: Vec<String>,
    note: String,
}

binary_object! {
    Bag => "edge.Bag", schema = 1 {
        leaves: Vec<Leaf> = 0,
        names: Vec<String> = 1,
        note: String = 2,
    }
}

fn bag(leaves: u32, names: usize, note: usize) -> Bag {
    Bag {
        leaves: (0..leaves).map(|value| Leaf { value }).collect(),
        names: (0..names).map(|i| format!("n{i}")).collect(),
        note: "x".repeat(note),
    }
}

fn frame(value: &Bag) -> Vec<u8> {
    BinarySerializer::new()
        .serialize(value, &SerializeOptions::default())
        .into_value()
        .unwrap()
        .to_vec()
}

fn read(bytes: &[u8], opts: &DeserializeOptions) -> afrs::DeserializeResult<Bag> {
    BinarySerializer::new().deserialize::<Bag>(bytes, opts)
}

fn nested_arrays(depth: usize) -> Value {
    (0..depth).fold(Value::I32(0), |inner, _| Value::Array(vec![inner]))
}

// ============================================================================
// LIMITS
// ============================================================================

#[test]
fn test_empty_members_round_trip() {
    let empty = Bag::default();
    let outcome = read(&frame(&empty), &DeserializeOptions::default());
    assert_eq!(outcome.stats().unwrap().object_count, 1);
    assert_eq!(outcome.into_value(), Some(empty));
}

#[test]
fn test_object_count_limit() {
    let bytes = frame(&bag(100, 0, 0));
    let at_limit = DeserializeOptions::builder().max_object_count(101).build().unwrap();
    assert_eq!(read(&bytes, &at_limit).code(), ErrorCode::Success);

    let below = DeserializeOptions::builder().max_object_count(50).build().unwrap();
    assert_eq!(read(&bytes, &below).code(), ErrorCode::MaxObjectCountExceeded);
}

#[test]
fn test_collection_count_limit() {
    let bytes = frame(&bag(0, 1000, 0));
    let tight = DeserializeOptions::builder()
        .max_collection_count(999)
        .build()
        .unwrap();
    assert_eq!(read(&bytes, &tight).code(), ErrorCode::CollectionTooLarge);
}

#[test]
fn test_string_limit_handling() {
    let bytes = frame(&bag(0, 0, 5000));
    let limited = |handling: OutOfRangeHandling| {
        DeserializeOptions::builder()
            .max_string_length(100)
            .out_of_range(handling)
            .build()
            .unwrap()
    };
    assert_eq!(
        read(&bytes, &limited(OutOfRangeHandling::Error)).code(),
        ErrorCode::StringTooLong
    );
    let truncated = read(&bytes, &limited(OutOfRangeHandling::Truncate))
        .into_value()
        .unwrap();
    assert_eq!(truncated.note.len(), 100);
    let emptied = read(&bytes, &limited(OutOfRangeHandling::Default))
        .into_value()
        .unwrap();
    assert!(emptied.note.is_empty());
}

#[test]
fn test_depth_limit_on_decode() {
    let serializer = BinarySerializer::new();
    let deep_writer = SerializeOptions::builder().max_depth(256).build().unwrap();
    let bytes = serializer
        .serialize_value(&nested_arrays(100), &TypeRef::Any, &deep_writer)
        .into_value()
        .unwrap();

    let outcome = serializer.deserialize_value(&bytes, None, &DeserializeOptions::default());
    assert_eq!(outcome.code(), ErrorCode::MaxDepthExceeded);

    let deep_reader = DeserializeOptions::builder().max_depth(128).build().unwrap();
    let outcome = serializer.deserialize_value(&bytes, None, &deep_reader);
    assert_eq!(outcome.value(), Some(&nested_arrays(100)));
    assert!(outcome.stats().unwrap().peak_depth >= 100);
}

#[test]
fn test_deepest_accepted_nesting_round_trips() {
    let serializer = BinarySerializer::new();
    let deep = nested_arrays(MAX_DEPTH);
    let writer = SerializeOptions::builder().max_depth(MAX_DEPTH).build().unwrap();
    let reader = DeserializeOptions::builder().max_depth(MAX_DEPTH).build().unwrap();

    let bytes = serializer
        .serialize_value(&deep, &TypeRef::Any, &writer)
        .into_value()
        .unwrap();
    let outcome = serializer.deserialize_value(&bytes, None, &reader);
    assert_eq!(outcome.code(), ErrorCode::Success);
    assert_eq!(outcome.stats().unwrap().peak_depth, MAX_DEPTH);
    assert_eq!(outcome.value(), Some(&deep));

    let shallower = DeserializeOptions::builder()
        .max_depth(MAX_DEPTH - 1)
        .build()
        .unwrap();
    assert_eq!(
        serializer.deserialize_value(&bytes, None, &shallower).code(),
        ErrorCode::MaxDepthExceeded
    );
}

fn link_chain(len: usize) -> Value {
    (0..len).fold(Value::Null, |next, id| {
        Value::object(
            Object::new("edge.Link")
                .with("id", id as i32)
                .with("next", next),
        )
    })
}

#[test]
fn test_deepest_accepted_object_chain_round_trips() {
    let registry = TypeRegistry::new();
    registry
        .register(
            TypeRegistration::builder("edge.Link")
                .member(MemberSpec::field("id", TypeRef::Builtin(TypeCode::I32)).key(0))
                .member(MemberSpec::field("next", TypeRef::named("edge.Link")).key(1))
                .build()
                .unwrap(),
        )
        .unwrap();
    let serializer = BinarySerializer::with_registry(Arc::new(registry));
    let chain = link_chain(MAX_DEPTH);
    let reader = DeserializeOptions::builder().max_depth(MAX_DEPTH).build().unwrap();

    for mode in [
        SerializationMode::Object,
        SerializationMode::VersionTolerant,
        SerializationMode::Full,
    ] {
        let writer = SerializeOptions::builder()
            .mode(mode)
            .max_depth(MAX_DEPTH)
            .build()
            .unwrap();
        let bytes = serializer
            .serialize_value(&chain, &TypeRef::named("edge.Link"), &writer)
            .into_value()
            .unwrap();
        let decoded = serializer
            .deserialize_value(&bytes, None, &reader)
            .into_value()
            .unwrap();

        let mut links = 0usize;
        let mut cursor = decoded.as_object().cloned();
        while let Some(link) = cursor {
            // Unlinking as we go keeps the drop of the chain flat.
            let mut node = link.write().unwrap();
            assert_eq!(
                node.get("id"),
                Some(&Value::I32((MAX_DEPTH - 1 - links) as i32)),
                "{mode:?}"
            );
            links += 1;
            cursor = node.remove("next").as_ref().and_then(Value::as_object).cloned();
        }
        assert_eq!(links, MAX_DEPTH, "{mode:?}");
    }
    dismantle(chain);
}

fn dismantle(chain: Value) {
    let mut cursor = chain.as_object().cloned();
    while let Some(link) = cursor {
        let next = link.write().unwrap().remove("next");
        cursor = next.as_ref().and_then(Value::as_object).cloned();
    }
}

#[test]
fn test_depth_limit_on_encode() {
    let shallow = SerializeOptions::builder().max_depth(1).build().unwrap();
    let outcome = BinarySerializer::new().serialize(&bag(1, 0, 0), &shallow);
    assert_eq!(outcome.code(), ErrorCode::MaxDepthExceeded);
}

#[test]
fn test_guard_violations_are_counted() {
    let before = global_metrics().snapshot().guard_violations;
    let bytes = frame(&bag(10, 0, 0));
    let tight = DeserializeOptions::builder().max_object_count(2).build().unwrap();
    assert_eq!(read(&bytes, &tight).code(), ErrorCode::MaxObjectCountExceeded);
    assert!(global_metrics().snapshot().guard_violations > before);
}

// ============================================================================
// CANCELLATION AND TIMEOUT
// ============================================================================

#[test]
fn test_cancelled_token_stops_decode() {
    let bytes = frame(&bag(10, 10, 10));
    let token = CancellationToken::new();
    let opts = DeserializeOptions::builder()
        .cancellation(token.clone())
        .build()
        .unwrap();
    assert_eq!(read(&bytes, &opts).code(), ErrorCode::Success);

    token.cancel();
    assert!(token.is_cancelled());
    assert_eq!(read(&bytes, &opts).code(), ErrorCode::Cancelled);
}

#[test]
fn test_zero_timeout_expires_immediately() {
    let bytes = frame(&bag(10, 0, 0));
    let opts = DeserializeOptions::builder().timeout_ms(0).build().unwrap();
    let outcome = read(&bytes, &opts);
    assert_eq!(outcome.code(), ErrorCode::Timeout);

    let unlimited = DeserializeOptions::builder().timeout_ms(-1).build().unwrap();
    assert_eq!(read(&bytes, &unlimited).code(), ErrorCode::Success);
}

// ============================================================================
// MALFORMED INPUT
// ============================================================================

#[test]
fn test_garbage_never_panics() {
    let mut rng = rand::rng();
    for len in [0usize, 1, 4, 31, 32, 33, 64, 512] {
        for _ in 0..32 {
            let mut bytes = vec![0u8; len];
            rng.fill_bytes(&mut bytes);
            assert_ne!(read(&bytes, &DeserializeOptions::default()).code(), ErrorCode::Success);
        }
    }
}

#[test]
fn test_body_mutations_without_checksum_fail_cleanly() {
    let opts = SerializeOptions::builder()
        .checksum(ChecksumAlgorithm::None)
        .build()
        .unwrap();
    let original = BinarySerializer::new()
        .serialize(&bag(3, 3, 8), &opts)
        .into_value()
        .unwrap()
        .to_vec();

    for index in HEADER_SIZE..original.len() {
        for replacement in [0x00, 0x7F, 0xFF] {
            let mut mutated = original.clone();
            if mutated[index] == replacement {
                continue;
            }
            mutated[index] = replacement;
            // Any outcome is fine as long as it is reported rather than panicking.
            let _ = read(&mutated, &DeserializeOptions::safe()).code();
        }
    }
}

#[test]
fn test_safe_preset_bounds_payload() {
    let big = bag(0, 0, 2 * 1024 * 1024);
    let writer = SerializeOptions::builder()
        .max_payload_size(8 * 1024 * 1024)
        .max_string_length(4 * 1024 * 1024)
        .build()
        .unwrap();
    let bytes = BinarySerializer::new()
        .serialize(&big, &writer)
        .into_value()
        .unwrap();
    assert_eq!(
        read(&bytes, &DeserializeOptions::safe()).code(),
        ErrorCode::DataTooLarge
    );
}
