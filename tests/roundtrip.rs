//! Round-trip tests across serialization modes, presets, string encodings, byte orders
//! and transform combinations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use afrs::config::{BehaviorFlags, DeserializeOptions, SerializeOptions, StringEncoding};
use afrs::core::header::HeaderFlags;
use afrs::core::value::Decimal;
use afrs::core::{Endianness, Layout, SerializationMode};
use afrs::error::ErrorCode;
use afrs::transform::{ChecksumAlgorithm, CompressionAlgorithm, EncryptionAlgorithm, EncryptionKey};
use afrs::{binary_enum, binary_object, BinarySerializer};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Default)]
struct Entity {
    id: u32,
    name: String,
    tags: Vec<String>,
}

binary_object! {
    Entity => "rt.Entity", schema = 1 {
        id: u32 = 0,
        name: String = 1,
        tags: Vec<String> = 2,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Vec3 {
    x: f32,
    y: f32,
    z: f32,
}

binary_object! {
    Vec3 => "rt.Vec3", schema = 1 {
        x: f32 = 0,
        y: f32 = 1,
        z: f32 = 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Class {
    Warrior,
    Mage,
}

binary_enum!(Class { Warrior = 0, Mage = 5 });

#[derive(Debug, Clone, PartialEq)]
struct Player {
    id: Uuid,
    name: String,
    level: u16,
    health: f64,
    position: Vec3,
    class: Class,
    inventory: Vec<u32>,
    stats: BTreeMap<String, i64>,
    guild: Option<String>,
    avatar: Bytes,
    created: DateTime<Utc>,
    played: TimeDelta,
    zone_time: DateTime<FixedOffset>,
    gold: Decimal,
    initial: char,
    mood: i8,
    flags: u64,
    alive: bool,
}

binary_object! {
    Player => "rt.Player", schema = 2 {
        id: Uuid = 0 [required],
        name: String = 1,
        level: u16 = 2,
        health: f64 = 3,
        position: Vec3 = 4,
        class: Class = 5,
        inventory: Vec<u32> = 6,
        stats: BTreeMap<String, i64> = 7,
        guild: Option<String> = 8 [nullable],
        avatar: Bytes = 9,
        created: DateTime<Utc> = 10,
        played: TimeDelta = 11,
        zone_time: DateTime<FixedOffset> = 12,
        gold: Decimal = 13,
        initial: char = 14,
        mood: i8 = 15,
        flags: u64 = 16,
        alive: bool = 17,
    }
}

fn entity() -> Entity {
    Entity {
        id: 42,
        name: "x".into(),
        tags: vec!["a".into(), "b".into()],
    }
}

fn player() -> Player {
    let created = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
    let offset = FixedOffset::east_opt(2 * 3600).unwrap();
    Player {
        id: Uuid::from_u128(0x1234_5678_9abc_def0_1122_3344_5566_7788),
        name: "Ærwyn the Grey 🧙".into(),
        level: 37,
        health: 88.25,
        position: Vec3 {
            x: 1.5,
            y: -2.0,
            z: 1024.125,
        },
        class: Class::Mage,
        inventory: (0..600).collect(),
        stats: BTreeMap::from([("str".to_string(), 12), ("int".to_string(), -3)]),
        guild: None,
        avatar: Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF]),
        created,
        played: TimeDelta::try_seconds(3 * 3600 + 17).unwrap() + TimeDelta::nanoseconds(500),
        zone_time: created.with_timezone(&offset),
        gold: Decimal::new(1_234_567, 2).unwrap(),
        initial: 'Æ',
        mood: -7,
        flags: u64::MAX - 1,
        alive: true,
    }
}

fn roundtrip<T>(value: &T, ser: &SerializeOptions, de: &DeserializeOptions) -> T
where
    T: afrs::ToValue + afrs::FromValue + afrs::Describe,
{
    let serializer = BinarySerializer::new();
    let written = serializer.serialize(value, ser);
    let frame = match written {
        afrs::Outcome::Success { value, .. } => value,
        afrs::Outcome::Failure(f) => panic!("serialize failed: {}", f.diagnostic),
    };
    match serializer.deserialize::<T>(&frame, de) {
        afrs::Outcome::Success { value, .. } => value,
        afrs::Outcome::Failure(f) => panic!("deserialize failed: {}", f.diagnostic),
    }
}

// ============================================================================
// MODES
// ============================================================================

#[test]
fn test_end_to_end_struct_bytes_balance() {
    let serializer = BinarySerializer::new();
    let written = serializer.serialize(&entity(), &SerializeOptions::default());
    let written_bytes = written.stats().unwrap().bytes_written;
    let frame = written.into_value().unwrap();

    let read = serializer.deserialize::<Entity>(&frame, &DeserializeOptions::default());
    assert_eq!(read.stats().unwrap().bytes_read, written_bytes);
    assert_eq!(read.into_value().unwrap(), entity());
}

#[test]
fn test_every_mode_roundtrips_player() {
    for mode in SerializationMode::ALL {
        let ser = SerializeOptions::builder().mode(mode).build().unwrap();
        let de = DeserializeOptions::builder().mode(mode).build().unwrap();
        assert_eq!(roundtrip(&player(), &ser, &de), player(), "mode {mode:?}");
    }
}

#[test]
fn test_mode_is_carried_in_header_flags() {
    let serializer = BinarySerializer::new();
    for mode in SerializationMode::ALL {
        let ser = SerializeOptions::builder().mode(mode).build().unwrap();
        let frame = serializer.serialize(&entity(), &ser).into_value().unwrap();
        let info = serializer.inspect(&frame).unwrap();
        assert_eq!(info.capabilities, mode.capabilities(), "mode {mode:?}");
    }
}

#[test]
fn test_key_value_layout_in_object_mode() {
    let ser = SerializeOptions::builder()
        .layout(Layout::KeyValue)
        .build()
        .unwrap();
    let de = DeserializeOptions::builder()
        .mode(SerializationMode::Object)
        .layout(Layout::KeyValue)
        .build()
        .unwrap();
    assert_eq!(roundtrip(&player(), &ser, &de), player());
}

#[test]
fn test_presets_roundtrip() {
    let presets = [
        SerializeOptions::default(),
        SerializeOptions::for_network(),
        SerializeOptions::for_storage(),
        SerializeOptions::for_save_game(),
        SerializeOptions::for_debug(),
    ];
    for ser in presets {
        assert_eq!(
            roundtrip(&player(), &ser, &DeserializeOptions::default()),
            player(),
            "preset {:?}",
            ser.mode()
        );
    }
}

#[test]
fn test_debug_frames_are_larger_than_compact() {
    let serializer = BinarySerializer::new();
    let size = |opts: SerializeOptions| {
        serializer
            .serialize(&entity(), &opts)
            .stats()
            .unwrap()
            .bytes_written
    };
    let compact = size(
        SerializeOptions::builder()
            .mode(SerializationMode::Compact)
            .build()
            .unwrap(),
    );
    let debug = size(SerializeOptions::for_debug());
    assert!(debug > compact, "debug {debug} <= compact {compact}");
}

// ============================================================================
// ENCODINGS AND BYTE ORDER
// ============================================================================

#[test]
fn test_string_encodings() {
    let cases = [
        (StringEncoding::Utf8, "Ærwyn 🧙"),
        (StringEncoding::Utf16, "Ærwyn 🧙"),
        (StringEncoding::Latin1, "café"),
        (StringEncoding::Ascii, "plain"),
    ];
    for (encoding, name) in cases {
        let value = Entity {
            name: name.into(),
            ..entity()
        };
        let ser = SerializeOptions::builder()
            .string_encoding(encoding)
            .build()
            .unwrap();
        assert_eq!(
            roundtrip(&value, &ser, &DeserializeOptions::default()),
            value,
            "{encoding:?}"
        );
    }
}

#[test]
fn test_unrepresentable_characters_fail() {
    let serializer = BinarySerializer::new();
    let value = Entity {
        name: "naïve".into(),
        ..entity()
    };
    let ascii = SerializeOptions::builder()
        .string_encoding(StringEncoding::Ascii)
        .build()
        .unwrap();
    assert_eq!(
        serializer.serialize(&value, &ascii).code(),
        ErrorCode::InvalidEncoding
    );

    let latin1 = SerializeOptions::builder()
        .string_encoding(StringEncoding::Latin1)
        .build()
        .unwrap();
    let emoji = Entity {
        name: "🧙".into(),
        ..entity()
    };
    assert_eq!(
        serializer.serialize(&emoji, &latin1).code(),
        ErrorCode::InvalidEncoding
    );
}

#[test]
fn test_big_endian_frames() {
    let serializer = BinarySerializer::new();
    let ser = SerializeOptions::builder()
        .endianness(Endianness::Big)
        .build()
        .unwrap();
    let frame = serializer.serialize(&player(), &ser).into_value().unwrap();
    let info = serializer.inspect(&frame).unwrap();
    assert!(info.header.flags().contains(HeaderFlags::BIG_ENDIAN));
    assert_eq!(info.header.endianness(), Endianness::Big);
    assert_eq!(
        serializer
            .deserialize::<Player>(&frame, &DeserializeOptions::default())
            .into_value(),
        Some(player())
    );
}

// ============================================================================
// TRANSFORMS
// ============================================================================

#[test]
fn test_all_compression_algorithms() {
    for algorithm in [
        CompressionAlgorithm::Lz4,
        CompressionAlgorithm::Zstd,
        CompressionAlgorithm::Gzip,
        CompressionAlgorithm::Deflate,
    ] {
        let ser = SerializeOptions::builder()
            .compression(algorithm)
            .compression_threshold(64)
            .build()
            .unwrap();
        let serializer = BinarySerializer::new();
        let written = serializer.serialize(&player(), &ser);
        assert!(written.stats().unwrap().compressed, "{algorithm:?}");
        let frame = written.into_value().unwrap();
        assert!(serializer.inspect(&frame).unwrap().is_compressed());
        assert_eq!(
            serializer
                .deserialize::<Player>(&frame, &DeserializeOptions::default())
                .into_value(),
            Some(player()),
            "{algorithm:?}"
        );
    }
}

#[test]
fn test_below_threshold_is_not_compressed() {
    let ser = SerializeOptions::builder()
        .compression(CompressionAlgorithm::Zstd)
        .compression_threshold(4096)
        .build()
        .unwrap();
    let written = BinarySerializer::new().serialize(&entity(), &ser);
    assert!(!written.stats().unwrap().compressed);
}

#[test]
fn test_all_ciphers_with_all_checksums() {
    let ciphers = [
        EncryptionAlgorithm::Aes128Gcm,
        EncryptionAlgorithm::Aes256Gcm,
        EncryptionAlgorithm::ChaCha20Poly1305,
        EncryptionAlgorithm::XChaCha20Poly1305,
    ];
    let checksums = [
        ChecksumAlgorithm::None,
        ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::Fnv1a32,
        ChecksumAlgorithm::XxHash32,
        ChecksumAlgorithm::XxHash64,
        ChecksumAlgorithm::Sha256,
    ];
    for cipher in ciphers {
        let key = EncryptionKey::generate(cipher).unwrap();
        for checksum in checksums {
            let ser = SerializeOptions::builder()
                .compression(CompressionAlgorithm::Lz4)
                .compression_threshold(64)
                .encryption(cipher, key.clone())
                .checksum(checksum)
                .build()
                .unwrap();
            let de = DeserializeOptions::builder().key(key.clone()).build().unwrap();
            assert_eq!(
                roundtrip(&player(), &ser, &de),
                player(),
                "{cipher:?} / {checksum:?}"
            );
        }
    }
}

#[test]
fn test_encryption_uses_fresh_nonces() {
    let key = EncryptionKey::generate(EncryptionAlgorithm::ChaCha20Poly1305).unwrap();
    let ser = SerializeOptions::builder()
        .encryption(EncryptionAlgorithm::ChaCha20Poly1305, key)
        .build()
        .unwrap();
    let serializer = BinarySerializer::new();
    let a = serializer.serialize(&entity(), &ser).into_value().unwrap();
    let b = serializer.serialize(&entity(), &ser).into_value().unwrap();
    assert_eq!(a.len(), b.len());
    assert_ne!(a, b);
}

#[test]
fn test_plain_frames_are_deterministic() {
    let serializer = BinarySerializer::new();
    let opts = SerializeOptions::for_storage();
    let a = serializer.serialize(&player(), &opts).into_value().unwrap();
    let b = serializer.serialize(&player(), &opts).into_value().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_interning_shrinks_repetitive_strings() {
    let serializer = BinarySerializer::new();
    let repetitive = Entity {
        tags: vec!["environment-tag".to_string(); 64],
        ..entity()
    };
    let size = |interned: bool| {
        let opts = SerializeOptions::builder()
            .flag(BehaviorFlags::INTERN_STRINGS, interned)
            .build()
            .unwrap();
        let written = serializer.serialize(&repetitive, &opts);
        let len = written.stats().unwrap().bytes_written;
        let frame = written.into_value().unwrap();
        let back = serializer
            .deserialize::<Entity>(&frame, &DeserializeOptions::default())
            .into_value();
        assert_eq!(back.as_ref(), Some(&repetitive));
        len
    };
    assert!(size(true) < size(false));
}
