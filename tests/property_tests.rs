//! Property-based tests using proptest
//!
//! These tests check frame invariants over randomly generated graphs, byte strings
//! and options.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use afrs::config::{DeserializeOptions, SerializeOptions};
use afrs::core::buffer::{Endianness, WireReader, WireWriter};
use afrs::core::header::{HeaderFlags, WireHeader};
use afrs::core::SerializationMode;
use afrs::transform::compression::{compress, decompress};
use afrs::transform::{ChecksumAlgorithm, CompressionAlgorithm};
use afrs::{binary_object, BinarySerializer, ErrorCode};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
struct Sample {
    id: i64,
    name: String,
    weights: Vec<f64>,
    labels: BTreeMap<String, u32>,
    nickname: Option<String>,
    flag: bool,
}

binary_object! {
    Sample => "prop.Sample", schema = 1 {
        id: i64 = 0,
        name: String = 1,
        weights: Vec<f64> = 2,
        labels: BTreeMap<String, u32> = 3,
        nickname: Option<String> = 4,
        flag: bool = 5,
    }
}

fn sample() -> impl Strategy<Value = Sample> {
    (
        any::<i64>(),
        ".{0,64}",
        prop::collection::vec(-1.0e12f64..1.0e12, 0..40),
        prop::collection::btree_map("[a-z]{1,8}", any::<u32>(), 0..8),
        prop::option::of("[A-Za-z ]{0,16}"),
        any::<bool>(),
    )
        .prop_map(|(id, name, weights, labels, nickname, flag)| Sample {
            id,
            name,
            weights,
            labels,
            nickname,
            flag,
        })
}

fn algorithm() -> impl Strategy<Value = CompressionAlgorithm> {
    prop::sample::select(vec![
        CompressionAlgorithm::Lz4,
        CompressionAlgorithm::Zstd,
        CompressionAlgorithm::Gzip,
        CompressionAlgorithm::Deflate,
    ])
}

// Property: every graph survives a round trip in every mode
proptest! {
    #[test]
    fn prop_typed_roundtrip(
        value in sample(),
        mode in prop::sample::select(SerializationMode::ALL.to_vec()),
        big_endian in any::<bool>(),
    ) {
        let endianness = if big_endian { Endianness::Big } else { Endianness::Little };
        let opts = SerializeOptions::builder()
            .mode(mode)
            .endianness(endianness)
            .build()
            .unwrap();
        let serializer = BinarySerializer::new();
        let frame = serializer.serialize(&value, &opts).into_value().unwrap();
        let back = serializer
            .deserialize::<Sample>(&frame, &DeserializeOptions::default())
            .into_value();
        prop_assert_eq!(back, Some(value));
    }
}

// Property: plain frames are a pure function of value and options
proptest! {
    #[test]
    fn prop_plain_frames_deterministic(value in sample()) {
        let serializer = BinarySerializer::new();
        let opts = SerializeOptions::for_storage();
        let first = serializer.serialize(&value, &opts).into_value().unwrap();
        let second = serializer.serialize(&value, &opts).into_value().unwrap();
        prop_assert_eq!(first, second);
    }
}

// Property: compression round trips at the exact declared size
proptest! {
    #[test]
    fn prop_compression_roundtrip(
        data in prop::collection::vec(any::<u8>(), 0..20_000),
        algorithm in algorithm(),
    ) {
        let packed = compress(&data, algorithm, 0).unwrap();
        let unpacked = decompress(&packed, algorithm, data.len()).unwrap();
        prop_assert_eq!(unpacked, data);
    }
}

// Property: a wrong declared size is always detected
proptest! {
    #[test]
    fn prop_decompression_size_is_exact(
        data in prop::collection::vec(any::<u8>(), 1..5_000),
        algorithm in algorithm(),
    ) {
        let packed = compress(&data, algorithm, 0).unwrap();
        let short = decompress(&packed, algorithm, data.len() - 1);
        prop_assert_eq!(short.unwrap_err().code(), ErrorCode::DecompressionFailed);
    }
}

// Property: headers survive their own byte form
proptest! {
    #[test]
    fn prop_header_bytes_roundtrip(
        data_size in any::<u32>(),
        uncompressed in any::<u32>(),
        checksum in any::<u32>(),
        type_hash in any::<u32>(),
        keyed in any::<bool>(),
        big_endian in any::<bool>(),
    ) {
        let mut flags = HeaderFlags::empty();
        flags.set(HeaderFlags::VERSION_TOLERANT, keyed);
        let endianness = if big_endian { Endianness::Big } else { Endianness::Little };
        let header = WireHeader::create(data_size, uncompressed, flags, checksum, type_hash, endianness);
        let parsed = WireHeader::read_from(&header.to_bytes()).unwrap();
        prop_assert_eq!(parsed, header);
        prop_assert!(parsed.validate().is_ok());
    }
}

// Property: varints and zigzag integers read back what was written
proptest! {
    #[test]
    fn prop_varint_roundtrip(values in prop::collection::vec(any::<i64>(), 0..64)) {
        let mut writer = WireWriter::new(Vec::new(), Endianness::Little, true, usize::MAX);
        for v in &values {
            writer.write_zigzag(*v).unwrap();
            writer.write_varint(v.unsigned_abs()).unwrap();
        }
        let bytes = writer.into_inner();
        let mut reader = WireReader::new(&bytes, Endianness::Little, true);
        for v in &values {
            prop_assert_eq!(reader.read_zigzag().unwrap(), *v);
            prop_assert_eq!(reader.read_varint().unwrap(), v.unsigned_abs());
        }
        prop_assert!(reader.is_exhausted());
    }
}

// Property: arbitrary input is rejected, never panics
proptest! {
    #[test]
    fn prop_arbitrary_bytes_rejected(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let outcome = BinarySerializer::new()
            .deserialize::<Sample>(&data, &DeserializeOptions::safe());
        prop_assert!(outcome.is_failure());
    }
}

// Property: a flipped body bit never decodes silently when a checksum is present
proptest! {
    #[test]
    fn prop_body_flip_detected(value in sample(), position in any::<prop::sample::Index>(), bit in 0u8..8) {
        let opts = SerializeOptions::builder()
            .checksum(ChecksumAlgorithm::XxHash64)
            .build()
            .unwrap();
        let serializer = BinarySerializer::new();
        let mut frame = serializer.serialize(&value, &opts).into_value().unwrap().to_vec();
        let body = afrs::core::HEADER_SIZE..frame.len();
        let index = body.start + position.index(body.len());
        frame[index] ^= 1 << bit;
        let outcome = serializer.deserialize::<Sample>(&frame, &DeserializeOptions::default());
        prop_assert_eq!(outcome.code(), ErrorCode::ChecksumFailed);
    }
}
