//! Frame integrity tests: header corruption, version gating, body checksums and the
//! order in which the transform stages reject bad input.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use afrs::config::{BehaviorFlags, DeserializeOptions, SerializeOptions};
use afrs::core::header::{HeaderFlags, HEADER_SIZE};
use afrs::error::ErrorCode;
use afrs::policy::VersionInfo;
use afrs::transform::checksum::fnv1a32;
use afrs::transform::{ChecksumAlgorithm, CompressionAlgorithm, EncryptionAlgorithm, EncryptionKey};
use afrs::{binary_object, BinarySerializer};

#[derive(Debug, Clone, PartialEq, Default)]
struct Record {
    id: u64,
    body: String,
}

binary_object! {
    Record => "integrity.Record", schema = 1 {
        id: u64 = 0,
        body: String = 1,
    }
}

fn record() -> Record {
    Record {
        id: 7,
        body: "integrity check payload ".repeat(32),
    }
}

fn frame(opts: &SerializeOptions) -> Vec<u8> {
    BinarySerializer::new()
        .serialize(&record(), opts)
        .into_value()
        .expect("serialize")
        .to_vec()
}

fn decode_code(bytes: &[u8], opts: &DeserializeOptions) -> ErrorCode {
    BinarySerializer::new()
        .deserialize::<Record>(bytes, opts)
        .code()
}

/// Recompute the header checksum after editing a little-endian header in place.
fn reseal_header(bytes: &mut [u8]) {
    let checksum = fnv1a32(&bytes[..HEADER_SIZE - 4]);
    bytes[HEADER_SIZE - 4..HEADER_SIZE].copy_from_slice(&checksum.to_le_bytes());
}

// ============================================================================
// HEADER CORRUPTION
// ============================================================================

#[test]
fn test_every_header_bit_flip_is_detected() {
    let original = frame(&SerializeOptions::default());
    let opts = DeserializeOptions::default();
    for byte in 0..HEADER_SIZE {
        for bit in 0..8 {
            let mut corrupted = original.clone();
            corrupted[byte] ^= 1 << bit;
            assert_eq!(
                decode_code(&corrupted, &opts),
                ErrorCode::ChecksumFailed,
                "byte {byte} bit {bit}"
            );
        }
    }
}

#[test]
fn test_short_input_is_truncated() {
    let original = frame(&SerializeOptions::default());
    let opts = DeserializeOptions::default();
    assert_eq!(decode_code(&[], &opts), ErrorCode::DataTruncated);
    assert_eq!(decode_code(&original[..HEADER_SIZE - 1], &opts), ErrorCode::DataTruncated);
    assert_eq!(
        decode_code(&original[..original.len() - 1], &opts),
        ErrorCode::DataTruncated
    );
}

#[test]
fn test_trailing_bytes_need_lenient_options() {
    let mut padded = frame(&SerializeOptions::default());
    padded.extend_from_slice(&[0xAA, 0xBB]);
    assert_eq!(
        decode_code(&padded, &DeserializeOptions::default()),
        ErrorCode::TrailingData
    );
    let lenient = DeserializeOptions::builder()
        .flag(BehaviorFlags::ALLOW_TRAILING_DATA, true)
        .build()
        .unwrap();
    assert_eq!(decode_code(&padded, &lenient), ErrorCode::Success);
}

#[test]
fn test_flag_and_magic_must_agree() {
    let mut bytes = frame(&SerializeOptions::default());
    let flags = u16::from_le_bytes([bytes[6], bytes[7]]) | HeaderFlags::COMPRESSED.bits();
    bytes[6..8].copy_from_slice(&flags.to_le_bytes());
    reseal_header(&mut bytes);
    assert_eq!(
        decode_code(&bytes, &DeserializeOptions::default()),
        ErrorCode::InvalidHeader
    );
}

// ============================================================================
// VERSION GATE
// ============================================================================

#[test]
fn test_major_version_mismatch() {
    let mut bytes = frame(&SerializeOptions::default());
    // version is major in the high byte; little-endian puts it second
    bytes[5] = 2;
    reseal_header(&mut bytes);
    assert_eq!(
        decode_code(&bytes, &DeserializeOptions::default()),
        ErrorCode::VersionMismatch
    );
}

#[test]
fn test_minor_version_checked_only_on_request() {
    let bytes = frame(&SerializeOptions::default());
    let needs_minor = |check: bool| {
        DeserializeOptions::builder()
            .min_format_version(VersionInfo::new(1, 1, 0))
            .check_minor_version(check)
            .build()
            .unwrap()
    };
    assert_eq!(decode_code(&bytes, &needs_minor(false)), ErrorCode::Success);
    assert_eq!(decode_code(&bytes, &needs_minor(true)), ErrorCode::VersionMismatch);
}

#[test]
fn test_newer_minor_is_accepted() {
    let mut bytes = frame(&SerializeOptions::default());
    bytes[4] = 9;
    reseal_header(&mut bytes);
    let strict = DeserializeOptions::builder()
        .check_minor_version(true)
        .build()
        .unwrap();
    assert_eq!(decode_code(&bytes, &strict), ErrorCode::Success);
}

// ============================================================================
// BODY INTEGRITY
// ============================================================================

#[test]
fn test_body_corruption_fails_checksum_for_every_algorithm() {
    for checksum in [
        ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::Fnv1a32,
        ChecksumAlgorithm::XxHash32,
        ChecksumAlgorithm::XxHash64,
        ChecksumAlgorithm::Sha256,
    ] {
        let opts = SerializeOptions::builder().checksum(checksum).build().unwrap();
        let mut bytes = frame(&opts);
        let middle = HEADER_SIZE + (bytes.len() - HEADER_SIZE) / 2;
        bytes[middle] ^= 0x01;
        assert_eq!(
            decode_code(&bytes, &DeserializeOptions::default()),
            ErrorCode::ChecksumFailed,
            "{checksum:?}"
        );
    }
}

#[test]
fn test_checksum_is_verified_before_decryption() {
    let key = EncryptionKey::generate(EncryptionAlgorithm::Aes256Gcm).unwrap();
    let opts = SerializeOptions::builder()
        .encryption(EncryptionAlgorithm::Aes256Gcm, key.clone())
        .checksum(ChecksumAlgorithm::Crc32)
        .build()
        .unwrap();
    let mut bytes = frame(&opts);
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;

    let de = DeserializeOptions::builder().key(key).build().unwrap();
    assert_eq!(decode_code(&bytes, &de), ErrorCode::ChecksumFailed);
}

#[test]
fn test_checksum_precedes_decrypt_and_decompress() {
    let key = EncryptionKey::generate(EncryptionAlgorithm::ChaCha20Poly1305).unwrap();
    let de = DeserializeOptions::builder().key(key.clone()).build().unwrap();
    for compression in [
        CompressionAlgorithm::Zstd,
        CompressionAlgorithm::Lz4,
        CompressionAlgorithm::Deflate,
    ] {
        let opts = SerializeOptions::builder()
            .compression(compression)
            .compression_threshold(0)
            .encryption(EncryptionAlgorithm::ChaCha20Poly1305, key.clone())
            .checksum(ChecksumAlgorithm::XxHash64)
            .build()
            .unwrap();
        let mut bytes = frame(&opts);
        let flags = HeaderFlags::from_bits_retain(u16::from_le_bytes([bytes[6], bytes[7]]));
        assert!(flags.contains(HeaderFlags::COMPRESSED), "{compression:?}");
        assert!(flags.contains(HeaderFlags::ENCRYPTED), "{compression:?}");
        assert_eq!(decode_code(&bytes, &de), ErrorCode::Success, "{compression:?}");

        let middle = HEADER_SIZE + (bytes.len() - HEADER_SIZE) / 2;
        bytes[middle] ^= 0x01;
        assert_eq!(
            decode_code(&bytes, &de),
            ErrorCode::ChecksumFailed,
            "{compression:?}"
        );
    }
}

#[test]
fn test_sealed_header_with_foreign_magic() {
    let mut bytes = frame(&SerializeOptions::default());
    bytes[..4].copy_from_slice(b"ZZZZ");
    assert_eq!(
        decode_code(&bytes, &DeserializeOptions::default()),
        ErrorCode::ChecksumFailed
    );
    reseal_header(&mut bytes);
    assert_eq!(
        decode_code(&bytes, &DeserializeOptions::default()),
        ErrorCode::InvalidMagicNumber
    );
}

#[test]
fn test_tampering_without_checksum_fails_authentication() {
    let key = EncryptionKey::generate(EncryptionAlgorithm::ChaCha20Poly1305).unwrap();
    let opts = SerializeOptions::builder()
        .encryption(EncryptionAlgorithm::ChaCha20Poly1305, key.clone())
        .checksum(ChecksumAlgorithm::None)
        .build()
        .unwrap();
    let mut bytes = frame(&opts);
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;

    let de = DeserializeOptions::builder().key(key).build().unwrap();
    assert_eq!(decode_code(&bytes, &de), ErrorCode::AuthenticationFailed);
}

#[test]
fn test_wrong_or_missing_key() {
    let key = EncryptionKey::generate(EncryptionAlgorithm::Aes128Gcm).unwrap();
    let opts = SerializeOptions::builder()
        .encryption(EncryptionAlgorithm::Aes128Gcm, key)
        .build()
        .unwrap();
    let bytes = frame(&opts);

    let other = EncryptionKey::generate(EncryptionAlgorithm::Aes128Gcm).unwrap();
    let wrong = DeserializeOptions::builder().key(other).build().unwrap();
    assert_eq!(decode_code(&bytes, &wrong), ErrorCode::AuthenticationFailed);

    assert_eq!(
        decode_code(&bytes, &DeserializeOptions::default()),
        ErrorCode::InvalidEncryptionKey
    );

    let short = DeserializeOptions::builder()
        .key(EncryptionKey::new(vec![1u8; 5]))
        .build();
    assert!(short.is_ok(), "key length is checked against the frame's algorithm");
    assert_eq!(
        decode_code(&bytes, &short.unwrap()),
        ErrorCode::InvalidEncryptionKey
    );
}

#[test]
fn test_type_hash_is_bound_to_ciphertext() {
    let key = EncryptionKey::generate(EncryptionAlgorithm::XChaCha20Poly1305).unwrap();
    let opts = SerializeOptions::builder()
        .encryption(EncryptionAlgorithm::XChaCha20Poly1305, key.clone())
        .checksum(ChecksumAlgorithm::None)
        .build()
        .unwrap();
    let mut bytes = frame(&opts);
    bytes[20] ^= 0x01;
    reseal_header(&mut bytes);

    let de = DeserializeOptions::builder().key(key).build().unwrap();
    assert_eq!(decode_code(&bytes, &de), ErrorCode::AuthenticationFailed);
}

// ============================================================================
// SIZE BOUNDS
// ============================================================================

#[test]
fn test_declared_uncompressed_size_is_bounded_before_decompression() {
    let opts = SerializeOptions::builder()
        .compression(CompressionAlgorithm::Zstd)
        .compression_threshold(64)
        .checksum(ChecksumAlgorithm::None)
        .build()
        .unwrap();
    let mut bytes = frame(&opts);
    bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
    reseal_header(&mut bytes);
    assert_eq!(
        decode_code(&bytes, &DeserializeOptions::default()),
        ErrorCode::DataTooLarge
    );
}

#[test]
fn test_decompressed_size_must_match_header() {
    let opts = SerializeOptions::builder()
        .compression(CompressionAlgorithm::Lz4)
        .compression_threshold(64)
        .checksum(ChecksumAlgorithm::None)
        .build()
        .unwrap();
    let mut bytes = frame(&opts);
    let declared = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    bytes[12..16].copy_from_slice(&(declared - 1).to_le_bytes());
    reseal_header(&mut bytes);
    let code = decode_code(&bytes, &DeserializeOptions::default());
    assert_eq!(code, ErrorCode::DecompressionFailed);
}

#[test]
fn test_small_payload_limit_rejects_frame() {
    let bytes = frame(&SerializeOptions::default());
    let tight = DeserializeOptions::builder()
        .max_payload_size(64)
        .build()
        .unwrap();
    assert_eq!(decode_code(&bytes, &tight), ErrorCode::DataTooLarge);
}
