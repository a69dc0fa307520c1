//! Payload and header integrity hashes.
//!
//! Every algorithm produces a 32-bit value so it fits the header's checksum slot. Wider
//! digests are folded (xxHash64) or truncated (SHA-256).

use crate::error::{ErrorCode, Result, SerializerError};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a, 32-bit. Used for the header checksum and for type hashes.
#[inline]
pub fn fnv1a32(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Checksum algorithm tag. The discriminant is stored in the upper nibble of the
/// header flags, so at most 15 algorithms fit.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
pub enum ChecksumAlgorithm {
    None = 0,
    #[default]
    Crc32 = 1,
    Fnv1a32 = 2,
    XxHash32 = 3,
    XxHash64 = 4,
    Sha256 = 5,
}

impl ChecksumAlgorithm {
    pub fn id(self) -> u8 {
        self.into()
    }

    pub fn from_id(id: u8) -> Result<Self> {
        Self::try_from_primitive(id).map_err(|_| {
            SerializerError::new(
                ErrorCode::UnsupportedAlgorithm,
                format!("unknown checksum algorithm id {id}"),
            )
        })
    }

    pub fn is_enabled(self) -> bool {
        self != ChecksumAlgorithm::None
    }

    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::None => "none",
            ChecksumAlgorithm::Crc32 => "crc32",
            ChecksumAlgorithm::Fnv1a32 => "fnv1a32",
            ChecksumAlgorithm::XxHash32 => "xxhash32",
            ChecksumAlgorithm::XxHash64 => "xxhash64",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }

    /// Hash `data`. `None` always yields zero.
    pub fn compute(self, data: &[u8]) -> u32 {
        match self {
            ChecksumAlgorithm::None => 0,
            ChecksumAlgorithm::Crc32 => crc32fast::hash(data),
            ChecksumAlgorithm::Fnv1a32 => fnv1a32(data),
            ChecksumAlgorithm::XxHash32 => xxhash_rust::xxh32::xxh32(data, 0),
            ChecksumAlgorithm::XxHash64 => {
                let wide = xxhash_rust::xxh64::xxh64(data, 0);
                (wide ^ (wide >> 32)) as u32
            }
            ChecksumAlgorithm::Sha256 => {
                let digest = Sha256::digest(data);
                u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
            }
        }
    }
}
