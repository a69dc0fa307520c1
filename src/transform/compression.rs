//! Compression providers with threshold and adaptive selection.
//!
//! Decompression is always bounded by a caller-supplied `expected_size` (taken from the
//! frame header, already checked against `max_payload_size`). Output that would exceed it
//! is rejected before it is allocated, so a small compressed body cannot expand into an
//! unbounded buffer.

use crate::error::{constants, ErrorCode, Result, SerializerError};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::trace;

/// Minimum entropy threshold for compression (0.0-8.0 bits per byte).
/// Data above this is unlikely to compress well.
const MIN_ENTROPY_THRESHOLD: f64 = 7.0;

/// Bytes sampled for the entropy estimate.
const ENTROPY_SAMPLE: usize = 512;

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
pub enum CompressionAlgorithm {
    #[default]
    None = 0,
    Lz4 = 1,
    Zstd = 2,
    Gzip = 3,
    Deflate = 4,
}

impl CompressionAlgorithm {
    pub fn id(self) -> u8 {
        self.into()
    }

    pub fn from_id(id: u8) -> Result<Self> {
        Self::try_from_primitive(id).map_err(|_| {
            SerializerError::new(
                ErrorCode::UnsupportedAlgorithm,
                format!("unknown compression algorithm id {id}"),
            )
        })
    }

    pub fn is_enabled(self) -> bool {
        self != CompressionAlgorithm::None
    }

    /// Valid level range, or `None` when the algorithm ignores levels.
    pub fn level_range(self) -> Option<(i32, i32)> {
        match self {
            CompressionAlgorithm::Zstd => Some((1, 22)),
            CompressionAlgorithm::Gzip | CompressionAlgorithm::Deflate => Some((0, 9)),
            CompressionAlgorithm::None | CompressionAlgorithm::Lz4 => None,
        }
    }

    /// Level used when the options leave it at zero.
    pub fn default_level(self) -> i32 {
        match self {
            CompressionAlgorithm::Zstd => 3,
            CompressionAlgorithm::Gzip | CompressionAlgorithm::Deflate => 6,
            CompressionAlgorithm::None | CompressionAlgorithm::Lz4 => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Deflate => "deflate",
        }
    }
}

/// Calculate Shannon entropy of data (bits per byte).
/// Returns a value between 0.0 (all identical) and 8.0 (perfectly random).
pub(crate) fn calculate_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut freq = [0u32; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in &freq {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Adaptive compression decision based on size and entropy.
fn should_compress_adaptive(data: &[u8], threshold_bytes: usize) -> bool {
    if data.len() < threshold_bytes {
        return false;
    }
    // Small payloads: the sample would be the whole input anyway.
    if data.len() < 1024 {
        return true;
    }
    let sample = &data[..data.len().min(ENTROPY_SAMPLE)];
    calculate_entropy(sample) < MIN_ENTROPY_THRESHOLD
}

fn resolve_level(algorithm: CompressionAlgorithm, level: i32) -> i32 {
    if level == 0 {
        algorithm.default_level()
    } else {
        level
    }
}

fn compression_failed(algorithm: CompressionAlgorithm, err: impl std::fmt::Display) -> SerializerError {
    SerializerError::new(
        ErrorCode::CompressionFailed,
        format!("{} ({}): {err}", constants::ERR_COMPRESSION_FAILED, algorithm.name()),
    )
}

fn decompression_failed(algorithm: CompressionAlgorithm, detail: impl std::fmt::Display) -> SerializerError {
    SerializerError::new(
        ErrorCode::DecompressionFailed,
        format!("{} ({}): {detail}", constants::ERR_DECOMPRESSION_FAILED, algorithm.name()),
    )
}

/// Compress `data`. `level` of zero selects the algorithm default.
///
/// # Errors
/// `CompressionFailed` if the provider reports an error.
pub fn compress(data: &[u8], algorithm: CompressionAlgorithm, level: i32) -> Result<Vec<u8>> {
    let level = resolve_level(algorithm, level);
    match algorithm {
        CompressionAlgorithm::None => Ok(data.to_vec()),
        CompressionAlgorithm::Lz4 => Ok(lz4_flex::compress(data)),
        CompressionAlgorithm::Zstd => {
            let mut out = Vec::new();
            zstd::stream::copy_encode(data, &mut out, level)
                .map_err(|e| compression_failed(algorithm, e))?;
            Ok(out)
        }
        CompressionAlgorithm::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(
                Vec::with_capacity(data.len() / 2),
                flate2::Compression::new(level.clamp(0, 9) as u32),
            );
            encoder
                .write_all(data)
                .map_err(|e| compression_failed(algorithm, e))?;
            encoder.finish().map_err(|e| compression_failed(algorithm, e))
        }
        CompressionAlgorithm::Deflate => {
            let mut encoder = flate2::write::DeflateEncoder::new(
                Vec::with_capacity(data.len() / 2),
                flate2::Compression::new(level.clamp(0, 9) as u32),
            );
            encoder
                .write_all(data)
                .map_err(|e| compression_failed(algorithm, e))?;
            encoder.finish().map_err(|e| compression_failed(algorithm, e))
        }
    }
}

/// Decompress `data` into exactly `expected_size` bytes.
///
/// # Errors
/// `DecompressionFailed` if the input is malformed or the output size differs from
/// `expected_size`. Streaming decoders stop reading one byte past the limit.
pub fn decompress(data: &[u8], algorithm: CompressionAlgorithm, expected_size: usize) -> Result<Vec<u8>> {
    let out = match algorithm {
        CompressionAlgorithm::None => data.to_vec(),
        CompressionAlgorithm::Lz4 => lz4_flex::decompress(data, expected_size)
            .map_err(|e| decompression_failed(algorithm, e))?,
        CompressionAlgorithm::Zstd => {
            let decoder = zstd::stream::Decoder::new(data)
                .map_err(|e| decompression_failed(algorithm, e))?;
            read_bounded(decoder, algorithm, expected_size)?
        }
        CompressionAlgorithm::Gzip => {
            read_bounded(flate2::read::GzDecoder::new(data), algorithm, expected_size)?
        }
        CompressionAlgorithm::Deflate => read_bounded(
            flate2::read::DeflateDecoder::new(data),
            algorithm,
            expected_size,
        )?,
    };

    if out.len() != expected_size {
        return Err(decompression_failed(
            algorithm,
            format_args!(
                "{}: expected {expected_size}, got {}",
                constants::ERR_DECOMPRESSED_SIZE,
                out.len()
            ),
        ));
    }
    Ok(out)
}

/// Read at most `limit + 1` bytes so an oversized stream is detected without
/// buffering all of it.
fn read_bounded<R: Read>(reader: R, algorithm: CompressionAlgorithm, limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(limit.min(64 * 1024));
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| decompression_failed(algorithm, e))?;
    if out.len() > limit {
        return Err(decompression_failed(
            algorithm,
            format_args!("output exceeds declared size {limit}"),
        ));
    }
    Ok(out)
}

/// Compress data if it meets the configured threshold, otherwise return it unchanged.
/// Returns the output bytes and a flag indicating whether compression was applied.
pub fn maybe_compress(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    level: i32,
    threshold_bytes: usize,
) -> Result<(Vec<u8>, bool)> {
    if !algorithm.is_enabled() || data.len() < threshold_bytes {
        Ok((data.to_vec(), false))
    } else {
        Ok((compress(data, algorithm, level)?, true))
    }
}

/// Like [`maybe_compress`], but skips high-entropy input and keeps the raw bytes when
/// the compressed form is not smaller.
pub fn maybe_compress_adaptive(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    level: i32,
    threshold_bytes: usize,
) -> Result<(Vec<u8>, bool)> {
    if !algorithm.is_enabled() || !should_compress_adaptive(data, threshold_bytes) {
        trace!(len = data.len(), "adaptive compression skipped");
        return Ok((data.to_vec(), false));
    }

    let compressed = compress(data, algorithm, level)?;
    // +1 for the algorithm id prefix the pipeline adds
    if compressed.len() + 1 < data.len() {
        Ok((compressed, true))
    } else {
        trace!(
            raw = data.len(),
            compressed = compressed.len(),
            "compression not beneficial"
        );
        Ok((data.to_vec(), false))
    }
}
