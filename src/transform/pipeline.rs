//! Frame assembly: compression, then encryption, then checksum, then header.
//!
//! ```text
//! body = payload
//!      | compress  -> [algorithm id] compressed          (COMPRESSED)
//!      | encrypt   -> [algorithm id] nonce ct tag        (ENCRYPTED)
//! checksum(body)   -> header.payload_checksum            (HAS_CHECKSUM)
//! frame = header(32) body
//! ```
//!
//! Opening runs the same stages in reverse. The checksum is verified before any
//! decryption or decompression, and the decompressed size must equal the size the
//! header declares.

use super::checksum::ChecksumAlgorithm;
use super::compression::{self, CompressionAlgorithm};
use super::encryption::{self, EncryptionAlgorithm, EncryptionKey};
use crate::config::{BehaviorFlags, DeserializeOptions, SerializeOptions};
use crate::core::header::{
    pack_version, HeaderFlags, WireHeader, FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR, HEADER_SIZE,
};
use crate::error::{constants, ErrorCode, Result, SerializerError};
use std::borrow::Cow;
use tracing::{instrument, trace};

/// Associated data bound into every ciphertext: the root type hash and the format
/// version, so a body cannot be replayed under a different header.
fn associated_data(type_hash: u32, version: u16) -> [u8; 6] {
    let mut aad = [0u8; 6];
    aad[..4].copy_from_slice(&type_hash.to_le_bytes());
    aad[4..].copy_from_slice(&version.to_le_bytes());
    aad
}

fn missing_key() -> SerializerError {
    SerializerError::new(ErrorCode::InvalidEncryptionKey, constants::ERR_MISSING_KEY)
}

/// Split `[algorithm id] rest`.
fn split_algorithm<'a>(body: &'a [u8], stage: &str) -> Result<(u8, &'a [u8])> {
    body.split_first()
        .map(|(id, rest)| (*id, rest))
        .ok_or_else(|| {
            SerializerError::new(
                ErrorCode::DataTruncated,
                format!("{stage} body is missing its algorithm id"),
            )
        })
}

/// What [`seal`] did to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealReport {
    pub payload_size: usize,
    pub frame_size: usize,
    pub compressed: bool,
    pub encrypted: bool,
}

/// Wrap an encoded `payload` into a complete frame appended to `out`.
///
/// `flags` carries the structural bits chosen by the encoder; transform bits are added
/// here.
#[instrument(level = "trace", skip_all, fields(len = payload.len()))]
pub fn seal(
    payload: &[u8],
    flags: HeaderFlags,
    type_hash: u32,
    options: &SerializeOptions,
    out: &mut Vec<u8>,
) -> Result<SealReport> {
    let max = options.limits().max_payload_size;
    if payload.len() > max {
        return Err(SerializerError::new(
            ErrorCode::DataTooLarge,
            format!("payload of {} bytes exceeds {max}", payload.len()),
        ));
    }
    let mut flags = flags;

    let algorithm = options.compression();
    let (compressed, applied) = if options.has_flag(BehaviorFlags::ADAPTIVE_COMPRESSION) {
        compression::maybe_compress_adaptive(
            payload,
            algorithm,
            options.compression_level(),
            options.compression_threshold(),
        )?
    } else {
        compression::maybe_compress(
            payload,
            algorithm,
            options.compression_level(),
            options.compression_threshold(),
        )?
    };
    let mut body = if applied {
        flags |= HeaderFlags::COMPRESSED;
        let mut tagged = Vec::with_capacity(compressed.len() + 1);
        tagged.push(algorithm.id());
        tagged.extend_from_slice(&compressed);
        tagged
    } else {
        compressed
    };

    let cipher = options.encryption();
    if cipher.is_enabled() {
        let key = options.key().ok_or_else(missing_key)?;
        let version = pack_version(FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR);
        let aad = associated_data(type_hash, version);
        let sealed = encryption::encrypt(&body, cipher, key, &aad)?;
        flags |= HeaderFlags::ENCRYPTED;
        body = Vec::with_capacity(sealed.len() + 1);
        body.push(cipher.id());
        body.extend_from_slice(&sealed);
    }

    let checksum_algorithm = options.checksum();
    let checksum = if checksum_algorithm.is_enabled() {
        flags = (flags | HeaderFlags::HAS_CHECKSUM).with_checksum_algorithm_id(checksum_algorithm.id());
        checksum_algorithm.compute(&body)
    } else {
        0
    };

    let data_size = u32::try_from(body.len()).map_err(|_| {
        SerializerError::new(ErrorCode::DataTooLarge, "frame body exceeds the 32-bit size field")
    })?;
    let header = WireHeader::create(
        data_size,
        payload.len() as u32,
        flags,
        checksum,
        type_hash,
        options.endianness(),
    );

    let start = out.len();
    out.reserve(HEADER_SIZE + body.len());
    header.write_to(out);
    out.extend_from_slice(&body);

    trace!(
        payload = payload.len(),
        frame = out.len() - start,
        compressed = applied,
        encrypted = cipher.is_enabled(),
        checksum = checksum_algorithm.name(),
        "frame sealed"
    );
    Ok(SealReport {
        payload_size: payload.len(),
        frame_size: out.len() - start,
        compressed: applied,
        encrypted: cipher.is_enabled(),
    })
}

/// Parse and validate the header at the start of `bytes` against `options`.
pub fn open_header(bytes: &[u8], options: &DeserializeOptions) -> Result<WireHeader> {
    let header = WireHeader::read_from(bytes)?;
    header.validate_against(options.min_format_version(), options.check_minor_version())?;

    let available = bytes.len() - HEADER_SIZE;
    let data_size = header.data_size() as usize;
    if data_size > available {
        return Err(SerializerError::new(
            ErrorCode::DataTruncated,
            format!("{}: {data_size} declared, {available} available", constants::ERR_DATA_SIZE),
        ));
    }
    if data_size < available && !options.has_flag(BehaviorFlags::ALLOW_TRAILING_DATA) {
        return Err(SerializerError::new(
            ErrorCode::TrailingData,
            format!("{} bytes follow the frame", available - data_size),
        ));
    }

    let max = options.limits().max_payload_size;
    let uncompressed = header.uncompressed_size() as usize;
    if uncompressed > max {
        return Err(SerializerError::new(
            ErrorCode::DataTooLarge,
            format!("frame declares a {uncompressed}-byte payload, limit is {max}"),
        ));
    }
    Ok(header)
}

/// Verify, decrypt and decompress the body of a validated frame. Plain frames borrow
/// from `bytes`.
#[instrument(level = "trace", skip_all, fields(data_size = header.data_size()))]
pub fn open_body<'b>(
    header: &WireHeader,
    bytes: &'b [u8],
    key: Option<&EncryptionKey>,
) -> Result<Cow<'b, [u8]>> {
    let body = bytes
        .get(HEADER_SIZE..HEADER_SIZE + header.data_size() as usize)
        .ok_or_else(|| SerializerError::new(ErrorCode::DataTruncated, constants::ERR_DATA_SIZE))?;
    header.validate_data_checksum(body)?;

    let flags = header.flags();
    let mut payload: Cow<'b, [u8]> = Cow::Borrowed(body);

    if flags.contains(HeaderFlags::ENCRYPTED) {
        let (id, sealed) = split_algorithm(&payload, "encrypted")?;
        let algorithm = EncryptionAlgorithm::from_id(id)?;
        let key = key.ok_or_else(missing_key)?;
        let aad = associated_data(header.type_hash(), header.version());
        payload = Cow::Owned(encryption::decrypt(sealed, algorithm, key, &aad)?);
    }

    let expected = header.uncompressed_size() as usize;
    if flags.contains(HeaderFlags::COMPRESSED) {
        let (id, compressed) = split_algorithm(&payload, "compressed")?;
        let algorithm = CompressionAlgorithm::from_id(id)?;
        payload = Cow::Owned(compression::decompress(compressed, algorithm, expected)?);
    } else if payload.len() != expected {
        return Err(SerializerError::new(
            ErrorCode::DataCorrupted,
            format!(
                "payload is {} bytes, header declares {expected}",
                payload.len()
            ),
        ));
    }
    Ok(payload)
}

/// Checksum algorithm a frame was sealed with, `None` when it carries no checksum.
pub fn frame_checksum(header: &WireHeader) -> Result<ChecksumAlgorithm> {
    if header.flags().contains(HeaderFlags::HAS_CHECKSUM) {
        header.checksum_algorithm()
    } else {
        Ok(ChecksumAlgorithm::None)
    }
}
