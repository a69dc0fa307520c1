//! # Wire Header
//!
//! Fixed 32-byte frame prefix. Every field is written in the frame's byte order; the
//! order is recovered on read from whichever interpretation of the magic is recognized
//! and then cross-checked against the `BIG_ENDIAN` flag.
//!
//! ```text
//! [Magic(4)] [Version(2)] [Flags(2)] [DataSize(4)] [UncompressedSize(4)]
//! [PayloadChecksum(4)] [TypeHash(4)] [Reserved(4)] [HeaderChecksum(4)]
//! ```
//!
//! `HeaderChecksum` is FNV-1a over the 28 preceding encoded bytes. Nothing after the
//! header may be interpreted until [`WireHeader::validate`] succeeds, because the size
//! and flag fields are untrusted until then.

use crate::core::buffer::{Endianness, WireReader};
use crate::error::{constants, ErrorCode, Result, SerializerError};
use crate::policy::version::VersionInfo;
use crate::transform::checksum::{fnv1a32, ChecksumAlgorithm};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Total encoded header size.
pub const HEADER_SIZE: usize = 32;

/// Bytes covered by the header checksum.
const CHECKSUMMED_LEN: usize = HEADER_SIZE - 4;

/// "AFRS": plain payload
pub const MAGIC_PLAIN: u32 = 0x4146_5253;
/// "AFRC": compressed payload
pub const MAGIC_COMPRESSED: u32 = 0x4146_5243;
/// "AFRE": encrypted payload
pub const MAGIC_ENCRYPTED: u32 = 0x4146_5245;

/// Current frame format version.
pub const FORMAT_VERSION_MAJOR: u8 = 1;
pub const FORMAT_VERSION_MINOR: u8 = 0;

bitflags! {
    /// 16-bit header flag set. The upper nibble carries the checksum algorithm id.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct HeaderFlags: u16 {
        const COMPRESSED = 0x0001;
        const ENCRYPTED = 0x0002;
        const HAS_CHECKSUM = 0x0004;
        const HAS_TYPE_INFO = 0x0008;
        const VERSION_TOLERANT = 0x0010;
        const CIRCULAR_REFERENCE = 0x0020;
        const POLYMORPHIC = 0x0040;
        const STREAMING = 0x0080;
        const BIG_ENDIAN = 0x0100;
        const DEBUG_INFO = 0x0200;
        const STRING_INTERN = 0x0400;
        const BIT_PACKED = 0x0800;
        const CHECKSUM_ALGORITHM_MASK = 0xF000;
    }
}

impl HeaderFlags {
    /// Flags describing payload structure (as opposed to transforms or byte order).
    pub const STRUCTURAL: HeaderFlags = HeaderFlags::VERSION_TOLERANT
        .union(HeaderFlags::CIRCULAR_REFERENCE)
        .union(HeaderFlags::POLYMORPHIC)
        .union(HeaderFlags::STREAMING);

    pub fn checksum_algorithm_id(self) -> u8 {
        ((self.bits() & Self::CHECKSUM_ALGORITHM_MASK.bits()) >> 12) as u8
    }

    pub fn with_checksum_algorithm_id(self, id: u8) -> Self {
        let cleared = self.bits() & !Self::CHECKSUM_ALGORITHM_MASK.bits();
        HeaderFlags::from_bits_retain(cleared | (((id & 0x0F) as u16) << 12))
    }
}

/// Pack a major/minor pair into the 2-byte version field.
pub fn pack_version(major: u8, minor: u8) -> u16 {
    ((major as u16) << 8) | minor as u16
}

pub fn unpack_version(raw: u16) -> (u8, u8) {
    ((raw >> 8) as u8, (raw & 0xFF) as u8)
}

/// Parsed or freshly built frame header. Read-only once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    magic: u32,
    version: u16,
    flags: HeaderFlags,
    data_size: u32,
    uncompressed_size: u32,
    payload_checksum: u32,
    type_hash: u32,
    reserved: u32,
    header_checksum: u32,
    endianness: Endianness,
}

impl WireHeader {
    /// Build a header for a body whose transforms are already applied.
    ///
    /// The magic is derived from the transform flags and `BIG_ENDIAN` is set from
    /// `endianness`, so callers only pass structural and transform bits.
    pub fn create(
        data_size: u32,
        uncompressed_size: u32,
        flags: HeaderFlags,
        payload_checksum: u32,
        type_hash: u32,
        endianness: Endianness,
    ) -> Self {
        let mut flags = flags;
        flags.set(HeaderFlags::BIG_ENDIAN, endianness == Endianness::Big);
        let magic = magic_for(flags);

        let mut header = Self {
            magic,
            version: pack_version(FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR),
            flags,
            data_size,
            uncompressed_size,
            payload_checksum,
            type_hash,
            reserved: 0,
            header_checksum: 0,
            endianness,
        };
        header.header_checksum = header.compute_checksum();
        header
    }

    /// Parse the first 32 bytes of `bytes` without touching the payload.
    ///
    /// An unrecognized magic is not an error here; it is reported by [`validate`](Self::validate).
    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SerializerError::new(
                ErrorCode::DataTruncated,
                constants::ERR_HEADER_TOO_SHORT,
            ));
        }

        let raw_magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let endianness = if is_known_magic(u32::from_le_bytes(raw_magic)) {
            Endianness::Little
        } else if is_known_magic(u32::from_be_bytes(raw_magic)) {
            Endianness::Big
        } else {
            Endianness::Little
        };

        let mut reader = WireReader::new(&bytes[..HEADER_SIZE], endianness, false);
        Ok(Self {
            magic: reader.read_u32_fixed()?,
            version: reader.read_u16_fixed()?,
            flags: HeaderFlags::from_bits_retain(reader.read_u16_fixed()?),
            data_size: reader.read_u32_fixed()?,
            uncompressed_size: reader.read_u32_fixed()?,
            payload_checksum: reader.read_u32_fixed()?,
            type_hash: reader.read_u32_fixed()?,
            reserved: reader.read_u32_fixed()?,
            header_checksum: reader.read_u32_fixed()?,
            endianness,
        })
    }

    /// Check header integrity, magic, format version and flag consistency, in that
    /// order. Integrity comes first so that a damaged magic or version field is reported
    /// as corruption rather than as a foreign or incompatible frame.
    pub fn validate(&self) -> Result<()> {
        self.validate_against(
            &VersionInfo::new(FORMAT_VERSION_MAJOR as u16, 0, 0),
            false,
        )
    }

    /// [`validate`](Self::validate) with an explicit minimum format version.
    pub fn validate_against(&self, required: &VersionInfo, check_minor: bool) -> Result<()> {
        if self.compute_checksum() != self.header_checksum {
            return Err(SerializerError::new(
                ErrorCode::ChecksumFailed,
                constants::ERR_HEADER_CHECKSUM,
            ));
        }

        if !is_known_magic(self.magic) {
            return Err(SerializerError::new(
                ErrorCode::InvalidMagicNumber,
                format!("{}: 0x{:08X}", constants::ERR_INVALID_MAGIC, self.magic),
            ));
        }

        let data_version = self.format_version();
        let supported = VersionInfo::new(
            FORMAT_VERSION_MAJOR as u16,
            FORMAT_VERSION_MINOR as u16,
            0,
        );
        if !VersionInfo::is_compatible(&data_version, required, check_minor)
            || data_version.major != supported.major
        {
            return Err(SerializerError::new(
                ErrorCode::VersionMismatch,
                format!(
                    "frame format {}.{} is not compatible with required {}.{}",
                    data_version.major, data_version.minor, required.major, required.minor
                ),
            ));
        }

        if self.flags.contains(HeaderFlags::BIG_ENDIAN) != (self.endianness == Endianness::Big) {
            return Err(SerializerError::new(
                ErrorCode::InvalidHeader,
                constants::ERR_ENDIAN_FLAG,
            ));
        }

        if magic_for(self.flags) != self.magic {
            return Err(SerializerError::new(
                ErrorCode::InvalidHeader,
                constants::ERR_MAGIC_FLAGS,
            ));
        }

        if self.flags.contains(HeaderFlags::HAS_CHECKSUM)
            != (self.flags.checksum_algorithm_id() != 0)
        {
            return Err(SerializerError::new(
                ErrorCode::InvalidHeader,
                "HasChecksum flag disagrees with checksum algorithm id",
            ));
        }

        Ok(())
    }

    /// Verify the payload checksum over the body exactly as it follows the header.
    pub fn validate_data_checksum(&self, body: &[u8]) -> Result<()> {
        if !self.flags.contains(HeaderFlags::HAS_CHECKSUM) {
            return Ok(());
        }
        let algorithm = self.checksum_algorithm()?;
        if algorithm.compute(body) != self.payload_checksum {
            return Err(SerializerError::new(
                ErrorCode::ChecksumFailed,
                constants::ERR_PAYLOAD_CHECKSUM,
            ));
        }
        Ok(())
    }

    pub fn checksum_algorithm(&self) -> Result<ChecksumAlgorithm> {
        ChecksumAlgorithm::from_id(self.flags.checksum_algorithm_id())
    }

    /// Encode into a new 32-byte array.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..CHECKSUMMED_LEN].copy_from_slice(&self.encode_prefix());
        let tail = match self.endianness {
            Endianness::Little => self.header_checksum.to_le_bytes(),
            Endianness::Big => self.header_checksum.to_be_bytes(),
        };
        out[CHECKSUMMED_LEN..].copy_from_slice(&tail);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bytes());
    }

    fn encode_prefix(&self) -> [u8; CHECKSUMMED_LEN] {
        let (u16_bytes, u32_bytes): (fn(u16) -> [u8; 2], fn(u32) -> [u8; 4]) =
            match self.endianness {
                Endianness::Little => (u16::to_le_bytes, u32::to_le_bytes),
                Endianness::Big => (u16::to_be_bytes, u32::to_be_bytes),
            };

        let mut out = [0u8; CHECKSUMMED_LEN];
        let mut at = 0;
        let mut put = |field: &[u8]| {
            out[at..at + field.len()].copy_from_slice(field);
            at += field.len();
        };
        put(&u32_bytes(self.magic));
        put(&u16_bytes(self.version));
        put(&u16_bytes(self.flags.bits()));
        put(&u32_bytes(self.data_size));
        put(&u32_bytes(self.uncompressed_size));
        put(&u32_bytes(self.payload_checksum));
        put(&u32_bytes(self.type_hash));
        put(&u32_bytes(self.reserved));
        out
    }

    fn compute_checksum(&self) -> u32 {
        fnv1a32(&self.encode_prefix())
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn format_version(&self) -> VersionInfo {
        let (major, minor) = unpack_version(self.version);
        VersionInfo::new(major as u16, minor as u16, 0)
    }

    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    pub fn payload_checksum(&self) -> u32 {
        self.payload_checksum
    }

    pub fn type_hash(&self) -> u32 {
        self.type_hash
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn header_checksum(&self) -> u32 {
        self.header_checksum
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Total frame length announced by this header.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.data_size as usize
    }
}

fn is_known_magic(magic: u32) -> bool {
    matches!(magic, MAGIC_PLAIN | MAGIC_COMPRESSED | MAGIC_ENCRYPTED)
}

fn magic_for(flags: HeaderFlags) -> u32 {
    if flags.contains(HeaderFlags::ENCRYPTED) {
        MAGIC_ENCRYPTED
    } else if flags.contains(HeaderFlags::COMPRESSED) {
        MAGIC_COMPRESSED
    } else {
        MAGIC_PLAIN
    }
}
