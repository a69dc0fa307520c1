//! Endian-aware byte cursors used by the header codec and the member walk.
//!
//! The writer grows one owned `Vec<u8>`; the reader borrows the input slice and never
//! copies more than a caller asks for. Every read is bounds-checked and reports a
//! [`BufferOverflowError`] instead of panicking.

use crate::error::{BufferDirection, BufferOverflowError, ErrorCode, Result, SerializerError};
use serde::{Deserialize, Serialize};

/// Byte order for fixed-width fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the host.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// Maximum encoded length of a LEB128 u64.
const MAX_VARINT_LEN: usize = 10;

macro_rules! write_fixed {
    ($name:ident, $ty:ty) => {
        #[inline]
        pub fn $name(&mut self, value: $ty) -> Result<()> {
            let bytes = match self.endian {
                Endianness::Little => value.to_le_bytes(),
                Endianness::Big => value.to_be_bytes(),
            };
            self.write_bytes(&bytes)
        }
    };
}

macro_rules! read_fixed {
    ($name:ident, $ty:ty, $n:expr) => {
        #[inline]
        pub fn $name(&mut self) -> Result<$ty> {
            let mut raw = [0u8; $n];
            raw.copy_from_slice(self.read_slice($n)?);
            Ok(match self.endian {
                Endianness::Little => <$ty>::from_le_bytes(raw),
                Endianness::Big => <$ty>::from_be_bytes(raw),
            })
        }
    };
}

/// Growable output cursor.
#[derive(Debug)]
pub struct WireWriter {
    buf: Vec<u8>,
    endian: Endianness,
    bit_packed: bool,
    limit: usize,
}

impl WireWriter {
    pub fn new(buf: Vec<u8>, endian: Endianness, bit_packed: bool, limit: usize) -> Self {
        Self {
            buf,
            endian,
            bit_packed,
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Swap the underlying buffer, returning the previous one. Used to encode nested
    /// length-prefixed sections without a second writer type.
    pub fn replace_buffer(&mut self, buf: Vec<u8>) -> Vec<u8> {
        std::mem::replace(&mut self.buf, buf)
    }

    pub fn bit_packed(&self) -> bool {
        self.bit_packed
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.buf.len() + bytes.len() > self.limit {
            return Err(BufferOverflowError {
                direction: BufferDirection::Write,
                requested: bytes.len(),
                available: self.limit.saturating_sub(self.buf.len()),
                position: self.buf.len(),
            }
            .into());
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    write_fixed!(write_u16_fixed, u16);
    write_fixed!(write_u32_fixed, u32);
    write_fixed!(write_u64_fixed, u64);
    write_fixed!(write_i16_fixed, i16);
    write_fixed!(write_i32_fixed, i32);
    write_fixed!(write_i64_fixed, i64);
    write_fixed!(write_i128_fixed, i128);
    write_fixed!(write_f32, f32);
    write_fixed!(write_f64, f64);

    /// Unsigned LEB128.
    pub fn write_varint(&mut self, mut value: u64) -> Result<()> {
        let mut out = [0u8; MAX_VARINT_LEN];
        let mut n = 0;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                out[n] = byte;
                n += 1;
                break;
            }
            out[n] = byte | 0x80;
            n += 1;
        }
        self.write_bytes(&out[..n])
    }

    pub fn write_zigzag(&mut self, value: i64) -> Result<()> {
        self.write_varint(((value << 1) ^ (value >> 63)) as u64)
    }

    /// Unsigned integer: varint when bit-packed, otherwise fixed width.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        if self.bit_packed {
            self.write_varint(value as u64)
        } else {
            self.write_u16_fixed(value)
        }
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        if self.bit_packed {
            self.write_varint(value as u64)
        } else {
            self.write_u32_fixed(value)
        }
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        if self.bit_packed {
            self.write_varint(value)
        } else {
            self.write_u64_fixed(value)
        }
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        if self.bit_packed {
            self.write_zigzag(value as i64)
        } else {
            self.write_i16_fixed(value)
        }
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        if self.bit_packed {
            self.write_zigzag(value as i64)
        } else {
            self.write_i32_fixed(value)
        }
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        if self.bit_packed {
            self.write_zigzag(value)
        } else {
            self.write_i64_fixed(value)
        }
    }

    /// Length or count prefix.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| SerializerError::new(ErrorCode::DataTooLarge, "length exceeds u32"))?;
        self.write_u32(len)
    }
}

/// Bounds-checked input cursor over a borrowed slice.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endianness,
    bit_packed: bool,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8], endian: Endianness, bit_packed: bool) -> Self {
        Self {
            data,
            pos: 0,
            endian,
            bit_packed,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn bit_packed(&self) -> bool {
        self.bit_packed
    }

    #[inline]
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(BufferOverflowError {
                direction: BufferDirection::Read,
                requested: len,
                available: self.remaining(),
                position: self.pos,
            }
            .into());
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_slice(len).map(|_| ())
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or_else(|| {
            BufferOverflowError {
                direction: BufferDirection::Read,
                requested: 1,
                available: 0,
                position: self.pos,
            }
            .into()
        })
    }

    read_fixed!(read_u16_fixed, u16, 2);
    read_fixed!(read_u32_fixed, u32, 4);
    read_fixed!(read_u64_fixed, u64, 8);
    read_fixed!(read_i16_fixed, i16, 2);
    read_fixed!(read_i32_fixed, i32, 4);
    read_fixed!(read_i64_fixed, i64, 8);
    read_fixed!(read_i128_fixed, i128, 16);
    read_fixed!(read_f32, f32, 4);
    read_fixed!(read_f64, f64, 8);

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            let bits = (byte & 0x7F) as u64;
            if i == MAX_VARINT_LEN - 1 && bits > 1 {
                return Err(SerializerError::new(
                    ErrorCode::InvalidData,
                    crate::error::constants::ERR_VARINT_OVERFLOW,
                ));
            }
            result |= bits << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(SerializerError::new(
            ErrorCode::InvalidData,
            crate::error::constants::ERR_VARINT_OVERFLOW,
        ))
    }

    pub fn read_zigzag(&mut self) -> Result<i64> {
        let raw = self.read_varint()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    fn narrow<T: TryFrom<u64>>(raw: u64) -> Result<T> {
        T::try_from(raw)
            .map_err(|_| SerializerError::new(ErrorCode::InvalidData, "varint out of range"))
    }

    fn narrow_signed<T: TryFrom<i64>>(raw: i64) -> Result<T> {
        T::try_from(raw)
            .map_err(|_| SerializerError::new(ErrorCode::InvalidData, "varint out of range"))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        if self.bit_packed {
            Self::narrow(self.read_varint()?)
        } else {
            self.read_u16_fixed()
        }
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        if self.bit_packed {
            Self::narrow(self.read_varint()?)
        } else {
            self.read_u32_fixed()
        }
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        if self.bit_packed {
            self.read_varint()
        } else {
            self.read_u64_fixed()
        }
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        if self.bit_packed {
            Self::narrow_signed(self.read_zigzag()?)
        } else {
            self.read_i16_fixed()
        }
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        if self.bit_packed {
            Self::narrow_signed(self.read_zigzag()?)
        } else {
            self.read_i32_fixed()
        }
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        if self.bit_packed {
            self.read_zigzag()
        } else {
            self.read_i64_fixed()
        }
    }

    pub fn read_len(&mut self) -> Result<usize> {
        Ok(self.read_u32()? as usize)
    }
}
