//! Bounds-checked random-access reads

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{Codec, Endian};
use crate::error::{Error, Result};

macro_rules! read_fn {
    ($name:ident, $ty:ty, $size:expr, $method:ident) => {
        #[doc = concat!("Reads a `", stringify!($ty), "` at `offset` in the codec byte order.")]
        pub fn $name(&self, offset: usize) -> Result<$ty> {
            let bytes = self.bytes(offset, $size)?;
            Ok(match self.codec.endian {
                Endian::Little => LittleEndian::$method(bytes),
                Endian::Big => BigEndian::$method(bytes),
            })
        }
    };
}

/// A view over a decompressed byte sequence.
///
/// All reads take file-relative offsets and fail with
/// [`Error::Truncated`] instead of panicking when the data runs out.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    codec: Codec,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], codec: Codec) -> Self {
        Self { data, codec }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same data, different byte order.
    #[must_use]
    pub fn with_endian(&self, endian: Endian) -> Self {
        Self {
            data: self.data,
            codec: self.codec.with_endian(endian),
        }
    }

    /// Borrows `len` bytes at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(Error::Truncated {
                offset,
                len,
                size: self.data.len(),
            })
    }

    pub fn u8(&self, offset: usize) -> Result<u8> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn i8(&self, offset: usize) -> Result<i8> {
        Ok(self.u8(offset)? as i8)
    }

    read_fn!(u16, u16, 2, read_u16);
    read_fn!(i16, i16, 2, read_i16);
    read_fn!(u32, u32, 4, read_u32);
    read_fn!(i32, i32, 4, read_i32);
    read_fn!(u64, u64, 8, read_u64);
    read_fn!(i64, i64, 8, read_i64);
    read_fn!(f32, f32, 4, read_f32);
    read_fn!(f64, f64, 8, read_f64);

    /// Reads a pointer and rebases it to a file-relative offset.
    ///
    /// Null pointers yield `None`. A pointer below the image base cannot be
    /// resolved and is reported as [`Error::NullReference`].
    pub fn ptr(&self, offset: usize) -> Result<Option<u32>> {
        let raw = self.u32(offset)?;
        if raw == 0 {
            return Ok(None);
        }
        self.codec
            .rebase(raw)
            .map(Some)
            .ok_or(Error::NullReference {
                what: "pointer",
                address: offset as u32,
            })
    }

    /// Reads a null-terminated string in the codec text encoding.
    pub fn cstring(&self, offset: usize) -> Result<String> {
        let tail = self.data.get(offset..).ok_or(Error::Truncated {
            offset,
            len: 1,
            size: self.data.len(),
        })?;
        let end = tail.iter().position(|&b| b == 0).ok_or(Error::Truncated {
            offset,
            len: tail.len() + 1,
            size: self.data.len(),
        })?;
        Ok(self.codec.text.decode(&tail[..end]))
    }

    /// Reads a fixed-length string, stopping early at the first null byte.
    pub fn fixed_string(&self, offset: usize, len: usize) -> Result<String> {
        let raw = self.bytes(offset, len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(self.codec.text.decode(&raw[..end]))
    }

    /// Reads a string prefixed by its `u32` byte length.
    pub fn prefixed_string(&self, offset: usize) -> Result<String> {
        let len = self.u32(offset)? as usize;
        self.fixed_string(offset + 4, len)
    }
}
