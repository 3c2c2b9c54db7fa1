//! Endian-aware byte conversion
//!
//! Every decode and encode entry point takes a [`Codec`]: the byte order,
//! the image base used to rebase pointers recovered from executable dumps,
//! and the code page for label strings. There is no process-wide state, so
//! independent codecs can run side by side.

mod labels;
mod reader;
mod text;
mod writer;

pub use labels::LabelMap;
pub use reader::ByteReader;
pub use text::{Game, Language, TextEncoding};
pub use writer::ByteWriter;

use serde::{Deserialize, Serialize};

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum Endian {
    /// Dreamcast and PC data.
    #[default]
    Little,
    /// GameCube data.
    Big,
}

impl Endian {
    /// The opposite byte order.
    #[must_use]
    pub fn swapped(self) -> Self {
        match self {
            Endian::Little => Endian::Big,
            Endian::Big => Endian::Little,
        }
    }
}

/// Decode/encode context threaded through the whole codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Codec {
    /// Byte order for every multi-byte field.
    pub endian: Endian,
    /// Absolute load address of the data; 0 for self-contained files.
    pub image_base: u32,
    /// Code page used for strings.
    pub text: TextEncoding,
}

impl Codec {
    #[must_use]
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn little_endian() -> Self {
        Self::new(Endian::Little)
    }

    #[must_use]
    pub fn big_endian() -> Self {
        Self::new(Endian::Big)
    }

    #[must_use]
    pub fn with_image_base(mut self, image_base: u32) -> Self {
        self.image_base = image_base;
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: TextEncoding) -> Self {
        self.text = text;
        self
    }

    /// Returns the same context with a different byte order.
    #[must_use]
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Wraps `data` in a bounds-checked reader using this context.
    pub fn reader<'a>(&self, data: &'a [u8]) -> ByteReader<'a> {
        ByteReader::new(data, *self)
    }

    /// Creates an empty writer using this context.
    pub fn writer(&self) -> ByteWriter {
        ByteWriter::new(*self)
    }

    /// Rebases a raw 32-bit pointer to a file-relative offset.
    ///
    /// Returns `None` for a null pointer and `None` as well for a pointer
    /// below the image base, which cannot point into the data.
    pub fn rebase(&self, raw: u32) -> Option<u32> {
        if raw == 0 {
            None
        } else {
            raw.checked_sub(self.image_base)
        }
    }
}

/// Reads a 32-bit pointer at `offset` and rebases it against `image_base`.
///
/// Returns 0 for a null pointer, otherwise the file-relative offset.
pub fn resolve_pointer(bytes: &[u8], offset: usize, image_base: u32, endian: Endian) -> crate::Result<u32> {
    let codec = Codec::new(endian).with_image_base(image_base);
    Ok(codec.reader(bytes).ptr(offset)?.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_pointer_rebases() {
        let bytes = [0x10, 0x00, 0x40, 0x8C, 0, 0, 0, 0];
        assert_eq!(resolve_pointer(&bytes, 0, 0x8C40_0000, Endian::Little).unwrap(), 0x10);
        assert_eq!(resolve_pointer(&bytes, 4, 0x8C40_0000, Endian::Little).unwrap(), 0);
    }

    #[test]
    fn test_rebase_below_image_base() {
        let codec = Codec::default().with_image_base(0x1000);
        assert_eq!(codec.rebase(0x800), None);
        assert_eq!(codec.rebase(0x1800), Some(0x800));
    }
}
