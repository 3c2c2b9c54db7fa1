//! Self-contained model and animation files
//!
//! Both containers start with a 64-bit magic whose top byte is the format
//! version, followed by the address of the root structure. Data is stored
//! at image base 0, so every pointer is a plain file offset.
//!
//! | Container | Magic | Version | Payload |
//! |-----------|-------|---------|---------|
//! | [`ModelFile`] | `SA1MDL`, `SADXMDL`, `SA2MDL`, `SA2BMDL` | 3 | object tree + metadata |
//! | [`AnimationFile`] | `SAANIM` | 2 | one motion |

mod animation;
mod metadata;
mod model;

pub use animation::AnimationFile;
pub use metadata::Metadata;
pub use model::{ModelFile, ModelFormat};

use crate::codec::{Codec, Endian};
use crate::error::{Error, Result};

/// Mask that strips the version byte from a container magic.
pub const MAGIC_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;

/// Splits the leading `u64` into magic and version. The magic bytes are
/// ASCII and read the same in either byte order.
pub(crate) fn read_magic(bytes: &[u8], container: &'static str) -> Result<(u64, u8)> {
    let head: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::Truncated {
            offset: 0,
            len: 8,
            size: bytes.len(),
        })?;
    let raw = u64::from_le_bytes(head);
    let magic = raw & MAGIC_MASK;
    if magic == 0 {
        return Err(Error::InvalidMagic { container, magic });
    }
    Ok((magic, (raw >> 56) as u8))
}

pub(crate) fn magic_bytes(magic: u64, version: u8) -> [u8; 8] {
    (magic | (u64::from(version) << 56)).to_le_bytes()
}

/// Picks the byte order under which the root address at offset 8 lands
/// inside the file.
pub(crate) fn detect_endian(bytes: &[u8]) -> Result<Endian> {
    let little = Codec::little_endian().reader(bytes).u32(8)?;
    let big = Codec::big_endian().reader(bytes).u32(8)?;
    let fits = |address: u32| (address as usize) < bytes.len();
    let endian = if !fits(little) && fits(big) { Endian::Big } else { Endian::Little };
    tracing::debug!("Container byte order: {endian:?}");
    Ok(endian)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_split() {
        let bytes = magic_bytes(0x4D494E414153, 2);
        assert_eq!(&bytes[..6], b"SAANIM");
        assert_eq!(read_magic(&bytes, "animation").unwrap(), (0x4D494E414153, 2));
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(read_magic(b"SA1", "model"), Err(Error::Truncated { .. })));
    }

    #[test]
    fn test_detect_endian() {
        let mut bytes = vec![0u8; 0x20];
        bytes[8..12].copy_from_slice(&0x10u32.to_be_bytes());
        assert_eq!(detect_endian(&bytes).unwrap(), Endian::Big);
        bytes[8..12].copy_from_slice(&0x10u32.to_le_bytes());
        assert_eq!(detect_endian(&bytes).unwrap(), Endian::Little);
    }
}
