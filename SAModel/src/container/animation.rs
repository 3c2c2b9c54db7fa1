//! `SAANIM` animation files

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{detect_endian, magic_bytes, read_magic};
use crate::codec::{Codec, LabelMap, TextEncoding};
use crate::error::{Error, Result};
use crate::motion::{Motion, MotionOptions};

const MAGIC: u64 = u64::from_le_bytes(*b"SAANIM\0\0");
const VERSION: u8 = 2;
const HEADER_SIZE: usize = 0x18;
const FLAG_SHORT_ROT: u32 = 0x1;

/// An animation file holding one motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationFile {
    pub motion: Motion,
    pub codec: Codec,
}

impl AnimationFile {
    pub fn new(motion: Motion) -> Self {
        Self {
            motion,
            codec: Codec::default(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_text(bytes, TextEncoding::default())
    }

    pub fn from_bytes_with_text(bytes: &[u8], text: TextEncoding) -> Result<Self> {
        let (magic, version) = read_magic(bytes, "animation")?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic { container: "animation", magic });
        }
        if version != VERSION {
            return Err(Error::UnsupportedVersion { container: "animation", version });
        }
        let codec = Codec::new(detect_endian(bytes)?).with_text(text);
        let reader = codec.reader(bytes);
        let address = reader.ptr(8)?.ok_or(Error::NullReference { what: "motion", address: 8 })?;
        let model_parts = reader.u32(12)? as usize;
        let options = MotionOptions {
            short_rot: reader.u32(16)? & FLAG_SHORT_ROT != 0,
        };
        let mut motion = Motion::decode(&reader, address, model_parts, options, &LabelMap::new())?;
        if let Some(name) = reader.ptr(20)? {
            motion.name = reader.cstring(name as usize)?;
        }
        tracing::debug!(
            "Read animation {}: {} parts, {} frames",
            motion.name,
            motion.model_parts,
            motion.frame_count
        );
        Ok(Self { motion, codec })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let codec = self.codec.with_image_base(0);
        let mut writer = codec.writer();
        writer.write_bytes(&magic_bytes(MAGIC, VERSION));
        writer.write_u32(0);
        writer.write_u32(self.motion.model_parts as u32);
        writer.write_u32(if self.motion.short_rot { FLAG_SHORT_ROT } else { 0 });
        writer.write_u32(0);
        debug_assert_eq!(writer.pos(), HEADER_SIZE);

        let address = self.motion.encode(&mut writer)?;
        writer.align(4);
        let name = writer.write_cstring(&self.motion.name);
        writer.align(4);

        writer.patch_u32(8, address);
        writer.patch_u32(20, name);
        Ok(writer.into_bytes())
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::Keyframes;
    use crate::primitives::Rotation;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_keeps_name_and_flags() {
        let mut keys = Keyframes::new();
        keys.rotation.insert(0, Rotation::new(0, 0, 0));
        keys.rotation.insert(20, Rotation::new(0x1000, 0, -0x1000));
        let mut motion = Motion::new("spin", 1);
        motion.models.insert(0, keys);
        motion.short_rot = true;
        motion.update_frame_count();

        let mut file = AnimationFile::new(motion);
        for codec in [Codec::little_endian(), Codec::big_endian()] {
            file.codec = codec;
            let bytes = file.to_bytes().unwrap();
            assert_eq!(&bytes[..6], b"SAANIM");
            assert_eq!(bytes.len() % 4, 0);
            let read = AnimationFile::from_bytes(&bytes).unwrap();
            assert_eq!(read, file);
        }
    }

    #[test]
    fn test_wrong_magic() {
        let err = AnimationFile::from_bytes(b"SA1MDL\0\x03\0\0\0\0\0\0\0\0").unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { container: "animation", .. }));
    }
}
