//! `*MDL` model files

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use super::{detect_endian, magic_bytes, read_magic};
use crate::attach::AttachFormat;
use crate::codec::{Codec, TextEncoding};
use crate::error::{Error, Result};
use crate::object::{Hierarchy, HierarchyLayout};

const VERSION: u8 = 3;
const HEADER_SIZE: usize = 0x10;

/// The four model file flavours, one per attach format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFormat {
    Sa1,
    Sadx,
    Sa2,
    Sa2b,
}

impl ModelFormat {
    const ALL: [ModelFormat; 4] = [ModelFormat::Sa1, ModelFormat::Sadx, ModelFormat::Sa2, ModelFormat::Sa2b];

    pub fn magic(self) -> u64 {
        u64::from_le_bytes(match self {
            ModelFormat::Sa1 => *b"SA1MDL\0\0",
            ModelFormat::Sadx => *b"SADXMDL\0",
            ModelFormat::Sa2 => *b"SA2MDL\0\0",
            ModelFormat::Sa2b => *b"SA2BMDL\0",
        })
    }

    pub fn from_magic(magic: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.magic() == magic)
    }

    pub fn attach_format(self) -> AttachFormat {
        match self {
            ModelFormat::Sa1 => AttachFormat::Basic,
            ModelFormat::Sadx => AttachFormat::BasicDx,
            ModelFormat::Sa2 => AttachFormat::Chunk,
            ModelFormat::Sa2b => AttachFormat::Gc,
        }
    }

    pub fn for_attach(format: AttachFormat) -> Self {
        match format {
            AttachFormat::Basic => ModelFormat::Sa1,
            AttachFormat::BasicDx => ModelFormat::Sadx,
            AttachFormat::Chunk => ModelFormat::Sa2,
            AttachFormat::Gc => ModelFormat::Sa2b,
        }
    }
}

/// A model file: one object tree plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub hierarchy: Hierarchy,
    pub metadata: Metadata,
    /// Byte order and text encoding of the file. The image base is always 0.
    pub codec: Codec,
}

impl ModelFile {
    pub fn new(hierarchy: Hierarchy) -> Self {
        Self {
            hierarchy,
            metadata: Metadata::default(),
            codec: Codec::default(),
        }
    }

    pub fn format(&self) -> ModelFormat {
        ModelFormat::for_attach(self.hierarchy.format)
    }

    /// Parses a model file, detecting its byte order. Strings are read as
    /// Shift-JIS; see [`ModelFile::from_bytes_with_text`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_text(bytes, TextEncoding::default())
    }

    pub fn from_bytes_with_text(bytes: &[u8], text: TextEncoding) -> Result<Self> {
        let (magic, version) = read_magic(bytes, "model")?;
        let format = ModelFormat::from_magic(magic).ok_or(Error::InvalidMagic { container: "model", magic })?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion { container: "model", version });
        }
        let codec = Codec::new(detect_endian(bytes)?).with_text(text);
        let reader = codec.reader(bytes);
        let object = reader.ptr(8)?.ok_or(Error::NullReference { what: "root object", address: 8 })?;
        let metadata = match reader.ptr(12)? {
            Some(offset) => Metadata::read(&reader, offset as usize)?,
            None => Metadata::default(),
        };
        tracing::debug!("Reading {format:?} model, root object at 0x{object:08X}");
        let hierarchy = Hierarchy::decode(&reader, object, format.attach_format(), &metadata.labels)?;
        Ok(Self {
            hierarchy,
            metadata,
            codec,
        })
    }

    /// Serializes the file. A wrapper root added on read is dropped again.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let codec = self.codec.with_image_base(0);
        let mut writer = codec.writer();
        writer.write_bytes(&magic_bytes(self.format().magic(), VERSION));
        writer.write_u32(0);
        writer.write_u32(0);
        debug_assert_eq!(writer.pos(), HEADER_SIZE);

        let object = self.hierarchy.encode(&mut writer, HierarchyLayout::SiblingChain)?;
        writer.align(4);
        let metadata_offset = writer.address();
        let labels = writer.labels().clone();
        self.metadata.write(&mut writer, &labels);

        writer.patch_u32(8, object);
        writer.patch_u32(12, metadata_offset);
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
