//! Model file metadata chunks

use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter, LabelMap};
use crate::error::Result;

const LABEL: u32 = u32::from_le_bytes(*b"LABL");
const ANIMATION: u32 = u32::from_le_bytes(*b"ANIM");
const MORPH: u32 = u32::from_le_bytes(*b"MORF");
const AUTHOR: u32 = u32::from_le_bytes(*b"AUTH");
const DESCRIPTION: u32 = u32::from_le_bytes(*b"DESC");
const TOOL: u32 = u32::from_le_bytes(*b"TOOL");
const END: u32 = u32::from_le_bytes(*b"END\0");

const LIST_END: u32 = 0xFFFF_FFFF;

/// Data carried after the object tree of a model file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Structure names by file offset.
    pub labels: LabelMap,
    /// Animation files that belong to the model.
    pub animations: Vec<String>,
    /// Shape-motion files that belong to the model.
    pub morphs: Vec<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub tool: Option<String>,
}

impl Metadata {
    pub(crate) fn read(reader: &ByteReader<'_>, offset: usize) -> Result<Self> {
        let mut metadata = Self::default();
        let mut at = offset;
        while at + 8 <= reader.len() {
            let kind = reader.u32(at)?;
            let size = reader.u32(at + 4)? as usize;
            let data = at + 8;
            match kind {
                END => break,
                LABEL => metadata.labels = read_labels(reader, data)?,
                ANIMATION => metadata.animations = read_names(reader, data)?,
                MORPH => metadata.morphs = read_names(reader, data)?,
                AUTHOR => metadata.author = Some(reader.cstring(data)?),
                DESCRIPTION => metadata.description = Some(reader.cstring(data)?),
                TOOL => metadata.tool = Some(reader.cstring(data)?),
                other => {
                    tracing::warn!("Skipping unknown metadata chunk 0x{other:08X} ({size} bytes)");
                }
            }
            at = data + size;
        }
        tracing::debug!(
            "Read metadata: {} labels, {} animations, {} morphs",
            metadata.labels.len(),
            metadata.animations.len(),
            metadata.morphs.len()
        );
        Ok(metadata)
    }

    /// Writes the chunk list. `labels` replaces [`Metadata::labels`], since
    /// addresses are only known once the tree has been written.
    pub(crate) fn write(&self, writer: &mut ByteWriter, labels: &LabelMap) {
        if !labels.is_empty() {
            write_chunk(writer, LABEL, |chunk| {
                let table = chunk.pos();
                for (_, address) in labels.iter() {
                    chunk.write_u32(address);
                    chunk.write_u32(0);
                }
                chunk.write_u32(LIST_END);
                chunk.write_u32(LIST_END);
                for (i, (name, _)) in labels.iter().enumerate() {
                    let name_offset = chunk.pos() as u32;
                    chunk.patch_u32(table + i * 8 + 4, name_offset);
                    chunk.write_cstring(name);
                }
            });
        }
        for (kind, names) in [(ANIMATION, &self.animations), (MORPH, &self.morphs)] {
            if names.is_empty() {
                continue;
            }
            write_chunk(writer, kind, |chunk| {
                for _ in names {
                    chunk.write_u32(0);
                }
                chunk.write_u32(LIST_END);
                for (i, name) in names.iter().enumerate() {
                    let name_offset = chunk.pos() as u32;
                    chunk.patch_u32(i * 4, name_offset);
                    chunk.write_cstring(name);
                }
            });
        }
        for (kind, text) in [(AUTHOR, &self.author), (DESCRIPTION, &self.description), (TOOL, &self.tool)] {
            if let Some(text) = text {
                write_chunk(writer, kind, |chunk| {
                    chunk.write_cstring(text);
                });
            }
        }
        writer.write_u32(END);
        writer.write_u32(0);
    }
}

/// Builds a chunk body in its own buffer so offsets inside it start at 0.
fn write_chunk(writer: &mut ByteWriter, kind: u32, body: impl FnOnce(&mut ByteWriter)) {
    let mut chunk = ByteWriter::new(writer.codec().with_image_base(0));
    body(&mut chunk);
    chunk.align(4);
    writer.write_u32(kind);
    writer.write_u32(chunk.len() as u32);
    writer.write_bytes(chunk.as_bytes());
}

fn read_labels(reader: &ByteReader<'_>, data: usize) -> Result<LabelMap> {
    let mut labels = LabelMap::new();
    let mut at = data;
    loop {
        let address = reader.u32(at)?;
        let name_offset = reader.u32(at + 4)?;
        if address == LIST_END {
            break;
        }
        labels.insert(reader.cstring(data + name_offset as usize)?, address);
        at += 8;
    }
    Ok(labels)
}

fn read_names(reader: &ByteReader<'_>, data: usize) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut at = data;
    loop {
        let name_offset = reader.u32(at)?;
        if name_offset == LIST_END {
            break;
        }
        names.push(reader.cstring(data + name_offset as usize)?);
        at += 4;
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip() {
        let metadata = Metadata {
            labels: LabelMap::new(),
            animations: vec!["run.saanim".into(), "idle.saanim".into()],
            morphs: Vec::new(),
            author: Some("ソニック".into()),
            description: None,
            tool: Some("samodel".into()),
        };
        let labels: LabelMap = [("object_root".to_string(), 0x10u32)].into_iter().collect();

        for codec in [Codec::little_endian(), Codec::big_endian()] {
            let mut w = codec.writer();
            metadata.write(&mut w, &labels);
            assert_eq!(w.len() % 4, 0);
            let bytes = w.into_bytes();
            let read = Metadata::read(&codec.reader(&bytes), 0).unwrap();
            assert_eq!(read.labels, labels);
            assert_eq!(read.animations, metadata.animations);
            assert_eq!(read.author, metadata.author);
            assert_eq!(read.tool, metadata.tool);
            assert_eq!(read.description, None);
        }
    }

    #[test]
    fn test_unknown_chunk_skipped() {
        let mut w = Codec::default().writer();
        w.write_u32(u32::from_le_bytes(*b"XTRA"));
        w.write_u32(4);
        w.write_u32(0xDEAD_BEEF);
        write_chunk(&mut w, TOOL, |c| {
            c.write_cstring("tool");
        });
        w.write_u32(END);
        w.write_u32(0);
        let bytes = w.into_bytes();
        let read = Metadata::read(&Codec::default().reader(&bytes), 0).unwrap();
        assert_eq!(read.tool.as_deref(), Some("tool"));
    }
}
