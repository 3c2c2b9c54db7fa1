//! Attachment geometry decoders
//!
//! An attach is the geometry block a scene node points at. Four mutually
//! incompatible layouts exist, selected by the caller through
//! [`AttachFormat`]:
//!
//! - [`basic`]: SA1 meshsets with per-corner attribute arrays
//! - [`basic`] (DX): the same with widened meshset and attach records
//! - [`chunk`]: SA2 vertex/poly chunk lists with a shared vertex cache
//! - [`gc`]: SA2B vertex attribute tables and GX display lists
//!
//! All four convert to the renderer-neutral [`MeshChunk`] form.

pub mod basic;
pub mod chunk;
pub mod gc;
mod mesh;

pub use basic::BasicAttach;
pub use chunk::{ChunkAttach, ChunkCache};
pub use gc::GcAttach;
pub use mesh::{Corner, Loop, MeshChunk, MeshMaterial, Strip};
pub(crate) use mesh::MeshBuilder;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter, Codec, LabelMap};
use crate::error::{Error, ErrorKind, Result};
use crate::primitives::Bounds;

/// Attach layout selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachFormat {
    Basic,
    BasicDx,
    Chunk,
    Gc,
}

impl fmt::Display for AttachFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttachFormat::Basic => "Basic",
            AttachFormat::BasicDx => "BasicDX",
            AttachFormat::Chunk => "Chunk",
            AttachFormat::Gc => "GC",
        })
    }
}

/// A decoded geometry block of any format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attach {
    Basic(BasicAttach),
    BasicDx(BasicAttach),
    Chunk(ChunkAttach),
    Gc(GcAttach),
}

impl Attach {
    /// Decodes the attach at file offset `address`.
    pub fn decode(reader: &ByteReader<'_>, address: u32, format: AttachFormat, labels: &LabelMap) -> Result<Self> {
        Ok(match format {
            AttachFormat::Basic => Attach::Basic(BasicAttach::decode(reader, address, false, labels)?),
            AttachFormat::BasicDx => Attach::BasicDx(BasicAttach::decode(reader, address, true, labels)?),
            AttachFormat::Chunk => Attach::Chunk(ChunkAttach::decode(reader, address, labels)?),
            AttachFormat::Gc => Attach::Gc(GcAttach::decode(reader, address, labels)?),
        })
    }

    /// Writes the attach and everything it points to, returning the
    /// address of its header.
    pub fn encode(&self, writer: &mut ByteWriter) -> Result<u32> {
        match self {
            Attach::Basic(a) => a.encode(writer, false),
            Attach::BasicDx(a) => a.encode(writer, true),
            Attach::Chunk(a) => a.encode(writer),
            Attach::Gc(a) => a.encode(writer),
        }
    }

    /// Converts to renderer-neutral mesh chunks.
    ///
    /// Chunk attaches that draw vertices loaded by other attaches need a
    /// shared cache; use [`Attach::to_mesh_with`] for those.
    pub fn to_mesh(&self) -> Result<Vec<MeshChunk>> {
        self.to_mesh_with(&mut ChunkCache::default())
    }

    /// Converts to mesh chunks using (and updating) a shared chunk cache.
    pub fn to_mesh_with(&self, cache: &mut ChunkCache) -> Result<Vec<MeshChunk>> {
        match self {
            Attach::Basic(a) => a.to_mesh(AttachFormat::Basic),
            Attach::BasicDx(a) => a.to_mesh(AttachFormat::BasicDx),
            Attach::Chunk(a) => a.to_mesh(cache),
            Attach::Gc(a) => a.to_mesh(),
        }
    }

    pub fn format(&self) -> AttachFormat {
        match self {
            Attach::Basic(_) => AttachFormat::Basic,
            Attach::BasicDx(_) => AttachFormat::BasicDx,
            Attach::Chunk(_) => AttachFormat::Chunk,
            Attach::Gc(_) => AttachFormat::Gc,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Attach::Basic(a) | Attach::BasicDx(a) => &a.name,
            Attach::Chunk(a) => &a.name,
            Attach::Gc(a) => &a.name,
        }
    }

    /// Number of vertices the attach loads.
    pub fn vertex_count(&self) -> usize {
        match self {
            Attach::Basic(a) | Attach::BasicDx(a) => a.positions.len(),
            Attach::Chunk(a) => a.vertex_count(),
            Attach::Gc(a) => a.vertex_count(),
        }
    }

    pub fn bounds(&self) -> Bounds {
        match self {
            Attach::Basic(a) | Attach::BasicDx(a) => a.bounds,
            Attach::Chunk(a) => a.bounds,
            Attach::Gc(a) => a.bounds,
        }
    }
}

/// Handle to an attach stored in an [`AttachArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachId(pub usize);

/// Owner of every attach decoded in one pass.
///
/// Nodes hold [`AttachId`]s. Decoding the same source address twice yields
/// the same id, so sharing in the binary graph survives as sharing here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachArena {
    attaches: Vec<Attach>,
    #[serde(skip)]
    by_address: HashMap<u32, AttachId>,
}

impl AttachArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the attach at `address` unless it was decoded already.
    pub fn decode_at(
        &mut self,
        reader: &ByteReader<'_>,
        address: u32,
        format: AttachFormat,
        labels: &LabelMap,
    ) -> Result<AttachId> {
        if let Some(&id) = self.by_address.get(&address) {
            tracing::debug!("Reusing attach at 0x{address:08X}");
            return Ok(id);
        }
        let attach = Attach::decode(reader, address, format, labels)?;
        let id = self.insert(attach);
        self.by_address.insert(address, id);
        Ok(id)
    }

    /// Adds an attach that did not come from a decode.
    pub fn insert(&mut self, attach: Attach) -> AttachId {
        self.attaches.push(attach);
        AttachId(self.attaches.len() - 1)
    }

    pub fn get(&self, id: AttachId) -> Option<&Attach> {
        self.attaches.get(id.0)
    }

    pub fn get_mut(&mut self, id: AttachId) -> Option<&mut Attach> {
        self.attaches.get_mut(id.0)
    }

    /// Source address an attach was decoded from, if any.
    pub fn source_address(&self, id: AttachId) -> Option<u32> {
        self.by_address
            .iter()
            .find_map(|(&address, &other)| (other == id).then_some(address))
    }

    pub fn len(&self) -> usize {
        self.attaches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attaches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttachId, &Attach)> {
        self.attaches.iter().enumerate().map(|(i, a)| (AttachId(i), a))
    }
}

/// Guesses the format of the attach at `address` by decoding it as GC,
/// Chunk, BasicDX and Basic in turn.
///
/// Only format mismatches move on to the next candidate; any other failure
/// is returned as-is.
pub fn detect_attach_format(bytes: &[u8], address: u32, codec: Codec) -> Result<AttachFormat> {
    let reader = codec.reader(bytes);
    let labels = LabelMap::new();
    let mut last = None;
    for format in [AttachFormat::Gc, AttachFormat::Chunk, AttachFormat::BasicDx, AttachFormat::Basic] {
        match Attach::decode(&reader, address, format, &labels) {
            Ok(_) => {
                tracing::debug!("Attach at 0x{address:08X} detected as {format}");
                return Ok(format);
            }
            Err(e) if e.kind() == ErrorKind::FormatMismatch => {
                tracing::trace!("Attach at 0x{address:08X} is not {format}: {e}");
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| Error::mismatch(AttachFormat::Basic, address, "no format matched")))
}

/// Reads a header pointer and rejects one that points outside the data.
///
/// Out-of-range pointers in a header are the clearest sign that the data
/// belongs to another format.
pub(crate) fn header_ptr(reader: &ByteReader<'_>, format: AttachFormat, address: u32, offset: usize) -> Result<Option<u32>> {
    let ptr = reader.ptr(offset).map_err(|_| Error::mismatch(format, address, "pointer below image base"))?;
    match ptr {
        Some(p) if p as usize >= reader.len() => Err(Error::mismatch(
            format,
            address,
            format!("pointer 0x{p:08X} at +0x{:X} is outside the data", offset - address as usize),
        )),
        _ => Ok(ptr),
    }
}

/// Name recorded for a file offset, or a synthesized one.
pub(crate) fn label_for(reader: &ByteReader<'_>, labels: &LabelMap, address: u32, prefix: &str) -> String {
    labels.name_or(reader.codec().image_base.wrapping_add(address), prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::basic::{Material, MeshSet, Poly, PolyType};
    use glam::Vec3;

    fn triangle() -> Attach {
        Attach::Basic(BasicAttach {
            name: "attach_tri".into(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            meshsets: vec![MeshSet {
                poly_type: PolyType::Triangles,
                material_id: 0,
                polys: vec![Poly::new(vec![0, 1, 2])],
                attributes: Vec::new(),
                normals: Vec::new(),
                colors: Vec::new(),
                uvs: Vec::new(),
            }],
            materials: vec![Material::default()],
            bounds: Bounds::from_points(&[Vec3::ZERO, Vec3::X, Vec3::Y]),
        })
    }

    #[test]
    fn test_arena_reuses_address() {
        let mut w = Codec::default().writer();
        w.write_u32(0);
        let address = triangle().encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let reader = Codec::default().reader(&bytes);

        let mut arena = AttachArena::new();
        let labels = LabelMap::new();
        let a = arena.decode_at(&reader, address, AttachFormat::Basic, &labels).unwrap();
        let b = arena.decode_at(&reader, address, AttachFormat::Basic, &labels).unwrap();
        assert_eq!(a, b);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.source_address(a), Some(address));
    }

    #[test]
    fn test_detect_basic() {
        let mut w = Codec::default().writer();
        w.write_u32(0);
        let address = triangle().encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let format = detect_attach_format(&bytes, address, Codec::default()).unwrap();
        assert!(matches!(format, AttachFormat::Basic | AttachFormat::BasicDx));
    }

    #[test]
    fn test_format_display() {
        assert_eq!(AttachFormat::Gc.to_string(), "GC");
        assert_eq!(AttachFormat::BasicDx.to_string(), "BasicDX");
    }
}
