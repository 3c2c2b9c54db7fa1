//! Chunk attaches
//!
//! A chunk attach is two byte-coded lists: vertex chunks that load vertices
//! into numbered cache slots, and poly chunks that set material state and
//! draw strips over cache slots. Because the cache outlives a single attach,
//! a model may draw vertices loaded by an earlier node; [`ChunkCache`]
//! carries that state across a hierarchy walk.
//!
//! Attach header (0x18): vertex chunk list pointer, poly chunk list pointer,
//! bounds.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::{AttachFormat, Corner, MeshBuilder, MeshChunk, MeshMaterial, header_ptr, label_for};
use crate::codec::{ByteReader, ByteWriter, LabelMap};
use crate::error::{Error, Result};
use crate::primitives::{Bounds, Color, ColorEncoding, Primitive, Vec2Encoding, Vec3Encoding};

const ATTACH_SIZE: usize = 0x18;
const CHUNK_END: u8 = 0xFF;

// ==================== Vertex chunks ====================

/// Vertex chunk types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexChunkKind {
    /// Position with a padding `w` (SH4 layout).
    Sh,
    /// Position and normal, each with a padding `w`.
    NormalSh,
    Vertex,
    Diffuse8,
    UserFlags,
    NinjaFlags,
    Normal,
    NormalDiffuse8,
    NormalUserFlags,
    NormalNinjaFlags,
}

impl VertexChunkKind {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            32 => Self::Sh,
            33 => Self::NormalSh,
            34 => Self::Vertex,
            35 => Self::Diffuse8,
            36 => Self::UserFlags,
            37 => Self::NinjaFlags,
            41 => Self::Normal,
            42 => Self::NormalDiffuse8,
            43 => Self::NormalUserFlags,
            44 => Self::NormalNinjaFlags,
            _ => return None,
        })
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Sh => 32,
            Self::NormalSh => 33,
            Self::Vertex => 34,
            Self::Diffuse8 => 35,
            Self::UserFlags => 36,
            Self::NinjaFlags => 37,
            Self::Normal => 41,
            Self::NormalDiffuse8 => 42,
            Self::NormalUserFlags => 43,
            Self::NormalNinjaFlags => 44,
        }
    }

    pub fn has_normal(self) -> bool {
        matches!(
            self,
            Self::NormalSh | Self::Normal | Self::NormalDiffuse8 | Self::NormalUserFlags | Self::NormalNinjaFlags
        )
    }

    pub fn has_color(self) -> bool {
        matches!(self, Self::Diffuse8 | Self::NormalDiffuse8)
    }

    pub fn has_flags(self) -> bool {
        matches!(
            self,
            Self::UserFlags | Self::NinjaFlags | Self::NormalUserFlags | Self::NormalNinjaFlags
        )
    }

    /// Ninja flags carry a cache slot offset in their low half.
    pub fn is_ninja(self) -> bool {
        matches!(self, Self::NinjaFlags | Self::NormalNinjaFlags)
    }

    fn is_sh(self) -> bool {
        matches!(self, Self::Sh | Self::NormalSh)
    }

    /// Bytes per vertex.
    pub fn stride(self) -> usize {
        if self.is_sh() {
            return if self.has_normal() { 32 } else { 16 };
        }
        let mut size = 12;
        if self.has_normal() {
            size += 12;
        }
        if self.has_color() || self.has_flags() {
            size += 4;
        }
        size
    }
}

/// One vertex loaded by a vertex chunk.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChunkVertex {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub color: Option<Color>,
    /// User or ninja flags word.
    pub flags: Option<u32>,
}

/// A block of vertices loaded into consecutive cache slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexChunk {
    pub kind: VertexChunkKind,
    /// Chunk flag byte; the low two bits hold the weight status.
    pub flags: u8,
    pub index_offset: u16,
    pub vertices: Vec<ChunkVertex>,
}

impl VertexChunk {
    pub fn new(kind: VertexChunkKind, index_offset: u16, vertices: Vec<ChunkVertex>) -> Self {
        Self {
            kind,
            flags: 0,
            index_offset,
            vertices,
        }
    }

    fn read(reader: &ByteReader<'_>, offset: usize, kind: VertexChunkKind, address: u32) -> Result<(Self, usize)> {
        let flags = reader.u8(offset + 1)?;
        let size = reader.u16(offset + 2)? as usize;
        let index_offset = reader.u16(offset + 4)?;
        let count = reader.u16(offset + 6)? as usize;
        if size != 1 + count * kind.stride() / 4 {
            return Err(Error::mismatch(
                AttachFormat::Chunk,
                address,
                format!("vertex chunk size {size} does not match {count} vertices of type {}", kind.as_u8()),
            ));
        }

        let mut cursor = offset + 8;
        reader.bytes(cursor, count * kind.stride())?;
        let mut vertices = Vec::with_capacity(count);
        for _ in 0..count {
            let position = Vec3::read(reader, &mut cursor, Vec3Encoding::Float)?;
            if kind.is_sh() {
                cursor += 4;
            }
            let normal = if kind.has_normal() {
                let n = Vec3::read(reader, &mut cursor, Vec3Encoding::Float)?;
                if kind.is_sh() {
                    cursor += 4;
                }
                Some(n)
            } else {
                None
            };
            let color = if kind.has_color() {
                Some(Color::read(reader, &mut cursor, ColorEncoding::Argb8_32)?)
            } else {
                None
            };
            let flags = if kind.has_flags() {
                cursor += 4;
                Some(reader.u32(cursor - 4)?)
            } else {
                None
            };
            vertices.push(ChunkVertex {
                position,
                normal,
                color,
                flags,
            });
        }

        Ok((
            Self {
                kind,
                flags,
                index_offset,
                vertices,
            },
            offset + 4 + size * 4,
        ))
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        let kind = self.kind;
        let size = 1 + self.vertices.len() * kind.stride() / 4;
        if size > usize::from(u16::MAX) {
            return Err(Error::Encode(format!("vertex chunk with {} vertices is too large", self.vertices.len())));
        }
        writer.write_u8(kind.as_u8());
        writer.write_u8(self.flags);
        writer.write_u16(size as u16);
        writer.write_u16(self.index_offset);
        writer.write_u16(self.vertices.len() as u16);
        for v in &self.vertices {
            v.position.write(writer, Vec3Encoding::Float);
            if kind.is_sh() {
                writer.write_f32(1.0);
            }
            if kind.has_normal() {
                v.normal
                    .ok_or_else(|| Error::Encode("vertex chunk type requires normals".into()))?
                    .write(writer, Vec3Encoding::Float);
                if kind.is_sh() {
                    writer.write_f32(0.0);
                }
            }
            if kind.has_color() {
                v.color
                    .ok_or_else(|| Error::Encode("vertex chunk type requires colours".into()))?
                    .write(writer, ColorEncoding::Argb8_32);
            }
            if kind.has_flags() {
                writer.write_u32(v.flags.unwrap_or(0));
            }
        }
        Ok(())
    }
}

// ==================== Poly chunks ====================

/// Two-byte state chunks (types 1 to 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitsKind {
    BlendAlpha,
    MipmapDAdjust,
    SpecularExponent,
    /// Stores the rest of the list in poly cache slot `flags`.
    CachePolygonList,
    /// Draws poly cache slot `flags`.
    DrawPolygonList,
}

impl BitsKind {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::BlendAlpha,
            2 => Self::MipmapDAdjust,
            3 => Self::SpecularExponent,
            4 => Self::CachePolygonList,
            5 => Self::DrawPolygonList,
            _ => return None,
        })
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::BlendAlpha => 1,
            Self::MipmapDAdjust => 2,
            Self::SpecularExponent => 3,
            Self::CachePolygonList => 4,
            Self::DrawPolygonList => 5,
        }
    }
}

bitflags! {
    /// Strip chunk flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StripFlags: u8 {
        const IGNORE_LIGHT = 0x01;
        const IGNORE_SPECULAR = 0x02;
        const IGNORE_AMBIENT = 0x04;
        const USE_ALPHA = 0x08;
        const DOUBLE_SIDE = 0x10;
        const FLAT_SHADING = 0x20;
        const ENVIRONMENT_MAPPING = 0x40;

        const _ = !0;
    }
}

/// Strip chunk types (64 to 75), naming the per-corner payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StripKind {
    Strip,
    Uvn,
    Uvh,
    Vn,
    UvnVn,
    UvhVn,
    D8,
    UvnD8,
    UvhD8,
    Strip2,
    Uvn2,
    Uvh2,
}

impl StripKind {
    const ALL: [StripKind; 12] = [
        Self::Strip,
        Self::Uvn,
        Self::Uvh,
        Self::Vn,
        Self::UvnVn,
        Self::UvhVn,
        Self::D8,
        Self::UvnD8,
        Self::UvhD8,
        Self::Strip2,
        Self::Uvn2,
        Self::Uvh2,
    ];

    fn from_u8(value: u8) -> Option<Self> {
        value.checked_sub(64).and_then(|i| Self::ALL.get(i as usize)).copied()
    }

    fn as_u8(self) -> u8 {
        64 + Self::ALL.iter().position(|&k| k == self).unwrap_or(0) as u8
    }

    pub fn uv_encoding(self) -> Option<Vec2Encoding> {
        match self {
            Self::Uvn | Self::UvnVn | Self::UvnD8 | Self::Uvn2 => Some(Vec2Encoding::Uv255),
            Self::Uvh | Self::UvhVn | Self::UvhD8 | Self::Uvh2 => Some(Vec2Encoding::Uv1023),
            _ => None,
        }
    }

    pub fn has_uv2(self) -> bool {
        matches!(self, Self::Uvn2 | Self::Uvh2)
    }

    pub fn has_normal(self) -> bool {
        matches!(self, Self::Vn | Self::UvnVn | Self::UvhVn)
    }

    pub fn has_color(self) -> bool {
        matches!(self, Self::D8 | Self::UvnD8 | Self::UvhD8)
    }
}

/// One strip corner: a cache slot plus inline attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StripCorner {
    pub index: u16,
    pub uv: Option<Vec2>,
    pub uv2: Option<Vec2>,
    pub normal: Option<Vec3>,
    pub color: Option<Color>,
    /// Present on every corner after the second.
    pub user_flags: Vec<u16>,
}

impl StripCorner {
    pub fn new(index: u16) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStrip {
    pub reversed: bool,
    pub corners: Vec<StripCorner>,
}

/// A strip chunk: several strips sharing one payload layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripChunk {
    pub kind: StripKind,
    pub flags: StripFlags,
    /// User flag words per corner (0 to 3).
    pub user_flag_count: u8,
    pub strips: Vec<ChunkStrip>,
}

impl StripChunk {
    fn read(reader: &ByteReader<'_>, offset: usize, kind: StripKind, address: u32) -> Result<(Self, usize)> {
        let flags = StripFlags::from_bits_retain(reader.u8(offset + 1)?);
        let size = reader.u16(offset + 2)? as usize;
        let header = reader.u16(offset + 4)?;
        let strip_count = (header & 0x3FFF) as usize;
        let user_flag_count = (header >> 14) as u8;
        let uv = kind.uv_encoding();

        let mut cursor = offset + 6;
        let mut strips = Vec::with_capacity(strip_count);
        for _ in 0..strip_count {
            let len = reader.i16(cursor)?;
            cursor += 2;
            let mut corners = Vec::with_capacity(len.unsigned_abs() as usize);
            for i in 0..len.unsigned_abs() {
                let mut corner = StripCorner::new(reader.u16(cursor)?);
                cursor += 2;
                if let Some(enc) = uv {
                    corner.uv = Some(Vec2::read(reader, &mut cursor, enc)?);
                    if kind.has_uv2() {
                        corner.uv2 = Some(Vec2::read(reader, &mut cursor, enc)?);
                    }
                }
                if kind.has_normal() {
                    corner.normal = Some(Vec3::read(reader, &mut cursor, Vec3Encoding::UnitShort)?);
                }
                if kind.has_color() {
                    corner.color = Some(Color::read(reader, &mut cursor, ColorEncoding::Argb8_16)?);
                }
                if i >= 2 {
                    for _ in 0..user_flag_count {
                        corner.user_flags.push(reader.u16(cursor)?);
                        cursor += 2;
                    }
                }
                corners.push(corner);
            }
            strips.push(ChunkStrip {
                reversed: len < 0,
                corners,
            });
        }

        let end = offset + 4 + size * 2;
        if cursor != end {
            return Err(Error::mismatch(
                AttachFormat::Chunk,
                address,
                format!("strip chunk at 0x{offset:08X} declares {} bytes but holds {}", size * 2, cursor - offset - 4),
            ));
        }
        Ok((
            Self {
                kind,
                flags,
                user_flag_count,
                strips,
            },
            end,
        ))
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        let kind = self.kind;
        let start = writer.pos();
        writer.write_u8(kind.as_u8());
        writer.write_u8(self.flags.bits());
        writer.write_u16(0);
        if self.strips.len() > 0x3FFF || self.user_flag_count > 3 {
            return Err(Error::Encode("strip chunk header overflow".into()));
        }
        writer.write_u16((u16::from(self.user_flag_count) << 14) | self.strips.len() as u16);

        let missing = |what: &str| Error::Encode(format!("strip chunk type {} requires {what} on every corner", kind.as_u8()));
        for strip in &self.strips {
            let len = i16::try_from(strip.corners.len()).map_err(|_| Error::Encode("strip too long".into()))?;
            writer.write_i16(if strip.reversed { -len } else { len });
            for (i, corner) in strip.corners.iter().enumerate() {
                writer.write_u16(corner.index);
                if let Some(enc) = kind.uv_encoding() {
                    corner.uv.ok_or_else(|| missing("uvs"))?.write(writer, enc);
                    if kind.has_uv2() {
                        corner.uv2.ok_or_else(|| missing("second uvs"))?.write(writer, enc);
                    }
                }
                if kind.has_normal() {
                    corner.normal.ok_or_else(|| missing("normals"))?.write(writer, Vec3Encoding::UnitShort);
                }
                if kind.has_color() {
                    corner.color.ok_or_else(|| missing("colours"))?.write(writer, ColorEncoding::Argb8_16);
                }
                if i >= 2 {
                    if corner.user_flags.len() != usize::from(self.user_flag_count) {
                        return Err(missing("user flags"));
                    }
                    for &f in &corner.user_flags {
                        writer.write_u16(f);
                    }
                }
            }
        }

        let size = (writer.pos() - start - 4) / 2;
        let size = u16::try_from(size).map_err(|_| Error::Encode("strip chunk too large".into()))?;
        writer.patch_u16(start + 2, size);
        Ok(())
    }
}

/// One entry of a poly chunk list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolyChunk {
    Null,
    Bits {
        kind: BitsKind,
        flags: u8,
    },
    /// Texture selection (types 8 and 9). `data` packs the texture id
    /// (13 bits), super-sample (1 bit) and filter mode (2 bits).
    Tiny {
        second: bool,
        flags: u8,
        data: u16,
    },
    /// Material colours (types 17 to 31). Specular alpha is the exponent.
    Material {
        second: bool,
        flags: u8,
        diffuse: Option<Color>,
        ambient: Option<Color>,
        specular: Option<Color>,
    },
    Strip(StripChunk),
}

impl PolyChunk {
    /// Texture id selected by a tiny chunk.
    pub fn texture_id(&self) -> Option<u16> {
        match self {
            PolyChunk::Tiny { data, .. } => Some(data & 0x1FFF),
            _ => None,
        }
    }

    fn read(reader: &ByteReader<'_>, offset: usize, address: u32) -> Result<Option<(Self, usize)>> {
        let kind = reader.u8(offset)?;
        let flags = reader.u8(offset + 1)?;
        Ok(Some(match kind {
            CHUNK_END => return Ok(None),
            0 => (PolyChunk::Null, offset + 2),
            1..=5 => {
                let kind = BitsKind::from_u8(kind).unwrap_or(BitsKind::BlendAlpha);
                (PolyChunk::Bits { kind, flags }, offset + 2)
            }
            8 | 9 => (
                PolyChunk::Tiny {
                    second: kind == 9,
                    flags,
                    data: reader.u16(offset + 2)?,
                },
                offset + 4,
            ),
            17..=31 => {
                let bits = kind - 16;
                let size = reader.u16(offset + 2)? as usize;
                let mut cursor = offset + 4;
                let mut color = |present: bool| -> Result<Option<Color>> {
                    present
                        .then(|| Color::read(reader, &mut cursor, ColorEncoding::Argb8_16))
                        .transpose()
                };
                let diffuse = color(bits & 1 != 0)?;
                let ambient = color(bits & 2 != 0)?;
                let specular = color(bits & 4 != 0)?;
                if cursor != offset + 4 + size * 2 {
                    return Err(Error::mismatch(
                        AttachFormat::Chunk,
                        address,
                        format!("material chunk type {kind} has size {size}"),
                    ));
                }
                (
                    PolyChunk::Material {
                        second: bits & 8 != 0,
                        flags,
                        diffuse,
                        ambient,
                        specular,
                    },
                    cursor,
                )
            }
            64..=75 => {
                let strip_kind = StripKind::from_u8(kind).unwrap_or(StripKind::Strip);
                let (strip, next) = StripChunk::read(reader, offset, strip_kind, address)?;
                (PolyChunk::Strip(strip), next)
            }
            other => {
                return Err(Error::mismatch(
                    AttachFormat::Chunk,
                    address,
                    format!("unknown poly chunk type {other} at 0x{offset:08X}"),
                ));
            }
        }))
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        match self {
            PolyChunk::Null => {
                writer.write_u8(0);
                writer.write_u8(0);
            }
            PolyChunk::Bits { kind, flags } => {
                writer.write_u8(kind.as_u8());
                writer.write_u8(*flags);
            }
            PolyChunk::Tiny { second, flags, data } => {
                writer.write_u8(if *second { 9 } else { 8 });
                writer.write_u8(*flags);
                writer.write_u16(*data);
            }
            PolyChunk::Material {
                second,
                flags,
                diffuse,
                ambient,
                specular,
            } => {
                let colors = [diffuse, ambient, specular];
                let mut bits = u8::from(*second) << 3;
                for (i, c) in colors.iter().enumerate() {
                    if c.is_some() {
                        bits |= 1 << i;
                    }
                }
                if bits == 0 {
                    return Err(Error::Encode("material chunk carries no colours".into()));
                }
                let count = colors.iter().filter(|c| c.is_some()).count();
                writer.write_u8(16 + bits);
                writer.write_u8(*flags);
                writer.write_u16((count * 2) as u16);
                for c in colors.into_iter().flatten() {
                    c.write(writer, ColorEncoding::Argb8_16);
                }
            }
            PolyChunk::Strip(strip) => strip.write(writer)?,
        }
        Ok(())
    }
}

// ==================== Attach ====================

/// A Chunk (SA2) attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAttach {
    pub name: String,
    /// Empty when the vertex list pointer is null.
    pub vertex_chunks: Vec<VertexChunk>,
    /// Empty when the poly list pointer is null.
    pub poly_chunks: Vec<PolyChunk>,
    pub bounds: Bounds,
}

impl ChunkAttach {
    pub fn decode(reader: &ByteReader<'_>, address: u32, labels: &LabelMap) -> Result<Self> {
        let format = AttachFormat::Chunk;
        let base = address as usize;
        reader.bytes(base, ATTACH_SIZE)?;
        let vertex_ptr = header_ptr(reader, format, address, base)?;
        let poly_ptr = header_ptr(reader, format, address, base + 4)?;
        let bounds = Bounds::read(reader, base + 8)?;

        let mut vertex_chunks = Vec::new();
        if let Some(mut cursor) = vertex_ptr.map(|p| p as usize) {
            loop {
                let kind = reader.u8(cursor)?;
                if kind == CHUNK_END {
                    break;
                }
                let kind = VertexChunkKind::from_u8(kind).ok_or_else(|| {
                    Error::mismatch(format, address, format!("unsupported vertex chunk type {kind} at 0x{cursor:08X}"))
                })?;
                let (chunk, next) = VertexChunk::read(reader, cursor, kind, address)?;
                vertex_chunks.push(chunk);
                cursor = next;
            }
        }

        let mut poly_chunks = Vec::new();
        if let Some(mut cursor) = poly_ptr.map(|p| p as usize) {
            while let Some((chunk, next)) = PolyChunk::read(reader, cursor, address)? {
                tracing::trace!("Poly chunk at 0x{cursor:08X}: {chunk:?}");
                poly_chunks.push(chunk);
                cursor = next;
            }
        }

        Ok(Self {
            name: label_for(reader, labels, address, "attach"),
            vertex_chunks,
            poly_chunks,
            bounds,
        })
    }

    pub fn encode(&self, writer: &mut ByteWriter) -> Result<u32> {
        let name = &self.name;
        writer.align(4);
        let vertex = if self.vertex_chunks.is_empty() {
            None
        } else {
            let address = writer.address();
            for chunk in &self.vertex_chunks {
                chunk.write(writer)?;
            }
            writer.write_bytes(&[CHUNK_END, 0, 0, 0]);
            writer.add_label(format!("vertex_{name}"), address);
            Some(address)
        };

        let poly = if self.poly_chunks.is_empty() {
            None
        } else {
            let address = writer.address();
            for chunk in &self.poly_chunks {
                chunk.write(writer)?;
            }
            writer.write_bytes(&[CHUNK_END, 0]);
            writer.add_label(format!("poly_{name}"), address);
            Some(address)
        };

        writer.align(4);
        let address = writer.address();
        writer.write_ptr(vertex);
        writer.write_ptr(poly);
        self.bounds.write(writer);
        writer.add_label(name.clone(), address);
        Ok(address)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_chunks.iter().map(|c| c.vertices.len()).sum()
    }

    /// Loads this attach's vertices into `cache` and converts its strips.
    pub fn to_mesh(&self, cache: &mut ChunkCache) -> Result<Vec<MeshChunk>> {
        for chunk in &self.vertex_chunks {
            cache.load(chunk);
        }
        let mut state = MeshMaterial::default();
        let mut out = Vec::new();
        self.draw(&self.poly_chunks, cache, &mut state, &mut HashSet::new(), &mut out)?;
        Ok(out)
    }

    fn draw(
        &self,
        chunks: &[PolyChunk],
        cache: &mut ChunkCache,
        state: &mut MeshMaterial,
        drawing: &mut HashSet<u8>,
        out: &mut Vec<MeshChunk>,
    ) -> Result<()> {
        for (i, chunk) in chunks.iter().enumerate() {
            match chunk {
                PolyChunk::Null => {}
                PolyChunk::Bits {
                    kind: BitsKind::CachePolygonList,
                    flags,
                } => {
                    cache.poly_lists.insert(*flags, chunks[i + 1..].to_vec());
                    return Ok(());
                }
                PolyChunk::Bits {
                    kind: BitsKind::DrawPolygonList,
                    flags,
                } => {
                    let cached = cache.poly_lists.get(flags).cloned().ok_or(Error::NullReference {
                        what: "cached polygon list",
                        address: u32::from(*flags),
                    })?;
                    if !drawing.insert(*flags) {
                        return Err(Error::CyclicPolyList {
                            attach: self.name.clone(),
                            slot: *flags,
                        });
                    }
                    self.draw(&cached, cache, state, drawing, out)?;
                    drawing.remove(flags);
                }
                PolyChunk::Bits {
                    kind: BitsKind::SpecularExponent,
                    flags,
                } => state.exponent = f32::from(flags & 0x1F),
                PolyChunk::Bits {
                    kind: BitsKind::BlendAlpha,
                    flags,
                } => state.blend = Some(((flags >> 3) & 7, flags & 7)),
                PolyChunk::Bits { .. } => {}
                PolyChunk::Tiny { .. } => state.texture_id = chunk.texture_id().map(u32::from),
                PolyChunk::Material {
                    diffuse,
                    ambient,
                    specular,
                    ..
                } => {
                    if let Some(d) = diffuse {
                        state.diffuse = *d;
                    }
                    if ambient.is_some() {
                        state.ambient = *ambient;
                    }
                    if let Some(s) = specular {
                        state.specular = Some(*s);
                        state.exponent = f32::from(s.a);
                    }
                }
                PolyChunk::Strip(strip) => out.push(self.strip_mesh(strip, cache, state)?),
            }
        }
        Ok(())
    }

    fn strip_mesh(&self, strip: &StripChunk, cache: &ChunkCache, state: &MeshMaterial) -> Result<MeshChunk> {
        let mut material = state.clone();
        material.use_alpha = strip.flags.contains(StripFlags::USE_ALPHA);
        material.double_sided = strip.flags.contains(StripFlags::DOUBLE_SIDE);
        material.ignore_lighting = strip.flags.contains(StripFlags::IGNORE_LIGHT);
        if strip.flags.contains(StripFlags::IGNORE_SPECULAR) {
            material.specular = None;
        }
        if strip.flags.contains(StripFlags::IGNORE_AMBIENT) {
            material.ambient = None;
        }

        type Key = (u16, Option<[u32; 2]>, Option<[u32; 3]>, Option<Color>);
        let mut builder: MeshBuilder<Key> = MeshBuilder::new(material);
        for s in &strip.strips {
            let mut indices = Vec::with_capacity(s.corners.len());
            for c in &s.corners {
                let key = (
                    c.index,
                    c.uv.map(|uv| [uv.x.to_bits(), uv.y.to_bits()]),
                    c.normal.map(|n| [n.x.to_bits(), n.y.to_bits(), n.z.to_bits()]),
                    c.color,
                );
                indices.push(builder.corner(key, || {
                    let v = cache.vertex(c.index).ok_or_else(|| Error::InvalidVertexIndex {
                        format: AttachFormat::Chunk,
                        attach: self.name.clone(),
                        index: c.index as usize,
                        count: cache.vertices.len(),
                    })?;
                    Ok(Corner {
                        position: v.position,
                        normal: c.normal.or(v.normal),
                        color: c.color.or(v.color),
                        uv: c.uv,
                    })
                })?);
            }
            builder.strip(indices, s.reversed);
        }
        Ok(builder.finish())
    }
}

/// Vertex and polygon-list cache shared by chunk attaches during a walk.
///
/// Ninja-flag vertices are stored at `index_offset + (flags & 0xFFFF)`.
/// Weights are not applied; the last chunk to load a slot wins.
#[derive(Debug, Clone, Default)]
pub struct ChunkCache {
    vertices: Vec<Option<ChunkVertex>>,
    poly_lists: HashMap<u8, Vec<PolyChunk>>,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&mut self, chunk: &VertexChunk) {
        for (i, v) in chunk.vertices.iter().enumerate() {
            let slot = match (chunk.kind.is_ninja(), v.flags) {
                (true, Some(flags)) => usize::from(chunk.index_offset) + (flags & 0xFFFF) as usize,
                _ => usize::from(chunk.index_offset) + i,
            };
            if slot >= self.vertices.len() {
                self.vertices.resize(slot + 1, None);
            }
            self.vertices[slot] = Some(ChunkVertex {
                position: v.position,
                normal: v.normal.filter(|_| chunk.kind.has_normal()),
                color: v.color.filter(|_| chunk.kind.has_color()),
                flags: v.flags.filter(|_| chunk.kind.has_flags()),
            });
        }
    }

    pub fn vertex(&self, index: u16) -> Option<&ChunkVertex> {
        self.vertices.get(index as usize).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    fn vertices() -> Vec<ChunkVertex> {
        [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE]
            .into_iter()
            .map(|position| ChunkVertex {
                position,
                normal: Some(Vec3::Z),
                ..ChunkVertex::default()
            })
            .collect()
    }

    fn sample() -> ChunkAttach {
        let corners = (0..4u16)
            .map(|i| StripCorner {
                uv: Some(Vec2::new(f32::from(i) / 255.0, 0.0)),
                user_flags: if i >= 2 { vec![0x1234] } else { Vec::new() },
                ..StripCorner::new(i)
            })
            .collect();
        ChunkAttach {
            name: "attach_chunk".into(),
            vertex_chunks: vec![VertexChunk::new(VertexChunkKind::Normal, 0, vertices())],
            poly_chunks: vec![
                PolyChunk::Material {
                    second: false,
                    flags: 0,
                    diffuse: Some(Color::rgba(0x80, 0x40, 0x20, 0xFF)),
                    ambient: None,
                    specular: Some(Color::rgba(0xFF, 0xFF, 0xFF, 16)),
                },
                PolyChunk::Tiny {
                    second: false,
                    flags: 0,
                    data: 0x4005,
                },
                PolyChunk::Strip(StripChunk {
                    kind: StripKind::Uvn,
                    flags: StripFlags::DOUBLE_SIDE,
                    user_flag_count: 1,
                    strips: vec![ChunkStrip {
                        reversed: true,
                        corners,
                    }],
                }),
            ],
            bounds: Bounds::default(),
        }
    }

    #[test]
    fn test_round_trip_both_endians() {
        for codec in [Codec::little_endian(), Codec::big_endian()] {
            let mut w = codec.writer();
            w.write_u32(0);
            let address = sample().encode(&mut w).unwrap();
            let (bytes, labels) = w.finish();
            let decoded = ChunkAttach::decode(&codec.reader(&bytes), address, &labels).unwrap();
            assert_eq!(decoded, sample());
        }
    }

    #[test]
    fn test_strip_size_field() {
        let mut w = Codec::little_endian().writer();
        PolyChunk::Strip(StripChunk {
            kind: StripKind::Strip,
            flags: StripFlags::empty(),
            user_flag_count: 0,
            strips: vec![ChunkStrip {
                reversed: false,
                corners: (0..3).map(StripCorner::new).collect(),
            }],
        })
        .write(&mut w)
        .unwrap();
        // header word + strip length + 3 indices
        assert_eq!(w.as_bytes(), &[64, 0, 5, 0, 1, 0, 3, 0, 0, 0, 1, 0, 2, 0]);
    }

    #[test]
    fn test_mesh_uses_material_state() {
        let chunks = sample().to_mesh(&mut ChunkCache::new()).unwrap();
        assert_eq!(chunks.len(), 1);
        let mesh = &chunks[0];
        assert_eq!(mesh.material.texture_id, Some(5));
        assert_eq!(mesh.material.exponent, 16.0);
        assert!(mesh.material.double_sided);
        assert_eq!(mesh.corners.len(), 4);
        assert_eq!(mesh.strips[0].indices, vec![0, 1, 2, 3]);
        assert_eq!(mesh.corners[3].normal, Some(Vec3::Z));
    }

    #[test]
    fn test_self_drawing_poly_list_is_an_error() {
        let mut cache = ChunkCache::new();
        let mut looping = sample();
        looping.poly_chunks = vec![
            PolyChunk::Bits {
                kind: BitsKind::CachePolygonList,
                flags: 0,
            },
            PolyChunk::Bits {
                kind: BitsKind::DrawPolygonList,
                flags: 0,
            },
        ];
        assert!(looping.to_mesh(&mut cache).unwrap().is_empty());

        let mut caller = sample();
        caller.poly_chunks = vec![PolyChunk::Bits {
            kind: BitsKind::DrawPolygonList,
            flags: 0,
        }];
        let err = caller.to_mesh(&mut cache).unwrap_err();
        assert!(matches!(&err, Error::CyclicPolyList { slot: 0, attach } if attach == "attach_chunk"));
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatMismatch);
    }

    #[test]
    fn test_cached_list_drawn_twice() {
        let mut cache = ChunkCache::new();
        let mut cached = sample();
        cached.poly_chunks.insert(
            0,
            PolyChunk::Bits {
                kind: BitsKind::CachePolygonList,
                flags: 3,
            },
        );
        assert!(cached.to_mesh(&mut cache).unwrap().is_empty());

        let mut caller = sample();
        let draw = PolyChunk::Bits {
            kind: BitsKind::DrawPolygonList,
            flags: 3,
        };
        caller.poly_chunks = vec![draw.clone(), draw];
        assert_eq!(caller.to_mesh(&mut cache).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_cache_slot() {
        let mut attach = sample();
        attach.vertex_chunks.clear();
        let err = attach.to_mesh(&mut ChunkCache::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidVertexIndex { index: 0, count: 0, .. }));
    }

    #[test]
    fn test_shared_cache_between_attaches() {
        let loader = ChunkAttach {
            name: "loader".into(),
            vertex_chunks: vec![VertexChunk::new(VertexChunkKind::Vertex, 10, vertices())],
            poly_chunks: Vec::new(),
            bounds: Bounds::default(),
        };
        let mut drawer = sample();
        drawer.vertex_chunks.clear();
        if let PolyChunk::Strip(strip) = &mut drawer.poly_chunks[2] {
            for c in &mut strip.strips[0].corners {
                c.index += 10;
            }
        }
        let mut cache = ChunkCache::new();
        loader.to_mesh(&mut cache).unwrap();
        let mesh = drawer.to_mesh(&mut cache).unwrap();
        assert_eq!(mesh[0].corners[1].position, Vec3::X);
        assert_eq!(mesh[0].corners[1].normal, None);
    }

    #[test]
    fn test_rejects_unknown_vertex_type() {
        let mut bytes = vec![0u8; 4];
        bytes.extend_from_slice(&[39, 0, 1, 0, 0, 0, 0, 0, 0xFF, 0, 0, 0]);
        let header = bytes.len() as u32;
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 20]);
        let err = ChunkAttach::decode(&Codec::default().reader(&bytes), header, &LabelMap::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::FormatMismatch);
    }
}
