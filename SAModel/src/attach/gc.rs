//! GameCube attaches
//!
//! A GC attach stores vertex attributes as separate indexed tables and its
//! polygons as GX display lists. Each mesh owns a parameter list and a
//! primitive stream. Parameters are state changes, not material snapshots:
//! a mesh without an index-attribute parameter reuses the flags of the
//! previous mesh in the same list, and material parameters stay in effect
//! until overridden.
//!
//! The primitive stream is big-endian on every platform.

use bitflags::bitflags;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::{AttachFormat, Corner, Loop, MeshBuilder, MeshChunk, MeshMaterial, header_ptr, label_for};
use crate::codec::{ByteReader, ByteWriter, Codec, Endian, LabelMap};
use crate::error::{Error, Result};
use crate::primitives::{Bounds, Color, ColorEncoding, Primitive, Vec2Encoding, Vec3Encoding};

const ATTACH_SIZE: usize = 0x24;
const VERTEX_SET_SIZE: usize = 0x10;
const MESH_SIZE: usize = 0x10;
const ATTRIBUTE_END: u8 = 0xFF;
const DISPLAY_LIST_ALIGN: usize = 0x20;

// Vertex table encodings: struct type in the low nibble, data type above.
const STRUCT_POSITION_XYZ: u32 = 1;
const STRUCT_NORMAL_XYZ: u32 = 2;
const STRUCT_COLOR_RGBA: u32 = 6;
const STRUCT_TEX_ST: u32 = 8;
const DATA_S16: u32 = 3;
const DATA_F32: u32 = 4;
const DATA_RGBA8: u32 = 10;

/// One indexed vertex attribute table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VertexSet {
    Position(Vec<Vec3>),
    Normal(Vec<Vec3>),
    Color0(Vec<Color>),
    /// Texture coordinates for channel `channel` (0 to 7), stored as
    /// fixed-point shorts with `frac_bits` fractional bits.
    Tex {
        channel: u8,
        frac_bits: u8,
        uvs: Vec<Vec2>,
    },
}

impl VertexSet {
    fn attribute(&self) -> u8 {
        match self {
            VertexSet::Position(_) => 1,
            VertexSet::Normal(_) => 2,
            VertexSet::Color0(_) => 3,
            VertexSet::Tex { channel, .. } => 5 + channel,
        }
    }

    fn len(&self) -> usize {
        match self {
            VertexSet::Position(v) | VertexSet::Normal(v) => v.len(),
            VertexSet::Color0(c) => c.len(),
            VertexSet::Tex { uvs, .. } => uvs.len(),
        }
    }

    fn packed_type(&self) -> u32 {
        match self {
            VertexSet::Position(_) => STRUCT_POSITION_XYZ | (DATA_F32 << 4),
            VertexSet::Normal(_) => STRUCT_NORMAL_XYZ | (DATA_F32 << 4),
            VertexSet::Color0(_) => STRUCT_COLOR_RGBA | (DATA_RGBA8 << 4),
            VertexSet::Tex { .. } => STRUCT_TEX_ST | (DATA_S16 << 4),
        }
    }

    fn element_size(&self) -> usize {
        match self {
            VertexSet::Position(_) | VertexSet::Normal(_) => 12,
            VertexSet::Color0(_) | VertexSet::Tex { .. } => 4,
        }
    }

    fn read(reader: &ByteReader<'_>, offset: usize, address: u32) -> Result<Option<Self>> {
        let attribute = reader.u8(offset)?;
        if attribute == ATTRIBUTE_END {
            return Ok(None);
        }
        let frac_bits = reader.u8(offset + 1)?;
        let count = reader.u16(offset + 2)? as usize;
        let packed = reader.u32(offset + 4)?;
        let data = header_ptr(reader, AttachFormat::Gc, address, offset + 8)?;

        let unsupported = || {
            Error::mismatch(
                AttachFormat::Gc,
                address,
                format!("unsupported vertex attribute {attribute} with type 0x{packed:02X}"),
            )
        };
        let expected = match attribute {
            1 => STRUCT_POSITION_XYZ | (DATA_F32 << 4),
            2 => STRUCT_NORMAL_XYZ | (DATA_F32 << 4),
            3 => STRUCT_COLOR_RGBA | (DATA_RGBA8 << 4),
            5..=12 => STRUCT_TEX_ST | (DATA_S16 << 4),
            _ => return Err(unsupported()),
        };
        if packed != expected {
            return Err(unsupported());
        }
        let base = match data {
            Some(p) => p as usize,
            None if count == 0 => 0,
            None => {
                return Err(Error::NullReference {
                    what: "vertex attribute data",
                    address,
                });
            }
        };

        let set = match attribute {
            1 | 2 => {
                reader.bytes(base, count * 12)?;
                let values = (0..count)
                    .map(|i| Vec3::read_at(reader, base + i * 12, Vec3Encoding::Float))
                    .collect::<Result<Vec<_>>>()?;
                if attribute == 1 {
                    VertexSet::Position(values)
                } else {
                    VertexSet::Normal(values)
                }
            }
            3 => VertexSet::Color0(
                (0..count)
                    .map(|i| Color::read_at(reader, base + i * 4, ColorEncoding::Rgba8))
                    .collect::<Result<_>>()?,
            ),
            _ => VertexSet::Tex {
                channel: attribute - 5,
                frac_bits,
                uvs: (0..count)
                    .map(|i| Vec2::read_at(reader, base + i * 4, Vec2Encoding::Fixed(frac_bits)))
                    .collect::<Result<_>>()?,
            },
        };
        Ok(Some(set))
    }

    fn write_data(&self, writer: &mut ByteWriter) -> Option<u32> {
        if self.len() == 0 {
            return None;
        }
        writer.align(4);
        let address = writer.address();
        match self {
            VertexSet::Position(v) | VertexSet::Normal(v) => {
                for p in v {
                    p.write(writer, Vec3Encoding::Float);
                }
            }
            VertexSet::Color0(c) => {
                for color in c {
                    color.write(writer, ColorEncoding::Rgba8);
                }
            }
            VertexSet::Tex { frac_bits, uvs, .. } => {
                for uv in uvs {
                    uv.write(writer, Vec2Encoding::Fixed(*frac_bits));
                }
            }
        }
        Some(address)
    }
}

bitflags! {
    /// Which loop indices a primitive stream carries, and their widths.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct IndexAttributeFlags: u32 {
        const BIT0 = 0x1;
        const BIT1 = 0x2;
        const POSITION_16BIT = 0x4;
        const HAS_POSITION = 0x8;
        const NORMAL_16BIT = 0x10;
        const HAS_NORMAL = 0x20;
        const COLOR_16BIT = 0x40;
        const HAS_COLOR = 0x80;
        const BIT8 = 0x100;
        const BIT9 = 0x200;
        const UV_16BIT = 0x400;
        const HAS_UV = 0x800;

        const _ = !0;
    }
}

impl IndexAttributeFlags {
    /// (present, 16-bit) pairs in stream order: position, normal, colour, uv.
    fn fields(self) -> [(bool, bool); 4] {
        [
            (self.contains(Self::HAS_POSITION), self.contains(Self::POSITION_16BIT)),
            (self.contains(Self::HAS_NORMAL), self.contains(Self::NORMAL_16BIT)),
            (self.contains(Self::HAS_COLOR), self.contains(Self::COLOR_16BIT)),
            (self.contains(Self::HAS_UV), self.contains(Self::UV_16BIT)),
        ]
    }
}

/// Mesh parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    VtxAttrFmt,
    IndexAttributeFlags,
    Lighting,
    BlendAlpha,
    AmbientColor,
    Texture,
    Unknown9,
    TexCoordGen,
}

impl ParameterKind {
    fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::VtxAttrFmt,
            1 => Self::IndexAttributeFlags,
            2 => Self::Lighting,
            4 => Self::BlendAlpha,
            5 => Self::AmbientColor,
            8 => Self::Texture,
            9 => Self::Unknown9,
            10 => Self::TexCoordGen,
            _ => return None,
        })
    }

    fn as_u32(self) -> u32 {
        match self {
            Self::VtxAttrFmt => 0,
            Self::IndexAttributeFlags => 1,
            Self::Lighting => 2,
            Self::BlendAlpha => 4,
            Self::AmbientColor => 5,
            Self::Texture => 8,
            Self::Unknown9 => 9,
            Self::TexCoordGen => 10,
        }
    }
}

/// One 8-byte mesh parameter: a type and a type-specific data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub kind: ParameterKind,
    pub data: u32,
}

impl Parameter {
    pub fn index_flags(flags: IndexAttributeFlags) -> Self {
        Self {
            kind: ParameterKind::IndexAttributeFlags,
            data: flags.bits(),
        }
    }

    /// Texture id in the low half, tiling mode in the high half.
    pub fn texture(id: u16, tile_mode: u16) -> Self {
        Self {
            kind: ParameterKind::Texture,
            data: u32::from(id) | (u32::from(tile_mode) << 16),
        }
    }

    pub fn ambient(color: Color) -> Self {
        Self {
            kind: ParameterKind::AmbientColor,
            data: color.to_rgba(),
        }
    }

    pub fn blend_alpha(src: u8, dst: u8) -> Self {
        Self {
            kind: ParameterKind::BlendAlpha,
            data: (u32::from(src & 7) << 11) | (u32::from(dst & 7) << 8),
        }
    }

    pub fn tex_coord_gen(data: u32) -> Self {
        Self {
            kind: ParameterKind::TexCoordGen,
            data,
        }
    }

    pub fn as_index_flags(&self) -> Option<IndexAttributeFlags> {
        (self.kind == ParameterKind::IndexAttributeFlags).then(|| IndexAttributeFlags::from_bits_retain(self.data))
    }

    pub fn texture_id(&self) -> Option<u16> {
        (self.kind == ParameterKind::Texture).then_some(self.data as u16)
    }

    pub fn tile_mode(&self) -> Option<u16> {
        (self.kind == ParameterKind::Texture).then_some((self.data >> 16) as u16)
    }

    pub fn ambient_color(&self) -> Option<Color> {
        (self.kind == ParameterKind::AmbientColor).then(|| Color::from_rgba(self.data))
    }

    /// Source and destination blend factors.
    pub fn blend(&self) -> Option<(u8, u8)> {
        (self.kind == ParameterKind::BlendAlpha)
            .then(|| (((self.data >> 11) & 7) as u8, ((self.data >> 8) & 7) as u8))
    }

    pub fn tex_gen(&self) -> Option<u32> {
        (self.kind == ParameterKind::TexCoordGen).then_some(self.data)
    }
}

/// GX primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x90 => Some(Self::Triangles),
            0x98 => Some(Self::TriangleStrip),
            0xA0 => Some(Self::TriangleFan),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Triangles => 0x90,
            Self::TriangleStrip => 0x98,
            Self::TriangleFan => 0xA0,
        }
    }
}

/// Indices of one primitive corner into the vertex tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GcLoop {
    pub position: u16,
    pub normal: Option<u16>,
    pub color: Option<u16>,
    pub uv: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcPrimitive {
    pub kind: PrimitiveKind,
    pub loops: Vec<GcLoop>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GcMesh {
    pub parameters: Vec<Parameter>,
    pub primitives: Vec<GcPrimitive>,
}

impl GcMesh {
    /// Index flags set by this mesh's own parameters.
    pub fn index_flags(&self) -> Option<IndexAttributeFlags> {
        self.parameters.iter().rev().find_map(Parameter::as_index_flags)
    }

    fn read(reader: &ByteReader<'_>, offset: usize, address: u32, carried: &mut Option<IndexAttributeFlags>) -> Result<Self> {
        let format = AttachFormat::Gc;
        let params_ptr = header_ptr(reader, format, address, offset)?;
        let param_count = reader.u32(offset + 4)? as usize;
        let prims_ptr = header_ptr(reader, format, address, offset + 8)?;
        let prims_size = reader.u32(offset + 12)? as usize;

        let mut parameters = Vec::with_capacity(param_count.min(64));
        if let Some(p) = params_ptr {
            reader.bytes(p as usize, param_count * 8)?;
            for i in 0..param_count {
                let at = p as usize + i * 8;
                let raw = reader.u32(at)?;
                let kind = ParameterKind::from_u32(raw)
                    .ok_or_else(|| Error::mismatch(format, address, format!("unknown mesh parameter type {raw}")))?;
                parameters.push(Parameter {
                    kind,
                    data: reader.u32(at + 4)?,
                });
            }
        }

        let mesh = Self {
            parameters,
            primitives: Vec::new(),
        };
        if let Some(flags) = mesh.index_flags() {
            *carried = Some(flags);
        }
        let Some(p) = prims_ptr else {
            return Ok(mesh);
        };
        let flags = carried.ok_or(Error::NullReference {
            what: "index attribute flags",
            address,
        })?;

        let stream = reader.with_endian(Endian::Big);
        let start = p as usize;
        let end = start + prims_size;
        stream.bytes(start, prims_size)?;
        let mut cursor = start;
        let mut primitives = Vec::new();
        while cursor < end {
            let kind = stream.u8(cursor)?;
            if kind == 0 {
                break;
            }
            let kind = PrimitiveKind::from_u8(kind)
                .ok_or_else(|| Error::mismatch(format, address, format!("unknown primitive type 0x{kind:02X}")))?;
            let count = stream.u16(cursor + 1)? as usize;
            cursor += 3;
            let mut loops = Vec::with_capacity(count);
            for _ in 0..count {
                let mut indices = [None; 4];
                for (slot, (present, wide)) in indices.iter_mut().zip(flags.fields()) {
                    if present {
                        *slot = Some(if wide {
                            cursor += 2;
                            stream.u16(cursor - 2)?
                        } else {
                            cursor += 1;
                            u16::from(stream.u8(cursor - 1)?)
                        });
                    }
                }
                let [position, normal, color, uv] = indices;
                let position = position.ok_or_else(|| Error::mismatch(format, address, "index flags carry no position"))?;
                loops.push(GcLoop {
                    position,
                    normal,
                    color,
                    uv,
                });
            }
            primitives.push(GcPrimitive { kind, loops });
        }
        Ok(Self { primitives, ..mesh })
    }

    fn write_primitives(&self, flags: IndexAttributeFlags) -> Result<Vec<u8>> {
        let mut stream = Codec::big_endian().writer();
        for prim in &self.primitives {
            stream.write_u8(prim.kind.as_u8());
            let count = u16::try_from(prim.loops.len()).map_err(|_| Error::Encode("primitive too long".into()))?;
            stream.write_u16(count);
            for l in &prim.loops {
                let values = [Some(l.position), l.normal, l.color, l.uv];
                for (value, (present, wide)) in values.into_iter().zip(flags.fields()) {
                    if !present {
                        continue;
                    }
                    let v = value.ok_or_else(|| Error::Encode("loop lacks an index its flags require".into()))?;
                    if wide {
                        stream.write_u16(v);
                    } else {
                        let narrow = u8::try_from(v)
                            .map_err(|_| Error::Encode(format!("index {v} needs 16-bit index flags")))?;
                        stream.write_u8(narrow);
                    }
                }
            }
        }
        stream.align(DISPLAY_LIST_ALIGN);
        Ok(stream.into_bytes())
    }
}

/// A GC (SA2B) attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcAttach {
    pub name: String,
    pub vertex_sets: Vec<VertexSet>,
    pub opaque: Vec<GcMesh>,
    pub translucent: Vec<GcMesh>,
    pub bounds: Bounds,
}

impl GcAttach {
    pub fn decode(reader: &ByteReader<'_>, address: u32, labels: &LabelMap) -> Result<Self> {
        let format = AttachFormat::Gc;
        let base = address as usize;
        reader.bytes(base, ATTACH_SIZE)?;
        let vertex_ptr = header_ptr(reader, format, address, base)?;

        let mut vertex_sets = Vec::new();
        if let Some(p) = vertex_ptr {
            let mut cursor = p as usize;
            while let Some(set) = VertexSet::read(reader, cursor, address)? {
                vertex_sets.push(set);
                cursor += VERTEX_SET_SIZE;
            }
        }

        let opaque_ptr = header_ptr(reader, format, address, base + 8)?;
        let translucent_ptr = header_ptr(reader, format, address, base + 12)?;
        let opaque_count = reader.u16(base + 16)? as usize;
        let translucent_count = reader.u16(base + 18)? as usize;
        let bounds = Bounds::read(reader, base + 20)?;

        let read_list = |ptr: Option<u32>, count: usize, what: &'static str| -> Result<Vec<GcMesh>> {
            let Some(p) = ptr else {
                return if count == 0 { Ok(Vec::new()) } else { Err(Error::NullReference { what, address }) };
            };
            let mut carried = None;
            (0..count)
                .map(|i| GcMesh::read(reader, p as usize + i * MESH_SIZE, address, &mut carried))
                .collect()
        };
        let opaque = read_list(opaque_ptr, opaque_count, "opaque meshes")?;
        let translucent = read_list(translucent_ptr, translucent_count, "translucent meshes")?;

        tracing::trace!(
            "GC attach at 0x{address:08X}: {} vertex sets, {} opaque, {} translucent",
            vertex_sets.len(),
            opaque.len(),
            translucent.len()
        );

        Ok(Self {
            name: label_for(reader, labels, address, "attach"),
            vertex_sets,
            opaque,
            translucent,
            bounds,
        })
    }

    pub fn encode(&self, writer: &mut ByteWriter) -> Result<u32> {
        let name = &self.name;
        let mesh_count = |meshes: &[GcMesh], what: &str| {
            u16::try_from(meshes.len()).map_err(|_| Error::Encode(format!("attach {name} has too many {what} meshes")))
        };
        let opaque_count = mesh_count(&self.opaque, "opaque")?;
        let translucent_count = mesh_count(&self.translucent, "translucent")?;

        let data: Vec<Option<u32>> = self.vertex_sets.iter().map(|set| set.write_data(writer)).collect();
        writer.align(4);
        let vertex = if self.vertex_sets.is_empty() {
            None
        } else {
            let address = writer.address();
            for (set, ptr) in self.vertex_sets.iter().zip(&data) {
                let count = u16::try_from(set.len()).map_err(|_| Error::Encode("vertex table too large".into()))?;
                writer.write_u8(set.attribute());
                writer.write_u8(match set {
                    VertexSet::Tex { frac_bits, .. } => *frac_bits,
                    _ => 0,
                });
                writer.write_u16(count);
                writer.write_u32(set.packed_type());
                writer.write_ptr(*ptr);
                writer.write_u32((set.len() * set.element_size()) as u32);
            }
            writer.write_u8(ATTRIBUTE_END);
            writer.write_bytes(&[0; VERTEX_SET_SIZE - 1]);
            writer.add_label(format!("vertex_{name}"), address);
            Some(address)
        };

        let opaque = write_mesh_list(writer, &self.opaque, &format!("opaque_{name}"))?;
        let translucent = write_mesh_list(writer, &self.translucent, &format!("translucent_{name}"))?;

        let address = writer.address();
        writer.write_ptr(vertex);
        writer.write_u32(0);
        writer.write_ptr(opaque);
        writer.write_ptr(translucent);
        writer.write_u16(opaque_count);
        writer.write_u16(translucent_count);
        self.bounds.write(writer);
        writer.add_label(name.clone(), address);
        Ok(address)
    }

    pub fn positions(&self) -> &[Vec3] {
        self.vertex_sets
            .iter()
            .find_map(|s| match s {
                VertexSet::Position(p) => Some(p.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn vertex_count(&self) -> usize {
        self.positions().len()
    }

    pub fn to_mesh(&self) -> Result<Vec<MeshChunk>> {
        let mut normals: &[Vec3] = &[];
        let mut colors: &[Color] = &[];
        let mut uvs: &[Vec2] = &[];
        for set in &self.vertex_sets {
            match set {
                VertexSet::Normal(n) => normals = n,
                VertexSet::Color0(c) => colors = c,
                VertexSet::Tex { channel: 0, uvs: t, .. } => uvs = t,
                _ => {}
            }
        }
        let positions = self.positions();

        let fetch = |index: Option<u16>, len: usize| -> Result<Option<usize>> {
            match index {
                Some(i) if usize::from(i) >= len => Err(Error::InvalidVertexIndex {
                    format: AttachFormat::Gc,
                    attach: self.name.clone(),
                    index: usize::from(i),
                    count: len,
                }),
                Some(i) => Ok(Some(usize::from(i))),
                None => Ok(None),
            }
        };

        let mut state = MeshMaterial::default();
        let mut chunks = Vec::with_capacity(self.opaque.len() + self.translucent.len());
        for (mesh, translucent) in self
            .opaque
            .iter()
            .map(|m| (m, false))
            .chain(self.translucent.iter().map(|m| (m, true)))
        {
            for param in &mesh.parameters {
                if let Some(id) = param.texture_id() {
                    state.texture_id = Some(u32::from(id));
                    state.tile_mode = param.tile_mode();
                }
                if let Some(color) = param.ambient_color() {
                    state.ambient = Some(color);
                }
                if let Some(blend) = param.blend() {
                    state.blend = Some(blend);
                }
                if let Some(tex_gen) = param.tex_gen() {
                    state.tex_gen = Some(tex_gen);
                }
            }
            let mut material = state.clone();
            material.use_alpha = translucent;

            let mut builder = MeshBuilder::new(material);
            for prim in &mesh.primitives {
                let mut corners = Vec::with_capacity(prim.loops.len());
                for l in &prim.loops {
                    let key = Loop {
                        position: u32::from(l.position),
                        normal: l.normal.map(u32::from),
                        color: l.color.map(u32::from),
                        uv: l.uv.map(u32::from),
                    };
                    corners.push(builder.corner(key, || {
                        let p = fetch(Some(l.position), positions.len())?.unwrap_or_default();
                        Ok(Corner {
                            position: positions[p],
                            normal: fetch(l.normal, normals.len())?.map(|i| normals[i]),
                            color: fetch(l.color, colors.len())?.map(|i| colors[i]),
                            uv: fetch(l.uv, uvs.len())?.map(|i| uvs[i]),
                        })
                    })?);
                }
                match prim.kind {
                    PrimitiveKind::Triangles => {
                        if corners.len() % 3 != 0 {
                            return Err(Error::IncompleteTriangles {
                                format: AttachFormat::Gc,
                                attach: self.name.clone(),
                                corners: corners.len(),
                            });
                        }
                        for tri in corners.chunks_exact(3) {
                            builder.triangle(tri[0], tri[1], tri[2]);
                        }
                    }
                    PrimitiveKind::TriangleStrip => builder.strip(corners, false),
                    PrimitiveKind::TriangleFan => builder.fan(&corners),
                }
            }
            chunks.push(builder.finish());
        }
        Ok(chunks)
    }
}

fn write_mesh_list(writer: &mut ByteWriter, meshes: &[GcMesh], label: &str) -> Result<Option<u32>> {
    if meshes.is_empty() {
        return Ok(None);
    }
    let mut carried = None;
    let mut refs = Vec::with_capacity(meshes.len());
    for mesh in meshes {
        writer.align(4);
        let params = (!mesh.parameters.is_empty()).then(|| writer.address());
        for p in &mesh.parameters {
            writer.write_u32(p.kind.as_u32());
            writer.write_u32(p.data);
        }

        if let Some(flags) = mesh.index_flags() {
            carried = Some(flags);
        }
        let prims = if mesh.primitives.is_empty() {
            (None, 0)
        } else {
            let flags = carried.ok_or_else(|| Error::Encode("mesh has primitives but no index attribute flags".into()))?;
            let stream = mesh.write_primitives(flags)?;
            writer.align(DISPLAY_LIST_ALIGN);
            let address = writer.address();
            writer.write_bytes(&stream);
            let size = u32::try_from(stream.len()).map_err(|_| Error::Encode("primitive stream too large".into()))?;
            (Some(address), size)
        };
        let count = u32::try_from(mesh.parameters.len()).map_err(|_| Error::Encode("too many mesh parameters".into()))?;
        refs.push((params, count, prims));
    }

    writer.align(4);
    let address = writer.address();
    for (params, count, (prims, size)) in refs {
        writer.write_ptr(params);
        writer.write_u32(count);
        writer.write_ptr(prims);
        writer.write_u32(size);
    }
    writer.add_label(label.to_string(), address);
    Ok(Some(address))
}
