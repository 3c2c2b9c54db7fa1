//! Basic and BasicDX attaches
//!
//! Layout (offsets from the attach header):
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0x00 | positions pointer |
//! | 0x04 | normals pointer |
//! | 0x08 | vertex count (i32) |
//! | 0x0C | meshset array pointer |
//! | 0x10 | material array pointer |
//! | 0x14 | meshset count, material count (u16 each) |
//! | 0x18 | bounds |
//! | 0x28 | BasicDX only: zero word |
//!
//! Meshsets carry their own per-corner normal, colour and uv arrays, indexed
//! by corner position across all polygons of the meshset.

use bitflags::bitflags;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::{AttachFormat, Corner, Loop, MeshBuilder, MeshChunk, MeshMaterial, header_ptr, label_for};
use crate::codec::{ByteReader, ByteWriter, LabelMap};
use crate::error::{Error, Result};
use crate::primitives::{Bounds, Color, ColorEncoding, Primitive, Vec2Encoding, Vec3Encoding};

const ATTACH_SIZE: usize = 0x28;
const MESHSET_SIZE: usize = 0x18;
const MATERIAL_SIZE: usize = 0x14;

bitflags! {
    /// Ninja material attribute word.
    ///
    /// Only the single-bit switches are named; blend modes, filter mode and
    /// mipmap adjust occupy multi-bit fields read through accessors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MaterialFlags: u32 {
        const PICK = 0x80;
        const USE_ANISOTROPIC = 0x1000;
        const CLAMP_V = 0x8000;
        const CLAMP_U = 0x1_0000;
        const FLIP_V = 0x2_0000;
        const FLIP_U = 0x4_0000;
        const IGNORE_SPECULAR = 0x8_0000;
        const USE_ALPHA = 0x10_0000;
        const USE_TEXTURE = 0x20_0000;
        const USE_ENV = 0x40_0000;
        const DOUBLE_SIDE = 0x80_0000;
        const USE_FLAT = 0x100_0000;
        const IGNORE_LIGHT = 0x200_0000;

        const _ = !0;
    }
}

impl MaterialFlags {
    pub fn mipmap_d_adjust(self) -> u8 {
        (self.bits() & 0xF) as u8
    }

    pub fn filter_mode(self) -> u8 {
        ((self.bits() >> 13) & 0x3) as u8
    }

    pub fn dst_alpha(self) -> u8 {
        ((self.bits() >> 26) & 0x7) as u8
    }

    pub fn src_alpha(self) -> u8 {
        ((self.bits() >> 29) & 0x7) as u8
    }
}

/// Surface description referenced by meshsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub diffuse: Color,
    pub specular: Color,
    pub exponent: f32,
    pub texture_id: u32,
    pub flags: MaterialFlags,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Color::WHITE,
            specular: Color::WHITE,
            exponent: 11.0,
            texture_id: 0,
            flags: MaterialFlags::USE_TEXTURE,
        }
    }
}

impl Material {
    fn read(reader: &ByteReader<'_>, offset: usize) -> Result<Self> {
        let mut cursor = offset;
        let diffuse = Color::read(reader, &mut cursor, ColorEncoding::Argb8_32)?;
        let specular = Color::read(reader, &mut cursor, ColorEncoding::Argb8_32)?;
        Ok(Self {
            diffuse,
            specular,
            exponent: reader.f32(cursor)?,
            texture_id: reader.u32(cursor + 4)?,
            flags: MaterialFlags::from_bits_retain(reader.u32(cursor + 8)?),
        })
    }

    fn write(&self, writer: &mut ByteWriter) {
        self.diffuse.write(writer, ColorEncoding::Argb8_32);
        self.specular.write(writer, ColorEncoding::Argb8_32);
        writer.write_f32(self.exponent);
        writer.write_u32(self.texture_id);
        writer.write_u32(self.flags.bits());
    }

    fn to_mesh_material(&self) -> MeshMaterial {
        MeshMaterial {
            diffuse: self.diffuse,
            ambient: None,
            specular: (!self.flags.contains(MaterialFlags::IGNORE_SPECULAR)).then_some(self.specular),
            exponent: self.exponent,
            texture_id: self.flags.contains(MaterialFlags::USE_TEXTURE).then_some(self.texture_id),
            tile_mode: None,
            blend: Some((self.flags.src_alpha(), self.flags.dst_alpha())),
            tex_gen: None,
            use_alpha: self.flags.contains(MaterialFlags::USE_ALPHA),
            double_sided: self.flags.contains(MaterialFlags::DOUBLE_SIDE),
            ignore_lighting: self.flags.contains(MaterialFlags::IGNORE_LIGHT),
        }
    }
}

/// Polygon layout of a meshset, stored in the top two bits of its first word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolyType {
    Triangles,
    Quads,
    NGons,
    Strips,
}

impl PolyType {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => PolyType::Triangles,
            1 => PolyType::Quads,
            2 => PolyType::NGons,
            _ => PolyType::Strips,
        }
    }

    fn bits(self) -> u16 {
        match self {
            PolyType::Triangles => 0,
            PolyType::Quads => 1,
            PolyType::NGons => 2,
            PolyType::Strips => 3,
        }
    }
}

/// One polygon as vertex indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poly {
    pub indices: Vec<u16>,
    /// Strips only: first triangle has reversed winding.
    pub reversed: bool,
}

impl Poly {
    pub fn new(indices: Vec<u16>) -> Self {
        Self {
            indices,
            reversed: false,
        }
    }
}

/// A run of polygons sharing one material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSet {
    pub poly_type: PolyType,
    pub material_id: u16,
    pub polys: Vec<Poly>,
    /// Per-polygon attribute words; empty when the pointer is null.
    pub attributes: Vec<u32>,
    /// Per-corner arrays; empty when the pointer is null.
    pub normals: Vec<Vec3>,
    pub colors: Vec<Color>,
    pub uvs: Vec<Vec2>,
}

impl MeshSet {
    pub fn corner_count(&self) -> usize {
        self.polys.iter().map(|p| p.indices.len()).sum()
    }

    fn read(reader: &ByteReader<'_>, offset: usize, address: u32, format: AttachFormat) -> Result<Self> {
        let type_material = reader.u16(offset)?;
        let poly_type = PolyType::from_bits(type_material >> 14);
        let poly_count = reader.u16(offset + 2)? as usize;

        let mut polys = Vec::with_capacity(poly_count);
        if let Some(mut cursor) = reader.ptr(offset + 4)?.map(|p| p as usize) {
            for _ in 0..poly_count {
                let (len, reversed) = match poly_type {
                    PolyType::Triangles => (3, false),
                    PolyType::Quads => (4, false),
                    PolyType::NGons => {
                        cursor += 2;
                        (reader.u16(cursor - 2)? as usize, false)
                    }
                    PolyType::Strips => {
                        let header = reader.u16(cursor)?;
                        cursor += 2;
                        ((header & 0x7FFF) as usize, header & 0x8000 != 0)
                    }
                };
                let mut indices = Vec::with_capacity(len);
                for i in 0..len {
                    indices.push(reader.u16(cursor + i * 2)?);
                }
                cursor += len * 2;
                polys.push(Poly { indices, reversed });
            }
        } else if poly_count > 0 {
            return Err(Error::mismatch(format, address, "meshset has polygons but no polygon data"));
        }

        let corners: usize = polys.iter().map(|p| p.indices.len()).sum();
        let read_array = |field: usize, count: usize, size: usize| -> Result<Option<usize>> {
            let ptr = reader.ptr(offset + field)?;
            if let Some(p) = ptr {
                reader.bytes(p as usize, count * size)?;
            }
            Ok(ptr.map(|p| p as usize))
        };

        let attributes = match read_array(8, poly_count, 4)? {
            Some(p) => (0..poly_count).map(|i| reader.u32(p + i * 4)).collect::<Result<_>>()?,
            None => Vec::new(),
        };
        let normals = match read_array(12, corners, 12)? {
            Some(p) => (0..corners)
                .map(|i| Vec3::read_at(reader, p + i * 12, Vec3Encoding::Float))
                .collect::<Result<_>>()?,
            None => Vec::new(),
        };
        let colors = match read_array(16, corners, 4)? {
            Some(p) => (0..corners)
                .map(|i| Color::read_at(reader, p + i * 4, ColorEncoding::Argb8_32))
                .collect::<Result<_>>()?,
            None => Vec::new(),
        };
        let uvs = match read_array(20, corners, 4)? {
            Some(p) => (0..corners)
                .map(|i| Vec2::read_at(reader, p + i * 4, Vec2Encoding::Uv255))
                .collect::<Result<_>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            poly_type,
            material_id: type_material & 0x3FFF,
            polys,
            attributes,
            normals,
            colors,
            uvs,
        })
    }

    fn check_arrays(&self) -> Result<()> {
        let corners = self.corner_count();
        for (what, len) in [
            ("normal", self.normals.len()),
            ("colour", self.colors.len()),
            ("uv", self.uvs.len()),
        ] {
            if len != 0 && len != corners {
                return Err(Error::Encode(format!(
                    "meshset has {corners} corners but {len} {what} entries"
                )));
            }
        }
        if !self.attributes.is_empty() && self.attributes.len() != self.polys.len() {
            return Err(Error::Encode("meshset attribute count differs from polygon count".into()));
        }
        if self.material_id > 0x3FFF {
            return Err(Error::Encode(format!("material id {} exceeds 14 bits", self.material_id)));
        }
        for poly in &self.polys {
            let len = poly.indices.len();
            let fits = match self.poly_type {
                PolyType::Triangles => len == 3,
                PolyType::Quads => len == 4,
                PolyType::NGons => len <= usize::from(u16::MAX),
                PolyType::Strips => len <= 0x7FFF,
            };
            if !fits {
                return Err(Error::Encode(format!("{:?} meshset cannot hold a polygon of {len} indices", self.poly_type)));
            }
        }
        Ok(())
    }
}

/// Addresses of one meshset's arrays, filled in while encoding.
struct MeshSetRefs {
    polys: Option<u32>,
    attributes: Option<u32>,
    normals: Option<u32>,
    colors: Option<u32>,
    uvs: Option<u32>,
}

/// A Basic (SA1) or BasicDX (SADX) attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAttach {
    pub name: String,
    pub positions: Vec<Vec3>,
    /// Per-vertex normals; empty when the pointer is null.
    pub normals: Vec<Vec3>,
    pub meshsets: Vec<MeshSet>,
    pub materials: Vec<Material>,
    pub bounds: Bounds,
}

impl BasicAttach {
    pub fn decode(reader: &ByteReader<'_>, address: u32, dx: bool, labels: &LabelMap) -> Result<Self> {
        let format = if dx { AttachFormat::BasicDx } else { AttachFormat::Basic };
        let base = address as usize;
        reader.bytes(base, ATTACH_SIZE)?;

        let positions_ptr = header_ptr(reader, format, address, base)?;
        let normals_ptr = header_ptr(reader, format, address, base + 4)?;
        let vertex_count = reader.i32(base + 8)?;
        let meshsets_ptr = header_ptr(reader, format, address, base + 0x0C)?;
        let materials_ptr = header_ptr(reader, format, address, base + 0x10)?;
        let meshset_count = reader.u16(base + 0x14)? as usize;
        let material_count = reader.u16(base + 0x16)? as usize;
        let bounds = Bounds::read(reader, base + 0x18)?;

        if vertex_count < 0 || vertex_count as usize * 12 > reader.len() {
            return Err(Error::mismatch(format, address, format!("implausible vertex count {vertex_count}")));
        }
        let vertex_count = vertex_count as usize;
        if !bounds.radius.is_finite() || bounds.radius < 0.0 {
            return Err(Error::mismatch(format, address, "bounding radius is not a finite positive value"));
        }

        let positions = match positions_ptr {
            Some(p) => read_vec3s(reader, p as usize, vertex_count)?,
            None if vertex_count == 0 => Vec::new(),
            None => {
                return Err(Error::NullReference {
                    what: "vertex positions",
                    address,
                });
            }
        };
        let normals = match normals_ptr {
            Some(p) => read_vec3s(reader, p as usize, vertex_count)?,
            None => Vec::new(),
        };

        let stride = if dx { MESHSET_SIZE + 4 } else { MESHSET_SIZE };
        let meshsets = match meshsets_ptr {
            Some(p) => (0..meshset_count)
                .map(|i| MeshSet::read(reader, p as usize + i * stride, address, format))
                .collect::<Result<Vec<_>>>()?,
            None if meshset_count == 0 => Vec::new(),
            None => return Err(Error::NullReference { what: "meshsets", address }),
        };
        let materials = match materials_ptr {
            Some(p) => (0..material_count)
                .map(|i| Material::read(reader, p as usize + i * MATERIAL_SIZE))
                .collect::<Result<Vec<_>>>()?,
            None if material_count == 0 => Vec::new(),
            None => return Err(Error::NullReference { what: "materials", address }),
        };

        tracing::trace!(
            "{format} attach at 0x{address:08X}: {} vertices, {} meshsets, {} materials",
            positions.len(),
            meshsets.len(),
            materials.len()
        );

        Ok(Self {
            name: label_for(reader, labels, address, "attach"),
            positions,
            normals,
            meshsets,
            materials,
            bounds,
        })
    }

    pub fn encode(&self, writer: &mut ByteWriter, dx: bool) -> Result<u32> {
        if !self.normals.is_empty() && self.normals.len() != self.positions.len() {
            return Err(Error::Encode(format!(
                "attach {} has {} positions but {} normals",
                self.name,
                self.positions.len(),
                self.normals.len()
            )));
        }
        let vertex_count = i32::try_from(self.positions.len())
            .map_err(|_| Error::Encode(format!("attach {} has too many vertices", self.name)))?;
        let meshset_count = count16(self.meshsets.len(), "meshset")?;
        let material_count = count16(self.materials.len(), "material")?;
        let name = &self.name;
        writer.align(4);

        let positions = write_vec3s(writer, &self.positions);
        if let Some(address) = positions {
            writer.add_label(format!("vertex_{name}"), address);
        }
        let normals = write_vec3s(writer, &self.normals);
        if let Some(address) = normals {
            writer.add_label(format!("normal_{name}"), address);
        }

        let mut refs = Vec::with_capacity(self.meshsets.len());
        for (i, ms) in self.meshsets.iter().enumerate() {
            ms.check_arrays()?;
            refs.push(write_meshset_arrays(writer, ms, &format!("{name}_{i}"))?);
        }

        writer.align(4);
        let meshsets = (!self.meshsets.is_empty()).then(|| writer.address());
        for (ms, r) in self.meshsets.iter().zip(&refs) {
            writer.write_u16((ms.poly_type.bits() << 14) | ms.material_id);
            writer.write_u16(count16(ms.polys.len(), "polygon")?);
            writer.write_ptr(r.polys);
            writer.write_ptr(r.attributes);
            writer.write_ptr(r.normals);
            writer.write_ptr(r.colors);
            writer.write_ptr(r.uvs);
            if dx {
                writer.write_u32(0);
            }
        }
        if let Some(address) = meshsets {
            writer.add_label(format!("meshlist_{name}"), address);
        }

        let materials = (!self.materials.is_empty()).then(|| writer.address());
        for material in &self.materials {
            material.write(writer);
        }
        if let Some(address) = materials {
            writer.add_label(format!("matlist_{name}"), address);
        }

        let address = writer.address();
        writer.write_ptr(positions);
        writer.write_ptr(normals);
        writer.write_i32(vertex_count);
        writer.write_ptr(meshsets);
        writer.write_ptr(materials);
        writer.write_u16(meshset_count);
        writer.write_u16(material_count);
        self.bounds.write(writer);
        if dx {
            writer.write_u32(0);
        }
        writer.add_label(name.clone(), address);
        Ok(address)
    }

    pub fn to_mesh(&self, format: AttachFormat) -> Result<Vec<MeshChunk>> {
        let mut chunks = Vec::with_capacity(self.meshsets.len());
        for ms in &self.meshsets {
            let material = match self.materials.get(ms.material_id as usize) {
                Some(m) => m.to_mesh_material(),
                None => {
                    tracing::warn!(
                        "Attach {} meshset references material {} of {}",
                        self.name,
                        ms.material_id,
                        self.materials.len()
                    );
                    MeshMaterial::default()
                }
            };
            let mut builder = MeshBuilder::new(material);
            let mut k = 0usize;
            for poly in &ms.polys {
                let mut corners = Vec::with_capacity(poly.indices.len());
                for &v in &poly.indices {
                    corners.push(self.corner(&mut builder, ms, v as usize, k, format)?);
                    k += 1;
                }
                match ms.poly_type {
                    PolyType::Triangles => builder.fan(&corners),
                    PolyType::Quads if corners.len() == 4 => {
                        builder.triangle(corners[0], corners[1], corners[2]);
                        builder.triangle(corners[2], corners[1], corners[3]);
                    }
                    PolyType::Quads | PolyType::NGons => builder.fan(&corners),
                    PolyType::Strips => builder.strip(corners, poly.reversed),
                }
            }
            chunks.push(builder.finish());
        }
        Ok(chunks)
    }

    fn corner(
        &self,
        builder: &mut MeshBuilder<Loop>,
        ms: &MeshSet,
        v: usize,
        k: usize,
        format: AttachFormat,
    ) -> Result<u32> {
        let key = Loop {
            position: v as u32,
            normal: (!ms.normals.is_empty()).then_some(k as u32),
            color: (!ms.colors.is_empty()).then_some(k as u32),
            uv: (!ms.uvs.is_empty()).then_some(k as u32),
        };
        builder.corner(key, || {
            let position = *self.positions.get(v).ok_or(Error::InvalidVertexIndex {
                format,
                attach: self.name.clone(),
                index: v,
                count: self.positions.len(),
            })?;
            Ok(Corner {
                position,
                normal: ms.normals.get(k).or_else(|| self.normals.get(v)).copied(),
                color: ms.colors.get(k).copied(),
                uv: ms.uvs.get(k).copied(),
            })
        })
    }
}

fn read_vec3s(reader: &ByteReader<'_>, offset: usize, count: usize) -> Result<Vec<Vec3>> {
    reader.bytes(offset, count * 12)?;
    (0..count)
        .map(|i| Vec3::read_at(reader, offset + i * 12, Vec3Encoding::Float))
        .collect()
}

fn write_vec3s(writer: &mut ByteWriter, values: &[Vec3]) -> Option<u32> {
    if values.is_empty() {
        return None;
    }
    let address = writer.address();
    for v in values {
        v.write(writer, Vec3Encoding::Float);
    }
    Some(address)
}

fn count16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::Encode(format!("{len} {what} entries exceed a 16-bit count")))
}

fn write_meshset_arrays(writer: &mut ByteWriter, ms: &MeshSet, name: &str) -> Result<MeshSetRefs> {
    let polys = (!ms.polys.is_empty()).then(|| writer.address());
    for poly in &ms.polys {
        match ms.poly_type {
            PolyType::Triangles | PolyType::Quads => {}
            PolyType::NGons => writer.write_u16(count16(poly.indices.len(), "n-gon index")?),
            PolyType::Strips => {
                let reversed = if poly.reversed { 0x8000 } else { 0 };
                writer.write_u16(reversed | count16(poly.indices.len(), "strip index")?);
            }
        }
        for &i in &poly.indices {
            writer.write_u16(i);
        }
    }
    writer.align(4);
    if let Some(address) = polys {
        writer.add_label(format!("poly_{name}"), address);
    }

    let attributes = (!ms.attributes.is_empty()).then(|| writer.address());
    for &a in &ms.attributes {
        writer.write_u32(a);
    }
    if let Some(address) = attributes {
        writer.add_label(format!("polyattr_{name}"), address);
    }
    let normals = write_vec3s(writer, &ms.normals);
    if let Some(address) = normals {
        writer.add_label(format!("polynormal_{name}"), address);
    }
    let colors = (!ms.colors.is_empty()).then(|| writer.address());
    for c in &ms.colors {
        c.write(writer, ColorEncoding::Argb8_32);
    }
    if let Some(address) = colors {
        writer.add_label(format!("vcolor_{name}"), address);
    }
    let uvs = (!ms.uvs.is_empty()).then(|| writer.address());
    for uv in &ms.uvs {
        uv.write(writer, Vec2Encoding::Uv255);
    }
    if let Some(address) = uvs {
        writer.add_label(format!("uv_{name}"), address);
    }

    Ok(MeshSetRefs {
        polys,
        attributes,
        normals,
        colors,
        uvs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    fn quad_attach() -> BasicAttach {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ];
        BasicAttach {
            name: "attach_quad".into(),
            normals: vec![Vec3::Z; 4],
            meshsets: vec![MeshSet {
                poly_type: PolyType::Quads,
                material_id: 0,
                polys: vec![Poly::new(vec![0, 1, 2, 3])],
                attributes: Vec::new(),
                normals: Vec::new(),
                colors: vec![Color::rgba(255, 0, 0, 255); 4],
                uvs: vec![
                    Vec2::new(0.0, 0.0),
                    Vec2::new(1.0, 0.0),
                    Vec2::new(0.0, 1.0),
                    Vec2::new(1.0, 1.0),
                ],
            }],
            materials: vec![Material {
                flags: MaterialFlags::USE_TEXTURE | MaterialFlags::USE_ALPHA | MaterialFlags::from_bits_retain(0xA000_0000),
                texture_id: 7,
                ..Material::default()
            }],
            bounds: Bounds::from_points(&positions),
            positions,
        }
    }

    #[test]
    fn test_material_flags_keep_blend_bits() {
        let flags = MaterialFlags::from_bits_retain(0xA430_2003);
        assert_eq!(flags.src_alpha(), 5);
        assert_eq!(flags.dst_alpha(), 1);
        assert_eq!(flags.filter_mode(), 1);
        assert_eq!(flags.mipmap_d_adjust(), 3);
        assert_eq!(flags.bits(), 0xA430_2003);
    }

    #[test]
    fn test_dx_round_trip_big_endian() {
        let attach = quad_attach();
        let codec = Codec::big_endian();
        let mut w = codec.writer();
        w.write_u32(0);
        let address = attach.encode(&mut w, true).unwrap();
        let (bytes, labels) = w.finish();
        assert_eq!(bytes.len(), address as usize + ATTACH_SIZE + 4);

        let decoded = BasicAttach::decode(&codec.reader(&bytes), address, true, &labels).unwrap();
        assert_eq!(decoded, attach);
    }

    #[test]
    fn test_quad_splits_into_two_triangles() {
        let chunks = quad_attach().to_mesh(AttachFormat::Basic).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].corners.len(), 4);
        assert_eq!(chunks[0].triangles, vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(chunks[0].material.texture_id, Some(7));
        assert!(chunks[0].material.use_alpha);
        assert_eq!(chunks[0].material.blend, Some((5, 0)));
    }

    #[test]
    fn test_poly_size_must_fit_poly_type() {
        let mut attach = quad_attach();
        attach.meshsets[0].polys[0].indices.pop();
        attach.meshsets[0].colors.pop();
        attach.meshsets[0].uvs.pop();
        let mut w = Codec::default().writer();
        let err = attach.encode(&mut w, false).unwrap_err();
        assert!(matches!(&err, Error::Encode(msg) if msg.contains("Quads")));

        let mut strip = quad_attach();
        strip.meshsets[0].poly_type = PolyType::Strips;
        strip.meshsets[0].polys = vec![Poly::new(vec![0; 0x8000])];
        strip.meshsets[0].colors.clear();
        strip.meshsets[0].uvs.clear();
        let err = strip.encode(&mut Codec::default().writer(), false).unwrap_err();
        assert!(matches!(&err, Error::Encode(msg) if msg.contains("32768")));
    }

    #[test]
    fn test_material_count_overflow() {
        let mut attach = quad_attach();
        attach.materials = vec![Material::default(); 0x10000];
        let err = attach.encode(&mut Codec::default().writer(), false).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn test_bad_vertex_index() {
        let mut attach = quad_attach();
        attach.meshsets[0].polys[0].indices[3] = 9;
        let err = attach.to_mesh(AttachFormat::Basic).unwrap_err();
        assert!(matches!(err, Error::InvalidVertexIndex { index: 9, count: 4, .. }));
    }

    #[test]
    fn test_strip_header_round_trip() {
        let mut attach = quad_attach();
        attach.meshsets[0].poly_type = PolyType::Strips;
        attach.meshsets[0].polys = vec![Poly {
            indices: vec![0, 1, 2, 3],
            reversed: true,
        }];
        let codec = Codec::little_endian();
        let mut w = codec.writer();
        w.write_u32(0);
        let address = attach.encode(&mut w, false).unwrap();
        let (bytes, labels) = w.finish();
        let decoded = BasicAttach::decode(&codec.reader(&bytes), address, false, &labels).unwrap();
        assert!(decoded.meshsets[0].polys[0].reversed);
        assert_eq!(decoded, attach);
    }
}
