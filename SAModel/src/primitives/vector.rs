//! Vector, rotation and bounding-sphere encodings

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::Primitive;
use super::bams::{bams_to_deg, deg_to_bams, deg_to_bams16};
use crate::codec::{ByteReader, ByteWriter};
use crate::error::Result;

/// Wire encodings of a 3-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vec3Encoding {
    /// 3 x `f32`.
    Float,
    /// 3 x `i16`, stored as-is.
    Short,
    /// 3 x `i16` normalized to `[-1, 1]` by 32767.
    UnitShort,
    /// 3 x 16-bit BAMS, decoded to degrees.
    Bams16,
    /// 3 x 32-bit BAMS, decoded to degrees.
    Bams32,
}

/// Wire encodings of a 2-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vec2Encoding {
    /// 2 x `f32`.
    Float,
    /// 2 x `i16`, stored as-is.
    Short,
    /// 2 x `i16` divided by 255 (standard texture coordinates).
    Uv255,
    /// 2 x `i16` divided by 1023 (high-resolution texture coordinates).
    Uv1023,
    /// 2 x `i16` fixed point with the given number of fractional bits.
    Fixed(u8),
}

fn quantize(v: f32, scale: f32) -> i16 {
    (v * scale).round() as i16
}

impl Primitive for Vec3 {
    type Encoding = Vec3Encoding;

    fn size(encoding: Vec3Encoding) -> usize {
        match encoding {
            Vec3Encoding::Float | Vec3Encoding::Bams32 => 12,
            Vec3Encoding::Short | Vec3Encoding::UnitShort | Vec3Encoding::Bams16 => 6,
        }
    }

    fn read(reader: &ByteReader<'_>, offset: &mut usize, encoding: Vec3Encoding) -> Result<Self> {
        let at = *offset;
        let v = match encoding {
            Vec3Encoding::Float => Vec3::new(reader.f32(at)?, reader.f32(at + 4)?, reader.f32(at + 8)?),
            Vec3Encoding::Short => Vec3::new(
                f32::from(reader.i16(at)?),
                f32::from(reader.i16(at + 2)?),
                f32::from(reader.i16(at + 4)?),
            ),
            Vec3Encoding::UnitShort => Vec3::new(
                f32::from(reader.i16(at)?) / 32767.0,
                f32::from(reader.i16(at + 2)?) / 32767.0,
                f32::from(reader.i16(at + 4)?) / 32767.0,
            ),
            Vec3Encoding::Bams16 => Vec3::new(
                bams_to_deg(i32::from(reader.i16(at)?)),
                bams_to_deg(i32::from(reader.i16(at + 2)?)),
                bams_to_deg(i32::from(reader.i16(at + 4)?)),
            ),
            Vec3Encoding::Bams32 => Vec3::new(
                bams_to_deg(reader.i32(at)?),
                bams_to_deg(reader.i32(at + 4)?),
                bams_to_deg(reader.i32(at + 8)?),
            ),
        };
        *offset += Self::size(encoding);
        Ok(v)
    }

    fn write(&self, writer: &mut ByteWriter, encoding: Vec3Encoding) {
        for c in self.to_array() {
            match encoding {
                Vec3Encoding::Float => writer.write_f32(c),
                Vec3Encoding::Short => writer.write_i16(c.round() as i16),
                Vec3Encoding::UnitShort => writer.write_i16(quantize(c, 32767.0)),
                Vec3Encoding::Bams16 => writer.write_i16(deg_to_bams16(c)),
                Vec3Encoding::Bams32 => writer.write_i32(deg_to_bams(c)),
            }
        }
    }
}

impl Primitive for Vec2 {
    type Encoding = Vec2Encoding;

    fn size(encoding: Vec2Encoding) -> usize {
        match encoding {
            Vec2Encoding::Float => 8,
            _ => 4,
        }
    }

    fn read(reader: &ByteReader<'_>, offset: &mut usize, encoding: Vec2Encoding) -> Result<Self> {
        let at = *offset;
        let v = if encoding == Vec2Encoding::Float {
            Vec2::new(reader.f32(at)?, reader.f32(at + 4)?)
        } else {
            let scale = short_scale(encoding);
            Vec2::new(
                f32::from(reader.i16(at)?) / scale,
                f32::from(reader.i16(at + 2)?) / scale,
            )
        };
        *offset += Self::size(encoding);
        Ok(v)
    }

    fn write(&self, writer: &mut ByteWriter, encoding: Vec2Encoding) {
        if encoding == Vec2Encoding::Float {
            writer.write_f32(self.x);
            writer.write_f32(self.y);
        } else {
            let scale = short_scale(encoding);
            writer.write_i16(quantize(self.x, scale));
            writer.write_i16(quantize(self.y, scale));
        }
    }
}

fn short_scale(encoding: Vec2Encoding) -> f32 {
    match encoding {
        Vec2Encoding::Float | Vec2Encoding::Short => 1.0,
        Vec2Encoding::Uv255 => 255.0,
        Vec2Encoding::Uv1023 => 1023.0,
        Vec2Encoding::Fixed(bits) => f32::from(1u16 << bits.min(15)),
    }
}

/// Euler rotation in raw BAMS units, as stored on scene nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Rotation {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Rotation {
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn from_degrees(deg: Vec3) -> Self {
        Self::new(deg_to_bams(deg.x), deg_to_bams(deg.y), deg_to_bams(deg.z))
    }

    pub fn to_degrees(self) -> Vec3 {
        Vec3::new(bams_to_deg(self.x), bams_to_deg(self.y), bams_to_deg(self.z))
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

impl Primitive for Rotation {
    /// Only the BAMS encodings apply; anything else reads as 32-bit.
    type Encoding = Vec3Encoding;

    fn size(encoding: Vec3Encoding) -> usize {
        if encoding == Vec3Encoding::Bams16 { 6 } else { 12 }
    }

    fn read(reader: &ByteReader<'_>, offset: &mut usize, encoding: Vec3Encoding) -> Result<Self> {
        let at = *offset;
        let r = if encoding == Vec3Encoding::Bams16 {
            Rotation::new(
                i32::from(reader.i16(at)?),
                i32::from(reader.i16(at + 2)?),
                i32::from(reader.i16(at + 4)?),
            )
        } else {
            Rotation::new(reader.i32(at)?, reader.i32(at + 4)?, reader.i32(at + 8)?)
        };
        *offset += Self::size(encoding);
        Ok(r)
    }

    fn write(&self, writer: &mut ByteWriter, encoding: Vec3Encoding) {
        for c in [self.x, self.y, self.z] {
            if encoding == Vec3Encoding::Bams16 {
                writer.write_i16(c as i16);
            } else {
                writer.write_i32(c);
            }
        }
    }
}

/// Bounding sphere stored after every attach header.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub center: Vec3,
    pub radius: f32,
}

impl Bounds {
    pub const SIZE: usize = 16;

    pub fn read(reader: &ByteReader<'_>, offset: usize) -> Result<Self> {
        let mut cursor = offset;
        let center = Vec3::read(reader, &mut cursor, Vec3Encoding::Float)?;
        let radius = reader.f32(cursor)?;
        Ok(Self { center, radius })
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        self.center.write(writer, Vec3Encoding::Float);
        writer.write_f32(self.radius);
    }

    /// Smallest sphere around the centroid containing every point.
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0f32, f32::max);
        Self { center, radius }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    #[test]
    fn test_read_advances_offset() {
        let mut w = Codec::big_endian().writer();
        Vec3::new(1.0, 2.0, 3.0).write(&mut w, Vec3Encoding::Float);
        Vec3::new(90.0, 0.0, -90.0).write(&mut w, Vec3Encoding::Bams16);
        let bytes = w.into_bytes();

        let reader = Codec::big_endian().reader(&bytes);
        let mut offset = 0;
        let a = Vec3::read(&reader, &mut offset, Vec3Encoding::Float).unwrap();
        assert_eq!(offset, 12);
        let b = Vec3::read(&reader, &mut offset, Vec3Encoding::Bams16).unwrap();
        assert_eq!(offset, 18);
        assert_eq!(a, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b, Vec3::new(90.0, 0.0, -90.0));
    }

    #[test]
    fn test_uv_scaling() {
        let mut w = Codec::default().writer();
        Vec2::new(1.0, 0.5).write(&mut w, Vec2Encoding::Uv255);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0xFF, 0x00, 0x80, 0x00]);
        let uv = Vec2::read_at(&Codec::default().reader(&bytes), 0, Vec2Encoding::Uv255).unwrap();
        assert_eq!(uv, Vec2::new(1.0, 128.0 / 255.0));
    }

    #[test]
    fn test_rotation_degrees() {
        let r = Rotation::from_degrees(Vec3::new(90.0, 180.0, -45.0));
        assert_eq!(r, Rotation::new(0x4000, 0x8000, -0x2000));
        assert_eq!(r.to_degrees(), Vec3::new(90.0, 180.0, -45.0));
    }

    #[test]
    fn test_bounds_from_points() {
        let b = Bounds::from_points(&[Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)]);
        assert_eq!(b.center, Vec3::ZERO);
        assert_eq!(b.radius, 1.0);
    }
}
