//! Packed colour encodings

use serde::{Deserialize, Serialize};

use super::Primitive;
use crate::codec::{ByteReader, ByteWriter};
use crate::error::Result;

/// Wire encodings of a colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorEncoding {
    /// Bytes R, G, B, A in order, independent of byte order.
    Rgba8,
    /// One `u32` holding `0xAARRGGBB`.
    Argb8_32,
    /// Two `u16` halves: `0xGGBB` then `0xAARR`.
    Argb8_16,
    /// One `u16` holding `0xARGB`, 4 bits per channel.
    Argb4,
    /// One `u16` holding 5-6-5 RGB; alpha reads as opaque.
    Rgb565,
}

/// An 8-bit-per-channel colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);
    pub const BLACK: Self = Self::rgba(0, 0, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_argb(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    pub fn to_argb(self) -> u32 {
        (u32::from(self.a) << 24) | (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }

    pub fn from_rgba(rgba: u32) -> Self {
        Self {
            r: (rgba >> 24) as u8,
            g: (rgba >> 16) as u8,
            b: (rgba >> 8) as u8,
            a: rgba as u8,
        }
    }

    pub fn to_rgba(self) -> u32 {
        (u32::from(self.r) << 24) | (u32::from(self.g) << 16) | (u32::from(self.b) << 8) | u32::from(self.a)
    }

    /// Expands 4-4-4-4 ARGB, replicating each nibble into both halves.
    pub fn from_argb4(v: u16) -> Self {
        let expand = |n: u16| ((n & 0xF) as u8) * 0x11;
        Self {
            a: expand(v >> 12),
            r: expand(v >> 8),
            g: expand(v >> 4),
            b: expand(v),
        }
    }

    pub fn to_argb4(self) -> u16 {
        (u16::from(self.a >> 4) << 12)
            | (u16::from(self.r >> 4) << 8)
            | (u16::from(self.g >> 4) << 4)
            | u16::from(self.b >> 4)
    }

    /// Expands 5-6-5 RGB, replicating the high bits into the low bits.
    pub fn from_rgb565(v: u16) -> Self {
        let r = ((v >> 11) & 0x1F) as u8;
        let g = ((v >> 5) & 0x3F) as u8;
        let b = (v & 0x1F) as u8;
        Self {
            r: (r << 3) | (r >> 2),
            g: (g << 2) | (g >> 4),
            b: (b << 3) | (b >> 2),
            a: 255,
        }
    }

    pub fn to_rgb565(self) -> u16 {
        (u16::from(self.r >> 3) << 11) | (u16::from(self.g >> 2) << 5) | u16::from(self.b >> 3)
    }

    /// Channels as floats in `0..=255`.
    pub fn to_array(self) -> [f32; 4] {
        [
            f32::from(self.r),
            f32::from(self.g),
            f32::from(self.b),
            f32::from(self.a),
        ]
    }

    /// Inverse of [`Color::to_array`], rounding and clamping each channel.
    pub fn from_array(channels: [f32; 4]) -> Self {
        let c = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        Self::rgba(c(channels[0]), c(channels[1]), c(channels[2]), c(channels[3]))
    }
}

impl Primitive for Color {
    type Encoding = ColorEncoding;

    fn size(encoding: ColorEncoding) -> usize {
        match encoding {
            ColorEncoding::Rgba8 | ColorEncoding::Argb8_32 | ColorEncoding::Argb8_16 => 4,
            ColorEncoding::Argb4 | ColorEncoding::Rgb565 => 2,
        }
    }

    fn read(reader: &ByteReader<'_>, offset: &mut usize, encoding: ColorEncoding) -> Result<Self> {
        let at = *offset;
        let color = match encoding {
            ColorEncoding::Rgba8 => {
                let b = reader.bytes(at, 4)?;
                Color::rgba(b[0], b[1], b[2], b[3])
            }
            ColorEncoding::Argb8_32 => Color::from_argb(reader.u32(at)?),
            ColorEncoding::Argb8_16 => {
                let gb = reader.u16(at)?;
                let ar = reader.u16(at + 2)?;
                Color::from_argb((u32::from(ar) << 16) | u32::from(gb))
            }
            ColorEncoding::Argb4 => Color::from_argb4(reader.u16(at)?),
            ColorEncoding::Rgb565 => Color::from_rgb565(reader.u16(at)?),
        };
        *offset += Self::size(encoding);
        Ok(color)
    }

    fn write(&self, writer: &mut ByteWriter, encoding: ColorEncoding) {
        match encoding {
            ColorEncoding::Rgba8 => writer.write_bytes(&[self.r, self.g, self.b, self.a]),
            ColorEncoding::Argb8_32 => writer.write_u32(self.to_argb()),
            ColorEncoding::Argb8_16 => {
                let argb = self.to_argb();
                writer.write_u16(argb as u16);
                writer.write_u16((argb >> 16) as u16);
            }
            ColorEncoding::Argb4 => writer.write_u16(self.to_argb4()),
            ColorEncoding::Rgb565 => writer.write_u16(self.to_rgb565()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    #[test]
    fn test_rgb565_expansion() {
        assert_eq!(Color::from_rgb565(0xFFFF), Color::rgba(255, 255, 255, 255));
        assert_eq!(Color::from_rgb565(0xF800), Color::rgba(255, 0, 0, 255));
        // 0b10000 expands to 0b10000100, not 0b10000000.
        assert_eq!(Color::from_rgb565(0x8000).r, 0x84);
        assert_eq!(Color::from_rgb565(0x07E0).g, 255);
    }

    #[test]
    fn test_argb4_expansion() {
        let c = Color::from_argb4(0xF84A);
        assert_eq!(c, Color::rgba(0x88, 0x44, 0xAA, 0xFF));
        assert_eq!(c.to_argb4(), 0xF84A);
    }

    #[test]
    fn test_argb8_byte_orders() {
        let color = Color::rgba(0x11, 0x22, 0x33, 0x44);

        let mut le = Codec::little_endian().writer();
        color.write(&mut le, ColorEncoding::Argb8_32);
        color.write(&mut le, ColorEncoding::Argb8_16);
        assert_eq!(le.as_bytes(), &[0x33, 0x22, 0x11, 0x44, 0x33, 0x22, 0x11, 0x44]);

        let mut be = Codec::big_endian().writer();
        color.write(&mut be, ColorEncoding::Argb8_32);
        color.write(&mut be, ColorEncoding::Argb8_16);
        assert_eq!(be.as_bytes(), &[0x44, 0x11, 0x22, 0x33, 0x22, 0x33, 0x44, 0x11]);

        let bytes = be.into_bytes();
        let reader = Codec::big_endian().reader(&bytes);
        let mut offset = 0;
        assert_eq!(Color::read(&reader, &mut offset, ColorEncoding::Argb8_32).unwrap(), color);
        assert_eq!(Color::read(&reader, &mut offset, ColorEncoding::Argb8_16).unwrap(), color);
        assert_eq!(offset, 8);
    }
}
