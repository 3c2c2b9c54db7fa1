//! Fixed-size value types and their wire encodings
//!
//! The encoding of a value is chosen by the structure that contains it,
//! never by the value itself, so the same vector can travel through several
//! encodings (with the precision loss each implies).

pub mod bams;
mod color;
mod vector;

pub use bams::{bams_to_deg, deg_to_bams, deg_to_bams16};
pub use color::{Color, ColorEncoding};
pub use vector::{Bounds, Rotation, Vec2Encoding, Vec3Encoding};

use crate::codec::{ByteReader, ByteWriter};
use crate::error::Result;

/// A value with one or more fixed-width wire encodings.
pub trait Primitive: Sized {
    type Encoding: Copy;

    /// Byte width of `encoding`.
    fn size(encoding: Self::Encoding) -> usize;

    /// Reads a value at `*offset` and advances `offset` past it.
    fn read(reader: &ByteReader<'_>, offset: &mut usize, encoding: Self::Encoding) -> Result<Self>;

    /// Appends the value in `encoding`.
    fn write(&self, writer: &mut ByteWriter, encoding: Self::Encoding);

    /// Reads a value at a fixed offset.
    fn read_at(reader: &ByteReader<'_>, offset: usize, encoding: Self::Encoding) -> Result<Self> {
        let mut cursor = offset;
        Self::read(reader, &mut cursor, encoding)
    }
}
