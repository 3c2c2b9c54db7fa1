//! Renderer-neutral intermediate mesh
//!
//! Every attach format converts to a list of [`MeshChunk`]s: one material,
//! a list of unique corners, and index lists into those corners. Corners are
//! deduplicated by the source index tuple they came from, so two polygons
//! sharing a vertex/normal/colour/uv combination share one corner.

use std::collections::HashMap;
use std::hash::Hash;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::primitives::Color;

/// One resolved polygon corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Corner {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub color: Option<Color>,
    pub uv: Option<Vec2>,
}

/// Source index tuple of a corner, used as its identity during dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Loop {
    pub position: u32,
    pub normal: Option<u32>,
    pub color: Option<u32>,
    pub uv: Option<u32>,
}

/// Surface properties common to every attach format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshMaterial {
    pub diffuse: Color,
    pub ambient: Option<Color>,
    pub specular: Option<Color>,
    pub exponent: f32,
    pub texture_id: Option<u32>,
    /// Texture tiling mode word, as the source format stores it.
    pub tile_mode: Option<u16>,
    /// Source and destination alpha blend factors.
    pub blend: Option<(u8, u8)>,
    /// Texture coordinate generation word.
    pub tex_gen: Option<u32>,
    pub use_alpha: bool,
    pub double_sided: bool,
    pub ignore_lighting: bool,
}

impl Default for MeshMaterial {
    fn default() -> Self {
        Self {
            diffuse: Color::WHITE,
            ambient: None,
            specular: None,
            exponent: 0.0,
            texture_id: None,
            tile_mode: None,
            blend: None,
            tex_gen: None,
            use_alpha: false,
            double_sided: false,
            ignore_lighting: false,
        }
    }
}

/// A triangle strip over corner indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strip {
    pub indices: Vec<u32>,
    /// Winding of the first triangle is clockwise.
    pub reversed: bool,
}

impl Strip {
    /// Expands the strip to a triangle list, alternating winding and
    /// dropping degenerate triangles.
    pub fn to_triangles(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.indices.len().saturating_sub(2) * 3);
        let mut flip = self.reversed;
        for w in self.indices.windows(3) {
            if w[0] != w[1] && w[1] != w[2] && w[0] != w[2] {
                if flip {
                    out.extend_from_slice(&[w[1], w[0], w[2]]);
                } else {
                    out.extend_from_slice(&[w[0], w[1], w[2]]);
                }
            }
            flip = !flip;
        }
        out
    }
}

/// A drawable unit: one material and its geometry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshChunk {
    pub material: MeshMaterial,
    pub corners: Vec<Corner>,
    /// Independent triangles, three corner indices each.
    pub triangles: Vec<u32>,
    pub strips: Vec<Strip>,
}

impl MeshChunk {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty() && self.strips.is_empty()
    }

    /// All geometry as one triangle list.
    pub fn triangle_list(&self) -> Vec<u32> {
        let mut out = self.triangles.clone();
        for strip in &self.strips {
            out.extend(strip.to_triangles());
        }
        out
    }
}

/// Builds a [`MeshChunk`], deduplicating corners by key.
///
/// The key type is chosen by the attach format: GC and Basic use [`Loop`];
/// Chunk strips key on the cache index plus the inline per-corner values.
pub(crate) struct MeshBuilder<K> {
    chunk: MeshChunk,
    lookup: HashMap<K, u32>,
}

impl<K: Eq + Hash> MeshBuilder<K> {
    pub fn new(material: MeshMaterial) -> Self {
        Self {
            chunk: MeshChunk {
                material,
                ..MeshChunk::default()
            },
            lookup: HashMap::new(),
        }
    }

    /// Returns the corner index for `key`, resolving the corner only the
    /// first time the key is seen.
    pub fn corner(&mut self, key: K, resolve: impl FnOnce() -> Result<Corner>) -> Result<u32> {
        if let Some(&index) = self.lookup.get(&key) {
            return Ok(index);
        }
        let index = self.chunk.corners.len() as u32;
        self.chunk.corners.push(resolve()?);
        self.lookup.insert(key, index);
        Ok(index)
    }

    pub fn triangle(&mut self, a: u32, b: u32, c: u32) {
        self.chunk.triangles.extend_from_slice(&[a, b, c]);
    }

    /// Triangulates a convex polygon as a fan around its first corner.
    pub fn fan(&mut self, corners: &[u32]) {
        for pair in corners.windows(2).skip(1) {
            self.triangle(corners[0], pair[0], pair[1]);
        }
    }

    pub fn strip(&mut self, indices: Vec<u32>, reversed: bool) {
        self.chunk.strips.push(Strip { indices, reversed });
    }

    pub fn finish(self) -> MeshChunk {
        self.chunk
    }
}
