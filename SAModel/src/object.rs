//! Scene hierarchy (NJS_OBJECT trees)
//!
//! Objects are 0x34-byte records linked by child and sibling pointers:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0x00 | flags |
//! | 0x04 | attach pointer |
//! | 0x08 | position (3 x f32) |
//! | 0x14 | rotation (3 x i32 BAMS) |
//! | 0x20 | scale (3 x f32) |
//! | 0x2C | child pointer |
//! | 0x30 | sibling pointer |
//!
//! In memory a [`Node`] owns its children. The sibling chain of a node's
//! first child becomes the rest of its child list; only a root can keep
//! siblings of its own, and [`Hierarchy::decode`] wraps such a root in a
//! synthetic parent.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::attach::{Attach, AttachArena, AttachFormat, AttachId, ChunkCache, MeshChunk, label_for};
use crate::codec::{ByteReader, ByteWriter, Codec, LabelMap};
use crate::error::{Error, Result};
use crate::primitives::{Primitive, Rotation, Vec3Encoding};

/// Size of one object record.
pub const OBJECT_SIZE: usize = 0x34;

/// Name given to the synthetic parent of a root with siblings.
pub const WRAPPER_NAME: &str = "Root";

bitflags! {
    /// `NJS_OBJECT` evaluation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ObjectFlags: u32 {
        const NO_POSITION = 0x1;
        const NO_ROTATE = 0x2;
        const NO_SCALE = 0x4;
        /// Hidden.
        const NO_DISPLAY = 0x8;
        /// Children are not drawn.
        const NO_CHILDREN = 0x10;
        const ROTATE_ZYX = 0x20;
        /// Skipped by motions.
        const NO_ANIMATE = 0x40;
        /// Skipped by shape motions.
        const NO_MORPH = 0x80;
        const CLIP = 0x100;
        const MODIFIER = 0x200;
        const QUATERNION = 0x400;
        const ROTATE_BASE = 0x800;
        const ROTATE_SET = 0x1000;
        const ENVELOPE = 0x2000;

        const _ = !0;
    }
}

/// One scene node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub flags: ObjectFlags,
    pub position: Vec3,
    pub rotation: Rotation,
    pub scale: Vec3,
    pub attach: Option<AttachId>,
    pub children: Vec<Node>,
    /// Sibling chain of a root object. Always empty below the root.
    pub siblings: Vec<Node>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new("object")
    }
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: ObjectFlags::empty(),
            position: Vec3::ZERO,
            rotation: Rotation::ZERO,
            scale: Vec3::ONE,
            attach: None,
            children: Vec::new(),
            siblings: Vec::new(),
        }
    }

    /// Derives the transform-skip flags from the transform itself.
    pub fn update_transform_flags(&mut self) {
        self.flags.set(ObjectFlags::NO_POSITION, self.position == Vec3::ZERO);
        self.flags.set(ObjectFlags::NO_ROTATE, self.rotation.is_zero());
        self.flags.set(ObjectFlags::NO_SCALE, self.scale == Vec3::ONE);
    }

    pub fn hidden(&self) -> bool {
        self.flags.contains(ObjectFlags::NO_DISPLAY)
    }

    pub fn skip_animation(&self) -> bool {
        self.flags.contains(ObjectFlags::NO_ANIMATE)
    }

    pub fn skip_morph(&self) -> bool {
        self.flags.contains(ObjectFlags::NO_MORPH)
    }

    /// Pre-order walk: this node, its children, then its siblings.
    fn walk<'a>(&'a self, out: &mut Vec<&'a Node>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
        for sibling in &self.siblings {
            sibling.walk(out);
        }
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>() + self.siblings.iter().map(Node::count).sum::<usize>()
    }
}

/// Output shape of [`Hierarchy::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HierarchyLayout {
    /// Write the tree as held in memory, wrapper root included.
    #[default]
    Flat,
    /// Drop a synthetic wrapper root and write its children as a sibling
    /// chain, reproducing the legacy layout the data was read from.
    SiblingChain,
}

/// A node tree plus the attaches its nodes reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    pub root: Node,
    pub attaches: AttachArena,
    pub format: AttachFormat,
    /// `root` is a synthetic wrapper added during decode.
    pub wrapped: bool,
}

impl PartialEq for Hierarchy {
    /// Compares structure and resolved attaches, not arena handles.
    fn eq(&self, other: &Self) -> bool {
        fn attach<'h>(n: &Node, h: &'h Hierarchy) -> Option<&'h Attach> {
            n.attach.and_then(|id| h.attaches.get(id))
        }
        fn same(a: &Node, ah: &Hierarchy, b: &Node, bh: &Hierarchy) -> bool {
            a.name == b.name
                && a.flags == b.flags
                && a.position == b.position
                && a.rotation == b.rotation
                && a.scale == b.scale
                && attach(a, ah) == attach(b, bh)
                && a.children.len() == b.children.len()
                && a.siblings.len() == b.siblings.len()
                && a.children.iter().zip(&b.children).all(|(x, y)| same(x, ah, y, bh))
                && a.siblings.iter().zip(&b.siblings).all(|(x, y)| same(x, ah, y, bh))
        }
        self.format == other.format && self.wrapped == other.wrapped && same(&self.root, self, &other.root, other)
    }
}

impl Hierarchy {
    pub fn new(root: Node, attaches: AttachArena, format: AttachFormat) -> Self {
        Self {
            root,
            attaches,
            format,
            wrapped: false,
        }
    }

    /// Decodes the object tree at `address`.
    ///
    /// A root with a sibling chain is wrapped in a synthetic [`WRAPPER_NAME`]
    /// node whose only child is the original root; the original keeps its
    /// siblings and children unchanged.
    pub fn decode(reader: &ByteReader<'_>, address: u32, format: AttachFormat, labels: &LabelMap) -> Result<Self> {
        let mut hierarchy = Self::decode_root(reader, address, format, labels)?;
        if !hierarchy.root.siblings.is_empty() {
            tracing::debug!(
                "Root object at 0x{address:08X} has {} siblings; adding a wrapper root",
                hierarchy.root.siblings.len()
            );
            let original = std::mem::take(&mut hierarchy.root);
            hierarchy.root = Node {
                children: vec![original],
                ..Node::new(WRAPPER_NAME)
            };
            hierarchy.root.update_transform_flags();
            hierarchy.wrapped = true;
        }
        Ok(hierarchy)
    }

    /// Decodes the object tree at `address` without wrapping a root that
    /// has siblings.
    pub fn decode_root(reader: &ByteReader<'_>, address: u32, format: AttachFormat, labels: &LabelMap) -> Result<Self> {
        tracing::debug!("Decoding {format} object tree at 0x{address:08X}");
        let mut decoder = TreeDecoder {
            reader,
            format,
            labels,
            attaches: AttachArena::new(),
            path: HashSet::new(),
        };
        let mut root = decoder.node(address)?;
        let sibling = reader.ptr(address as usize + 0x30)?;
        root.siblings = match sibling {
            Some(s) => decoder.chain(s)?,
            None => Vec::new(),
        };
        tracing::debug!(
            "Decoded {} nodes and {} attaches",
            root.count(),
            decoder.attaches.len()
        );
        Ok(Self {
            root,
            attaches: decoder.attaches,
            format,
            wrapped: false,
        })
    }

    /// Convenience for self-contained data: decodes from bytes with `codec`.
    pub fn from_bytes(bytes: &[u8], address: u32, format: AttachFormat, codec: Codec) -> Result<Self> {
        Self::decode(&codec.reader(bytes), address, format, &LabelMap::new())
    }

    /// Writes the tree, returning the root object's address.
    ///
    /// Children and attaches are written before the objects that point at
    /// them. Attaches shared between nodes are written once.
    pub fn encode(&self, writer: &mut ByteWriter, layout: HierarchyLayout) -> Result<u32> {
        let mut encoder = TreeEncoder {
            hierarchy: self,
            written: HashMap::new(),
        };
        let chain: Vec<&Node> = if layout == HierarchyLayout::SiblingChain && self.wrapped {
            self.root.children.iter().collect()
        } else {
            vec![&self.root]
        };
        encoder.chain(writer, &chain)?.ok_or_else(|| Error::Encode("hierarchy has no root".into()))
    }

    /// Encodes into a fresh buffer. The first word is left null so that no
    /// structure sits at offset 0.
    pub fn to_bytes(&self, codec: Codec, layout: HierarchyLayout) -> Result<(Vec<u8>, u32, LabelMap)> {
        let mut writer = codec.writer();
        writer.write_u32(0);
        let address = self.encode(&mut writer, layout)?;
        let (bytes, labels) = writer.finish();
        Ok((bytes, address, labels))
    }

    /// Every node in deterministic pre-order: node, children, siblings.
    ///
    /// Motion channel indices follow this order.
    pub fn nodes(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.root.walk(&mut out);
        out
    }

    pub fn count_nodes(&self) -> usize {
        self.root.count()
    }

    pub fn node_at(&self, index: usize) -> Option<&Node> {
        self.nodes().into_iter().nth(index)
    }

    pub fn attach(&self, node: &Node) -> Option<&Attach> {
        node.attach.and_then(|id| self.attaches.get(id))
    }

    /// Converts every attach in walk order, sharing one chunk cache so
    /// chunk models can draw vertices loaded by earlier nodes.
    pub fn to_meshes(&self) -> Result<Vec<(usize, Vec<MeshChunk>)>> {
        let mut cache = ChunkCache::new();
        let mut out = Vec::new();
        for (index, node) in self.nodes().into_iter().enumerate() {
            if let Some(attach) = self.attach(node) {
                out.push((index, attach.to_mesh_with(&mut cache)?));
            }
        }
        Ok(out)
    }
}

struct TreeDecoder<'r, 'a> {
    reader: &'r ByteReader<'a>,
    format: AttachFormat,
    labels: &'r LabelMap,
    attaches: AttachArena,
    /// Objects on the current child path plus the sibling chain being read.
    path: HashSet<u32>,
}

impl TreeDecoder<'_, '_> {
    fn node(&mut self, address: u32) -> Result<Node> {
        if !self.path.insert(address) {
            return Err(Error::CyclicReference { address });
        }
        let reader = self.reader;
        let base = address as usize;
        reader.bytes(base, OBJECT_SIZE)?;

        let flags = reader.u32(base)?;
        if flags & !0x3FFF != 0 {
            tracing::warn!("Object at 0x{address:08X} has unknown flag bits 0x{:X}", flags & !0x3FFF);
        }
        let attach = match reader.ptr(base + 4)? {
            Some(a) => Some(self.attaches.decode_at(reader, a, self.format, self.labels)?),
            None => None,
        };
        let position = Vec3::read_at(reader, base + 8, Vec3Encoding::Float)?;
        let rotation = Rotation::read_at(reader, base + 0x14, Vec3Encoding::Bams32)?;
        let scale = Vec3::read_at(reader, base + 0x20, Vec3Encoding::Float)?;

        let children = match reader.ptr(base + 0x2C)? {
            Some(child) => self.chain(child)?,
            None => Vec::new(),
        };

        self.path.remove(&address);
        Ok(Node {
            name: label_for(reader, self.labels, address, "object"),
            flags: ObjectFlags::from_bits_retain(flags),
            position,
            rotation,
            scale,
            attach,
            children,
            siblings: Vec::new(),
        })
    }

    /// Reads a sibling chain starting at `first`.
    fn chain(&mut self, first: u32) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        let mut seen = Vec::new();
        let mut next = Some(first);
        while let Some(address) = next {
            if seen.contains(&address) || self.path.contains(&address) {
                return Err(Error::CyclicReference { address });
            }
            nodes.push(self.node(address)?);
            seen.push(address);
            next = self.reader.ptr(address as usize + 0x30)?;
        }
        Ok(nodes)
    }
}

struct TreeEncoder<'h> {
    hierarchy: &'h Hierarchy,
    written: HashMap<AttachId, u32>,
}

impl TreeEncoder<'_> {
    /// Writes a chain of siblings last-to-first so every sibling pointer is
    /// known when its object is written. Returns the first node's address.
    fn chain(&mut self, writer: &mut ByteWriter, nodes: &[&Node]) -> Result<Option<u32>> {
        let mut next = None;
        for node in nodes.iter().rev() {
            next = Some(self.node(writer, node, next)?);
        }
        Ok(next)
    }

    fn node(&mut self, writer: &mut ByteWriter, node: &Node, sibling: Option<u32>) -> Result<u32> {
        let children: Vec<&Node> = node.children.iter().collect();
        let child = self.chain(writer, &children)?;

        // A root's own siblings follow it in the chain.
        let sibling = if node.siblings.is_empty() {
            sibling
        } else {
            let siblings: Vec<&Node> = node.siblings.iter().collect();
            self.chain(writer, &siblings)?
        };

        let attach = match node.attach {
            Some(id) => Some(self.attach(writer, id)?),
            None => None,
        };

        writer.align(4);
        let address = writer.address();
        writer.write_u32(node.flags.bits());
        writer.write_ptr(attach);
        node.position.write(writer, Vec3Encoding::Float);
        node.rotation.write(writer, Vec3Encoding::Bams32);
        node.scale.write(writer, Vec3Encoding::Float);
        writer.write_ptr(child);
        writer.write_ptr(sibling);
        writer.add_label(node.name.clone(), address);
        Ok(address)
    }

    fn attach(&mut self, writer: &mut ByteWriter, id: AttachId) -> Result<u32> {
        if let Some(&address) = self.written.get(&id) {
            return Ok(address);
        }
        let attach = self
            .hierarchy
            .attaches
            .get(id)
            .ok_or_else(|| Error::Encode(format!("node references missing attach {}", id.0)))?;
        let address = attach.encode(writer)?;
        self.written.insert(id, address);
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, x: f32) -> Node {
        Node {
            position: Vec3::new(x, 0.0, 0.0),
            ..Node::new(name)
        }
    }

    fn tree() -> Hierarchy {
        let mut root = leaf("root", 0.0);
        let mut arm = leaf("arm", 1.0);
        arm.children.push(leaf("hand", 2.0));
        root.children.push(arm);
        root.children.push(leaf("leg", 3.0));
        root.rotation = Rotation::new(0x4000, 0, -0x100);
        root.flags = ObjectFlags::NO_SCALE | ObjectFlags::ROTATE_ZYX;
        Hierarchy::new(root, AttachArena::new(), AttachFormat::Chunk)
    }

    fn empty_chunk(name: &str) -> Attach {
        Attach::Chunk(crate::attach::chunk::ChunkAttach {
            name: name.into(),
            vertex_chunks: Vec::new(),
            poly_chunks: Vec::new(),
            bounds: crate::primitives::Bounds::default(),
        })
    }

    #[test]
    fn test_equality_compares_attaches_not_handles() {
        let build = |order: [&str; 2]| {
            let mut arena = AttachArena::new();
            let ids = order.map(|n| arena.insert(empty_chunk(n)));
            let by_name = |n: &str| ids[order.iter().position(|o| *o == n).unwrap_or_default()];
            let mut h = tree();
            h.root.attach = Some(by_name("body"));
            h.root.children[1].attach = Some(by_name("leg"));
            h.attaches = arena;
            h
        };
        let forward = build(["body", "leg"]);
        let backward = build(["leg", "body"]);
        assert_ne!(forward.root.attach, backward.root.attach);
        assert_eq!(forward, backward);

        let mut other = build(["body", "leg"]);
        other.root.children[1].attach = other.root.attach;
        assert_ne!(forward, other);
    }

    #[test]
    fn test_walk_is_pre_order() {
        let names: Vec<_> = tree().nodes().iter().map(|n| n.name.clone()).collect();
        assert_eq!(names, ["root", "arm", "hand", "leg"]);
        assert_eq!(tree().count_nodes(), 4);
        assert_eq!(tree().node_at(2).map(|n| n.name.as_str()), Some("hand"));
    }

    #[test]
    fn test_round_trip_keeps_names_and_order() {
        for codec in [Codec::little_endian(), Codec::big_endian()] {
            let (bytes, address, labels) = tree().to_bytes(codec, HierarchyLayout::Flat).unwrap();
            let decoded = Hierarchy::decode(&codec.reader(&bytes), address, AttachFormat::Chunk, &labels).unwrap();
            assert_eq!(decoded, tree());
        }
    }

    #[test]
    fn test_children_precede_parents() {
        let (_, address, labels) = tree().to_bytes(Codec::default(), HierarchyLayout::Flat).unwrap();
        let hand = labels.address_of("hand").unwrap();
        let arm = labels.address_of("arm").unwrap();
        assert!(hand < arm);
        assert_eq!(labels.address_of("root"), Some(address));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut w = Codec::default().writer();
        w.write_u32(0);
        let address = w.address();
        w.write_u32(0);
        w.write_ptr(None);
        w.write_bytes(&[0; 36]);
        w.write_ptr(Some(address)); // child points back at itself
        w.write_ptr(None);
        let bytes = w.into_bytes();
        let err = Hierarchy::decode(&Codec::default().reader(&bytes), address, AttachFormat::Basic, &LabelMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::CyclicReference { address: 4 }));
    }

    #[test]
    fn test_root_siblings_are_wrapped() {
        let mut root = leaf("first", 1.0);
        root.children.push(leaf("first_child", 1.5));
        root.siblings.push(leaf("second", 2.0));
        let h = Hierarchy::new(root, AttachArena::new(), AttachFormat::Basic);
        let (bytes, address, labels) = h.to_bytes(Codec::default(), HierarchyLayout::Flat).unwrap();

        let decoded = Hierarchy::decode(&Codec::default().reader(&bytes), address, AttachFormat::Basic, &labels).unwrap();
        assert!(decoded.wrapped);
        assert_eq!(decoded.root.name, WRAPPER_NAME);
        assert_eq!(decoded.root.children.len(), 1);
        let original = &decoded.root.children[0];
        assert_eq!(original.name, "first");
        assert_eq!(original.children[0].name, "first_child");
        assert_eq!(original.siblings[0].name, "second");

        let names: Vec<_> = decoded.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, [WRAPPER_NAME, "first", "first_child", "second"]);

        // Written back as a chain, the wrapper disappears again.
        let (bytes, address, labels) = decoded.to_bytes(Codec::default(), HierarchyLayout::SiblingChain).unwrap();
        let raw = Hierarchy::decode_root(&Codec::default().reader(&bytes), address, AttachFormat::Basic, &labels).unwrap();
        assert_eq!(raw.root, h.root);
    }
}
