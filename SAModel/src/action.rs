//! Model + motion pairs (NJS_ACTION)
//!
//! An action is an 8-byte record pointing at an object tree and a motion
//! that animates it. Motion part `i` drives node `i` of the tree's
//! pre-order walk.

use serde::{Deserialize, Serialize};

use crate::attach::{AttachFormat, label_for};
use crate::codec::{ByteReader, ByteWriter, Codec, LabelMap};
use crate::error::{Error, Result};
use crate::motion::{Frame, Motion, MotionOptions};
use crate::object::{Hierarchy, HierarchyLayout, Node};

/// Size of an action record.
pub const ACTION_SIZE: usize = 0x08;

/// A hierarchy bundled with the motion that animates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub hierarchy: Hierarchy,
    pub motion: Motion,
}

impl Action {
    /// Bundles a hierarchy and a motion, rejecting a motion that addresses
    /// more parts than the hierarchy has nodes.
    pub fn new(name: impl Into<String>, hierarchy: Hierarchy, motion: Motion) -> Result<Self> {
        check_compatible(&hierarchy, &motion)?;
        Ok(Self {
            name: name.into(),
            hierarchy,
            motion,
        })
    }

    /// Decodes the action record at `address`.
    ///
    /// The tree is read without a wrapper root so that node indices line up
    /// with the motion's part indices; the motion gets one part per node.
    pub fn decode(
        reader: &ByteReader<'_>,
        address: u32,
        format: AttachFormat,
        options: MotionOptions,
        labels: &LabelMap,
    ) -> Result<Self> {
        let at = address as usize;
        let object = reader.ptr(at)?.ok_or(Error::NullReference { what: "action object", address })?;
        let motion = reader.ptr(at + 4)?.ok_or(Error::NullReference { what: "action motion", address })?;

        let hierarchy = Hierarchy::decode_root(reader, object, format, labels)?;
        let motion = Motion::decode(reader, motion, hierarchy.count_nodes(), options, labels)?;
        Self::new(label_for(reader, labels, address, "action"), hierarchy, motion)
    }

    pub fn from_bytes(
        bytes: &[u8],
        address: u32,
        codec: Codec,
        format: AttachFormat,
        options: MotionOptions,
    ) -> Result<Self> {
        Self::decode(&codec.reader(bytes), address, format, options, &LabelMap::new())
    }

    /// Writes the hierarchy, then the motion, then the record, returning
    /// the record's address.
    pub fn encode(&self, writer: &mut ByteWriter, layout: HierarchyLayout) -> Result<u32> {
        check_compatible(&self.hierarchy, &self.motion)?;
        let object = self.hierarchy.encode(writer, layout)?;
        let motion = self.motion.encode(writer)?;
        writer.align(4);
        let address = writer.address();
        writer.add_label(self.name.clone(), address);
        writer.write_ptr(Some(object));
        writer.write_ptr(Some(motion));
        Ok(address)
    }

    pub fn to_bytes(&self, codec: Codec, layout: HierarchyLayout) -> Result<(Vec<u8>, u32, LabelMap)> {
        let mut writer = codec.writer();
        writer.write_u32(0);
        let address = self.encode(&mut writer, layout)?;
        let (bytes, labels) = writer.finish();
        Ok((bytes, address, labels))
    }

    /// Each node in walk order paired with its sampled motion values.
    pub fn pose_at(&self, frame: f32) -> Vec<(&Node, Option<Frame>)> {
        self.hierarchy
            .nodes()
            .into_iter()
            .enumerate()
            .map(|(i, node)| (node, self.motion.value_at(i, frame)))
            .collect()
    }
}

fn check_compatible(hierarchy: &Hierarchy, motion: &Motion) -> Result<()> {
    let node_count = hierarchy.count_nodes();
    if motion.model_parts > node_count {
        return Err(Error::IncompatibleMotion {
            motion_parts: motion.model_parts,
            node_count,
        });
    }
    Ok(())
}
