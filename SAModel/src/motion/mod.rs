//! Keyframe motions (NJS_MOTION)
//!
//! A motion header points at an `mdata` table holding, per model part, one
//! key-table pointer and one key count for every channel in the motion's
//! channel mask. Parts are addressed by their index in the pre-order node
//! walk of the hierarchy the motion drives.
//!
//! Vertex and normal channels key whole arrays. The array length is never
//! stored; it is recovered from the gaps between the arrays, which the
//! encoder always writes back to back right before their key table.

mod keyframes;

pub use keyframes::{AnimFlags, Channel, Frame, Keyframes, Lerp, Spotlight, sample};

use std::collections::{BTreeMap, HashMap};

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::attach::label_for;
use crate::codec::{ByteReader, ByteWriter, Codec, LabelMap};
use crate::error::{Error, Result};
use crate::primitives::{Color, ColorEncoding, Primitive, Rotation, Vec2Encoding, Vec3Encoding, bams_to_deg, deg_to_bams};

/// Size of a motion header.
pub const MOTION_SIZE: usize = 0x0C;

/// Decode-time knobs that the binary does not record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotionOptions {
    /// Rotation keys use a `u16` frame and 16-bit BAMS angles.
    pub short_rot: bool,
}

/// Interpolation hint stored in the high bits of `inp_fn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationMode {
    #[default]
    Linear,
    Spline,
    User,
}

impl InterpolationMode {
    fn from_inp_fn(inp_fn: u16) -> Self {
        match inp_fn & 0xC0 {
            0x40 => InterpolationMode::Spline,
            0x80 => InterpolationMode::User,
            _ => InterpolationMode::Linear,
        }
    }

    fn bits(self) -> u16 {
        match self {
            InterpolationMode::Linear => 0,
            InterpolationMode::Spline => 0x40,
            InterpolationMode::User => 0x80,
        }
    }
}

/// A keyframe animation over the parts of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub name: String,
    pub frame_count: u32,
    pub interpolation: InterpolationMode,
    /// Number of parts the `mdata` table has rows for.
    pub model_parts: usize,
    /// Keyframes by part index. Parts without keys are absent.
    pub models: BTreeMap<usize, Keyframes>,
    pub short_rot: bool,
}

impl Motion {
    pub fn new(name: impl Into<String>, model_parts: usize) -> Self {
        Self {
            name: name.into(),
            frame_count: 0,
            interpolation: InterpolationMode::Linear,
            model_parts,
            models: BTreeMap::new(),
            short_rot: false,
        }
    }

    /// Union of the channels used by any part.
    pub fn flags(&self) -> AnimFlags {
        self.models.values().fold(AnimFlags::empty(), |acc, k| acc | k.flags())
    }

    /// Samples part `part` at `frame`, or `None` if the part has no keys.
    pub fn value_at(&self, part: usize, frame: f32) -> Option<Frame> {
        self.models.get(&part).map(|k| k.value_at(frame))
    }

    /// Sets `frame_count` to one past the last keyed frame.
    pub fn update_frame_count(&mut self) {
        self.frame_count = self
            .models
            .values()
            .filter_map(Keyframes::last_frame)
            .max()
            .map_or(0, |f| f + 1);
    }

    /// Decodes the motion header at `address`.
    pub fn decode(
        reader: &ByteReader<'_>,
        address: u32,
        model_parts: usize,
        options: MotionOptions,
        labels: &LabelMap,
    ) -> Result<Self> {
        let at = address as usize;
        let mdata = reader.ptr(at)?;
        let frame_count = reader.u32(at + 4)?;
        let raw_mask = reader.u16(at + 8)?;
        let mask = AnimFlags::from_bits(raw_mask)
            .ok_or_else(|| Error::invalid_motion(address, format!("unknown channel bits 0x{raw_mask:04X}")))?;
        let inp_fn = reader.u16(at + 10)?;
        let channels = usize::from(inp_fn & 0xF);
        if channels != mask.bits().count_ones() as usize {
            return Err(Error::invalid_motion(
                address,
                format!("channel count {channels} does not match mask 0x{raw_mask:04X}"),
            ));
        }

        let mut models = BTreeMap::new();
        if let Some(mdata) = mdata {
            let stride = channels * 8;
            for part in 0..model_parts {
                let row = mdata as usize + part * stride;
                let mut keys = Keyframes::new();
                for (slot, channel) in Channel::in_mask(mask).enumerate() {
                    let table = reader.ptr(row + slot * 4)?;
                    let count = reader.u32(row + (channels + slot) * 4)? as usize;
                    if let Some(table) = table
                        && count > 0
                    {
                        read_channel(reader, &mut keys, channel, table, count, options)?;
                    }
                }
                if !keys.is_empty() {
                    models.insert(part, keys);
                }
            }
        }

        let name = label_for(reader, labels, address, "motion");
        tracing::debug!(
            "Decoded motion {name}: {frame_count} frames, {} of {model_parts} parts keyed, channels {mask:?}",
            models.len()
        );
        Ok(Self {
            name,
            frame_count,
            interpolation: InterpolationMode::from_inp_fn(inp_fn),
            model_parts,
            models,
            short_rot: options.short_rot,
        })
    }

    /// Writes key tables, the `mdata` table and the header, returning the
    /// header address.
    pub fn encode(&self, writer: &mut ByteWriter) -> Result<u32> {
        if let Some((&part, _)) = self.models.iter().next_back()
            && part >= self.model_parts
        {
            return Err(Error::Encode(format!(
                "motion {} keys part {part} but declares {} parts",
                self.name, self.model_parts
            )));
        }
        let mask = self.flags();
        let channels: Vec<Channel> = Channel::in_mask(mask).collect();

        let mut rows = Vec::with_capacity(self.model_parts);
        for part in 0..self.model_parts {
            let row = match self.models.get(&part) {
                Some(keys) => channels
                    .iter()
                    .map(|&c| self.write_channel(writer, keys, c, part))
                    .collect::<Result<Vec<_>>>()?,
                None => vec![(None, 0); channels.len()],
            };
            rows.push(row);
        }

        writer.align(4);
        let mdata = (self.model_parts > 0).then(|| writer.address());
        if let Some(mdata) = mdata {
            writer.add_label(format!("{}_mdata", self.name), mdata);
        }
        for row in &rows {
            for &(table, _) in row {
                writer.write_ptr(table);
            }
            for &(_, count) in row {
                writer.write_u32(count);
            }
        }

        let address = writer.address();
        writer.add_label(self.name.clone(), address);
        writer.write_ptr(mdata);
        writer.write_u32(self.frame_count);
        writer.write_u16(mask.bits());
        writer.write_u16(channels.len() as u16 | self.interpolation.bits());
        Ok(address)
    }

    /// Encodes into a standalone buffer whose first word is left null.
    pub fn to_bytes(&self, codec: Codec) -> Result<(Vec<u8>, u32, LabelMap)> {
        let mut writer = codec.writer();
        writer.write_u32(0);
        let address = self.encode(&mut writer)?;
        let (bytes, labels) = writer.finish();
        Ok((bytes, address, labels))
    }

    /// Writes one key table, returning its address and key count.
    fn write_channel(
        &self,
        writer: &mut ByteWriter,
        keys: &Keyframes,
        channel: Channel,
        part: usize,
    ) -> Result<(Option<u32>, u32)> {
        let count = keys.key_count(channel);
        if count == 0 {
            return Ok((None, 0));
        }
        let label = format!("{}_{part}_{}", self.name, channel_label(channel));
        writer.align(4);

        let arrays = match channel {
            Channel::Vertex => Some(&keys.vertex),
            Channel::Normal => Some(&keys.normal),
            _ => None,
        };
        let mut array_addresses = Vec::new();
        if let Some(arrays) = arrays {
            for (&frame, array) in arrays {
                if array.is_empty() {
                    return Err(Error::Encode(format!("{label} has an empty array at frame {frame}")));
                }
                let address = writer.address();
                writer.add_label(format!("{label}_{frame}"), address);
                for v in array {
                    v.write(writer, Vec3Encoding::Float);
                }
                array_addresses.push(address);
            }
        }

        let table = writer.address();
        writer.add_label(label.clone(), table);
        let vec3_keys = |writer: &mut ByteWriter, map: &BTreeMap<u32, Vec3>| {
            for (&frame, v) in map {
                writer.write_u32(frame);
                v.write(writer, Vec3Encoding::Float);
            }
        };
        let scalar_keys = |writer: &mut ByteWriter, map: &BTreeMap<u32, f32>, bams: bool| {
            for (&frame, &v) in map {
                writer.write_u32(frame);
                if bams {
                    writer.write_i32(deg_to_bams(v));
                } else {
                    writer.write_f32(v);
                }
            }
        };
        match channel {
            Channel::Position => vec3_keys(writer, &keys.position),
            Channel::Scale => vec3_keys(writer, &keys.scale),
            Channel::Vector => vec3_keys(writer, &keys.vector),
            Channel::Target => vec3_keys(writer, &keys.target),
            Channel::Rotation => {
                for (&frame, r) in &keys.rotation {
                    if self.short_rot {
                        let frame = u16::try_from(frame)
                            .map_err(|_| Error::Encode(format!("{label}: frame {frame} exceeds a short rotation key")))?;
                        writer.write_u16(frame);
                        r.write(writer, Vec3Encoding::Bams16);
                    } else {
                        writer.write_u32(frame);
                        r.write(writer, Vec3Encoding::Bams32);
                    }
                }
            }
            Channel::Vertex | Channel::Normal => {
                let frames = arrays.into_iter().flat_map(|a| a.keys());
                for (&frame, &address) in frames.zip(&array_addresses) {
                    writer.write_u32(frame);
                    writer.write_ptr(Some(address));
                }
            }
            Channel::Roll => scalar_keys(writer, &keys.roll, true),
            Channel::Angle => scalar_keys(writer, &keys.angle, true),
            Channel::Intensity => scalar_keys(writer, &keys.intensity, false),
            Channel::Color => {
                for (&frame, c) in &keys.color {
                    writer.write_u32(frame);
                    c.write(writer, ColorEncoding::Argb8_32);
                }
            }
            Channel::Spot => {
                for (&frame, s) in &keys.spot {
                    writer.write_u32(frame);
                    writer.write_f32(s.near);
                    writer.write_f32(s.far);
                    writer.write_i32(deg_to_bams(s.inner_angle));
                    writer.write_i32(deg_to_bams(s.outer_angle));
                }
            }
            Channel::Point => {
                for (&frame, p) in &keys.point {
                    writer.write_u32(frame);
                    p.write(writer, Vec2Encoding::Float);
                }
            }
        }
        Ok((Some(table), count as u32))
    }
}

fn channel_label(channel: Channel) -> &'static str {
    match channel {
        Channel::Position => "pos",
        Channel::Rotation => "rot",
        Channel::Scale => "scl",
        Channel::Vector => "vec",
        Channel::Vertex => "vert",
        Channel::Normal => "norm",
        Channel::Target => "target",
        Channel::Roll => "roll",
        Channel::Angle => "angle",
        Channel::Color => "color",
        Channel::Intensity => "intensity",
        Channel::Spot => "spot",
        Channel::Point => "point",
    }
}

/// Reads `count` fixed-size key records starting at `table`.
fn read_keys<T>(
    table: u32,
    count: usize,
    size: usize,
    mut read: impl FnMut(usize) -> Result<(u32, T)>,
) -> Result<BTreeMap<u32, T>> {
    (0..count).map(|i| read(table as usize + i * size)).collect()
}

fn read_channel(
    reader: &ByteReader<'_>,
    keys: &mut Keyframes,
    channel: Channel,
    table: u32,
    count: usize,
    options: MotionOptions,
) -> Result<()> {
    tracing::trace!("Reading {count} {channel:?} keys at 0x{table:08X}");
    let vec3 = |o: usize| -> Result<(u32, Vec3)> { Ok((reader.u32(o)?, Vec3::read_at(reader, o + 4, Vec3Encoding::Float)?)) };
    let bams = |o: usize| -> Result<(u32, f32)> { Ok((reader.u32(o)?, bams_to_deg(reader.i32(o + 4)?))) };
    match channel {
        Channel::Position => keys.position = read_keys(table, count, 16, vec3)?,
        Channel::Scale => keys.scale = read_keys(table, count, 16, vec3)?,
        Channel::Vector => keys.vector = read_keys(table, count, 16, vec3)?,
        Channel::Target => keys.target = read_keys(table, count, 16, vec3)?,
        Channel::Rotation if options.short_rot => {
            keys.rotation = read_keys(table, count, 8, |o| {
                Ok((u32::from(reader.u16(o)?), Rotation::read_at(reader, o + 2, Vec3Encoding::Bams16)?))
            })?;
        }
        Channel::Rotation => {
            keys.rotation = read_keys(table, count, 16, |o| {
                Ok((reader.u32(o)?, Rotation::read_at(reader, o + 4, Vec3Encoding::Bams32)?))
            })?;
        }
        Channel::Vertex => keys.vertex = read_array_keys(reader, table, count)?,
        Channel::Normal => keys.normal = read_array_keys(reader, table, count)?,
        Channel::Roll => keys.roll = read_keys(table, count, 8, bams)?,
        Channel::Angle => keys.angle = read_keys(table, count, 8, bams)?,
        Channel::Intensity => keys.intensity = read_keys(table, count, 8, |o| Ok((reader.u32(o)?, reader.f32(o + 4)?)))?,
        Channel::Color => {
            keys.color = read_keys(table, count, 8, |o| {
                Ok((reader.u32(o)?, Color::read_at(reader, o + 4, ColorEncoding::Argb8_32)?))
            })?;
        }
        Channel::Spot => {
            keys.spot = read_keys(table, count, 20, |o| {
                let spot = Spotlight {
                    near: reader.f32(o + 4)?,
                    far: reader.f32(o + 8)?,
                    inner_angle: bams_to_deg(reader.i32(o + 12)?),
                    outer_angle: bams_to_deg(reader.i32(o + 16)?),
                };
                Ok((reader.u32(o)?, spot))
            })?;
        }
        Channel::Point => {
            keys.point = read_keys(table, count, 12, |o| {
                Ok((reader.u32(o)?, Vec2::read_at(reader, o + 4, Vec2Encoding::Float)?))
            })?;
        }
    }
    Ok(())
}

/// Reads `(frame, pointer)` keys and the `Vec3` arrays they point at.
///
/// Distinct array addresses are sorted high to low. Each array ends where
/// the next higher one starts; the highest ends at the key table when the
/// table follows it, and otherwise shares the length of its lower
/// neighbour. A lone array past its table is measured against the file
/// size.
fn read_array_keys(reader: &ByteReader<'_>, table: u32, count: usize) -> Result<BTreeMap<u32, Vec<Vec3>>> {
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let o = table as usize + i * 8;
        let frame = reader.u32(o)?;
        let ptr = reader.ptr(o + 4)?.ok_or(Error::NullReference {
            what: "vertex array",
            address: o as u32,
        })?;
        entries.push((frame, ptr));
    }

    let mut starts: Vec<u32> = entries.iter().map(|&(_, p)| p).collect();
    starts.sort_unstable_by(|a, b| b.cmp(a));
    starts.dedup();

    let mut lengths: HashMap<u32, usize> = HashMap::new();
    for (i, &start) in starts.iter().enumerate() {
        let higher = i.checked_sub(1).map(|p| starts[p]);
        let after_table = (table > start).then_some(table);
        let end = match (higher, after_table) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if let Some(end) = end {
            lengths.insert(start, (end - start) as usize / 12);
        }
    }
    if let Some(&highest) = starts.first()
        && !lengths.contains_key(&highest)
    {
        // A lone trailing array runs to the end of the file.
        let len = match starts.get(1).and_then(|s| lengths.get(s)) {
            Some(&borrowed) => borrowed,
            None => reader.len().saturating_sub(highest as usize) / 12,
        };
        lengths.insert(highest, len);
    }

    let mut keys = BTreeMap::new();
    for (frame, ptr) in entries {
        let len = lengths.get(&ptr).copied().unwrap_or_default();
        if len == 0 {
            return Err(Error::invalid_motion(table, format!("vertex array at 0x{ptr:08X} is empty")));
        }
        let array = (0..len)
            .map(|i| Vec3::read_at(reader, ptr as usize + i * 12, Vec3Encoding::Float))
            .collect::<Result<Vec<_>>>()?;
        keys.insert(frame, array);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn walk_cycle() -> Motion {
        let mut root = Keyframes::new();
        root.position.insert(0, Vec3::ZERO);
        root.position.insert(30, Vec3::new(0.0, 5.0, 0.0));
        root.rotation.insert(0, Rotation::new(0, 0x4000, 0));
        let mut arm = Keyframes::new();
        arm.vertex.insert(0, vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
        arm.vertex.insert(15, vec![Vec3::ONE, Vec3::X, Vec3::Z]);
        arm.color.insert(0, Color::rgba(255, 0, 0, 255));

        let mut motion = Motion::new("walk", 3);
        motion.models.insert(0, root);
        motion.models.insert(2, arm);
        motion.update_frame_count();
        motion
    }

    #[test]
    fn test_round_trip() {
        let motion = walk_cycle();
        assert_eq!(motion.frame_count, 31);
        for codec in [Codec::little_endian(), Codec::big_endian()] {
            let (bytes, address, labels) = motion.to_bytes(codec).unwrap();
            let decoded =
                Motion::decode(&codec.reader(&bytes), address, 3, MotionOptions::default(), &labels).unwrap();
            assert_eq!(decoded, motion);
        }
    }

    #[test]
    fn test_short_rotation_keys() {
        let mut motion = walk_cycle();
        motion.short_rot = true;
        let options = MotionOptions { short_rot: true };
        let (bytes, address, labels) = motion.to_bytes(Codec::default()).unwrap();
        let decoded = Motion::decode(&Codec::default().reader(&bytes), address, 3, options, &labels).unwrap();
        assert_eq!(decoded.models[&0].rotation, motion.models[&0].rotation);

        motion.models.get_mut(&0).unwrap().rotation.insert(70_000, Rotation::ZERO);
        assert!(matches!(motion.to_bytes(Codec::default()), Err(Error::Encode(_))));
    }

    #[test]
    fn test_header_fields() {
        let mut motion = walk_cycle();
        motion.interpolation = InterpolationMode::Spline;
        let (bytes, address, _) = motion.to_bytes(Codec::default()).unwrap();
        let reader = Codec::default().reader(&bytes);
        let mask = AnimFlags::POSITION | AnimFlags::ROTATION | AnimFlags::VERTEX | AnimFlags::COLOR;
        assert_eq!(reader.u16(address as usize + 8).unwrap(), mask.bits());
        assert_eq!(reader.u16(address as usize + 10).unwrap(), 4 | 0x40);
    }

    #[test]
    fn test_empty_vertex_array_rejected() {
        let mut motion = Motion::new("bad", 1);
        let mut keys = Keyframes::new();
        keys.normal.insert(0, Vec::new());
        motion.models.insert(0, keys);
        assert!(matches!(motion.to_bytes(Codec::default()), Err(Error::Encode(_))));
    }

    #[test]
    fn test_part_beyond_declared_count_rejected() {
        let mut motion = walk_cycle();
        motion.model_parts = 2;
        assert!(matches!(motion.to_bytes(Codec::default()), Err(Error::Encode(_))));
    }

    #[test]
    fn test_mask_count_mismatch() {
        let mut w = Codec::default().writer();
        w.write_u32(0);
        let address = w.address();
        w.write_ptr(None);
        w.write_u32(10);
        w.write_u16(AnimFlags::POSITION.bits());
        w.write_u16(2);
        let bytes = w.into_bytes();
        let err = Motion::decode(&Codec::default().reader(&bytes), address, 1, MotionOptions::default(), &LabelMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMotion { .. }));
    }

    #[test]
    fn test_lone_array_after_table_runs_to_file_end() {
        let mut w = Codec::default().writer();
        w.write_u32(0);
        let header = w.address();
        let mdata = header + 0x0C;
        let table = mdata + 8;
        let array = table + 8;
        w.write_ptr(Some(mdata));
        w.write_u32(1);
        w.write_u16(AnimFlags::VERTEX.bits());
        w.write_u16(1);
        w.write_ptr(Some(table));
        w.write_u32(1);
        w.write_u32(0);
        w.write_ptr(Some(array));
        for v in [Vec3::X, Vec3::Y] {
            v.write(&mut w, Vec3Encoding::Float);
        }
        let bytes = w.into_bytes();

        let reader = Codec::default().reader(&bytes);
        let motion = Motion::decode(&reader, header, 1, MotionOptions::default(), &LabelMap::new()).unwrap();
        assert_eq!(motion.models[&0].vertex[&0], vec![Vec3::X, Vec3::Y]);

        // Nothing left after the array start: still rejected as empty.
        let err = read_array_keys(&Codec::default().reader(&bytes[..array as usize]), table, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidMotion { .. }));
    }

    #[test]
    fn test_array_before_foreign_table() {
        // Table first, then two arrays of two vertices each.
        let mut w = Codec::default().writer();
        w.write_u32(0);
        let table = w.address();
        let arrays = table + 16;
        w.write_u32(0);
        w.write_ptr(Some(arrays));
        w.write_u32(5);
        w.write_ptr(Some(arrays + 24));
        for v in [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z] {
            v.write(&mut w, Vec3Encoding::Float);
        }
        let bytes = w.into_bytes();
        let keys = read_array_keys(&Codec::default().reader(&bytes), table, 2).unwrap();
        assert_eq!(keys[&0], vec![Vec3::ZERO, Vec3::X]);
        assert_eq!(keys[&5], vec![Vec3::Y, Vec3::Z]);
    }
}
