//! Sparse keyframe channels and frame sampling

use std::collections::BTreeMap;
use std::ops::Bound;

use bitflags::bitflags;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::primitives::{Color, Rotation};

bitflags! {
    /// Channel occupancy mask, in wire order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AnimFlags: u16 {
        const POSITION = 0x1;
        const ROTATION = 0x2;
        const SCALE = 0x4;
        const VECTOR = 0x8;
        const VERTEX = 0x10;
        const NORMAL = 0x20;
        const TARGET = 0x40;
        const ROLL = 0x80;
        const ANGLE = 0x100;
        const COLOR = 0x200;
        const INTENSITY = 0x400;
        const SPOT = 0x800;
        const POINT = 0x1000;
    }
}

/// One animatable channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Position,
    Rotation,
    Scale,
    Vector,
    Vertex,
    Normal,
    Target,
    Roll,
    Angle,
    Color,
    Intensity,
    Spot,
    Point,
}

impl Channel {
    /// Every channel in wire order.
    pub const ALL: [Channel; 13] = [
        Channel::Position,
        Channel::Rotation,
        Channel::Scale,
        Channel::Vector,
        Channel::Vertex,
        Channel::Normal,
        Channel::Target,
        Channel::Roll,
        Channel::Angle,
        Channel::Color,
        Channel::Intensity,
        Channel::Spot,
        Channel::Point,
    ];

    pub fn flag(self) -> AnimFlags {
        AnimFlags::from_bits_retain(1 << self as u16)
    }

    /// Channels set in `flags`, in wire order.
    pub fn in_mask(flags: AnimFlags) -> impl Iterator<Item = Channel> {
        Self::ALL.into_iter().filter(move |c| flags.contains(c.flag()))
    }
}

/// Spotlight cone parameters. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Spotlight {
    pub near: f32,
    pub far: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
}

/// Linear interpolation between two keyed values.
pub trait Lerp: Clone {
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

impl Lerp for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        mix(*self, *other, t)
    }
}

impl Lerp for Vec2 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec2::lerp(*self, *other, t)
    }
}

impl Lerp for Vec3 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec3::lerp(*self, *other, t)
    }
}

impl Lerp for Rotation {
    /// Per axis in BAMS units, rounded to the nearest unit. Wraps to `i32`
    /// only when `t` lies outside `0..=1`.
    fn lerp(&self, other: &Self, t: f32) -> Self {
        let axis = |a: i32, b: i32| {
            let delta = (i64::from(b) - i64::from(a)) as f64 * f64::from(t);
            (i64::from(a) + delta.round() as i64) as i32
        };
        Rotation::new(axis(self.x, other.x), axis(self.y, other.y), axis(self.z, other.z))
    }
}

impl Lerp for Color {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        let a = self.to_array();
        let b = other.to_array();
        Color::from_array(std::array::from_fn(|i| mix(a[i], b[i], t)))
    }
}

impl Lerp for Spotlight {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Spotlight {
            near: mix(self.near, other.near, t),
            far: mix(self.far, other.far, t),
            inner_angle: mix(self.inner_angle, other.inner_angle, t),
            outer_angle: mix(self.outer_angle, other.outer_angle, t),
        }
    }
}

impl Lerp for Vec<Vec3> {
    /// Element-wise at matching indices; elements past the shorter array
    /// keep the earlier key's value.
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self.iter()
            .enumerate()
            .map(|(i, a)| other.get(i).map_or(*a, |b| Vec3::lerp(*a, *b, t)))
            .collect()
    }
}

/// Samples one channel at `frame`.
///
/// A lone key is returned for every frame. A frame that hits a key exactly
/// returns that key. Frames before the first key or after the last key
/// clamp to it; anything else interpolates between the surrounding keys.
pub fn sample<T: Lerp>(keys: &BTreeMap<u32, T>, frame: f32) -> Option<T> {
    if keys.len() <= 1 {
        return keys.values().next().cloned();
    }
    if frame.fract() == 0.0 && frame >= 0.0 && frame <= u32::MAX as f32 {
        if let Some(v) = keys.get(&(frame as u32)) {
            return Some(v.clone());
        }
    }
    let (before, after) = if frame < 0.0 {
        (None, keys.iter().next())
    } else {
        let floor = frame.floor().min(u32::MAX as f32) as u32;
        (
            keys.range(..=floor).next_back(),
            keys.range((Bound::Excluded(floor), Bound::Unbounded)).next(),
        )
    };
    match (before, after) {
        (Some((&b, bv)), Some((&a, av))) => {
            let t = (frame - b as f32) / (a as f32 - b as f32);
            Some(bv.lerp(av, t))
        }
        (Some((_, v)), None) | (None, Some((_, v))) => Some(v.clone()),
        (None, None) => None,
    }
}

/// Sparse keyframes of one model part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Keyframes {
    pub position: BTreeMap<u32, Vec3>,
    pub rotation: BTreeMap<u32, Rotation>,
    pub scale: BTreeMap<u32, Vec3>,
    pub vector: BTreeMap<u32, Vec3>,
    pub vertex: BTreeMap<u32, Vec<Vec3>>,
    pub normal: BTreeMap<u32, Vec<Vec3>>,
    pub target: BTreeMap<u32, Vec3>,
    /// Degrees.
    pub roll: BTreeMap<u32, f32>,
    /// Degrees.
    pub angle: BTreeMap<u32, f32>,
    pub color: BTreeMap<u32, Color>,
    pub intensity: BTreeMap<u32, f32>,
    pub spot: BTreeMap<u32, Spotlight>,
    pub point: BTreeMap<u32, Vec2>,
}

/// Every channel of a part sampled at one frame. Empty channels are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub position: Option<Vec3>,
    pub rotation: Option<Rotation>,
    pub scale: Option<Vec3>,
    pub vector: Option<Vec3>,
    pub vertex: Option<Vec<Vec3>>,
    pub normal: Option<Vec<Vec3>>,
    pub target: Option<Vec3>,
    pub roll: Option<f32>,
    pub angle: Option<f32>,
    pub color: Option<Color>,
    pub intensity: Option<f32>,
    pub spot: Option<Spotlight>,
    pub point: Option<Vec2>,
}

impl Keyframes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored in `channel`.
    pub fn key_count(&self, channel: Channel) -> usize {
        match channel {
            Channel::Position => self.position.len(),
            Channel::Rotation => self.rotation.len(),
            Channel::Scale => self.scale.len(),
            Channel::Vector => self.vector.len(),
            Channel::Vertex => self.vertex.len(),
            Channel::Normal => self.normal.len(),
            Channel::Target => self.target.len(),
            Channel::Roll => self.roll.len(),
            Channel::Angle => self.angle.len(),
            Channel::Color => self.color.len(),
            Channel::Intensity => self.intensity.len(),
            Channel::Spot => self.spot.len(),
            Channel::Point => self.point.len(),
        }
    }

    /// Channels that hold at least one key.
    pub fn flags(&self) -> AnimFlags {
        Channel::ALL
            .into_iter()
            .filter(|&c| self.key_count(c) > 0)
            .fold(AnimFlags::empty(), |acc, c| acc | c.flag())
    }

    pub fn channel_count(&self) -> usize {
        self.flags().bits().count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.flags().is_empty()
    }

    /// Highest keyed frame across all channels.
    pub fn last_frame(&self) -> Option<u32> {
        [
            self.position.keys().next_back(),
            self.rotation.keys().next_back(),
            self.scale.keys().next_back(),
            self.vector.keys().next_back(),
            self.vertex.keys().next_back(),
            self.normal.keys().next_back(),
            self.target.keys().next_back(),
            self.roll.keys().next_back(),
            self.angle.keys().next_back(),
            self.color.keys().next_back(),
            self.intensity.keys().next_back(),
            self.spot.keys().next_back(),
            self.point.keys().next_back(),
        ]
        .into_iter()
        .flatten()
        .copied()
        .max()
    }

    /// Samples every non-empty channel at `frame`.
    pub fn value_at(&self, frame: f32) -> Frame {
        Frame {
            position: sample(&self.position, frame),
            rotation: sample(&self.rotation, frame),
            scale: sample(&self.scale, frame),
            vector: sample(&self.vector, frame),
            vertex: sample(&self.vertex, frame),
            normal: sample(&self.normal, frame),
            target: sample(&self.target, frame),
            roll: sample(&self.roll, frame),
            angle: sample(&self.angle, frame),
            color: sample(&self.color, frame),
            intensity: sample(&self.intensity, frame),
            spot: sample(&self.spot, frame),
            point: sample(&self.point, frame),
        }
    }
}
