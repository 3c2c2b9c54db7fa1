//! # SAModel
//!
//! A pure-Rust codec for the Ninja model and motion formats used by the
//! Sonic Adventure series.
//!
//! ## Supported Data
//!
//! - **Objects** - `NJS_OBJECT` scene hierarchies
//! - **Attaches** - Basic (SA1), BasicDX (SADX), Chunk (SA2) and GC (SA2B) geometry
//! - **Motions** - `NJS_MOTION` keyframe animation, all thirteen channels
//! - **Actions** - `NJS_ACTION` model/motion pairs
//! - **Containers** - `*MDL` model files and `SAANIM` animation files
//!
//! Data may come from self-contained files or from raw executable dumps;
//! a [`Codec`](codec::Codec) carries the byte order and image base for
//! either case.
//!
//! ## Quick Start
//!
//! ### Reading a model file
//!
//! ```no_run
//! use samodel::container::ModelFile;
//!
//! let file = ModelFile::read("sonic.sa1mdl")?;
//! for node in file.hierarchy.nodes() {
//!     println!("{}", node.name);
//! }
//! # Ok::<(), samodel::Error>(())
//! ```
//!
//! ### Decoding from an executable dump
//!
//! ```no_run
//! use samodel::prelude::*;
//!
//! let exe = std::fs::read("sonic.exe")?;
//! let codec = Codec::little_endian().with_image_base(0x0040_0000);
//! let hierarchy = Hierarchy::from_bytes(&exe, 0x0056_0000, AttachFormat::BasicDx, codec)?;
//! println!("{} nodes", hierarchy.count_nodes());
//! # Ok::<(), samodel::Error>(())
//! ```
//!
//! ### Sampling a motion
//!
//! ```
//! use samodel::prelude::*;
//! use glam::Vec3;
//!
//! let mut keys = Keyframes::new();
//! keys.position.insert(0, Vec3::ZERO);
//! keys.position.insert(10, Vec3::new(10.0, 0.0, 0.0));
//!
//! let frame = keys.value_at(5.0);
//! assert_eq!(frame.position, Some(Vec3::new(5.0, 0.0, 0.0)));
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - Enables the `samodel` command-line binary

pub mod action;
pub mod attach;
pub mod codec;
pub mod container;
pub mod error;
pub mod motion;
pub mod object;
pub mod primitives;

// Re-exports for convenience
pub use error::{Error, ErrorKind, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::action::Action;
    pub use crate::attach::{Attach, AttachArena, AttachFormat, AttachId, MeshChunk, detect_attach_format};
    pub use crate::codec::{Codec, Endian, LabelMap, TextEncoding};
    pub use crate::container::{AnimationFile, ModelFile, ModelFormat};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::motion::{AnimFlags, Channel, Frame, Keyframes, Motion, MotionOptions};
    pub use crate::object::{Hierarchy, HierarchyLayout, Node, ObjectFlags};
    pub use crate::primitives::{Bounds, Color, Rotation};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;
