use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand, ValueEnum};

use crate::attach::{AttachFormat, detect_attach_format};
use crate::codec::{Codec, Endian, LabelMap};
use crate::container::{AnimationFile, MAGIC_MASK, ModelFile, ModelFormat};
use crate::motion::{Motion, MotionOptions};
use crate::object::Hierarchy;

pub mod dump;
pub mod inspect;
pub mod motion;
pub mod swap;

/// Attach format argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Basic,
    #[value(name = "basicdx")]
    BasicDx,
    Chunk,
    Gc,
}

impl From<FormatArg> for AttachFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Basic => AttachFormat::Basic,
            FormatArg::BasicDx => AttachFormat::BasicDx,
            FormatArg::Chunk => AttachFormat::Chunk,
            FormatArg::Gc => AttachFormat::Gc,
        }
    }
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("Invalid hex value '{s}': {e}"))
}

/// Options for data that is not wrapped in a model or animation file
#[derive(Args, Debug, Clone, Default)]
pub struct RawArgs {
    /// Address of the object or motion in a raw dump (hex)
    #[arg(long, value_parser = parse_hex)]
    pub address: Option<u32>,

    /// Address the dump was loaded at (hex)
    #[arg(long, value_parser = parse_hex, default_value = "0")]
    pub image_base: u32,

    /// Attach format (detected from the first attach if omitted)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Read the dump as big-endian
    #[arg(long)]
    pub big_endian: bool,

    /// Read a raw motion animating this many nodes instead of an object
    #[arg(long)]
    pub nodes: Option<usize>,

    /// Rotation keys are 16-bit
    #[arg(long)]
    pub short_rot: bool,
}

impl RawArgs {
    fn codec(&self) -> Codec {
        let endian = if self.big_endian { Endian::Big } else { Endian::Little };
        Codec::new(endian).with_image_base(self.image_base)
    }
}

/// Anything the CLI can open.
pub enum Input {
    Model(ModelFile),
    Animation(AnimationFile),
    RawObject { hierarchy: Hierarchy, codec: Codec },
    RawMotion { motion: Motion, codec: Codec },
}

impl Input {
    /// Opens a container by magic, or falls back to a raw dump described
    /// by `raw`.
    pub fn load(path: &Path, raw: &RawArgs) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        if bytes.starts_with(b"SAANIM") {
            return Ok(Input::Animation(AnimationFile::from_bytes(&bytes)?));
        }
        let magic = bytes
            .get(..8)
            .and_then(|head| <[u8; 8]>::try_from(head).ok())
            .map(|head| u64::from_le_bytes(head) & MAGIC_MASK);
        if magic.and_then(ModelFormat::from_magic).is_some() {
            return Ok(Input::Model(ModelFile::from_bytes(&bytes)?));
        }

        let codec = raw.codec();
        let offset = raw
            .address
            .context("Not a model or animation file; pass --address to read a raw dump")?
            .checked_sub(raw.image_base)
            .context("--address lies below --image-base")?;
        if let Some(nodes) = raw.nodes {
            let options = MotionOptions { short_rot: raw.short_rot };
            let motion = Motion::decode(&codec.reader(&bytes), offset, nodes, options, &LabelMap::new())?;
            return Ok(Input::RawMotion { motion, codec });
        }
        let format = match raw.format {
            Some(format) => format.into(),
            None => detect_format(&bytes, offset, codec)?,
        };
        let hierarchy = Hierarchy::from_bytes(&bytes, offset, format, codec)?;
        Ok(Input::RawObject { hierarchy, codec })
    }
}

/// Detects the attach format from the root object's attach.
fn detect_format(bytes: &[u8], object: u32, codec: Codec) -> anyhow::Result<AttachFormat> {
    let attach = codec.reader(bytes).ptr(object as usize + 4)?;
    let Some(attach) = attach else {
        tracing::warn!("Root object has no attach; assuming Basic. Pass --format to override");
        return Ok(AttachFormat::Basic);
    };
    Ok(detect_attach_format(bytes, attach, codec)?)
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show container header, node tree and attach summaries
    Inspect {
        /// Model, animation or raw dump file
        file: PathBuf,

        #[command(flatten)]
        raw: RawArgs,
    },

    /// Write the decoded data as JSON
    Dump {
        /// Model, animation or raw dump file
        file: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        raw: RawArgs,
    },

    /// Summarize motion channels and sample them
    Motion {
        /// Animation file or raw dump
        file: PathBuf,

        /// Frame to sample (fractional frames interpolate)
        #[arg(short, long)]
        frame: Option<f32>,

        #[command(flatten)]
        raw: RawArgs,
    },

    /// Re-encode with the opposite byte order
    SwapEndian {
        /// Source file
        input: PathBuf,

        /// Destination file
        output: PathBuf,

        #[command(flatten)]
        raw: RawArgs,
    },
}

impl Commands {
    pub fn execute(&self) -> anyhow::Result<()> {
        match self {
            Commands::Inspect { file, raw } => inspect::execute(file, raw),
            Commands::Dump { file, output, raw } => dump::execute(file, output.as_deref(), raw),
            Commands::Motion { file, frame, raw } => motion::execute(file, *frame, raw),
            Commands::SwapEndian { input, output, raw } => swap::execute(input, output, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x400000"), Ok(0x0040_0000));
        assert_eq!(parse_hex("8C010000"), Ok(0x8C01_0000));
        assert!(parse_hex("zz").is_err());
    }
}
