//! CLI command for byte-order conversion
use std::path::Path;

use anyhow::Context;

use super::{Input, RawArgs};
use crate::object::HierarchyLayout;

pub fn execute(input: &Path, output: &Path, raw: &RawArgs) -> anyhow::Result<()> {
    let bytes = match Input::load(input, raw)? {
        Input::Model(mut model) => {
            model.codec.endian = model.codec.endian.swapped();
            println!("Writing {:?}-endian model", model.codec.endian);
            model.to_bytes()?
        }
        Input::Animation(mut animation) => {
            animation.codec.endian = animation.codec.endian.swapped();
            println!("Writing {:?}-endian animation", animation.codec.endian);
            animation.to_bytes()?
        }
        Input::RawObject { hierarchy, codec } => {
            let codec = codec.with_endian(codec.endian.swapped());
            let (bytes, address, _) = hierarchy.to_bytes(codec, HierarchyLayout::SiblingChain)?;
            println!("Root object now at 0x{address:08X}");
            bytes
        }
        Input::RawMotion { motion, codec } => {
            let codec = codec.with_endian(codec.endian.swapped());
            let (bytes, address, _) = motion.to_bytes(codec)?;
            println!("Motion now at 0x{address:08X}");
            bytes
        }
    };
    std::fs::write(output, bytes).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}
