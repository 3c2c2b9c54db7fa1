//! CLI command for dumping decoded data as JSON
use std::path::Path;

use anyhow::Context;

use super::{Input, RawArgs};

pub fn execute(file: &Path, output: Option<&Path>, raw: &RawArgs) -> anyhow::Result<()> {
    let json = match Input::load(file, raw)? {
        Input::Model(model) => serde_json::to_string_pretty(&model)?,
        Input::Animation(animation) => serde_json::to_string_pretty(&animation)?,
        Input::RawObject { hierarchy, .. } => serde_json::to_string_pretty(&hierarchy)?,
        Input::RawMotion { motion, .. } => serde_json::to_string_pretty(&motion)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
