//! CLI command for motion summaries and sampling
use std::path::Path;

use super::inspect::print_motion;
use super::{Input, RawArgs};
use crate::motion::{Channel, Motion};

pub fn execute(file: &Path, frame: Option<f32>, raw: &RawArgs) -> anyhow::Result<()> {
    let motion = match Input::load(file, raw)? {
        Input::Animation(animation) => animation.motion,
        Input::RawMotion { motion, .. } => motion,
        Input::Model(_) | Input::RawObject { .. } => {
            anyhow::bail!("{} holds a model, not a motion (pass --nodes for a raw motion)", file.display())
        }
    };

    print_motion(&motion);
    print_key_counts(&motion);

    if let Some(frame) = frame {
        println!("Frame {frame}:");
        for part in motion.models.keys() {
            if let Some(values) = motion.value_at(*part, frame) {
                println!("  part {part}: {values:?}");
            }
        }
    }
    Ok(())
}

fn print_key_counts(motion: &Motion) {
    for (part, keys) in &motion.models {
        let counts: Vec<String> = Channel::in_mask(keys.flags())
            .map(|c| format!("{c:?}={}", keys.key_count(c)))
            .collect();
        println!("  part {part} keys: {}", counts.join(" "));
    }
}
