//! CLI command for summarizing models and motions
use std::path::Path;

use super::{Input, RawArgs};
use crate::attach::Attach;
use crate::motion::Motion;
use crate::object::{Hierarchy, Node};

pub fn execute(file: &Path, raw: &RawArgs) -> anyhow::Result<()> {
    match Input::load(file, raw)? {
        Input::Model(model) => {
            println!("{:?} model ({:?}-endian)", model.format(), model.codec.endian);
            print_hierarchy(&model.hierarchy);
            let meta = &model.metadata;
            println!("Labels: {}", meta.labels.len());
            for (title, value) in [("Author", &meta.author), ("Description", &meta.description), ("Tool", &meta.tool)] {
                if let Some(value) = value {
                    println!("{title}: {value}");
                }
            }
            if !meta.animations.is_empty() {
                println!("Animations: {}", meta.animations.join(", "));
            }
            if !meta.morphs.is_empty() {
                println!("Morphs: {}", meta.morphs.join(", "));
            }
        }
        Input::Animation(animation) => {
            println!("Animation ({:?}-endian)", animation.codec.endian);
            print_motion(&animation.motion);
        }
        Input::RawObject { hierarchy, codec } => {
            println!("Raw object tree (image base 0x{:08X})", codec.image_base);
            print_hierarchy(&hierarchy);
        }
        Input::RawMotion { motion, codec } => {
            println!("Raw motion (image base 0x{:08X})", codec.image_base);
            print_motion(&motion);
        }
    }
    Ok(())
}

fn print_hierarchy(hierarchy: &Hierarchy) {
    println!(
        "{} format, {} nodes, {} attaches",
        hierarchy.format,
        hierarchy.count_nodes(),
        hierarchy.attaches.len()
    );
    print_node(hierarchy, &hierarchy.root, 0);
}

fn print_node(hierarchy: &Hierarchy, node: &Node, depth: usize) {
    let attach = hierarchy.attach(node).map(describe_attach).unwrap_or_default();
    let hidden = if node.hidden() { " (hidden)" } else { "" };
    println!("{:indent$}{}{hidden}{attach}", "", node.name, indent = depth * 2);
    for child in &node.children {
        print_node(hierarchy, child, depth + 1);
    }
    for sibling in &node.siblings {
        print_node(hierarchy, sibling, depth);
    }
}

fn describe_attach(attach: &Attach) -> String {
    let bounds = attach.bounds();
    format!(
        " -> {} [{} vertices, radius {:.2}]",
        attach.name(),
        attach.vertex_count(),
        bounds.radius
    )
}

pub(super) fn print_motion(motion: &Motion) {
    println!(
        "{}: {} frames, {} parts, {:?} interpolation",
        motion.name, motion.frame_count, motion.model_parts, motion.interpolation
    );
    println!("Channels: {:?}", motion.flags());
    for (part, keys) in &motion.models {
        println!("  part {part}: {:?}", keys.flags());
    }
}
