use std::collections::BTreeMap;

use glam::{Vec2, Vec3};
use pretty_assertions::assert_eq;
use samodel::attach::basic::{Material, MeshSet, Poly, PolyType};
use samodel::attach::chunk::{
    ChunkAttach, ChunkStrip, ChunkVertex, PolyChunk, StripChunk, StripCorner, StripFlags, StripKind, VertexChunk,
    VertexChunkKind,
};
use samodel::attach::gc::{GcAttach, GcLoop, GcMesh, GcPrimitive, IndexAttributeFlags, Parameter, PrimitiveKind, VertexSet};
use samodel::attach::BasicAttach;
use samodel::motion::{Lerp, Spotlight};
use samodel::prelude::*;
use samodel::primitives::{bams_to_deg, deg_to_bams16};
use tempfile::tempdir;

const FORMATS: [AttachFormat; 4] = [AttachFormat::Basic, AttachFormat::BasicDx, AttachFormat::Chunk, AttachFormat::Gc];

fn basic_attach() -> BasicAttach {
    let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)];
    BasicAttach {
        name: "attach_quad".into(),
        normals: vec![Vec3::Z; 4],
        meshsets: vec![MeshSet {
            poly_type: PolyType::Strips,
            material_id: 0,
            polys: vec![Poly::new(vec![0, 1, 2, 3])],
            attributes: Vec::new(),
            normals: Vec::new(),
            colors: vec![Color::rgba(255, 0, 0, 255); 4],
            uvs: (0..4).map(|i| Vec2::new(i as f32 / 255.0, 0.0)).collect(),
        }],
        materials: vec![Material::default()],
        bounds: Bounds::from_points(&positions),
        positions,
    }
}

fn chunk_attach() -> ChunkAttach {
    let vertices = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)]
        .into_iter()
        .map(|position| ChunkVertex {
            position,
            normal: Some(Vec3::Z),
            ..ChunkVertex::default()
        })
        .collect();
    ChunkAttach {
        name: "attach_quad".into(),
        vertex_chunks: vec![VertexChunk::new(VertexChunkKind::Normal, 0, vertices)],
        poly_chunks: vec![PolyChunk::Strip(StripChunk {
            kind: StripKind::Uvn,
            flags: StripFlags::empty(),
            user_flag_count: 0,
            strips: vec![ChunkStrip {
                reversed: false,
                corners: (0..4u16)
                    .map(|i| StripCorner {
                        uv: Some(Vec2::new(f32::from(i) / 255.0, 0.0)),
                        ..StripCorner::new(i)
                    })
                    .collect(),
            }],
        })],
        bounds: Bounds::default(),
    }
}

fn gc_loop(i: u16) -> GcLoop {
    GcLoop {
        position: i,
        normal: Some(0),
        color: None,
        uv: Some(i),
    }
}

fn gc_attach() -> GcAttach {
    let flags = IndexAttributeFlags::HAS_POSITION | IndexAttributeFlags::HAS_NORMAL | IndexAttributeFlags::HAS_UV;
    GcAttach {
        name: "attach_quad".into(),
        vertex_sets: vec![
            VertexSet::Position(vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)]),
            VertexSet::Normal(vec![Vec3::Z]),
            VertexSet::Tex {
                channel: 0,
                frac_bits: 8,
                uvs: vec![Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::ONE],
            },
        ],
        opaque: vec![
            GcMesh {
                parameters: vec![Parameter::index_flags(flags), Parameter::texture(7, 0)],
                primitives: vec![GcPrimitive {
                    kind: PrimitiveKind::Triangles,
                    loops: [0, 1, 2].map(gc_loop).to_vec(),
                }],
            },
            // No index flags here: decoding relies on the previous mesh.
            GcMesh {
                parameters: Vec::new(),
                primitives: vec![GcPrimitive {
                    kind: PrimitiveKind::TriangleStrip,
                    loops: [2, 1, 3].map(gc_loop).to_vec(),
                }],
            },
        ],
        translucent: Vec::new(),
        bounds: Bounds::default(),
    }
}

fn attach_for(format: AttachFormat) -> Attach {
    match format {
        AttachFormat::Basic => Attach::Basic(basic_attach()),
        AttachFormat::BasicDx => Attach::BasicDx(basic_attach()),
        AttachFormat::Chunk => Attach::Chunk(chunk_attach()),
        AttachFormat::Gc => Attach::Gc(gc_attach()),
    }
}

/// body -> (arm, leg), with body and arm sharing one attach.
fn scene(format: AttachFormat) -> Hierarchy {
    let mut attaches = AttachArena::new();
    let shared = attaches.insert(attach_for(format));

    let mut body = Node::new("body");
    body.attach = Some(shared);
    body.rotation = Rotation::new(0, 0x4000, 0);

    let mut arm = Node::new("arm");
    arm.attach = Some(shared);
    arm.position = Vec3::new(1.5, 0.0, -2.0);
    arm.flags = ObjectFlags::NO_ANIMATE | ObjectFlags::ROTATE_ZYX;

    let mut leg = Node::new("leg");
    leg.scale = Vec3::new(1.0, 2.0, 1.0);
    leg.flags = ObjectFlags::NO_DISPLAY;
    leg.children.push(Node::new("foot"));

    body.children = vec![arm, leg];
    Hierarchy::new(body, attaches, format)
}

#[test]
fn test_hierarchy_round_trip_every_format_and_endian() {
    for format in FORMATS {
        for codec in [Codec::little_endian(), Codec::big_endian()] {
            let original = scene(format);
            let (bytes, address, labels) = original.to_bytes(codec, HierarchyLayout::Flat).unwrap();
            let decoded = Hierarchy::decode(&codec.reader(&bytes), address, format, &labels).unwrap();
            assert_eq!(decoded, original, "{format} {:?}", codec.endian);
        }
    }
}

#[test]
fn test_round_trip_with_image_base() {
    let codec = Codec::big_endian().with_image_base(0x8C01_0000);
    let original = scene(AttachFormat::Chunk);
    let (bytes, address, labels) = original.to_bytes(codec, HierarchyLayout::Flat).unwrap();
    assert!(address >= 0x8C01_0000);
    let decoded = Hierarchy::decode(&codec.reader(&bytes), address - 0x8C01_0000, AttachFormat::Chunk, &labels).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_shared_attach_decodes_once() {
    for format in FORMATS {
        let (bytes, address, _) = scene(format).to_bytes(Codec::default(), HierarchyLayout::Flat).unwrap();
        let decoded = Hierarchy::from_bytes(&bytes, address, format, Codec::default()).unwrap();
        let nodes = decoded.nodes();
        assert_eq!(decoded.attaches.len(), 1);
        assert!(nodes[0].attach.is_some());
        assert_eq!(nodes[0].attach, nodes[1].attach);
        assert!(std::ptr::eq(
            decoded.attach(nodes[0]).unwrap(),
            decoded.attach(nodes[1]).unwrap()
        ));
    }
}

#[test]
fn test_walk_order() {
    let names: Vec<String> = scene(AttachFormat::Basic).nodes().iter().map(|n| n.name.clone()).collect();
    assert_eq!(names, vec!["body", "arm", "leg", "foot"]);
}

#[test]
fn test_root_siblings_are_wrapped() {
    let mut first = Node::new("first");
    first.children.push(Node::new("first_child"));
    first.siblings.push(Node::new("second"));
    first.siblings.push(Node::new("third"));
    let chain = Hierarchy::new(first.clone(), AttachArena::new(), AttachFormat::Basic);
    let (bytes, address, labels) = chain.to_bytes(Codec::default(), HierarchyLayout::Flat).unwrap();
    let reader = Codec::default().reader(&bytes);

    let wrapped = Hierarchy::decode(&reader, address, AttachFormat::Basic, &labels).unwrap();
    assert!(wrapped.wrapped);
    assert_eq!(wrapped.root.name, "Root");
    assert_eq!(wrapped.root.children, vec![first.clone()]);
    assert_eq!(wrapped.count_nodes(), 5);

    let raw = Hierarchy::decode_root(&reader, address, AttachFormat::Basic, &labels).unwrap();
    assert!(!raw.wrapped);
    assert_eq!(raw.root, first);
}

#[test]
fn test_meshes_from_every_format() {
    for format in FORMATS {
        let meshes = scene(format).to_meshes().unwrap();
        // body and arm share the attach; both are converted.
        assert_eq!(meshes.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);
        let chunks = &meshes[0].1;
        let triangles: usize = chunks.iter().map(|c| c.triangle_list().len() / 3).sum();
        assert_eq!(triangles, 2, "{format}");
    }
}

#[test]
fn test_gc_index_flags_carry_forward_on_decode() {
    let codec = Codec::little_endian();
    let mut writer = codec.writer();
    writer.write_u32(0);
    let address = gc_attach().encode(&mut writer).unwrap();
    let (bytes, labels) = writer.finish();

    let decoded = GcAttach::decode(&codec.reader(&bytes), address, &labels).unwrap();
    assert!(decoded.opaque[1].index_flags().is_none());
    assert_eq!(decoded.opaque[1].primitives, gc_attach().opaque[1].primitives);

    let chunks = decoded.to_mesh().unwrap();
    assert_eq!(chunks[1].corners[2].uv, Some(Vec2::ONE));
    assert_eq!(chunks[1].material.texture_id, Some(7));
}

#[test]
fn test_detect_gc_attach() {
    let codec = Codec::big_endian();
    let mut writer = codec.writer();
    writer.write_u32(0);
    let address = gc_attach().encode(&mut writer).unwrap();
    let bytes = writer.into_bytes();
    assert_eq!(detect_attach_format(&bytes, address, codec).unwrap(), AttachFormat::Gc);
}

#[test]
fn test_truncated_input_reports_offset() {
    let (bytes, address, _) = scene(AttachFormat::Basic).to_bytes(Codec::default(), HierarchyLayout::Flat).unwrap();
    let cut = &bytes[..address as usize + 0x20];
    let err = Hierarchy::from_bytes(cut, address, AttachFormat::Basic, Codec::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Truncated);
}

fn every_channel() -> Keyframes {
    let mut keys = Keyframes::new();
    keys.position.insert(0, Vec3::ZERO);
    keys.position.insert(10, Vec3::new(1.0, 2.0, 3.0));
    keys.rotation.insert(0, Rotation::new(0, 0, 0));
    keys.rotation.insert(10, Rotation::new(0x4000, -0x2000, 0x10000));
    keys.scale.insert(5, Vec3::ONE);
    keys.vector.insert(0, Vec3::Y);
    keys.vertex.insert(0, vec![Vec3::ZERO, Vec3::X]);
    keys.vertex.insert(4, vec![Vec3::ONE, Vec3::Y, Vec3::Z, Vec3::NEG_X]);
    keys.vertex.insert(8, vec![Vec3::Z; 3]);
    keys.normal.insert(2, vec![Vec3::Z; 5]);
    keys.target.insert(0, Vec3::new(0.0, 0.0, -10.0));
    keys.roll.insert(0, 90.0);
    keys.angle.insert(3, 45.0);
    keys.color.insert(0, Color::rgba(10, 20, 30, 40));
    keys.color.insert(6, Color::WHITE);
    keys.intensity.insert(1, 0.75);
    keys.spot.insert(0, Spotlight {
        near: 1.0,
        far: 100.0,
        inner_angle: 22.5,
        outer_angle: 45.0,
    });
    keys.point.insert(9, Vec2::new(0.5, -0.5));
    keys
}

#[test]
fn test_motion_round_trip_every_channel() {
    let mut motion = Motion::new("everything", 2);
    motion.models.insert(1, every_channel());
    motion.update_frame_count();
    assert_eq!(motion.flags().bits(), 0x1FFF);

    for codec in [Codec::little_endian(), Codec::big_endian()] {
        let (bytes, address, labels) = motion.to_bytes(codec).unwrap();
        let decoded = Motion::decode(&codec.reader(&bytes), address, 2, MotionOptions::default(), &labels).unwrap();
        assert_eq!(decoded, motion);
        assert_eq!(decoded.models[&1].vertex[&4].len(), 4);
        assert_eq!(decoded.models[&1].channel_count(), 13);
    }
}

#[test]
fn test_motion_round_trip_channel_subsets() {
    let full = every_channel();
    let subsets: [fn(&mut Keyframes); 3] = [
        |k| {
            k.vertex.clear();
            k.normal.clear();
        },
        |k| {
            *k = Keyframes {
                normal: k.normal.clone(),
                ..Keyframes::default()
            };
        },
        |k| {
            *k = Keyframes {
                spot: k.spot.clone(),
                color: k.color.clone(),
                ..Keyframes::default()
            };
        },
    ];
    for strip in subsets {
        let mut keys = full.clone();
        strip(&mut keys);
        let mut motion = Motion::new("subset", 1);
        motion.models.insert(0, keys);
        let (bytes, address, labels) = motion.to_bytes(Codec::default()).unwrap();
        let decoded =
            Motion::decode(&Codec::default().reader(&bytes), address, 1, MotionOptions::default(), &labels).unwrap();
        assert_eq!(decoded, motion);
    }
}

#[test]
fn test_interpolation_boundaries() {
    let a = Vec3::new(0.0, 10.0, -4.0);
    let b = Vec3::new(10.0, 20.0, 4.0);
    let mut keys = Keyframes::new();
    keys.position = BTreeMap::from([(0, a), (10, b)]);

    assert_eq!(keys.value_at(0.0).position, Some(a));
    assert_eq!(keys.value_at(10.0).position, Some(b));
    assert_eq!(keys.value_at(5.0).position, Some(Lerp::lerp(&a, &b, 0.5)));
    assert_eq!(keys.value_at(-1.0).position, Some(a));
    assert_eq!(keys.value_at(20.0).position, Some(b));
}

#[test]
fn test_single_key_channel() {
    let mut keys = Keyframes::new();
    keys.intensity.insert(7, 0.25);
    for frame in [0.0, 1.0, 7.0, 6.5, 1000.0] {
        assert_eq!(keys.value_at(frame).intensity, Some(0.25));
    }
}

#[test]
fn test_bams_quantization() {
    let step = 360.0 / 65536.0;
    let back = bams_to_deg(i32::from(deg_to_bams16(90.0)));
    assert!((back - 90.0).abs() <= step);
    assert_eq!(deg_to_bams16(0.0), 0);
    assert_eq!(deg_to_bams16(360.0), 0);
}

#[test]
fn test_action_round_trip_and_errors() {
    let hierarchy = scene(AttachFormat::Gc);
    let mut motion = Motion::new("wave", hierarchy.count_nodes());
    let mut keys = Keyframes::new();
    keys.rotation.insert(0, Rotation::ZERO);
    keys.rotation.insert(16, Rotation::new(0, 0, 0x2000));
    motion.models.insert(1, keys);
    motion.update_frame_count();

    let action = Action::new("wave_action", hierarchy.clone(), motion.clone()).unwrap();
    let codec = Codec::big_endian();
    let (bytes, address, labels) = action.to_bytes(codec, HierarchyLayout::Flat).unwrap();
    let decoded =
        Action::decode(&codec.reader(&bytes), address, AttachFormat::Gc, MotionOptions::default(), &labels).unwrap();
    assert_eq!(decoded, action);

    motion.model_parts = hierarchy.count_nodes() + 1;
    let err = Action::new("too_many", hierarchy, motion).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleMotion);

    let mut writer = codec.writer();
    writer.write_u32(0);
    let record = writer.address();
    writer.write_ptr(None);
    writer.write_ptr(Some(0x4));
    let bytes = writer.into_bytes();
    let err = Action::from_bytes(&bytes, record, codec, AttachFormat::Gc, MotionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsatisfiedReference);
}

#[test]
fn test_model_file_on_disk() {
    let dir = tempdir().unwrap();
    for format in FORMATS {
        let path = dir.path().join(format!("{format}.mdl"));
        let mut file = ModelFile::new(scene(format));
        file.metadata.animations = vec!["wave.saanim".into()];
        file.metadata.description = Some("test scene".into());
        file.codec = Codec::big_endian();
        file.write(&path).unwrap();

        let read = ModelFile::read(&path).unwrap();
        assert_eq!(read.hierarchy, file.hierarchy);
        assert_eq!(read.metadata.animations, file.metadata.animations);
        assert_eq!(read.metadata.description, file.metadata.description);
        assert!(read.metadata.labels.address_of("arm").is_some());
        assert_eq!(read.codec.endian, Endian::Big);
    }
}

#[test]
fn test_animation_file_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("everything.saanim");
    let mut motion = Motion::new("everything", 3);
    motion.models.insert(2, every_channel());
    motion.update_frame_count();
    AnimationFile::new(motion.clone()).write(&path).unwrap();

    let read = AnimationFile::read(&path).unwrap();
    assert_eq!(read.motion, motion);
}
