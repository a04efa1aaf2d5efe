//! Scene graph construction
//!
//! The builder is the single writer of node ids. Phases run in a fixed order:
//!
//! 1. walk the source depth-first, check structure, assign ids and paths
//! 2. register bones and finalize the registry
//! 3. encode every shape, resolving skin bindings against the registry
//! 4. consolidate merge groups
//! 5. sample animation

use std::collections::HashSet;

use tracing::{debug, info};

use i3d_core::math::bake_transform;
use i3d_core::{
    Affine, AxisOrientation, Error, ExportConfig, IndexPath, NodeId, NodeKind, Result, ResultExt,
    Transform, Vec3,
};
use i3d_scene::{SceneSource, SourceObject};

use crate::animation::{AnimationSet, AnimationTrackEncoder, EncodedRotation, Keyframe};
use crate::cancel::CancelToken;
use crate::geometry::GeometryEncoder;
use crate::graph::{SceneGraph, SceneNode, Splice};
use crate::merge::MergeGroupResolver;
use crate::report::ExportReport;
use crate::skin::SkinBindingResolver;

/// Builds the normalized [`SceneGraph`] of one export
#[derive(Debug)]
pub struct SceneGraphBuilder<'a> {
    config: &'a ExportConfig,
    cancel: &'a CancelToken,
}

/// Pending visit of the depth-first walk
struct Visit {
    key: String,
    parent: Option<usize>,
    path: IndexPath,
}

impl<'a> SceneGraphBuilder<'a> {
    pub fn new(config: &'a ExportConfig, cancel: &'a CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Run every phase
    pub fn build(&self, scene: &dyn SceneSource, report: &mut ExportReport) -> Result<SceneGraph> {
        let mut graph = self.walk(scene)?;
        info!(nodes = graph.nodes.len(), "Scene walked");

        self.register_bones(&mut graph)?;
        self.cancel.check()?;

        let encoder = GeometryEncoder::new(self.config);
        self.encode_shapes(scene, &mut graph, &encoder, report)?;
        self.cancel.check()?;

        if self.config.export.merge_groups {
            MergeGroupResolver::new(&encoder).resolve(&mut graph, report);
        }

        if self.config.export.animation {
            self.encode_animation(scene, &mut graph, report)?;
        }
        self.cancel.check()?;

        report.nodes = graph.summaries();
        Ok(graph)
    }

    /// Depth-first walk in sibling order with structural checks
    pub fn walk(&self, scene: &dyn SceneSource) -> Result<SceneGraph> {
        let mut graph = SceneGraph::new(scene.scene_name(), scene.frames_per_second());
        graph.nodes.reserve(scene.object_count());

        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<Visit> = scene
            .root_keys()
            .iter()
            .enumerate()
            .rev()
            .map(|(i, key)| Visit {
                key: key.clone(),
                parent: None,
                path: IndexPath::root(i as u32),
            })
            .collect();

        while let Some(visit) = stack.pop() {
            let parent_key = visit.parent.map(|p| graph.node(p).key.clone());
            let Some(object) = scene.object(&visit.key) else {
                return Err(match &parent_key {
                    Some(parent) => Error::structural(format!(
                        "'{}' lists child '{}' which does not exist",
                        parent, visit.key
                    )),
                    None => Error::structural(format!("root '{}' does not exist", visit.key)),
                });
            };
            if !visited.insert(visit.key.clone()) {
                return Err(Error::structural(format!(
                    "'{}' is reachable more than once (cycle or shared child)",
                    visit.key
                )));
            }
            match (&parent_key, &object.parent) {
                (None, Some(declared)) => {
                    return Err(Error::structural(format!(
                        "root '{}' declares parent '{}'",
                        visit.key, declared
                    )));
                }
                (Some(actual), Some(declared)) if actual != declared => {
                    return Err(Error::structural(format!(
                        "'{}' declares parent '{}' but is listed by '{}'",
                        visit.key, declared, actual
                    )));
                }
                _ => {}
            }

            let id = NodeId(graph.nodes.len() as u32 + 1);
            let mut node = self.make_node(id, visit.path.clone(), object);
            let parent_world = visit
                .parent
                .map(|p| graph.node(p).world)
                .unwrap_or(Affine::IDENTITY);
            node.world = parent_world.mul(&Affine::from_transform(&node.transform));
            node.parent = visit.parent;
            let index = graph.push(node);
            match visit.parent {
                Some(parent) => graph.node_mut(parent).children.push(index),
                None => graph.roots.push(index),
            }

            for (i, child) in object.children.iter().enumerate().rev() {
                stack.push(Visit {
                    key: child.clone(),
                    parent: Some(index),
                    path: visit.path.child(i as u32),
                });
            }
        }
        Ok(graph)
    }

    fn make_node(&self, id: NodeId, path: IndexPath, object: &SourceObject) -> SceneNode {
        let toggles = &self.config.export;
        let kind = match object.kind {
            NodeKind::Shape if !toggles.shapes => NodeKind::Transform,
            NodeKind::Light if !toggles.lights => NodeKind::Transform,
            NodeKind::Camera if !toggles.cameras => NodeKind::Transform,
            other => other,
        };
        let transform = match self.config.axis_orientation {
            AxisOrientation::BakeTransforms => bake_transform(&object.transform),
            AxisOrientation::KeepTransforms => object.transform,
        };

        let mut node = SceneNode::new(id, path, object.key.clone(), kind);
        node.name = object.display_name().to_string();
        node.transform = transform;
        node.source_transform = object.transform;
        node.visible = object.visible;
        node.materials = object.materials.clone();
        node.merge_group = object.merge_tag().map(String::from);
        node.merge_group_root = object.merge_group_root;
        node.bounding_volume = object.bounding_volume;
        node.attributes = object.attributes.clone();
        node.user_attributes = object.user_attributes.clone();
        if kind == NodeKind::Light {
            node.light = Some(object.light.clone().unwrap_or_default());
        }
        if kind == NodeKind::Camera {
            node.camera = Some(object.camera.clone().unwrap_or_default());
        }
        node
    }

    /// Publish bone ids; skin resolution is only possible afterwards
    fn register_bones(&self, graph: &mut SceneGraph) -> Result<()> {
        for index in graph.walk() {
            let node = &graph.nodes[index];
            if node.kind == NodeKind::Bone {
                let (key, name, id) = (node.key.clone(), node.name.clone(), node.id);
                graph.bones.register(&key, &name, id)?;
            }
        }
        graph.bones.finalize();
        debug!(bones = graph.bones.len(), "Bone registry finalized");
        Ok(())
    }

    fn encode_shapes(
        &self,
        scene: &dyn SceneSource,
        graph: &mut SceneGraph,
        encoder: &GeometryEncoder<'_>,
        report: &mut ExportReport,
    ) -> Result<()> {
        let skin_resolver = SkinBindingResolver::new(&graph.bones, self.config)?;
        let mut encoded = Vec::new();

        for index in graph.walk() {
            let node = graph.node(index);
            if node.kind != NodeKind::Shape {
                continue;
            }
            self.cancel.check()?;
            let mesh = scene.object(&node.key).and_then(|o| o.mesh.as_ref());
            let Some(mesh) = mesh else {
                report.skip(&node.name, "shape has no mesh data; exported as transform group");
                encoded.push((index, None));
                continue;
            };

            let skin = if self.config.export.skin_weights && mesh.has_skin_weights() {
                skin_resolver.resolve_mesh(&node.name, &mesh.skin_weights, report)
            } else {
                None
            };
            let result = encoder
                .encode(
                    &node.name,
                    mesh,
                    skin.as_deref(),
                    node.slot_count(),
                    &node.bounding_volume,
                )
                .with_context(|| format!("encoding mesh of '{}'", node.name))?;
            if result.is_none() {
                report.skip(&node.name, "mesh has no triangles; exported as transform group");
            }
            encoded.push((index, result));
        }

        for (index, mesh) in encoded {
            let node = graph.node_mut(index);
            if mesh.is_none() {
                node.kind = NodeKind::Transform;
            }
            node.mesh = mesh;
        }
        Ok(())
    }

    fn encode_animation(
        &self,
        scene: &dyn SceneSource,
        graph: &mut SceneGraph,
        report: &mut ExportReport,
    ) -> Result<()> {
        let encoder = AnimationTrackEncoder::new(self.config, graph.fps)?;
        let mut clips = Vec::new();

        for index in graph.walk() {
            let node = graph.node(index);
            let Some(animation) = scene.object(&node.key).and_then(|o| o.animation.as_ref()) else {
                continue;
            };
            if !node.exported {
                if !animation.is_empty() {
                    let target = node
                        .merged_into
                        .map(|m| graph.node(m).name.clone())
                        .unwrap_or_default();
                    report.skip(
                        &node.name,
                        format!("animation dropped: node was merged into '{}'", target),
                    );
                }
                continue;
            }
            let mut clip = encoder
                .encode(node.id, &node.name, &node.source_transform, animation)
                .with_context(|| format!("sampling animation of '{}'", node.name))?;
            if let (Some(clip), Some(splice)) = (clip.as_mut(), node.spliced) {
                rebase_keyframes(&mut clip.keyframes, &splice);
            }
            clips.extend(clip);
        }

        report.animated_nodes = clips.len();
        if !clips.is_empty() {
            info!(clips = clips.len(), "Animation sampled");
            graph.animation = Some(AnimationSet {
                name: graph.name.clone(),
                clips,
            });
        }
        Ok(())
    }
}

/// Move sampled local transforms into the space of a spliced node's new
/// parent. Channels the clip does not animate come from the pre-splice local.
fn rebase_keyframes(keyframes: &mut [Keyframe], splice: &Splice) {
    for key in keyframes {
        let local = Transform {
            translation: key.translation.unwrap_or(splice.original.translation),
            rotation: key
                .rotation
                .map(|r| Vec3::new(r.degrees.x.to_radians(), r.degrees.y.to_radians(), r.degrees.z.to_radians()))
                .unwrap_or(splice.original.rotation),
            scale: key.scale.unwrap_or(splice.original.scale),
        };
        let rebased = splice.offset.mul(&Affine::from_transform(&local)).to_transform();
        key.translation = Some(rebased.translation);
        key.rotation = Some(EncodedRotation::from_radians(rebased.rotation));
        key.scale = Some(rebased.scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i3d_core::{Transform, Vec3};
    use i3d_scene::{SceneDescription, SourceMesh};

    fn triangle() -> SourceMesh {
        SourceMesh::from_indexed(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        )
    }

    fn build(scene: &SceneDescription, config: &ExportConfig) -> Result<(SceneGraph, ExportReport)> {
        let cancel = CancelToken::new();
        let mut report = ExportReport::new();
        let graph = SceneGraphBuilder::new(config, &cancel).build(scene, &mut report)?;
        Ok((graph, report))
    }

    fn tree() -> SceneDescription {
        let mut scene = SceneDescription::new("tree", 24.0);
        scene.push_root(SourceObject::new("A", NodeKind::Transform)).unwrap();
        scene.push_child("A", SourceObject::new("A0", NodeKind::Transform)).unwrap();
        scene.push_child("A", SourceObject::new("A1", NodeKind::Transform)).unwrap();
        scene.push_child("A1", SourceObject::new("A1a", NodeKind::Transform)).unwrap();
        scene.push_root(SourceObject::new("B", NodeKind::Transform)).unwrap();
        scene
    }

    #[test]
    fn test_ids_and_paths_depth_first() {
        let (graph, report) = build(&tree(), &ExportConfig::default()).unwrap();
        let walked: Vec<(u32, String, String)> = graph
            .walk()
            .into_iter()
            .map(|i| {
                let n = graph.node(i);
                (n.id.0, n.path.to_string(), n.name.clone())
            })
            .collect();
        assert_eq!(
            walked,
            vec![
                (1, "0>".to_string(), "A".to_string()),
                (2, "0>0".to_string(), "A0".to_string()),
                (3, "0>1".to_string(), "A1".to_string()),
                (4, "0>1|0".to_string(), "A1a".to_string()),
                (5, "1>".to_string(), "B".to_string()),
            ]
        );
        assert_eq!(report.nodes.len(), 5);
    }

    #[test]
    fn test_missing_child() {
        let mut scene = tree();
        scene.object_mut("A").unwrap().children.push("ghost".into());
        let err = build(&scene, &ExportConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_cycle() {
        let mut scene = tree();
        scene.object_mut("A1a").unwrap().children.push("A1".into());
        let err = build(&scene, &ExportConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
    }

    #[test]
    fn test_parent_mismatch() {
        let mut scene = tree();
        scene.object_mut("A0").unwrap().parent = Some("B".into());
        assert!(build(&scene, &ExportConfig::default()).is_err());

        let mut scene = tree();
        scene.object_mut("B").unwrap().parent = Some("A".into());
        assert!(build(&scene, &ExportConfig::default()).is_err());
    }

    #[test]
    fn test_world_transforms_baked() {
        let mut scene = SceneDescription::new("bake", 24.0);
        scene
            .push_root(
                SourceObject::new("Body", NodeKind::Transform)
                    .with_transform(Transform::from_translation(Vec3::new(0.0, 2.0, 1.0))),
            )
            .unwrap();
        scene
            .push_child(
                "Body",
                SourceObject::shape("Cab", triangle(), Vec::new())
                    .with_transform(Transform::from_translation(Vec3::new(1.0, 0.0, 0.0))),
            )
            .unwrap();
        let (graph, _) = build(&scene, &ExportConfig::default()).unwrap();
        let body = graph.find("Body").unwrap();
        assert_eq!(body.transform.translation, Vec3::new(0.0, 1.0, -2.0));
        let cab = graph.find("Cab").unwrap();
        assert_eq!(cab.world.transform_point(Vec3::ZERO), Vec3::new(1.0, 1.0, -2.0));
        assert!(cab.is_shape());
    }

    #[test]
    fn test_kind_downgrade() {
        let mut scene = SceneDescription::new("toggles", 24.0);
        scene.push_root(SourceObject::shape("Box", triangle(), Vec::new())).unwrap();
        scene.push_root(SourceObject::new("Sun", NodeKind::Light)).unwrap();
        let config = ExportConfig {
            export: i3d_core::ExportToggles {
                shapes: false,
                lights: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let (graph, _) = build(&scene, &config).unwrap();
        assert_eq!(graph.find("Box").unwrap().kind, NodeKind::Transform);
        assert!(graph.find("Box").unwrap().mesh.is_none());
        let sun = graph.find("Sun").unwrap();
        assert_eq!(sun.kind, NodeKind::Transform);
        assert!(sun.light.is_none());
    }

    #[test]
    fn test_shape_without_mesh_is_reported() {
        let mut scene = SceneDescription::new("empty", 24.0);
        scene.push_root(SourceObject::new("Hull", NodeKind::Shape)).unwrap();
        scene
            .push_root(SourceObject::shape(
                "Flat",
                SourceMesh::from_indexed(vec![[0.0; 3]], &[]),
                Vec::new(),
            ))
            .unwrap();
        let (graph, report) = build(&scene, &ExportConfig::default()).unwrap();
        assert_eq!(graph.find("Hull").unwrap().kind, NodeKind::Transform);
        assert_eq!(graph.find("Flat").unwrap().kind, NodeKind::Transform);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn test_cancelled_before_encoding() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let config = ExportConfig::default();
        let mut report = ExportReport::new();
        let result = SceneGraphBuilder::new(&config, &cancel).build(&tree(), &mut report);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
