//! Merge-group consolidation
//!
//! Shapes sharing a merge-group tag are written as one shape. Members are
//! collected in depth-first order, checked for identical material-slot
//! topology against the group root, transformed into the root's space and
//! concatenated. A mismatch rejects only that group; its members then export
//! individually.

use std::collections::HashMap;

use tracing::{debug, info};

use i3d_core::{Affine, BoundingBox, BoundingVolume, ConflictError, NodeKind};

use crate::geometry::{EncodedMesh, GeometryEncoder, Subset};
use crate::graph::{SceneGraph, SceneNode, Splice};
use crate::report::ExportReport;

/// Material-slot topology of a member: declared shader per slot
fn topology(node: &SceneNode) -> Vec<&str> {
    node.materials.iter().map(|m| m.shader_key()).collect()
}

fn describe(slots: &[&str]) -> String {
    let shaders: Vec<&str> = slots
        .iter()
        .map(|s| if s.is_empty() { "<none>" } else { s })
        .collect();
    format!("{} slot(s) [{}]", slots.len(), shaders.join(", "))
}

/// Check every member against the group root
pub fn check_topology(
    group: &str,
    root: &SceneNode,
    members: &[&SceneNode],
) -> Result<(), ConflictError> {
    let expected = topology(root);
    let root_skinned = root.mesh.as_ref().map(|m| m.skin.is_some()).unwrap_or(false);

    let mut offending = Vec::new();
    let mut reason = None;
    for member in members {
        let slots = topology(member);
        let skinned = member.mesh.as_ref().map(|m| m.skin.is_some()).unwrap_or(false);
        if slots != expected {
            reason.get_or_insert_with(|| {
                format!(
                    "'{}' has {}, group root '{}' has {}",
                    member.name,
                    describe(&slots),
                    root.name,
                    describe(&expected)
                )
            });
            offending.push(member.name.clone());
        } else if skinned != root_skinned {
            reason.get_or_insert_with(|| {
                format!("'{}' and group root '{}' differ in skinning", member.name, root.name)
            });
            offending.push(member.name.clone());
        }
    }

    match reason {
        None => Ok(()),
        Some(reason) => Err(ConflictError {
            group: group.to_string(),
            offending,
            reason,
        }),
    }
}

/// Concatenate meshes slot by slot; indices are offset by the vertices
/// already emitted. All parts must already be in the target space.
pub fn merge_meshes(parts: &[EncodedMesh], slot_count: usize) -> EncodedMesh {
    let normals = parts.iter().any(|m| m.normals.is_some());
    let uvs = parts.iter().any(|m| m.uvs.is_some());
    let colors = parts.iter().any(|m| m.colors.is_some());
    let skin = parts.iter().all(|m| m.skin.is_some()) && !parts.is_empty();

    let mut merged = EncodedMesh {
        positions: Vec::new(),
        normals: normals.then(Vec::new),
        uvs: uvs.then(Vec::new),
        colors: colors.then(Vec::new),
        skin: skin.then(Vec::new),
        indices: Vec::new(),
        subsets: Vec::new(),
        bounding_volume: BoundingVolume::Box(BoundingBox::EMPTY),
        uv_density: Vec::new(),
    };

    for slot in 0..slot_count as u32 {
        let first_vertex = merged.positions.len() as u32;
        let first_index = merged.indices.len() as u32;

        for part in parts {
            for subset in part.subsets.iter().filter(|s| s.material_slot == slot) {
                let base = merged.positions.len() as u32;
                let range = subset.first_vertex as usize..(subset.first_vertex + subset.vertex_count) as usize;

                merged.positions.extend_from_slice(&part.positions[range.clone()]);
                if let Some(out) = &mut merged.normals {
                    match &part.normals {
                        Some(n) => out.extend_from_slice(&n[range.clone()]),
                        None => out.extend(range.clone().map(|_| [0.0, 0.0, 0.0])),
                    }
                }
                if let Some(out) = &mut merged.uvs {
                    match &part.uvs {
                        Some(uv) => out.extend_from_slice(&uv[range.clone()]),
                        None => out.extend(range.clone().map(|_| [0.0, 0.0])),
                    }
                }
                if let Some(out) = &mut merged.colors {
                    match &part.colors {
                        Some(c) => out.extend_from_slice(&c[range.clone()]),
                        None => out.extend(range.clone().map(|_| [1.0, 1.0, 1.0, 1.0])),
                    }
                }
                if let (Some(out), Some(s)) = (&mut merged.skin, &part.skin) {
                    out.extend_from_slice(&s[range.clone()]);
                }

                let start = subset.first_index as usize;
                let end = start + subset.index_count as usize;
                merged.indices.extend(
                    part.indices[start..end]
                        .iter()
                        .map(|&i| i - subset.first_vertex + base),
                );
            }
        }

        let index_count = merged.indices.len() as u32 - first_index;
        if index_count > 0 {
            merged.subsets.push(Subset {
                material_slot: slot,
                first_vertex,
                vertex_count: merged.positions.len() as u32 - first_vertex,
                first_index,
                index_count,
            });
        }
    }

    merged.update_uv_density(slot_count);
    merged
}

/// Consolidates tagged shapes in a built scene graph
#[derive(Debug)]
pub struct MergeGroupResolver<'a> {
    encoder: &'a GeometryEncoder<'a>,
}

impl<'a> MergeGroupResolver<'a> {
    pub fn new(encoder: &'a GeometryEncoder<'a>) -> Self {
        Self { encoder }
    }

    /// Tagged shapes grouped by tag, groups and members in depth-first order
    fn collect_groups(graph: &SceneGraph, report: &mut ExportReport) -> Vec<(String, Vec<usize>)> {
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for index in graph.walk() {
            let node = graph.node(index);
            let Some(tag) = node.merge_group.as_deref() else {
                continue;
            };
            if !node.is_shape() || !node.exported {
                report.warn(format!(
                    "'{}' is tagged with merge group '{}' but has no exported mesh; tag ignored",
                    node.name, tag
                ));
                continue;
            }
            let slot = *positions.entry(tag.to_string()).or_insert_with(|| {
                groups.push((tag.to_string(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(index);
        }
        groups
    }

    /// Resolve every merge group of the graph
    pub fn resolve(&self, graph: &mut SceneGraph, report: &mut ExportReport) {
        for (tag, members) in Self::collect_groups(graph, report) {
            if members.len() < 2 {
                report.warn(format!(
                    "merge group '{}' has a single member '{}'; exported as a normal shape",
                    tag,
                    graph.node(members[0]).name
                ));
                continue;
            }

            let flagged: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&i| graph.node(i).merge_group_root)
                .collect();
            if flagged.len() > 1 {
                report.warn(format!(
                    "merge group '{}' has {} root members; using '{}'",
                    tag,
                    flagged.len(),
                    graph.node(flagged[0]).name
                ));
            }
            let root = flagged.first().copied().unwrap_or(members[0]);

            let member_refs: Vec<&SceneNode> = members.iter().map(|&i| graph.node(i)).collect();
            if let Err(conflict) = check_topology(&tag, graph.node(root), &member_refs) {
                report.conflict(conflict);
                continue;
            }

            let Some(root_inverse) = graph.node(root).world.inverse() else {
                report.conflict(ConflictError {
                    group: tag.clone(),
                    offending: vec![graph.node(root).name.clone()],
                    reason: "group root has a zero scale".to_string(),
                });
                continue;
            };

            let consolidated = self.consolidate(graph, &tag, root, &members, &root_inverse);
            info!(
                group = %tag,
                members = members.len(),
                vertices = graph.node(consolidated).mesh.as_ref().map(|m| m.vertex_count()).unwrap_or(0),
                "Merged group"
            );
        }
        Self::rebase_spliced(graph, report);
    }

    /// Exported children of non-root members are written under the nearest
    /// exported ancestor; re-express their local transforms in its space so
    /// their world placement is unchanged.
    fn rebase_spliced(graph: &mut SceneGraph, report: &mut ExportReport) {
        for index in graph.walk() {
            let node = graph.node(index);
            let Some(old_parent) = node.parent else {
                continue;
            };
            if !node.exported || graph.node(old_parent).exported {
                continue;
            }
            let new_world = graph
                .exported_parent(index)
                .map(|p| graph.node(p).world)
                .unwrap_or(Affine::IDENTITY);
            let Some(new_inverse) = new_world.inverse() else {
                report.warn(format!(
                    "'{}' is placed under a zero-scale parent after merging; transform kept",
                    node.name
                ));
                continue;
            };
            let splice = Splice {
                offset: new_inverse.mul(&graph.node(old_parent).world),
                original: node.transform,
            };
            let rebased = splice.offset.mul(&Affine::from_transform(&node.transform)).to_transform();
            debug!(node = %node.name, "Rebased under merged parent");

            let node = graph.node_mut(index);
            node.transform = rebased;
            node.spliced = Some(splice);
        }
    }

    fn consolidate(
        &self,
        graph: &mut SceneGraph,
        tag: &str,
        root: usize,
        members: &[usize],
        root_inverse: &Affine,
    ) -> usize {
        let parts: Vec<EncodedMesh> = members
            .iter()
            .filter_map(|&i| {
                let node = graph.node(i);
                let to_root = root_inverse.mul(&node.world);
                node.mesh.as_ref().map(|m| m.transformed(&to_root))
            })
            .collect();

        let root_node = graph.node(root);
        let slot_count = root_node.slot_count();
        let mut mesh = merge_meshes(&parts, slot_count);
        let settings = root_node.bounding_volume;
        mesh.update_bounds(
            settings.mode,
            settings.override_box.map(|b| self.encoder.export_box(&b)),
        );

        let node = SceneNode {
            name: tag.to_string(),
            kind: NodeKind::Shape,
            exported: true,
            merged_into: None,
            spliced: None,
            mesh: Some(mesh),
            merge_group: None,
            merge_group_root: false,
            light: None,
            camera: None,
            parent: None,
            children: Vec::new(),
            ..root_node.clone()
        };
        let consolidated = graph.push(node);
        graph.replace_in_tree(root, consolidated);

        for &member in members {
            let node = graph.node_mut(member);
            node.exported = false;
            node.merged_into = Some(consolidated);
            debug!(member = %node.name, group = %tag, "Member merged");
        }
        consolidated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i3d_core::{ExportConfig, IndexPath, NodeId, Transform, Vec3};
    use i3d_scene::{SourceMaterial, SourceMesh};

    fn strip(count: u32) -> SourceMesh {
        let mut positions = Vec::new();
        for i in 0..count {
            positions.push([i as f32, 0.0, 0.0]);
            positions.push([i as f32, 1.0, 0.0]);
        }
        let mut triangles = Vec::new();
        for i in 0..count.saturating_sub(1) {
            let b = i * 2;
            triangles.push([b, b + 2, b + 1]);
            triangles.push([b + 1, b + 2, b + 3]);
        }
        SourceMesh::from_indexed(positions, &triangles)
    }

    fn material(shader: &str) -> SourceMaterial {
        SourceMaterial {
            shader: Some(shader.to_string()),
            ..SourceMaterial::new("m")
        }
    }

    fn shape(
        graph: &mut SceneGraph,
        config: &ExportConfig,
        name: &str,
        id: u32,
        materials: Vec<SourceMaterial>,
        x: f64,
    ) -> usize {
        let mut node = SceneNode::new(NodeId(id), IndexPath::root(id - 1), name, NodeKind::Shape);
        node.materials = materials;
        node.merge_group = Some("wheels".into());
        node.transform = Transform::from_translation(Vec3::new(x, 0.0, 0.0));
        node.world = Affine::from_transform(&node.transform);
        node.mesh = GeometryEncoder::new(config)
            .encode(name, &strip(50), None, node.slot_count(), &Default::default())
            .unwrap();
        let index = graph.push(node);
        graph.roots.push(index);
        index
    }

    fn keep() -> ExportConfig {
        ExportConfig {
            axis_orientation: i3d_core::AxisOrientation::KeepTransforms,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_two_wheels() {
        let config = keep();
        let encoder = GeometryEncoder::new(&config);
        let mut graph = SceneGraph::new("t", 24.0);
        let left = shape(&mut graph, &config, "WheelL", 1, vec![material("tire")], 0.0);
        let right = shape(&mut graph, &config, "WheelR", 2, vec![material("tire")], 5.0);
        let mut report = ExportReport::new();

        MergeGroupResolver::new(&encoder).resolve(&mut graph, &mut report);

        assert!(report.conflicts.is_empty());
        let exported = graph.exported();
        assert_eq!(exported.len(), 1);
        let merged = graph.node(exported[0]);
        assert_eq!(merged.name, "wheels");
        assert_eq!(merged.id, NodeId(1));
        let mesh = merged.mesh.as_ref().unwrap();
        assert_eq!(mesh.vertex_count(), 200);

        let single = graph.node(left).mesh.as_ref().unwrap();
        let half = single.indices.len();
        for (a, b) in single.indices.iter().zip(&mesh.indices[half..]) {
            assert_eq!(*a + 100, *b);
        }
        // WheelR sits 5 units to the right of the root
        assert_eq!(mesh.positions[100], [5.0, 0.0, 0.0]);
        match mesh.bounding_volume {
            BoundingVolume::Box(b) => assert_eq!(b.max.x, 54.0),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!graph.node(left).exported);
        assert!(!graph.node(right).exported);
        assert_eq!(graph.node(right).merged_into, Some(exported[0]));
    }

    #[test]
    fn test_child_of_merged_member_keeps_world_position() {
        let config = keep();
        let encoder = GeometryEncoder::new(&config);
        let mut graph = SceneGraph::new("t", 24.0);
        shape(&mut graph, &config, "WheelL", 1, vec![material("tire")], 0.0);
        let right = shape(&mut graph, &config, "WheelR", 2, vec![material("tire")], 5.0);
        let mut bolt = SceneNode::new(NodeId(3), IndexPath::root(1).child(0), "Bolt", NodeKind::Transform);
        bolt.transform = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        bolt.world = graph.node(right).world.mul(&Affine::from_transform(&bolt.transform));
        bolt.parent = Some(right);
        let bolt = graph.push(bolt);
        graph.node_mut(right).children.push(bolt);
        let mut report = ExportReport::new();

        MergeGroupResolver::new(&encoder).resolve(&mut graph, &mut report);

        let roots = graph.exported_children(&graph.roots.clone());
        let names: Vec<&str> = roots.iter().map(|&i| graph.node(i).name.as_str()).collect();
        assert_eq!(names, vec!["wheels", "Bolt"]);
        let node = graph.node(bolt);
        assert_eq!(node.transform.translation, Vec3::new(6.0, 0.0, 0.0));
        let splice = node.spliced.unwrap();
        assert_eq!(splice.original.translation, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(splice.offset.translation, Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_child_of_group_root_is_not_rebased() {
        let config = keep();
        let encoder = GeometryEncoder::new(&config);
        let mut graph = SceneGraph::new("t", 24.0);
        let left = shape(&mut graph, &config, "WheelL", 1, vec![material("tire")], 2.0);
        shape(&mut graph, &config, "WheelR", 2, vec![material("tire")], 5.0);
        let mut hub = SceneNode::new(NodeId(3), IndexPath::root(0).child(0), "Hub", NodeKind::Transform);
        hub.transform = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        hub.world = graph.node(left).world.mul(&Affine::from_transform(&hub.transform));
        hub.parent = Some(left);
        let hub = graph.push(hub);
        graph.node_mut(left).children.push(hub);
        let mut report = ExportReport::new();

        MergeGroupResolver::new(&encoder).resolve(&mut graph, &mut report);

        let node = graph.node(hub);
        assert!(node.spliced.is_none());
        assert_eq!(node.transform.translation, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(graph.node(node.parent.unwrap()).name, "wheels");
    }

    #[test]
    fn test_slot_count_mismatch_is_a_conflict() {
        let config = keep();
        let encoder = GeometryEncoder::new(&config);
        let mut graph = SceneGraph::new("t", 24.0);
        shape(&mut graph, &config, "WheelL", 1, vec![material("tire")], 0.0);
        shape(&mut graph, &config, "WheelR", 2, vec![material("tire"), material("rim")], 5.0);
        let mut report = ExportReport::new();

        MergeGroupResolver::new(&encoder).resolve(&mut graph, &mut report);

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].group, "wheels");
        assert_eq!(report.conflicts[0].offending, vec!["WheelR".to_string()]);
        assert_eq!(graph.exported().len(), 2);
    }

    #[test]
    fn test_flagged_root_wins() {
        let config = keep();
        let encoder = GeometryEncoder::new(&config);
        let mut graph = SceneGraph::new("t", 24.0);
        shape(&mut graph, &config, "WheelL", 1, vec![material("tire")], 0.0);
        let right = shape(&mut graph, &config, "WheelR", 2, vec![material("tire")], 5.0);
        graph.node_mut(right).merge_group_root = true;
        let mut report = ExportReport::new();

        MergeGroupResolver::new(&encoder).resolve(&mut graph, &mut report);

        let exported = graph.exported();
        let merged = graph.node(exported[0]);
        assert_eq!(merged.id, NodeId(2));
        // WheelL is 5 units left of the root
        assert_eq!(merged.mesh.as_ref().unwrap().positions[0], [-5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_single_member_is_not_merged() {
        let config = keep();
        let encoder = GeometryEncoder::new(&config);
        let mut graph = SceneGraph::new("t", 24.0);
        shape(&mut graph, &config, "WheelL", 1, vec![material("tire")], 0.0);
        let mut report = ExportReport::new();

        MergeGroupResolver::new(&encoder).resolve(&mut graph, &mut report);

        assert_eq!(graph.exported().len(), 1);
        assert_eq!(graph.node(0).name, "WheelL");
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_merge_meshes_slot_major() {
        let config = keep();
        let encoder = GeometryEncoder::new(&config);
        let mut source = strip(2);
        source.triangles[1].material_slot = 1;
        let part = encoder
            .encode("p", &source, None, 2, &Default::default())
            .unwrap()
            .unwrap();
        let merged = merge_meshes(&[part.clone(), part], 2);

        assert_eq!(merged.subsets.len(), 2);
        assert_eq!(merged.subsets[0].index_count, 6);
        assert_eq!(merged.subsets[0].vertex_count, 6);
        assert_eq!(merged.subsets[1].first_vertex, 6);
        assert_eq!(merged.subsets[1].first_index, 6);
        assert_eq!(&merged.indices[3..6], &[3, 4, 5]);
    }
}
