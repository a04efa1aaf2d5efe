//! Normalized scene graph
//!
//! Nodes live in an arena; the tree is expressed with arena indices. Merge
//! groups add consolidated nodes to the arena and splice them into the tree
//! in place of the group root, while the source members stay in the arena
//! marked as not exported.

use std::collections::BTreeMap;

use i3d_core::{Affine, IndexPath, NodeId, NodeKind, ParamValue, Transform};
use i3d_scene::{BoundingVolumeSettings, SourceCamera, SourceLight, SourceMaterial};

use crate::animation::AnimationSet;
use crate::geometry::EncodedMesh;
use crate::report::NodeSummary;
use crate::skin::BoneRegistry;

/// Re-parenting applied to a node whose parent was merged away
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splice {
    /// `inverse(new parent world) * old parent world`
    pub offset: Affine,
    /// Local transform relative to the old parent
    pub original: Transform,
}

/// One node of the normalized tree
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub id: NodeId,
    pub path: IndexPath,
    /// Key of the source object
    pub key: String,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Local transform in export space
    pub transform: Transform,
    /// Local transform as authored
    pub source_transform: Transform,
    /// World transform in export space
    pub world: Affine,
    pub visible: bool,
    /// Written to the document
    pub exported: bool,
    /// Consolidated node this member was merged into
    pub merged_into: Option<usize>,
    /// Set when the node is written under a different parent than authored
    pub spliced: Option<Splice>,
    pub mesh: Option<EncodedMesh>,
    pub materials: Vec<SourceMaterial>,
    pub merge_group: Option<String>,
    pub merge_group_root: bool,
    pub bounding_volume: BoundingVolumeSettings,
    pub attributes: BTreeMap<String, ParamValue>,
    pub light: Option<SourceLight>,
    pub camera: Option<SourceCamera>,
    pub user_attributes: BTreeMap<String, ParamValue>,
}

impl SceneNode {
    /// A plain exported node with identity transforms
    pub fn new(id: NodeId, path: IndexPath, key: impl Into<String>, kind: NodeKind) -> Self {
        let key = key.into();
        Self {
            id,
            path,
            name: key.clone(),
            key,
            kind,
            parent: None,
            children: Vec::new(),
            transform: Transform::IDENTITY,
            source_transform: Transform::IDENTITY,
            world: Affine::IDENTITY,
            visible: true,
            exported: true,
            merged_into: None,
            spliced: None,
            mesh: None,
            materials: Vec::new(),
            merge_group: None,
            merge_group_root: false,
            bounding_volume: BoundingVolumeSettings::default(),
            attributes: BTreeMap::new(),
            light: None,
            camera: None,
            user_attributes: BTreeMap::new(),
        }
    }

    /// Material slot count; a mesh without materials has one default slot
    pub fn slot_count(&self) -> usize {
        self.materials.len().max(1)
    }

    pub fn is_shape(&self) -> bool {
        self.kind == NodeKind::Shape && self.mesh.is_some()
    }
}

/// The normalized tree of one export
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub name: String,
    pub fps: f64,
    pub nodes: Vec<SceneNode>,
    /// Root nodes in sibling order
    pub roots: Vec<usize>,
    pub bones: BoneRegistry,
    pub animation: Option<AnimationSet>,
}

impl SceneGraph {
    pub fn new(name: impl Into<String>, fps: f64) -> Self {
        Self {
            name: name.into(),
            fps,
            ..Default::default()
        }
    }

    pub fn node(&self, index: usize) -> &SceneNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut SceneNode {
        &mut self.nodes[index]
    }

    /// Append a node to the arena and return its index
    pub fn push(&mut self, node: SceneNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Every node reachable from the roots, depth-first in sibling order
    pub fn walk(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.nodes[index].children.iter().rev().copied());
        }
        order
    }

    /// Exported nodes depth-first in sibling order
    pub fn exported(&self) -> Vec<usize> {
        self.walk()
            .into_iter()
            .filter(|&i| self.nodes[i].exported)
            .collect()
    }

    /// Exported nodes standing in for `indices`: non-exported nodes are
    /// replaced by their own exported descendants
    pub fn exported_children(&self, indices: &[usize]) -> Vec<usize> {
        let mut result = Vec::new();
        for &index in indices {
            let node = &self.nodes[index];
            if node.exported {
                result.push(index);
            } else {
                result.extend(self.exported_children(&node.children));
            }
        }
        result
    }

    /// Replace `old` by `new` in the tree; `new` takes over the children
    pub fn replace_in_tree(&mut self, old: usize, new: usize) {
        let parent = self.nodes[old].parent;
        let siblings = match parent {
            Some(p) => &mut self.nodes[p].children,
            None => &mut self.roots,
        };
        if let Some(slot) = siblings.iter_mut().find(|i| **i == old) {
            *slot = new;
        }
        let children = self.nodes[old].children.clone();
        for &child in &children {
            self.nodes[child].parent = Some(new);
        }
        self.nodes[new].parent = parent;
        self.nodes[new].children = children;
    }

    /// Nearest exported ancestor of `index`
    pub fn exported_parent(&self, index: usize) -> Option<usize> {
        let mut current = self.nodes[index].parent;
        while let Some(p) = current {
            if self.nodes[p].exported {
                return Some(p);
            }
            current = self.nodes[p].parent;
        }
        None
    }

    /// First exported node with this name
    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        self.exported()
            .into_iter()
            .map(|i| &self.nodes[i])
            .find(|n| n.name == name)
    }

    /// Exported node carrying `id`
    pub fn by_id(&self, id: NodeId) -> Option<&SceneNode> {
        self.walk()
            .into_iter()
            .map(|i| &self.nodes[i])
            .find(|n| n.exported && n.id == id)
    }

    /// Summaries of every node in the tree, in walk order
    pub fn summaries(&self) -> Vec<NodeSummary> {
        self.walk()
            .into_iter()
            .map(|i| {
                let node = &self.nodes[i];
                NodeSummary {
                    id: node.id.0,
                    path: node.path.to_string(),
                    name: node.name.clone(),
                    kind: node.kind.to_string(),
                    exported: node.exported,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root(0) -> [a(1) -> [c(3)], b(2)]
    fn make_graph() -> SceneGraph {
        let mut graph = SceneGraph::new("test", 24.0);
        let root = graph.push(SceneNode::new(NodeId(1), IndexPath::root(0), "root", NodeKind::Transform));
        let a = graph.push(SceneNode::new(NodeId(2), IndexPath::root(0).child(0), "a", NodeKind::Transform));
        let b = graph.push(SceneNode::new(NodeId(4), IndexPath::root(0).child(1), "b", NodeKind::Transform));
        let c = graph.push(SceneNode::new(NodeId(3), IndexPath::root(0).child(0).child(0), "c", NodeKind::Transform));
        graph.roots.push(root);
        graph.nodes[root].children = vec![a, b];
        graph.nodes[a].parent = Some(root);
        graph.nodes[b].parent = Some(root);
        graph.nodes[a].children = vec![c];
        graph.nodes[c].parent = Some(a);
        graph
    }

    #[test]
    fn test_walk_is_depth_first() {
        let graph = make_graph();
        let names: Vec<&str> = graph.walk().iter().map(|&i| graph.node(i).key.as_str()).collect();
        assert_eq!(names, vec!["root", "a", "c", "b"]);
    }

    #[test]
    fn test_exported_children_splices() {
        let mut graph = make_graph();
        graph.nodes[1].exported = false;
        let children = graph.exported_children(&graph.node(0).children.clone());
        let names: Vec<&str> = children.iter().map(|&i| graph.node(i).key.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn test_exported_parent_skips_hidden_ancestors() {
        let mut graph = make_graph();
        assert_eq!(graph.exported_parent(3), Some(1));
        graph.nodes[1].exported = false;
        assert_eq!(graph.exported_parent(3), Some(0));
        graph.nodes[0].exported = false;
        assert_eq!(graph.exported_parent(3), None);
    }

    #[test]
    fn test_replace_in_tree() {
        let mut graph = make_graph();
        let merged = graph.push(SceneNode::new(NodeId(2), IndexPath::root(0).child(0), "merged", NodeKind::Shape));
        graph.replace_in_tree(1, merged);

        assert_eq!(graph.node(0).children, vec![merged, 2]);
        assert_eq!(graph.node(merged).children, vec![3]);
        assert_eq!(graph.node(3).parent, Some(merged));
        let names: Vec<&str> = graph.walk().iter().map(|&i| graph.node(i).key.as_str()).collect();
        assert_eq!(names, vec!["root", "merged", "c", "b"]);
    }

    #[test]
    fn test_summaries() {
        let graph = make_graph();
        let summaries = graph.summaries();
        assert_eq!(summaries[2].path, "0>0|0");
        assert_eq!(summaries[2].id, 3);
        assert_eq!(graph.by_id(NodeId(4)).unwrap().key, "b");
    }
}
