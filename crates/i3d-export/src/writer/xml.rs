//! XML section builders
//!
//! Attributes are inserted in a fixed order (xmltree keeps insertion order
//! with the `attribute-order` feature), so the same graph always produces the
//! same bytes.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use xmltree::{Element, EmitterConfig, XMLNode};

use i3d_core::math::to_degrees;
use i3d_core::{
    format_float, format_floats, BoundingVolume, Error, NodeId, NodeKind, ParamValue, Result, Vec3,
};
use i3d_scene::{SourceCamera, SourceLight};

use super::binary::pack_influences;
use super::{DocumentPlan, PlannedShape, I3D_VERSION};
use crate::animation::{AnimationSet, Keyframe};
use crate::cancel::CancelToken;
use crate::defaults::AttributeDiffWriter;
use crate::geometry::EncodedMesh;
use crate::graph::{SceneGraph, SceneNode};

pub(crate) fn element(name: &str) -> Element {
    Element::new(name)
}

pub(crate) fn set(element: &mut Element, name: &str, value: impl Into<String>) {
    element.attributes.insert(name.to_string(), value.into());
}

pub(crate) fn push(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

fn set_all(element: &mut Element, attributes: Vec<(String, ParamValue)>) {
    for (name, value) in attributes {
        set(element, &name, value.to_attribute_string());
    }
}

fn vec3(v: Vec3) -> String {
    format_floats(&v.to_array())
}

fn f32s(values: &[f32]) -> String {
    let values: Vec<f64> = values.iter().map(|v| *v as f64).collect();
    format_floats(&values)
}

fn ids(values: impl IntoIterator<Item = u32>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn root(name: &str) -> Element {
    let mut root = element("i3D");
    set(&mut root, "name", name);
    set(&mut root, "version", I3D_VERSION);
    root
}

pub(crate) fn asset() -> Element {
    let mut asset = element("Asset");
    let mut export = element("Export");
    set(&mut export, "program", "i3dexporter");
    set(&mut export, "version", env!("CARGO_PKG_VERSION"));
    push(&mut asset, export);
    asset
}

pub(crate) fn files(plan: &DocumentPlan) -> Element {
    let mut files = element("Files");
    for (id, filename) in plan.files.entries() {
        let mut file = element("File");
        set(&mut file, "fileId", id.to_string());
        set(&mut file, "filename", filename);
        push(&mut files, file);
    }
    files
}

pub(crate) fn materials(plan: &DocumentPlan) -> Element {
    let mut materials = element("Materials");
    for planned in &plan.materials {
        let material = &planned.material;
        let mut e = element("Material");
        set(&mut e, "name", material.name.as_str());
        set(&mut e, "materialId", planned.id.to_string());
        set_all(&mut e, material.attributes.clone());
        if let Some(shader) = planned.shader_file {
            set(&mut e, "customShaderId", shader.to_string());
            if let Some(variation) = &material.shader_variation {
                set(&mut e, "customShaderVariation", variation.as_str());
            }
        }
        for (slot, file_id) in material.textures.iter().zip(&planned.texture_files) {
            let mut texture = element(slot.kind.element_name());
            if let Some(name) = &slot.name {
                set(&mut texture, "name", name.as_str());
            }
            set(&mut texture, "fileId", file_id.to_string());
            push(&mut e, texture);
        }
        for (name, value) in &material.custom_parameters {
            let mut parameter = element("CustomParameter");
            set(&mut parameter, "name", name.as_str());
            set(&mut parameter, "value", value.to_attribute_string());
            push(&mut e, parameter);
        }
        push(&mut materials, e);
    }
    materials
}

/// `<Shapes>` with every mesh inline
pub(crate) fn embedded_shapes(
    graph: &SceneGraph,
    plan: &DocumentPlan,
    cancel: &CancelToken,
) -> Result<Element> {
    let mut shapes = element("Shapes");
    for shape in &plan.shapes {
        cancel.check()?;
        let node = graph.node(shape.node);
        let Some(mesh) = &node.mesh else {
            return Err(Error::internal(format!("shape '{}' lost its mesh", node.name)));
        };
        push(&mut shapes, triangle_set(&node.name, shape, mesh));
    }
    Ok(shapes)
}

/// `<Shapes>` pointing at the binary subfile
pub(crate) fn external_shapes(file_name: &str) -> Element {
    let mut shapes = element("Shapes");
    set(&mut shapes, "externalShapesFile", file_name);
    shapes
}

fn triangle_set(name: &str, shape: &PlannedShape, mesh: &EncodedMesh) -> Element {
    let mut set_e = element("IndexedTriangleSet");
    set(&mut set_e, "name", name);
    set(&mut set_e, "shapeId", shape.shape_id.to_string());

    let streams = mesh.streams();
    let mut vertices = element("Vertices");
    set(&mut vertices, "count", mesh.vertex_count().to_string());
    if streams.normals {
        set(&mut vertices, "normal", "true");
    }
    if streams.uvs {
        set(&mut vertices, "uv0", "true");
    }
    if streams.colors {
        set(&mut vertices, "color", "true");
    }
    if streams.skin {
        set(&mut vertices, "blendweights", "true");
    }

    let palette: HashMap<NodeId, u8> = shape
        .palette
        .iter()
        .enumerate()
        .map(|(i, bone)| (*bone, i as u8))
        .collect();
    for i in 0..mesh.vertex_count() {
        let vertex = mesh.vertex(i);
        let mut v = element("v");
        set(&mut v, "p", f32s(&vertex.position));
        if let Some(n) = vertex.normal {
            set(&mut v, "n", f32s(&n));
        }
        if let Some(uv) = vertex.uv {
            set(&mut v, "t0", f32s(&uv));
        }
        if let Some(c) = vertex.color {
            set(&mut v, "c", f32s(&c));
        }
        if let Some(binding) = &vertex.skin {
            let (indices, weights) = pack_influences(binding, &palette);
            set(&mut v, "bw", f32s(&weights));
            set(&mut v, "bi", ids(indices.iter().map(|i| *i as u32)));
        }
        push(&mut vertices, v);
    }
    push(&mut set_e, vertices);

    let mut triangles = element("Triangles");
    set(&mut triangles, "count", mesh.triangle_count().to_string());
    for tri in mesh.indices.chunks_exact(3) {
        let mut t = element("t");
        set(&mut t, "vi", ids(tri.iter().copied()));
        push(&mut triangles, t);
    }
    push(&mut set_e, triangles);

    let mut subsets = element("Subsets");
    set(&mut subsets, "count", mesh.subsets.len().to_string());
    for subset in &mesh.subsets {
        let mut s = element("Subset");
        set(&mut s, "firstVertex", subset.first_vertex.to_string());
        set(&mut s, "numVertices", subset.vertex_count.to_string());
        set(&mut s, "firstIndex", subset.first_index.to_string());
        set(&mut s, "numIndices", subset.index_count.to_string());
        push(&mut subsets, s);
    }
    push(&mut set_e, subsets);
    set_e
}

/// Attribute values of a scene node, keyed like the node default table
pub(crate) fn node_values(node: &SceneNode) -> BTreeMap<String, ParamValue> {
    let mut values = node.attributes.clone();
    let t = &node.transform;
    values.insert(
        "translation".into(),
        ParamValue::Vector(t.translation.to_array().to_vec()),
    );
    values.insert(
        "rotation".into(),
        ParamValue::Vector(vec![
            to_degrees(t.rotation.x),
            to_degrees(t.rotation.y),
            to_degrees(t.rotation.z),
        ]),
    );
    values.insert("scale".into(), ParamValue::Vector(t.scale.to_array().to_vec()));
    values.insert("visibility".into(), ParamValue::Bool(node.visible));
    if let Some(mesh) = &node.mesh {
        values.insert(
            "boundingVolumeMode".into(),
            ParamValue::Enum(mesh.bounding_volume.mode().as_str().into()),
        );
    }
    values
}

fn light_values(light: &SourceLight) -> BTreeMap<String, ParamValue> {
    BTreeMap::from([
        ("type".to_string(), ParamValue::Enum(light.light_type.as_str().into())),
        ("color".to_string(), ParamValue::Vector(light.color.to_vec())),
        ("range".to_string(), ParamValue::Numeric(light.range)),
        ("coneAngle".to_string(), ParamValue::Numeric(light.cone_angle)),
        ("castShadowMap".to_string(), ParamValue::Bool(light.cast_shadow_map)),
        ("emitDiffuse".to_string(), ParamValue::Bool(light.emit_diffuse)),
        ("emitSpecular".to_string(), ParamValue::Bool(light.emit_specular)),
    ])
}

fn camera_values(camera: &SourceCamera) -> BTreeMap<String, ParamValue> {
    BTreeMap::from([
        ("fov".to_string(), ParamValue::Numeric(camera.fov)),
        ("nearClip".to_string(), ParamValue::Numeric(camera.near_clip)),
        ("farClip".to_string(), ParamValue::Numeric(camera.far_clip)),
        ("orthographic".to_string(), ParamValue::Bool(camera.orthographic)),
    ])
}

fn bounding_attributes(e: &mut Element, volume: &BoundingVolume) {
    match volume {
        BoundingVolume::Box(b) if !b.is_empty() => {
            set(e, "bvMin", vec3(b.min));
            set(e, "bvMax", vec3(b.max));
        }
        BoundingVolume::Box(_) => {}
        BoundingVolume::Sphere(s) => {
            set(e, "bvCenter", vec3(s.center));
            set(e, "bvRadius", format_float(s.radius));
        }
    }
}

/// `<Scene>`: exported nodes depth-first, non-exported nodes spliced out
pub(crate) fn scene(graph: &SceneGraph, plan: &DocumentPlan) -> Element {
    let mut scene = element("Scene");
    for index in graph.exported_children(&graph.roots) {
        push(&mut scene, scene_node(graph, plan, index));
    }
    scene
}

fn scene_node(graph: &SceneGraph, plan: &DocumentPlan, index: usize) -> Element {
    let node = graph.node(index);
    let mut e = element(node.kind.element_name());
    set(&mut e, "name", node.name.as_str());
    set(&mut e, "nodeId", node.id.to_string());

    if let Some(shape) = plan.shape_for(index) {
        set(&mut e, "shapeId", shape.shape_id.to_string());
        set(&mut e, "materialIds", ids(shape.material_ids.iter().copied()));
        if !shape.palette.is_empty() {
            set(&mut e, "skinBindNodeIds", ids(shape.palette.iter().map(|b| b.0)));
        }
        if let Some(mesh) = &node.mesh {
            bounding_attributes(&mut e, &mesh.bounding_volume);
        }
    }

    set_all(&mut e, AttributeDiffWriter::node().diff(&node_values(node)));
    match (node.kind, &node.light, &node.camera) {
        (NodeKind::Light, Some(light), _) => {
            set_all(&mut e, AttributeDiffWriter::light().diff(&light_values(light)));
        }
        (NodeKind::Camera, _, Some(camera)) => {
            set_all(&mut e, AttributeDiffWriter::camera().diff(&camera_values(camera)));
        }
        _ => {}
    }

    for child in graph.exported_children(&node.children) {
        push(&mut e, scene_node(graph, plan, child));
    }
    e
}

fn keyframe(key: &Keyframe) -> Element {
    let mut e = element("Keyframe");
    set(&mut e, "time", format_float(key.time_ms));
    if let Some(t) = key.translation {
        set(&mut e, "translation", vec3(t));
    }
    if let Some(r) = &key.rotation {
        set(&mut e, "rotation", vec3(r.degrees));
        set(&mut e, "rotationSin", vec3(r.sin));
        set(&mut e, "rotationCos", vec3(r.cos));
    }
    if let Some(s) = key.scale {
        set(&mut e, "scale", vec3(s));
    }
    if let Some(visible) = key.visibility {
        set(&mut e, "visibility", visible.to_string());
    }
    e
}

/// `<Animation>`; empty when nothing is animated
pub(crate) fn animation(set_data: Option<&AnimationSet>) -> Element {
    let mut animation = element("Animation");
    let Some(data) = set_data.filter(|s| !s.clips.is_empty()) else {
        return animation;
    };

    let mut sets = element("AnimationSets");
    set(&mut sets, "count", "1");
    let mut anim_set = element("AnimationSet");
    set(&mut anim_set, "name", data.name.as_str());
    set(&mut anim_set, "clipCount", "1");

    let mut clip = element("Clip");
    set(&mut clip, "name", data.name.as_str());
    set(&mut clip, "duration", format_float(data.duration_ms()));
    set(&mut clip, "count", data.clips.len().to_string());
    for node_clip in &data.clips {
        let mut keyframes = element("Keyframes");
        set(&mut keyframes, "nodeId", node_clip.node.to_string());
        set(&mut keyframes, "count", node_clip.keyframes.len().to_string());
        for key in &node_clip.keyframes {
            push(&mut keyframes, keyframe(key));
        }
        push(&mut clip, keyframes);
    }
    push(&mut anim_set, clip);
    push(&mut sets, anim_set);
    push(&mut animation, sets);
    animation
}

/// `<UserAttributes>` of the exported nodes
pub(crate) fn user_attributes(graph: &SceneGraph, enabled: bool) -> Element {
    let mut attributes = element("UserAttributes");
    if !enabled {
        return attributes;
    }
    for index in graph.exported() {
        let node = graph.node(index);
        if node.user_attributes.is_empty() {
            continue;
        }
        let mut entry = element("UserAttribute");
        set(&mut entry, "nodeId", node.id.to_string());
        for (name, value) in &node.user_attributes {
            let mut attribute = element("Attribute");
            set(&mut attribute, "name", name.as_str());
            set(&mut attribute, "type", value.type_name());
            set(&mut attribute, "value", value.to_attribute_string());
            push(&mut entry, attribute);
        }
        push(&mut attributes, entry);
    }
    attributes
}

/// Serialize with fixed indentation
pub(crate) fn to_bytes(root: &Element) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ");
    root.write_with_config(&mut bytes, config)
        .map_err(|e| Error::internal(format!("XML serialization failed: {}", e)))?;
    bytes.write_all(b"\n")?;
    Ok(bytes)
}
