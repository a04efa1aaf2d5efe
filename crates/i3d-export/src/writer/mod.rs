//! I3D document writer
//!
//! Writing happens in two steps. [`I3dDocumentWriter::plan`] walks the
//! exported tree once and fixes every id the document uses: shape ids in
//! tree order, materials deduplicated by value, file ids in first-reference
//! order and a bone palette per skinned shape. The XML and the optional
//! binary subfile are then produced from that plan.

mod binary;
mod xml;

pub use binary::{
    read_shapes_file, vertex_stride, DecodedShape, ShapeRecord, ShapesFileError, ShapesFileWriter,
    SHAPES_MAGIC, SHAPES_VERSION,
};

use std::collections::HashMap;
use std::io::Write;

use tracing::{debug, info};

use i3d_core::{Error, ExportConfig, GeometryEncoding, NodeId, Result};
use i3d_scene::ShaderLibrary;

use crate::cancel::CancelToken;
use crate::geometry::EncodedMesh;
use crate::graph::SceneGraph;
use crate::material::ExportMaterial;
use crate::path::PathResolver;
use crate::report::{ExportReport, ShapeStats};

/// `version` attribute of the `<i3D>` root
pub const I3D_VERSION: &str = "1.6";

/// Bone indices are stored as `u8`
pub const MAX_PALETTE_BONES: usize = 256;

/// Bones a skinned mesh references, in first-use order
pub fn bone_palette(owner: &str, mesh: &EncodedMesh) -> Result<Vec<NodeId>> {
    let mut palette: Vec<NodeId> = Vec::new();
    if let Some(skin) = &mesh.skin {
        for influence in skin.iter().flatten() {
            if !palette.contains(&influence.bone) {
                palette.push(influence.bone);
            }
        }
    }
    if palette.len() > MAX_PALETTE_BONES {
        return Err(Error::structural(format!(
            "'{}' is bound to {} bones, at most {} are supported per shape",
            owner,
            palette.len(),
            MAX_PALETTE_BONES
        )));
    }
    Ok(palette)
}

/// `<Files>` entries keyed by resolved path
#[derive(Debug, Default)]
pub struct FileTable {
    files: Vec<String>,
    ids: HashMap<String, u32>,
}

impl FileTable {
    /// Id of `resolved`, registering it on first use
    pub fn id_for(&mut self, resolved: &str) -> u32 {
        if let Some(id) = self.ids.get(resolved) {
            return *id;
        }
        self.files.push(resolved.to_string());
        let id = self.files.len() as u32;
        self.ids.insert(resolved.to_string(), id);
        id
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (i as u32 + 1, f.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A material with its document ids
#[derive(Debug, Clone)]
pub struct PlannedMaterial {
    pub id: u32,
    pub material: ExportMaterial,
    /// File id per texture, parallel to `material.textures`
    pub texture_files: Vec<u32>,
    pub shader_file: Option<u32>,
}

/// A shape with its document ids
#[derive(Debug, Clone)]
pub struct PlannedShape {
    /// Arena index of the scene node
    pub node: usize,
    pub shape_id: u32,
    /// Material id per slot
    pub material_ids: Vec<u32>,
    pub palette: Vec<NodeId>,
}

/// Every id the document uses
#[derive(Debug, Default)]
pub struct DocumentPlan {
    pub shapes: Vec<PlannedShape>,
    pub materials: Vec<PlannedMaterial>,
    pub files: FileTable,
    by_node: HashMap<usize, usize>,
}

impl DocumentPlan {
    pub fn shape_for(&self, node: usize) -> Option<&PlannedShape> {
        self.by_node.get(&node).map(|i| &self.shapes[*i])
    }
}

/// Serialized document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenDocument {
    pub xml: Vec<u8>,
    /// Binary subfile, in binary mode
    pub shapes: Option<Vec<u8>>,
}

/// Assembles the `.i3d` document (and `.shapes` subfile) from a finished graph
#[derive(Debug)]
pub struct I3dDocumentWriter<'a> {
    config: &'a ExportConfig,
    library: &'a ShaderLibrary,
    cancel: &'a CancelToken,
}

impl<'a> I3dDocumentWriter<'a> {
    pub fn new(config: &'a ExportConfig, library: &'a ShaderLibrary, cancel: &'a CancelToken) -> Self {
        Self {
            config,
            library,
            cancel,
        }
    }

    /// Fix shape, material and file ids; shape statistics go into `report`
    pub fn plan(
        &self,
        graph: &SceneGraph,
        resolver: &mut PathResolver,
        report: &mut ExportReport,
    ) -> Result<DocumentPlan> {
        let mut plan = DocumentPlan::default();
        let mut materials: Vec<ExportMaterial> = Vec::new();

        for index in graph.exported() {
            let node = graph.node(index);
            let Some(mesh) = node.mesh.as_ref().filter(|_| node.is_shape()) else {
                continue;
            };

            let sources: Vec<ExportMaterial> = if node.materials.is_empty() {
                vec![ExportMaterial::fallback()]
            } else {
                node.materials
                    .iter()
                    .map(|m| ExportMaterial::from_source(m, self.config, self.library))
                    .collect()
            };
            let material_ids = sources
                .into_iter()
                .map(|material| match materials.iter().position(|m| *m == material) {
                    Some(i) => i as u32 + 1,
                    None => {
                        materials.push(material);
                        materials.len() as u32
                    }
                })
                .collect();

            let shape_id = plan.shapes.len() as u32 + 1;
            let palette = bone_palette(&node.name, mesh)?;
            report.shapes.push(ShapeStats {
                name: node.name.clone(),
                shape_id,
                vertices: mesh.vertex_count(),
                triangles: mesh.triangle_count(),
                subsets: mesh.subsets.len(),
                skinned: mesh.skin.is_some(),
                uv_density: mesh.uv_density.clone(),
            });
            plan.by_node.insert(index, plan.shapes.len());
            plan.shapes.push(PlannedShape {
                node: index,
                shape_id,
                material_ids,
                palette,
            });
        }

        for (i, material) in materials.into_iter().enumerate() {
            let texture_files = material
                .textures
                .iter()
                .map(|t| plan.files.id_for(&resolver.resolve(&t.path, report).resolved))
                .collect();
            let shader_file = material
                .shader
                .as_deref()
                .map(|s| plan.files.id_for(&resolver.resolve(s, report).resolved));
            plan.materials.push(PlannedMaterial {
                id: i as u32 + 1,
                material,
                texture_files,
                shader_file,
            });
        }

        debug!(
            shapes = plan.shapes.len(),
            materials = plan.materials.len(),
            files = plan.files.len(),
            "Planned document"
        );
        Ok(plan)
    }

    /// Write the binary subfile for every planned shape
    pub fn write_shapes<W: Write>(&self, graph: &SceneGraph, plan: &DocumentPlan, out: W) -> Result<W> {
        let mut writer = ShapesFileWriter::new(
            out,
            plan.shapes.len() as u32,
            self.config.stream_threshold_bytes,
        )?;
        for shape in &plan.shapes {
            self.cancel.check()?;
            let node = graph.node(shape.node);
            let Some(mesh) = &node.mesh else {
                return Err(Error::internal(format!("shape '{}' lost its mesh", node.name)));
            };
            writer.write_shape(&ShapeRecord {
                shape_id: shape.shape_id,
                name: &node.name,
                mesh,
                palette: &shape.palette,
            })?;
        }
        writer.finish()
    }

    /// Build and serialize the XML document.
    ///
    /// `shapes_file` is the subfile name referenced in binary mode.
    pub fn write_xml(
        &self,
        graph: &SceneGraph,
        plan: &DocumentPlan,
        shapes_file: Option<&str>,
    ) -> Result<Vec<u8>> {
        let mut root = xml::root(&graph.name);
        xml::push(&mut root, xml::asset());
        xml::push(&mut root, xml::files(plan));
        xml::push(&mut root, xml::materials(plan));
        let shapes = match (self.config.geometry_encoding, shapes_file) {
            (GeometryEncoding::Embedded, _) => xml::embedded_shapes(graph, plan, self.cancel)?,
            (GeometryEncoding::Binary, Some(file)) => xml::external_shapes(file),
            (GeometryEncoding::Binary, None) => {
                return Err(Error::internal("binary geometry requested without a shapes file name"));
            }
        };
        xml::push(&mut root, shapes);
        xml::push(&mut root, xml::element("Dynamics"));
        self.cancel.check()?;
        xml::push(&mut root, xml::scene(graph, plan));
        xml::push(&mut root, xml::animation(graph.animation.as_ref()));
        xml::push(
            &mut root,
            xml::user_attributes(graph, self.config.export.user_attributes),
        );
        xml::to_bytes(&root)
    }

    /// Plan and serialize everything in memory
    pub fn write_document(
        &self,
        graph: &SceneGraph,
        resolver: &mut PathResolver,
        shapes_file: &str,
        report: &mut ExportReport,
    ) -> Result<WrittenDocument> {
        let plan = self.plan(graph, resolver, report)?;
        let shapes = match self.config.geometry_encoding {
            GeometryEncoding::Binary => Some(self.write_shapes(graph, &plan, Vec::new())?),
            GeometryEncoding::Embedded => None,
        };
        let xml = self.write_xml(graph, &plan, Some(shapes_file))?;
        info!(bytes = xml.len(), shapes = plan.shapes.len(), "Document serialized");
        Ok(WrittenDocument { xml, shapes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skin::Influence;
    use i3d_core::{BoundingBox, BoundingVolume};
    use smallvec::smallvec;

    #[test]
    fn test_file_table_first_reference_order() {
        let mut files = FileTable::default();
        assert_eq!(files.id_for("textures/b.dds"), 1);
        assert_eq!(files.id_for("textures/a.dds"), 2);
        assert_eq!(files.id_for("textures/b.dds"), 1);
        let entries: Vec<(u32, &str)> = files.entries().collect();
        assert_eq!(entries, vec![(1, "textures/b.dds"), (2, "textures/a.dds")]);
    }

    #[test]
    fn test_palette_first_use_order() {
        let mesh = EncodedMesh {
            positions: vec![[0.0; 3]; 2],
            normals: None,
            uvs: None,
            colors: None,
            skin: Some(vec![
                smallvec![
                    Influence { bone: NodeId(9), weight: 0.5 },
                    Influence { bone: NodeId(4), weight: 0.5 }
                ],
                smallvec![Influence { bone: NodeId(4), weight: 1.0 }],
            ]),
            indices: Vec::new(),
            subsets: Vec::new(),
            bounding_volume: BoundingVolume::Box(BoundingBox::EMPTY),
            uv_density: Vec::new(),
        };
        assert_eq!(bone_palette("arm", &mesh).unwrap(), vec![NodeId(9), NodeId(4)]);
    }

    #[test]
    fn test_palette_limit() {
        let skin = (0..300u32)
            .map(|i| smallvec![Influence { bone: NodeId(i + 1), weight: 1.0 }])
            .collect();
        let mesh = EncodedMesh {
            positions: vec![[0.0; 3]; 300],
            normals: None,
            uvs: None,
            colors: None,
            skin: Some(skin),
            indices: Vec::new(),
            subsets: Vec::new(),
            bounding_volume: BoundingVolume::Box(BoundingBox::EMPTY),
            uv_density: Vec::new(),
        };
        assert!(matches!(
            bone_palette("crowd", &mesh),
            Err(Error::Structural { .. })
        ));
    }
}
