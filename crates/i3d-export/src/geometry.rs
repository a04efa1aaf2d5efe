//! Geometry encoding
//!
//! Expands face-corner source meshes into indexed vertex buffers:
//! - one candidate vertex per corner, carrying only the enabled streams
//! - lossless dedup on the exact bit patterns of every component
//! - triangles grouped by material slot into contiguous subsets
//! - bounding volume and per-slot UV density

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::debug;

use i3d_core::math::{bake_vector, Affine};
use i3d_core::{
    AxisOrientation, BoundingBox, BoundingSphere, BoundingVolume, BoundingVolumeMode, Error,
    ExportConfig, Result, Vec3,
};
use i3d_scene::{BoundingVolumeSettings, SourceMesh};

use crate::skin::SkinBinding;

/// Triangles below this world-space area are left out of the UV density
pub const DEGENERATE_AREA: f64 = 1e-12;

/// Encode a linear color channel with the sRGB transfer curve
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0031308 {
        (c * 12.92).max(0.0)
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Which optional vertex streams a mesh carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamFlags {
    pub normals: bool,
    pub uvs: bool,
    pub colors: bool,
    pub skin: bool,
}

impl StreamFlags {
    pub const NORMAL: u32 = 1;
    pub const UV0: u32 = 1 << 1;
    pub const COLOR: u32 = 1 << 2;
    pub const SKIN: u32 = 1 << 3;

    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.normals {
            bits |= Self::NORMAL;
        }
        if self.uvs {
            bits |= Self::UV0;
        }
        if self.colors {
            bits |= Self::COLOR;
        }
        if self.skin {
            bits |= Self::SKIN;
        }
        bits
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            normals: bits & Self::NORMAL != 0,
            uvs: bits & Self::UV0 != 0,
            colors: bits & Self::COLOR != 0,
            skin: bits & Self::SKIN != 0,
        }
    }
}

/// Contiguous run of triangles sharing a material slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subset {
    pub material_slot: u32,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub first_index: u32,
    pub index_count: u32,
}

/// One vertex with all its streams, as referenced by the index buffer
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVertex {
    pub position: [f32; 3],
    pub normal: Option<[f32; 3]>,
    pub uv: Option<[f32; 2]>,
    pub color: Option<[f32; 4]>,
    pub skin: Option<SkinBinding>,
}

/// Deduplicated, indexed mesh ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub skin: Option<Vec<SkinBinding>>,
    /// Three indices per triangle
    pub indices: Vec<u32>,
    pub subsets: Vec<Subset>,
    pub bounding_volume: BoundingVolume,
    /// UV density per material slot
    pub uv_density: Vec<Option<f64>>,
}

impl EncodedMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn streams(&self) -> StreamFlags {
        StreamFlags {
            normals: self.normals.is_some(),
            uvs: self.uvs.is_some(),
            colors: self.colors.is_some(),
            skin: self.skin.is_some(),
        }
    }

    /// All streams of one vertex
    pub fn vertex(&self, index: usize) -> EncodedVertex {
        EncodedVertex {
            position: self.positions[index],
            normal: self.normals.as_ref().map(|n| n[index]),
            uv: self.uvs.as_ref().map(|u| u[index]),
            color: self.colors.as_ref().map(|c| c[index]),
            skin: self.skin.as_ref().map(|s| s[index].clone()),
        }
    }

    /// Axis-aligned box over all positions
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.positions.iter().map(|p| Vec3::from_f32(*p)))
    }

    /// Recompute the bounding volume, honoring an override box
    pub fn update_bounds(&mut self, mode: BoundingVolumeMode, override_box: Option<BoundingBox>) {
        let bbox = override_box.unwrap_or_else(|| self.bounding_box());
        self.bounding_volume = match mode {
            BoundingVolumeMode::Box => BoundingVolume::Box(bbox),
            BoundingVolumeMode::Sphere => {
                let center = bbox.center();
                let radius = match override_box {
                    Some(_) => bbox.size().length() / 2.0,
                    None => self
                        .positions
                        .iter()
                        .map(|p| Vec3::from_f32(*p).sub(&center).length())
                        .fold(0.0, f64::max),
                };
                BoundingVolume::Sphere(BoundingSphere { center, radius })
            }
        };
    }

    /// Recompute the UV density of every slot below `slot_count`
    pub fn update_uv_density(&mut self, slot_count: usize) {
        let mut density = vec![None; slot_count];
        if let Some(uvs) = &self.uvs {
            for subset in &self.subsets {
                let start = subset.first_index as usize;
                let end = start + subset.index_count as usize;
                let mut sum = 0.0;
                let mut count = 0usize;
                for tri in self.indices[start..end].chunks_exact(3) {
                    let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
                    let world = triangle_area(
                        Vec3::from_f32(self.positions[a]),
                        Vec3::from_f32(self.positions[b]),
                        Vec3::from_f32(self.positions[c]),
                    );
                    if world <= DEGENERATE_AREA {
                        continue;
                    }
                    sum += uv_area(uvs[a], uvs[b], uvs[c]) / world;
                    count += 1;
                }
                if let Some(slot) = density.get_mut(subset.material_slot as usize) {
                    *slot = (count > 0).then(|| sum / count as f64);
                }
            }
        }
        self.uv_density = density;
    }

    /// Copy with positions and normals moved by `transform`
    pub fn transformed(&self, transform: &Affine) -> Self {
        if transform.is_identity() {
            return self.clone();
        }
        let mut mesh = self.clone();
        for p in &mut mesh.positions {
            *p = canonical(transform.transform_point(Vec3::from_f32(*p)).to_f32());
        }
        if let Some(normals) = &mut mesh.normals {
            for n in normals.iter_mut() {
                *n = canonical(transform.transform_normal(Vec3::from_f32(*n)).to_f32());
            }
        }
        mesh
    }
}

/// World-space area of a triangle
pub fn triangle_area(a: Vec3, b: Vec3, c: Vec3) -> f64 {
    b.sub(&a).cross(&c.sub(&a)).length() / 2.0
}

/// Texture-space area of a triangle
pub fn uv_area(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f64 {
    let (ax, ay) = (a[0] as f64, a[1] as f64);
    let (bx, by) = (b[0] as f64, b[1] as f64);
    let (cx, cy) = (c[0] as f64, c[1] as f64);
    ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay)).abs() / 2.0
}

/// Replace `-0.0` components with `0.0`
pub fn canonical<const N: usize>(v: [f32; N]) -> [f32; N] {
    v.map(|c| if c == 0.0 { 0.0 } else { c })
}

fn bits(v: f32) -> u32 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

/// Exact dedup key: material slot plus the bit pattern of every component
/// (signed zeros compare equal)
type VertexKey = SmallVec<[u32; 32]>;

fn vertex_key(slot: u32, vertex: &EncodedVertex) -> VertexKey {
    let mut key = VertexKey::new();
    key.push(slot);
    key.extend(vertex.position.iter().copied().map(bits));
    if let Some(n) = vertex.normal {
        key.extend(n.iter().copied().map(bits));
    }
    if let Some(uv) = vertex.uv {
        key.extend(uv.iter().copied().map(bits));
    }
    if let Some(c) = vertex.color {
        key.extend(c.iter().copied().map(bits));
    }
    if let Some(skin) = &vertex.skin {
        key.push(skin.len() as u32);
        for influence in skin {
            let bits = influence.weight.to_bits();
            key.push(influence.bone.0);
            key.push((bits >> 32) as u32);
            key.push(bits as u32);
        }
    }
    key
}

/// Builds [`EncodedMesh`] values from source meshes
#[derive(Debug)]
pub struct GeometryEncoder<'a> {
    config: &'a ExportConfig,
}

impl<'a> GeometryEncoder<'a> {
    pub fn new(config: &'a ExportConfig) -> Self {
        Self { config }
    }

    fn bake(&self, v: Vec3) -> Vec3 {
        match self.config.axis_orientation {
            AxisOrientation::BakeTransforms => bake_vector(v),
            AxisOrientation::KeepTransforms => v,
        }
    }

    /// An object-space box in export space
    pub fn export_box(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox::from_points(bbox.corners().into_iter().map(|c| self.bake(c)))
    }

    /// Encode one mesh; `Ok(None)` when it has no triangles.
    ///
    /// `skin` holds one binding per source position. `slot_count` is the
    /// number of material slots of the owning object.
    pub fn encode(
        &self,
        owner: &str,
        mesh: &SourceMesh,
        skin: Option<&[SkinBinding]>,
        slot_count: usize,
        bounds: &BoundingVolumeSettings,
    ) -> Result<Option<EncodedMesh>> {
        mesh.validate(owner)?;
        if mesh.is_empty() {
            return Ok(None);
        }
        if let Some(triangle) = mesh
            .triangles
            .iter()
            .find(|t| t.material_slot as usize >= slot_count)
        {
            return Err(Error::structural(format!(
                "mesh of '{}' uses material slot {} but has {} slot(s)",
                owner, triangle.material_slot, slot_count
            )));
        }
        if let Some(skin) = skin {
            if skin.len() != mesh.positions.len() {
                return Err(Error::internal(format!(
                    "'{}': {} skin bindings for {} positions",
                    owner,
                    skin.len(),
                    mesh.positions.len()
                )));
            }
        }

        let toggles = &self.config.export;
        let streams = StreamFlags {
            normals: toggles.normals,
            uvs: toggles.uvs && mesh.has_uvs(),
            colors: toggles.colors && mesh.has_colors(),
            skin: toggles.skin_weights && skin.is_some(),
        };

        // Stable: triangles keep their authored order inside a slot
        let mut order: Vec<usize> = (0..mesh.triangles.len()).collect();
        order.sort_by_key(|&t| mesh.triangles[t].material_slot);

        let mut encoded = EncodedMesh {
            positions: Vec::new(),
            normals: streams.normals.then(Vec::new),
            uvs: streams.uvs.then(Vec::new),
            colors: streams.colors.then(Vec::new),
            skin: streams.skin.then(Vec::new),
            indices: Vec::with_capacity(mesh.triangles.len() * 3),
            subsets: Vec::new(),
            bounding_volume: BoundingVolume::Box(BoundingBox::EMPTY),
            uv_density: Vec::new(),
        };
        let mut lookup: HashMap<VertexKey, u32> = HashMap::new();

        for t in order {
            let triangle = &mesh.triangles[t];
            let slot = triangle.material_slot;
            if encoded.subsets.last().map(|s| s.material_slot) != Some(slot) {
                // Vertices are shared within a subset only
                lookup.clear();
                encoded.subsets.push(Subset {
                    material_slot: slot,
                    first_vertex: encoded.positions.len() as u32,
                    vertex_count: 0,
                    first_index: encoded.indices.len() as u32,
                    index_count: 0,
                });
            }

            let face_normal = self.face_normal(mesh, triangle.indices());
            for corner in &triangle.corners {
                let source = mesh.positions[corner.vertex as usize];
                let vertex = EncodedVertex {
                    position: canonical(self.bake(Vec3::from_f32(source)).to_f32()),
                    normal: streams.normals.then(|| {
                        let n = corner.normal.map(Vec3::from_f32).unwrap_or(face_normal);
                        canonical(self.bake(n).to_f32())
                    }),
                    uv: streams.uvs.then(|| canonical(corner.uv.unwrap_or([0.0, 0.0]))),
                    color: streams.colors.then(|| {
                        let c = corner.color.unwrap_or([1.0, 1.0, 1.0, 1.0]);
                        if self.config.snow_heap_mode {
                            c
                        } else {
                            [linear_to_srgb(c[0]), linear_to_srgb(c[1]), linear_to_srgb(c[2]), c[3]]
                        }
                    }),
                    skin: match (streams.skin, skin) {
                        (true, Some(bindings)) => Some(bindings[corner.vertex as usize].clone()),
                        _ => None,
                    },
                };

                let key = vertex_key(slot, &vertex);
                let index = match lookup.get(&key) {
                    Some(&index) => index,
                    None => {
                        let index = encoded.positions.len() as u32;
                        push_vertex(&mut encoded, vertex);
                        lookup.insert(key, index);
                        index
                    }
                };
                encoded.indices.push(index);
            }

            if let Some(subset) = encoded.subsets.last_mut() {
                subset.index_count += 3;
                subset.vertex_count = encoded.positions.len() as u32 - subset.first_vertex;
            }
        }

        let override_box = bounds.override_box.map(|b| self.export_box(&b));
        encoded.update_bounds(bounds.mode, override_box);
        encoded.update_uv_density(slot_count);

        debug!(
            owner = %owner,
            corners = mesh.triangles.len() * 3,
            vertices = encoded.vertex_count(),
            subsets = encoded.subsets.len(),
            "Encoded mesh"
        );
        Ok(Some(encoded))
    }

    /// Flat normal of a source triangle (zero for degenerate triangles)
    fn face_normal(&self, mesh: &SourceMesh, indices: [u32; 3]) -> Vec3 {
        let [a, b, c] = indices.map(|i| Vec3::from_f32(mesh.positions[i as usize]));
        b.sub(&a).cross(&c.sub(&a)).normalize()
    }
}

fn push_vertex(mesh: &mut EncodedMesh, vertex: EncodedVertex) {
    mesh.positions.push(vertex.position);
    if let (Some(normals), Some(n)) = (&mut mesh.normals, vertex.normal) {
        normals.push(n);
    }
    if let (Some(uvs), Some(uv)) = (&mut mesh.uvs, vertex.uv) {
        uvs.push(uv);
    }
    if let (Some(colors), Some(c)) = (&mut mesh.colors, vertex.color) {
        colors.push(c);
    }
    if let (Some(skin), Some(s)) = (&mut mesh.skin, vertex.skin) {
        skin.push(s);
    }
}
