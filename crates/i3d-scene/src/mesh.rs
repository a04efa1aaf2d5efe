//! Face-corner source meshes

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use i3d_core::{BoundingBox, Error, Result, Vec3};

/// One raw bone influence as authored (any number per vertex)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInfluence {
    /// Bone name, resolved against the bone registry after id assignment
    pub bone: String,
    pub weight: f64,
}

impl RawInfluence {
    pub fn new(bone: impl Into<String>, weight: f64) -> Self {
        Self {
            bone: bone.into(),
            weight,
        }
    }
}

/// Raw influences of one vertex
pub type RawInfluences = SmallVec<[RawInfluence; 4]>;

/// One triangle corner: a position index plus per-corner attributes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Corner {
    /// Index into [`SourceMesh::positions`]
    pub vertex: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv: Option<[f32; 2]>,
    /// Linear RGBA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f32; 4]>,
}

impl Corner {
    pub fn new(vertex: u32) -> Self {
        Self {
            vertex,
            ..Default::default()
        }
    }

    pub fn with_normal(mut self, normal: [f32; 3]) -> Self {
        self.normal = Some(normal);
        self
    }

    pub fn with_uv(mut self, uv: [f32; 2]) -> Self {
        self.uv = Some(uv);
        self
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = Some(color);
        self
    }
}

/// A triangle with its material slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTriangle {
    pub corners: [Corner; 3],
    #[serde(default)]
    pub material_slot: u32,
}

impl SourceTriangle {
    pub fn new(corners: [Corner; 3], material_slot: u32) -> Self {
        Self {
            corners,
            material_slot,
        }
    }

    /// Position indices of the three corners
    pub fn indices(&self) -> [u32; 3] {
        [
            self.corners[0].vertex,
            self.corners[1].vertex,
            self.corners[2].vertex,
        ]
    }
}

/// Mesh data as the host hands it over
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceMesh {
    /// Object-space positions
    pub positions: Vec<[f32; 3]>,
    pub triangles: Vec<SourceTriangle>,
    /// Raw influences per position; empty for unskinned meshes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skin_weights: Vec<RawInfluences>,
}

impl SourceMesh {
    /// Build a mesh from positions and position-index triangles, all in one slot
    pub fn from_indexed(positions: Vec<[f32; 3]>, triangles: &[[u32; 3]]) -> Self {
        let triangles = triangles
            .iter()
            .map(|t| SourceTriangle::new(t.map(Corner::new), 0))
            .collect();
        Self {
            positions,
            triangles,
            skin_weights: Vec::new(),
        }
    }

    /// Get position count
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Get triangle count
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Check if any corner carries a normal
    pub fn has_normals(&self) -> bool {
        self.corners().any(|c| c.normal.is_some())
    }

    /// Check if any corner carries UV coordinates
    pub fn has_uvs(&self) -> bool {
        self.corners().any(|c| c.uv.is_some())
    }

    /// Check if any corner carries a vertex color
    pub fn has_colors(&self) -> bool {
        self.corners().any(|c| c.color.is_some())
    }

    /// Check if mesh has bone weights (skinned)
    pub fn has_skin_weights(&self) -> bool {
        self.skin_weights.iter().any(|w| !w.is_empty())
    }

    fn corners(&self) -> impl Iterator<Item = &Corner> {
        self.triangles.iter().flat_map(|t| t.corners.iter())
    }

    /// All unique material slots used by triangles, sorted
    pub fn material_slots(&self) -> Vec<u32> {
        let mut slots: Vec<u32> = self.triangles.iter().map(|t| t.material_slot).collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    /// Names of all bones referenced by the raw weights, sorted
    pub fn bone_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .skin_weights
            .iter()
            .flat_map(|w| w.iter().map(|i| i.bone.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Calculate bounding box from positions
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.positions.iter().map(|p| Vec3::from_f32(*p)))
    }

    /// Check index ranges and the skin weight table length
    pub fn validate(&self, owner: &str) -> Result<()> {
        let count = self.positions.len();
        for (t, triangle) in self.triangles.iter().enumerate() {
            for index in triangle.indices() {
                if index as usize >= count {
                    return Err(Error::structural(format!(
                        "mesh of '{}': triangle {} references position {} of {}",
                        owner, t, index, count
                    )));
                }
            }
        }
        if !self.skin_weights.is_empty() && self.skin_weights.len() != count {
            return Err(Error::structural(format!(
                "mesh of '{}': {} skin weight entries for {} positions",
                owner,
                self.skin_weights.len(),
                count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> SourceMesh {
        SourceMesh::from_indexed(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_from_indexed() {
        let mesh = quad();
        assert_eq!(mesh.position_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.triangles[1].indices(), [0, 2, 3]);
        assert_eq!(mesh.material_slots(), vec![0]);
        assert!(!mesh.has_normals());
        assert!(!mesh.has_skin_weights());
    }

    #[test]
    fn test_bounding_box() {
        let bbox = quad().bounding_box();
        assert_eq!(bbox.min, Vec3::ZERO);
        assert_eq!(bbox.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_validate_out_of_range() {
        let mut mesh = quad();
        mesh.triangles[0].corners[2].vertex = 9;
        let err = mesh.validate("Plane").unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
        assert!(err.to_string().contains("Plane"));
    }

    #[test]
    fn test_validate_skin_length() {
        let mut mesh = quad();
        mesh.skin_weights = vec![RawInfluences::new()];
        assert!(mesh.validate("Plane").is_err());
        mesh.skin_weights = vec![RawInfluences::new(); 4];
        assert!(mesh.validate("Plane").is_ok());
    }

    #[test]
    fn test_bone_names_unique() {
        let mut mesh = quad();
        let mut weights = RawInfluences::new();
        weights.push(RawInfluence::new("spine", 0.5));
        weights.push(RawInfluence::new("arm", 0.5));
        mesh.skin_weights = vec![weights.clone(), weights, RawInfluences::new(), RawInfluences::new()];
        assert_eq!(mesh.bone_names(), vec!["arm", "spine"]);
        assert!(mesh.has_skin_weights());
    }

    #[test]
    fn test_corner_json() {
        let corner: Corner = serde_json::from_str(r#"{"vertex":2,"uv":[0.5,1.0]}"#).unwrap();
        assert_eq!(corner, Corner::new(2).with_uv([0.5, 1.0]));
    }
}
