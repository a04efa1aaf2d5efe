//! Headless scene description
//!
//! [`SceneDescription`] is the serde form of a host scene: a flat object list
//! plus ordered root keys. Objects reference each other by key; the tree is
//! rebuilt and checked by the exporter, so a description may be malformed and
//! still load.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use i3d_core::{
    BoundingBox, BoundingVolumeMode, Error, NodeKind, ParamValue, Result, ResultExt, Transform,
};

use crate::animation::SourceAnimation;
use crate::material::SourceMaterial;
use crate::mesh::SourceMesh;
use crate::traits::SceneSource;

fn default_fps() -> f64 {
    24.0
}

fn default_true() -> bool {
    true
}

/// Per-mesh bounding volume settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingVolumeSettings {
    pub mode: BoundingVolumeMode,
    /// Explicit box replacing the computed one (object space)
    pub override_box: Option<BoundingBox>,
}

/// Light type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightType {
    #[default]
    Point,
    Directional,
    Spot,
    Ambient,
}

impl LightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightType::Point => "point",
            LightType::Directional => "directional",
            LightType::Spot => "spot",
            LightType::Ambient => "ambient",
        }
    }
}

/// Light settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceLight {
    #[serde(rename = "type")]
    pub light_type: LightType,
    /// Linear RGB
    pub color: [f64; 3],
    pub range: f64,
    /// Degrees
    pub cone_angle: f64,
    pub cast_shadow_map: bool,
    pub emit_diffuse: bool,
    pub emit_specular: bool,
}

impl Default for SourceLight {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            color: [1.0, 1.0, 1.0],
            range: 10.0,
            cone_angle: 60.0,
            cast_shadow_map: false,
            emit_diffuse: true,
            emit_specular: true,
        }
    }
}

/// Camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceCamera {
    /// Vertical field of view in degrees
    pub fov: f64,
    pub near_clip: f64,
    pub far_clip: f64,
    pub orthographic: bool,
}

impl Default for SourceCamera {
    fn default() -> Self {
        Self {
            fov: 60.0,
            near_clip: 0.1,
            far_clip: 10000.0,
            orthographic: false,
        }
    }
}

/// One object of the host scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceObject {
    /// Stable key, unique within the scene
    pub key: String,
    /// Display name; the key is used when empty
    #[serde(default)]
    pub name: String,
    #[serde(default = "SourceObject::default_kind")]
    pub kind: NodeKind,
    #[serde(default)]
    pub parent: Option<String>,
    /// Child keys in sibling order
    #[serde(default)]
    pub children: Vec<String>,
    /// Local transform
    #[serde(default)]
    pub transform: Transform,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub mesh: Option<SourceMesh>,
    /// Material slots in slot order
    #[serde(default)]
    pub materials: Vec<SourceMaterial>,
    #[serde(default)]
    pub merge_group: Option<String>,
    /// This member is the reference member of its merge group
    #[serde(default)]
    pub merge_group_root: bool,
    #[serde(default)]
    pub bounding_volume: BoundingVolumeSettings,
    #[serde(default)]
    pub animation: Option<SourceAnimation>,
    /// Engine node attributes (`castsShadows`, `clipDistance`, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub light: Option<SourceLight>,
    #[serde(default)]
    pub camera: Option<SourceCamera>,
    #[serde(default)]
    pub user_attributes: BTreeMap<String, ParamValue>,
}

impl SourceObject {
    fn default_kind() -> NodeKind {
        NodeKind::Transform
    }

    pub fn new(key: impl Into<String>, kind: NodeKind) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            kind,
            parent: None,
            children: Vec::new(),
            transform: Transform::IDENTITY,
            visible: true,
            mesh: None,
            materials: Vec::new(),
            merge_group: None,
            merge_group_root: false,
            bounding_volume: BoundingVolumeSettings::default(),
            animation: None,
            attributes: BTreeMap::new(),
            light: None,
            camera: None,
            user_attributes: BTreeMap::new(),
        }
    }

    /// A shape object with one mesh and its material slots
    pub fn shape(key: impl Into<String>, mesh: SourceMesh, materials: Vec<SourceMaterial>) -> Self {
        let mut object = Self::new(key, NodeKind::Shape);
        object.mesh = Some(mesh);
        object.materials = materials;
        object
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_merge_group(mut self, tag: impl Into<String>) -> Self {
        self.merge_group = Some(tag.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_animation(mut self, animation: SourceAnimation) -> Self {
        self.animation = Some(animation);
        self
    }

    /// Name written to the document
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    /// Merge-group tag, ignoring blank tags
    pub fn merge_tag(&self) -> Option<&str> {
        self.merge_group
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// A complete scene in serde form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDescription {
    pub name: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Root keys in sibling order
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub objects: Vec<SourceObject>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl SceneDescription {
    /// Create an empty scene
    pub fn new(name: impl Into<String>, fps: f64) -> Self {
        Self {
            name: name.into(),
            fps,
            ..Default::default()
        }
    }

    /// Parse a scene from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut scene: Self = serde_json::from_str(text)
            .map_err(|e| Error::scene_format(format!("JSON: {}", e)))?;
        scene.rebuild_index()?;
        Ok(scene)
    }

    /// Load a scene from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Serialize the scene as pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("scene serialization: {}", e)))
    }

    /// Rebuild the key index, rejecting duplicate keys and a bad frame rate
    pub fn rebuild_index(&mut self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(Error::scene_format(format!(
                "frame rate must be positive, got {}",
                self.fps
            )));
        }
        self.index.clear();
        for (i, object) in self.objects.iter().enumerate() {
            if self.index.insert(object.key.clone(), i).is_some() {
                return Err(Error::structural(format!(
                    "duplicate object key '{}'",
                    object.key
                )));
            }
        }
        Ok(())
    }

    /// Add a top-level object
    pub fn push_root(&mut self, mut object: SourceObject) -> Result<()> {
        object.parent = None;
        let key = object.key.clone();
        self.insert(object)?;
        self.roots.push(key);
        Ok(())
    }

    /// Add `object` as the last child of `parent`
    pub fn push_child(&mut self, parent: &str, mut object: SourceObject) -> Result<()> {
        let parent_index = *self
            .index
            .get(parent)
            .ok_or_else(|| Error::structural(format!("unknown parent '{}'", parent)))?;
        object.parent = Some(parent.to_string());
        let key = object.key.clone();
        self.insert(object)?;
        self.objects[parent_index].children.push(key);
        Ok(())
    }

    fn insert(&mut self, object: SourceObject) -> Result<()> {
        if self.index.contains_key(&object.key) {
            return Err(Error::structural(format!(
                "duplicate object key '{}'",
                object.key
            )));
        }
        self.index.insert(object.key.clone(), self.objects.len());
        self.objects.push(object);
        Ok(())
    }

    /// Mutable access by key
    pub fn object_mut(&mut self, key: &str) -> Option<&mut SourceObject> {
        let index = *self.index.get(key)?;
        self.objects.get_mut(index)
    }
}

impl SceneSource for SceneDescription {
    fn scene_name(&self) -> &str {
        &self.name
    }

    fn frames_per_second(&self) -> f64 {
        self.fps
    }

    fn root_keys(&self) -> &[String] {
        &self.roots
    }

    fn object(&self, key: &str) -> Option<&SourceObject> {
        self.index.get(key).and_then(|&i| self.objects.get(i))
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_builds_tree() {
        let mut scene = SceneDescription::new("farm", 30.0);
        scene.push_root(SourceObject::new("root", NodeKind::Transform)).unwrap();
        scene.push_child("root", SourceObject::new("lamp", NodeKind::Light)).unwrap();

        assert_eq!(scene.root_keys(), &["root".to_string()]);
        assert_eq!(scene.object("root").unwrap().children, vec!["lamp".to_string()]);
        assert_eq!(scene.object("lamp").unwrap().parent.as_deref(), Some("root"));
        assert_eq!(scene.object_count(), 2);
    }

    #[test]
    fn test_duplicate_key() {
        let mut scene = SceneDescription::new("farm", 30.0);
        scene.push_root(SourceObject::new("a", NodeKind::Transform)).unwrap();
        let err = scene.push_root(SourceObject::new("a", NodeKind::Transform)).unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
    }

    #[test]
    fn test_unknown_parent() {
        let mut scene = SceneDescription::new("farm", 30.0);
        assert!(scene.push_child("ghost", SourceObject::new("a", NodeKind::Transform)).is_err());
    }

    #[test]
    fn test_display_name_and_tag() {
        let mut object = SourceObject::new("obj_1", NodeKind::Shape).with_merge_group("  ");
        object.name.clear();
        assert_eq!(object.display_name(), "obj_1");
        assert_eq!(object.merge_tag(), None);
        assert_eq!(object.with_merge_group(" wheels ").merge_tag(), Some("wheels"));
    }

    #[test]
    fn test_bad_fps() {
        let err = SceneDescription::from_json_str(r#"{"name":"x","fps":0}"#).unwrap_err();
        assert!(matches!(err, Error::SceneFormat { .. }));
    }
}
