//! Common types used across the exporter
//!
//! This module provides shared type definitions used by multiple crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sequential node identifier, assigned depth-first starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Depth-first, sibling-order position of a node in the scene tree.
///
/// Rendered in GIANTS notation: the root index, `>`, then the child indices
/// joined by `|` (`"0>"`, `"0>2|1"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct IndexPath(pub Vec<u32>);

impl IndexPath {
    /// Path of a root node
    pub fn root(index: u32) -> Self {
        Self(vec![index])
    }

    /// Path of the `index`-th child of this node
    pub fn child(&self, index: u32) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }

    /// Tree depth (roots have depth 0)
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((root, rest)) = self.0.split_first() else {
            return Ok(());
        };
        write!(f, "{}>", root)?;
        for (i, segment) in rest.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for IndexPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (root, rest) = s
            .split_once('>')
            .ok_or_else(|| format!("Index path '{}' has no root separator '>'", s))?;
        let mut segments = vec![root
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("Invalid root index in '{}': {}", s, e))?];
        if !rest.trim().is_empty() {
            for part in rest.split('|') {
                segments.push(
                    part.trim()
                        .parse::<u32>()
                        .map_err(|e| format!("Invalid segment '{}' in '{}': {}", part, s, e))?,
                );
            }
        }
        Ok(Self(segments))
    }
}

/// Kind of a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Transform,
    Shape,
    Light,
    Camera,
    Bone,
}

impl NodeKind {
    /// XML element name used for this kind in the `<Scene>` section.
    ///
    /// Bones have no element of their own and are written as transform groups.
    pub fn element_name(&self) -> &'static str {
        match self {
            NodeKind::Transform | NodeKind::Bone => "TransformGroup",
            NodeKind::Shape => "Shape",
            NodeKind::Light => "Light",
            NodeKind::Camera => "Camera",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Transform => "transform",
            NodeKind::Shape => "shape",
            NodeKind::Light => "light",
            NodeKind::Camera => "camera",
            NodeKind::Bone => "bone",
        };
        f.write_str(name)
    }
}

/// 3D vector (position, scale, Euler angles, ...)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn from_f32(v: [f32; 3]) -> Self {
        Self::new(v[0] as f64, v[1] as f64, v[2] as f64)
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn to_f32(&self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn add(&self, other: &Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            self.scale(1.0 / len)
        } else {
            Self::ZERO
        }
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Local transform: translation, XYZ Euler rotation in radians, scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Box that contains nothing; expanding it by a point yields that point
    pub const EMPTY: Self = Self {
        min: Vec3 { x: f64::INFINITY, y: f64::INFINITY, z: f64::INFINITY },
        max: Vec3 { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY, z: f64::NEG_INFINITY },
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Tight box around a set of points
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut bbox = Self::EMPTY;
        for point in points {
            bbox.expand(point);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    pub fn size(&self) -> Vec3 {
        self.max.sub(&self.min)
    }

    pub fn expand(&mut self, point: Vec3) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    /// Minimal box enclosing both boxes
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut result = *self;
        result.expand(other.min);
        result.expand(other.max);
        result
    }

    /// The eight corner points
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f64,
}

/// Which bounding volume a mesh carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundingVolumeMode {
    #[default]
    Box,
    Sphere,
}

impl BoundingVolumeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundingVolumeMode::Box => "box",
            BoundingVolumeMode::Sphere => "sphere",
        }
    }
}

/// Computed bounding volume of an exported mesh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoundingVolume {
    Box(BoundingBox),
    Sphere(BoundingSphere),
}

impl BoundingVolume {
    pub fn mode(&self) -> BoundingVolumeMode {
        match self {
            BoundingVolume::Box(_) => BoundingVolumeMode::Box,
            BoundingVolume::Sphere(_) => BoundingVolumeMode::Sphere,
        }
    }
}
