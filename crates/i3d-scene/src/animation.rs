//! Keyframed animation curves
//!
//! Curves are authored per scalar channel (one axis of translation, rotation
//! or scale, or visibility). Frames are host frames; the exporter converts
//! them to milliseconds with the scene frame rate.

use serde::{Deserialize, Serialize};

use i3d_core::{Error, Result};

/// Animated channel of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimProperty {
    TranslationX,
    TranslationY,
    TranslationZ,
    /// Radians
    RotationX,
    RotationY,
    RotationZ,
    ScaleX,
    ScaleY,
    ScaleZ,
    Visibility,
}

/// Transform component a property belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Translation,
    Rotation,
    Scale,
    Visibility,
}

impl AnimProperty {
    pub const ALL: [AnimProperty; 10] = [
        AnimProperty::TranslationX,
        AnimProperty::TranslationY,
        AnimProperty::TranslationZ,
        AnimProperty::RotationX,
        AnimProperty::RotationY,
        AnimProperty::RotationZ,
        AnimProperty::ScaleX,
        AnimProperty::ScaleY,
        AnimProperty::ScaleZ,
        AnimProperty::Visibility,
    ];

    pub fn channel(&self) -> Channel {
        match self {
            AnimProperty::TranslationX | AnimProperty::TranslationY | AnimProperty::TranslationZ => {
                Channel::Translation
            }
            AnimProperty::RotationX | AnimProperty::RotationY | AnimProperty::RotationZ => {
                Channel::Rotation
            }
            AnimProperty::ScaleX | AnimProperty::ScaleY | AnimProperty::ScaleZ => Channel::Scale,
            AnimProperty::Visibility => Channel::Visibility,
        }
    }

    /// Vector component index (0..3), `None` for visibility
    pub fn axis(&self) -> Option<usize> {
        match self {
            AnimProperty::TranslationX | AnimProperty::RotationX | AnimProperty::ScaleX => Some(0),
            AnimProperty::TranslationY | AnimProperty::RotationY | AnimProperty::ScaleY => Some(1),
            AnimProperty::TranslationZ | AnimProperty::RotationZ | AnimProperty::ScaleZ => Some(2),
            AnimProperty::Visibility => None,
        }
    }
}

/// Interpolation between a key and the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Hold the key value until the next key
    Constant,
    #[default]
    Linear,
    /// Cubic Hermite with flat tangents at both keys
    Bezier,
}

/// One keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub frame: f64,
    pub value: f64,
}

impl CurveKey {
    pub fn new(frame: f64, value: f64) -> Self {
        Self { frame, value }
    }
}

/// A keyframed scalar curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCurve {
    pub property: AnimProperty,
    #[serde(default)]
    pub interpolation: Interpolation,
    pub keys: Vec<CurveKey>,
}

impl SourceCurve {
    pub fn new(property: AnimProperty, interpolation: Interpolation, keys: Vec<CurveKey>) -> Self {
        Self {
            property,
            interpolation,
            keys,
        }
    }

    /// Copy with keys sorted by frame; of several keys on one frame the last wins.
    ///
    /// Fails on non-finite frames or values.
    pub fn normalized(&self) -> Result<Self> {
        if let Some(bad) = self
            .keys
            .iter()
            .find(|k| !k.frame.is_finite() || !k.value.is_finite())
        {
            return Err(Error::structural(format!(
                "{:?} curve has a non-finite key at frame {}",
                self.property, bad.frame
            )));
        }

        let mut keys = self.keys.clone();
        // Stable sort keeps authoring order among equal frames
        keys.sort_by(|a, b| a.frame.total_cmp(&b.frame));
        let mut deduped: Vec<CurveKey> = Vec::with_capacity(keys.len());
        for key in keys {
            match deduped.last_mut() {
                Some(last) if last.frame == key.frame => *last = key,
                _ => deduped.push(key),
            }
        }

        Ok(Self {
            property: self.property,
            interpolation: self.interpolation,
            keys: deduped,
        })
    }

    /// First and last key frame
    pub fn frame_range(&self) -> Option<(f64, f64)> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        Some((first.frame, last.frame))
    }

    /// Curve value at `frame`; keys must be normalized.
    ///
    /// Outside the keyed range the nearest key value is held.
    pub fn evaluate(&self, frame: f64) -> Option<f64> {
        let first = self.keys.first()?;
        if frame <= first.frame {
            return Some(first.value);
        }
        let next = self.keys.partition_point(|k| k.frame <= frame);
        if next >= self.keys.len() {
            return self.keys.last().map(|k| k.value);
        }

        let a = self.keys[next - 1];
        let b = self.keys[next];
        let t = (frame - a.frame) / (b.frame - a.frame);
        let value = match self.interpolation {
            Interpolation::Constant => a.value,
            Interpolation::Linear => a.value + (b.value - a.value) * t,
            Interpolation::Bezier => {
                let s = t * t * (3.0 - 2.0 * t);
                a.value + (b.value - a.value) * s
            }
        };
        Some(value)
    }
}

/// All curves of one object
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceAnimation {
    #[serde(default)]
    pub curves: Vec<SourceCurve>,
}

impl SourceAnimation {
    /// True when no curve has a key
    pub fn is_empty(&self) -> bool {
        self.curves.iter().all(|c| c.keys.is_empty())
    }

    /// The curve driving `property`, if any
    pub fn curve(&self, property: AnimProperty) -> Option<&SourceCurve> {
        self.curves
            .iter()
            .find(|c| c.property == property && !c.keys.is_empty())
    }

    /// Keyed frame range over all curves
    pub fn frame_range(&self) -> Option<(f64, f64)> {
        self.curves
            .iter()
            .filter_map(|c| c.frame_range())
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }

    /// Sorted union of every key frame
    pub fn key_frames(&self) -> Vec<f64> {
        let mut frames: Vec<f64> = self
            .curves
            .iter()
            .flat_map(|c| c.keys.iter().map(|k| k.frame))
            .collect();
        frames.sort_by(|a, b| a.total_cmp(b));
        frames.dedup();
        frames
    }

    /// Copy with every curve normalized and duplicate properties rejected
    pub fn normalized(&self) -> Result<Self> {
        let mut curves = Vec::with_capacity(self.curves.len());
        for curve in &self.curves {
            if curves.iter().any(|c: &SourceCurve| c.property == curve.property) {
                return Err(Error::structural(format!(
                    "{:?} is animated by more than one curve",
                    curve.property
                )));
            }
            curves.push(curve.normalized()?);
        }
        Ok(Self { curves })
    }
}
