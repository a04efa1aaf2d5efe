//! Animation track encoding
//!
//! Curves are sampled per node into keyframes carrying whole transform
//! channels. Rotation samples go through the stable trigonometric path so a
//! half turn encodes as an exact `sin = 0`, `cos = -1`.

use tracing::debug;

use i3d_core::math::{bake_rotation, bake_scale, bake_vector, clean_zero, stable_sin_cos, to_degrees};
use i3d_core::{AxisOrientation, Error, ExportConfig, NodeId, Result, SamplingMode, Transform, Vec3};
use i3d_scene::animation::Channel;
use i3d_scene::{AnimProperty, SourceAnimation};

/// Rotation sample: Euler degrees plus per-axis sine and cosine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedRotation {
    pub degrees: Vec3,
    pub sin: Vec3,
    pub cos: Vec3,
}

impl EncodedRotation {
    pub fn from_radians(radians: Vec3) -> Self {
        let (sx, cx) = stable_sin_cos(radians.x);
        let (sy, cy) = stable_sin_cos(radians.y);
        let (sz, cz) = stable_sin_cos(radians.z);
        Self {
            degrees: Vec3::new(to_degrees(radians.x), to_degrees(radians.y), to_degrees(radians.z)),
            sin: Vec3::new(sx, sy, sz),
            cos: Vec3::new(cx, cy, cz),
        }
    }
}

/// One sampled keyframe; channels without curves are `None`
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub time_ms: f64,
    pub translation: Option<Vec3>,
    pub rotation: Option<EncodedRotation>,
    pub scale: Option<Vec3>,
    pub visibility: Option<bool>,
}

/// Sampled animation of one node
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub node: NodeId,
    pub name: String,
    pub keyframes: Vec<Keyframe>,
}

impl AnimationClip {
    pub fn duration_ms(&self) -> f64 {
        match (self.keyframes.first(), self.keyframes.last()) {
            (Some(first), Some(last)) => last.time_ms - first.time_ms,
            _ => 0.0,
        }
    }
}

/// All clips of a document
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSet {
    pub name: String,
    pub clips: Vec<AnimationClip>,
}

impl AnimationSet {
    /// Time of the last keyframe over all clips
    pub fn duration_ms(&self) -> f64 {
        self.clips
            .iter()
            .filter_map(|c| c.keyframes.last().map(|k| k.time_ms))
            .fold(0.0, f64::max)
    }
}

/// Samples source curves into clips
#[derive(Debug)]
pub struct AnimationTrackEncoder<'a> {
    config: &'a ExportConfig,
    fps: f64,
}

impl<'a> AnimationTrackEncoder<'a> {
    pub fn new(config: &'a ExportConfig, fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::scene_format(format!("frame rate must be positive, got {}", fps)));
        }
        Ok(Self { config, fps })
    }

    /// Frame number to milliseconds
    pub fn frame_to_ms(&self, frame: f64) -> f64 {
        clean_zero(frame / self.fps * 1000.0)
    }

    /// Frames to sample for a normalized animation
    pub fn sample_frames(&self, animation: &SourceAnimation) -> Vec<f64> {
        match self.config.sampling_mode {
            SamplingMode::Keyframes => animation.key_frames(),
            SamplingMode::FixedStep => {
                let Some((start, end)) = animation.frame_range() else {
                    return Vec::new();
                };
                let step = self.config.frame_step;
                let mut frames = Vec::new();
                let mut k = 0u64;
                loop {
                    let frame = start + k as f64 * step;
                    if frame >= end - 1e-9 {
                        break;
                    }
                    frames.push(frame);
                    k += 1;
                }
                frames.push(end);
                frames
            }
        }
    }

    /// Sample one node. `rest` is the authored local transform, used for
    /// components without a curve. Nodes without keys yield `None`.
    pub fn encode(
        &self,
        node: NodeId,
        name: &str,
        rest: &Transform,
        animation: &SourceAnimation,
    ) -> Result<Option<AnimationClip>> {
        let animation = animation.normalized()?;
        if animation.is_empty() {
            return Ok(None);
        }

        let animated = |channel: Channel| {
            AnimProperty::ALL
                .iter()
                .any(|p| p.channel() == channel && animation.curve(*p).is_some())
        };
        let (has_t, has_r, has_s) = (
            animated(Channel::Translation),
            animated(Channel::Rotation),
            animated(Channel::Scale),
        );
        let visibility = animation.curve(AnimProperty::Visibility);

        let sample = |channel: Channel, base: Vec3, frame: f64| {
            let mut v = base.to_array();
            for property in AnimProperty::ALL.iter().filter(|p| p.channel() == channel) {
                if let (Some(curve), Some(axis)) = (animation.curve(*property), property.axis()) {
                    if let Some(value) = curve.evaluate(frame) {
                        v[axis] = value;
                    }
                }
            }
            Vec3::from_array(v)
        };

        let bake = self.config.axis_orientation == AxisOrientation::BakeTransforms;
        let keyframes: Vec<Keyframe> = self
            .sample_frames(&animation)
            .into_iter()
            .map(|frame| {
                let translation = has_t.then(|| {
                    let t = sample(Channel::Translation, rest.translation, frame);
                    if bake { bake_vector(t) } else { t }
                });
                let rotation = has_r.then(|| {
                    let r = sample(Channel::Rotation, rest.rotation, frame);
                    EncodedRotation::from_radians(if bake { bake_rotation(r) } else { r })
                });
                let scale = has_s.then(|| {
                    let s = sample(Channel::Scale, rest.scale, frame);
                    if bake { bake_scale(s) } else { s }
                });
                Keyframe {
                    time_ms: self.frame_to_ms(frame),
                    translation,
                    rotation,
                    scale,
                    visibility: visibility.and_then(|c| c.evaluate(frame)).map(|v| v > 0.5),
                }
            })
            .collect();

        debug!(node = %name, keyframes = keyframes.len(), "Encoded animation clip");
        Ok(Some(AnimationClip {
            node,
            name: name.to_string(),
            keyframes,
        }))
    }
}
