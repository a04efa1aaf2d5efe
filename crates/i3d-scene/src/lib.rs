//! i3d-scene
//!
//! The host adapter contract of the I3D exporter and its headless
//! implementation.
//!
//! The exporter core never talks to a live host application. Everything it
//! needs arrives through [`SceneSource`]: an ordered object tree with
//! per-object transforms, face-corner meshes, material slots, animation
//! curves and merge-group tags.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`traits`] | the `SceneSource` adapter trait |
//! | [`scene`] | `SceneDescription`, the serde (JSON) adapter |
//! | [`mesh`] | face-corner source meshes and raw skin weights |
//! | [`material`] | material slots, textures, typed parameters |
//! | [`animation`] | keyframed curves and their evaluation |
//! | [`shaders`] | GIANTS custom shader templates (read-only) |
//! | [`logging`] | tracing subscriber setup |
//!
//! # Example
//!
//! ```rust,ignore
//! use i3d_scene::{SceneDescription, SceneSource};
//!
//! let scene = SceneDescription::from_json_file("tractor.scene.json")?;
//! println!("{} roots", scene.root_keys().len());
//! ```

pub mod animation;
pub mod logging;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod shaders;
pub mod traits;

pub use animation::{AnimProperty, CurveKey, Interpolation, SourceAnimation, SourceCurve};
pub use material::{SourceMaterial, TextureKind, TextureSlot};
pub use mesh::{Corner, RawInfluence, RawInfluences, SourceMesh, SourceTriangle};
pub use scene::{
    BoundingVolumeSettings, LightType, SceneDescription, SourceCamera, SourceLight, SourceObject,
};
pub use shaders::{shader_id, ShaderLibrary, ShaderParameter, ShaderTemplate, ShaderTexture};
pub use traits::SceneSource;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
