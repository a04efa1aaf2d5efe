//! I3D export pipeline
//!
//! Turns a [`SceneSource`](i3d_scene::SceneSource) into a GIANTS I3D document
//! (XML scene graph, optionally with a binary `.shapes` subfile).
//!
//! Components, leaf first:
//!
//! | Module | Component |
//! |--------|-----------|
//! | [`path`] | `PathResolver`: portable file references |
//! | [`geometry`] | `GeometryEncoder`: vertex dedup, subsets, bounds, UV density |
//! | [`skin`] | `SkinBindingResolver`: bounded, normalized bone weights |
//! | [`merge`] | `MergeGroupResolver`: merge-group consolidation |
//! | [`animation`] | `AnimationTrackEncoder`: sampled keyframe clips |
//! | [`defaults`] | `AttributeDiffWriter`: documented defaults and the diff against them |
//! | [`builder`] | `SceneGraphBuilder`: the normalized, id-stable node tree |
//! | [`writer`] | `I3dDocumentWriter`: deterministic XML and binary output |
//!
//! # Example
//!
//! ```rust,ignore
//! use i3d_core::ExportConfig;
//! use i3d_export::I3dExporter;
//! use i3d_scene::SceneDescription;
//!
//! let scene = SceneDescription::from_json_file("tractor.scene.json")?;
//! let report = I3dExporter::new(ExportConfig::default())?.export(&scene, "tractor.i3d")?;
//! println!("{}", report.summary());
//! ```

pub mod animation;
pub mod builder;
pub mod cancel;
pub mod defaults;
pub mod exporter;
pub mod geometry;
pub mod graph;
pub mod material;
pub mod merge;
pub mod path;
pub mod report;
pub mod skin;
pub mod writer;

pub use animation::{AnimationClip, AnimationSet, AnimationTrackEncoder, EncodedRotation, Keyframe};
pub use builder::SceneGraphBuilder;
pub use cancel::CancelToken;
pub use defaults::AttributeDiffWriter;
pub use exporter::{I3dExporter, SHAPES_EXTENSION};
pub use geometry::{EncodedMesh, GeometryEncoder, StreamFlags, Subset};
pub use graph::{SceneGraph, SceneNode};
pub use material::ExportMaterial;
pub use merge::MergeGroupResolver;
pub use path::{PathReference, PathResolver};
pub use report::{ExportReport, NodeSummary, PathResolutionWarning, ShapeStats, SkippedItem};
pub use skin::{BoneRegistry, Influence, SkinBinding, SkinBindingResolver};
pub use writer::{read_shapes_file, DecodedShape, I3dDocumentWriter, WrittenDocument};
