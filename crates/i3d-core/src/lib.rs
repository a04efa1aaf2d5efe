//! I3D Exporter Core Library
//!
//! This crate provides common types, the immutable export configuration and
//! the error taxonomy shared across all exporter components.

pub mod config;
pub mod error;
pub mod math;
pub mod types;
pub mod value;

pub use config::{
    AxisOrientation, ExportConfig, ExportToggles, GeometryEncoding, PathMode, SamplingMode,
    MAX_SKIN_INFLUENCES,
};
pub use error::{ConflictError, Error, Result, ResultExt};
pub use math::{Affine, Mat3};
pub use types::*;
pub use value::{format_float, format_floats, ParamValue, DIFF_TOLERANCE};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::config::ExportConfig;
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::types::*;
    pub use crate::value::ParamValue;
}
