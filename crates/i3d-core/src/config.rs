//! Export configuration
//!
//! The configuration is an immutable value handed to the exporter once per
//! export call. Every field has a default so partial JSON/YAML files load.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum number of bone influences per vertex (fixed by the engine)
pub const MAX_SKIN_INFLUENCES: usize = 4;

/// How file references are written into the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMode {
    /// Normalized absolute path
    Absolute,
    /// Relative to the directory of the exported `.i3d`
    #[default]
    RelativeToDocument,
    /// `$data/...` rooted at the configured game install
    RelativeToInstall,
}

/// Physical encoding of the geometry payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryEncoding {
    /// Vertex and triangle data inline in the XML document
    #[default]
    Embedded,
    /// Separate little-endian `.shapes` subfile next to the document
    Binary,
}

/// How animation curves are sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Every `frame_step` frames over the keyed range
    FixedStep,
    /// Exactly at the authored keyframes
    #[default]
    Keyframes,
}

/// Axis handling between the Z-up source and the Y-up engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisOrientation {
    /// Convert Z-up data to Y-up
    #[default]
    BakeTransforms,
    /// Export without any changes
    KeepTransforms,
}

/// Per-feature export switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportToggles {
    /// Export shapes (otherwise written as transform groups)
    pub shapes: bool,
    /// Export lights (otherwise written as transform groups)
    pub lights: bool,
    /// Export cameras (otherwise written as transform groups)
    pub cameras: bool,
    pub animation: bool,
    pub normals: bool,
    pub uvs: bool,
    pub colors: bool,
    pub skin_weights: bool,
    pub merge_groups: bool,
    pub user_attributes: bool,
}

impl Default for ExportToggles {
    fn default() -> Self {
        Self {
            shapes: true,
            lights: true,
            cameras: true,
            animation: true,
            normals: true,
            uvs: true,
            colors: true,
            skin_weights: true,
            merge_groups: true,
            user_attributes: true,
        }
    }
}

/// Immutable configuration of one export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Game installation directory used for `$data/...` paths
    pub install_root: Option<PathBuf>,
    pub path_mode: PathMode,
    pub geometry_encoding: GeometryEncoding,
    /// Export vertex colors in linear space (snowHeapShader deformation)
    pub snow_heap_mode: bool,
    /// Force untextured emission to black
    pub emission_nullifier: bool,
    pub sampling_mode: SamplingMode,
    /// Frame step for [`SamplingMode::FixedStep`]
    pub frame_step: f64,
    pub axis_orientation: AxisOrientation,
    pub export: ExportToggles,
    /// Meshes whose binary payload exceeds this many bytes are streamed
    /// vertex by vertex instead of being assembled in memory
    pub stream_threshold_bytes: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            install_root: None,
            path_mode: PathMode::default(),
            geometry_encoding: GeometryEncoding::default(),
            snow_heap_mode: false,
            emission_nullifier: true,
            sampling_mode: SamplingMode::default(),
            frame_step: 1.0,
            axis_orientation: AxisOrientation::default(),
            export: ExportToggles::default(),
            stream_threshold_bytes: 4 * 1024 * 1024,
        }
    }
}

impl ExportConfig {
    /// Maximum skin influences per vertex (always [`MAX_SKIN_INFLUENCES`])
    pub fn max_skin_influences(&self) -> usize {
        MAX_SKIN_INFLUENCES
    }

    /// Install root, if one is configured and non-empty
    pub fn install_root(&self) -> Option<&Path> {
        self.install_root
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !self.frame_step.is_finite() || self.frame_step <= 0.0 {
            return Err(Error::invalid_config(format!(
                "frame_step must be a positive number, got {}",
                self.frame_step
            )));
        }
        Ok(())
    }

    /// Parse a JSON configuration
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::invalid_config(format!("JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| Error::invalid_config(format!("YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file; `.yaml`/`.yml` are read as YAML, anything else as JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if is_yaml {
            Self::from_yaml_str(&text)
        } else {
            Self::from_json_str(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExportConfig::default();
        assert_eq!(config.path_mode, PathMode::RelativeToDocument);
        assert_eq!(config.geometry_encoding, GeometryEncoding::Embedded);
        assert!(config.emission_nullifier);
        assert!(!config.snow_heap_mode);
        assert_eq!(config.max_skin_influences(), 4);
        assert!(config.export.merge_groups);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = ExportConfig::from_json_str(
            r#"{ "path_mode": "relative_to_install", "install_root": "C:/Games/FS25",
                 "export": { "animation": false } }"#,
        )
        .unwrap();
        assert_eq!(config.path_mode, PathMode::RelativeToInstall);
        assert_eq!(config.install_root(), Some(Path::new("C:/Games/FS25")));
        assert!(!config.export.animation);
        assert!(config.export.shapes);
    }

    #[test]
    fn test_yaml() {
        let config = ExportConfig::from_yaml_str(
            "geometry_encoding: binary\nsampling_mode: fixed_step\nframe_step: 2.0\n",
        )
        .unwrap();
        assert_eq!(config.geometry_encoding, GeometryEncoding::Binary);
        assert_eq!(config.sampling_mode, SamplingMode::FixedStep);
        assert_eq!(config.frame_step, 2.0);
    }

    #[test]
    fn test_invalid_frame_step() {
        let err = ExportConfig::from_json_str(r#"{ "frame_step": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_empty_install_root_is_none() {
        let config = ExportConfig {
            install_root: Some(PathBuf::new()),
            ..Default::default()
        };
        assert!(config.install_root().is_none());
    }
}
