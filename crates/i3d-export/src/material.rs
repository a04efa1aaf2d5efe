//! Materials as written to the document

use std::collections::BTreeMap;

use i3d_core::{ExportConfig, ParamValue};
use i3d_scene::{shader_id, ShaderLibrary, SourceMaterial, TextureSlot};

use crate::defaults::{diff_custom_parameters, AttributeDiffWriter};

const EMISSIVE_COLOR: &str = "emissiveColor";

/// A material after emission handling and default diffing.
///
/// Two source materials that produce equal `ExportMaterial`s share one
/// `<Material>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportMaterial {
    pub name: String,
    /// Shader reference as authored, resolved when written
    pub shader: Option<String>,
    pub shader_variation: Option<String>,
    /// Tabled attributes that differ from their default
    pub attributes: Vec<(String, ParamValue)>,
    pub custom_parameters: Vec<(String, ParamValue)>,
    /// Sorted by kind, then name
    pub textures: Vec<TextureSlot>,
}

impl ExportMaterial {
    pub fn from_source(source: &SourceMaterial, config: &ExportConfig, library: &ShaderLibrary) -> Self {
        let mut parameters = source.parameters.clone();
        if config.emission_nullifier && !source.has_emissive_texture() {
            nullify_emission(&mut parameters);
        }

        let shader_id = source.shader.as_deref().map(shader_id);
        Self {
            name: source.name.clone(),
            shader: source.shader.clone(),
            shader_variation: source.shader_variation.clone(),
            attributes: AttributeDiffWriter::material().diff(&parameters),
            custom_parameters: diff_custom_parameters(
                shader_id.as_deref(),
                &source.custom_parameters,
                library,
            ),
            textures: source.sorted_textures().into_iter().cloned().collect(),
        }
    }

    /// Material used for shapes without any material slot
    pub fn fallback() -> Self {
        Self {
            name: "default".to_string(),
            shader: None,
            shader_variation: None,
            attributes: Vec::new(),
            custom_parameters: Vec::new(),
            textures: Vec::new(),
        }
    }
}

/// Force the emissive rgb to black, keeping alpha
pub fn nullify_emission(parameters: &mut BTreeMap<String, ParamValue>) {
    if let Some(value) = parameters.get_mut(EMISSIVE_COLOR) {
        match value {
            ParamValue::Color(c) => {
                c[0] = 0.0;
                c[1] = 0.0;
                c[2] = 0.0;
            }
            ParamValue::Vector(v) => {
                for component in v.iter_mut().take(3) {
                    *component = 0.0;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i3d_scene::TextureKind;

    fn emissive_material() -> SourceMaterial {
        let mut material = SourceMaterial::new("lamp");
        material
            .parameters
            .insert(EMISSIVE_COLOR.into(), ParamValue::Color([1.0, 1.0, 1.0, 1.0]));
        material
    }

    #[test]
    fn test_emission_nullified() {
        let config = ExportConfig::default();
        let material = ExportMaterial::from_source(&emissive_material(), &config, &ShaderLibrary::new());
        // Black emission equals the default and is not written at all
        assert!(material.attributes.iter().all(|(n, _)| n != EMISSIVE_COLOR));
    }

    #[test]
    fn test_emission_kept_with_texture_or_disabled() {
        let mut source = emissive_material();
        let disabled = ExportConfig {
            emission_nullifier: false,
            ..Default::default()
        };
        let material = ExportMaterial::from_source(&source, &disabled, &ShaderLibrary::new());
        assert_eq!(
            material.attributes,
            vec![(EMISSIVE_COLOR.to_string(), ParamValue::Color([1.0, 1.0, 1.0, 1.0]))]
        );

        source.textures.push(TextureSlot {
            kind: TextureKind::Emissive,
            name: None,
            path: "glow.dds".into(),
        });
        let material = ExportMaterial::from_source(&source, &ExportConfig::default(), &ShaderLibrary::new());
        assert_eq!(material.attributes.len(), 1);
    }

    #[test]
    fn test_alpha_kept() {
        let mut parameters = BTreeMap::new();
        parameters.insert(EMISSIVE_COLOR.to_string(), ParamValue::Color([0.3, 0.2, 0.1, 0.5]));
        nullify_emission(&mut parameters);
        assert_eq!(parameters[EMISSIVE_COLOR], ParamValue::Color([0.0, 0.0, 0.0, 0.5]));
    }

    #[test]
    fn test_equal_sources_dedup() {
        let config = ExportConfig::default();
        let library = ShaderLibrary::new();
        let a = ExportMaterial::from_source(&emissive_material(), &config, &library);
        let mut other = emissive_material();
        other.parameters.insert(EMISSIVE_COLOR.into(), ParamValue::Color([0.2, 0.0, 0.0, 1.0]));
        let b = ExportMaterial::from_source(&other, &config, &library);
        assert_eq!(a, b);
    }
}
