//! Source materials

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use i3d_core::ParamValue;

/// Texture slot of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureKind {
    Diffuse,
    Normal,
    Gloss,
    Emissive,
    /// Custom shader texture, named by [`TextureSlot::name`]
    Custom,
}

impl TextureKind {
    /// Child element name inside `<Material>`
    pub fn element_name(&self) -> &'static str {
        match self {
            TextureKind::Diffuse => "Texture",
            TextureKind::Normal => "Normalmap",
            TextureKind::Gloss => "Glossmap",
            TextureKind::Emissive => "Emissivemap",
            TextureKind::Custom => "Custommap",
        }
    }
}

/// A texture file bound to a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureSlot {
    pub kind: TextureKind,
    /// Template texture name of a custom map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// File reference as authored (absolute, relative or `$data/...`)
    pub path: String,
}

/// A material as authored on the host side
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMaterial {
    pub name: String,
    /// Custom shader XML reference
    pub shader: Option<String>,
    pub shader_variation: Option<String>,
    /// Standard material attributes (`diffuseColor`, `emissiveColor`, ...)
    pub parameters: BTreeMap<String, ParamValue>,
    /// Custom shader parameters, by template parameter name
    pub custom_parameters: BTreeMap<String, ParamValue>,
    pub textures: Vec<TextureSlot>,
}

impl SourceMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether an emissive texture is bound
    pub fn has_emissive_texture(&self) -> bool {
        self.textures.iter().any(|t| t.kind == TextureKind::Emissive)
    }

    /// Textures in document order: fixed slots first, then custom maps by name
    pub fn sorted_textures(&self) -> Vec<&TextureSlot> {
        let mut textures: Vec<&TextureSlot> = self.textures.iter().collect();
        textures.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        textures
    }

    /// Topology key compared across merge-group members
    pub fn shader_key(&self) -> &str {
        self.shader.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_json() {
        let slot: TextureSlot =
            serde_json::from_str(r#"{"kind":"custom","name":"mTrackArray","path":"track.dds"}"#)
                .unwrap();
        assert_eq!(slot.kind, TextureKind::Custom);
        assert_eq!(slot.name.as_deref(), Some("mTrackArray"));
        assert_eq!(slot.kind.element_name(), "Custommap");

        let slot: TextureSlot =
            serde_json::from_str(r#"{"kind":"emissive","path":"glow.dds"}"#).unwrap();
        assert_eq!(slot.kind, TextureKind::Emissive);
    }

    #[test]
    fn test_sorted_textures() {
        let mut material = SourceMaterial::new("body");
        for (kind, name, path) in [
            (TextureKind::Custom, Some("b"), "b.dds"),
            (TextureKind::Normal, None, "n.dds"),
            (TextureKind::Custom, Some("a"), "a.dds"),
            (TextureKind::Diffuse, None, "d.dds"),
        ] {
            material.textures.push(TextureSlot {
                kind,
                name: name.map(String::from),
                path: path.into(),
            });
        }
        let order: Vec<&str> = material.sorted_textures().iter().map(|t| t.path.as_str()).collect();
        assert_eq!(order, vec!["d.dds", "n.dds", "a.dds", "b.dds"]);
        assert!(!material.has_emissive_texture());
    }
}
