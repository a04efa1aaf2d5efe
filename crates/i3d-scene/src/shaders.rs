//! GIANTS custom shader templates
//!
//! Shader XML files declare the parameters, textures and variations a
//! material may set. The exporter only reads them: parameter defaults feed
//! the attribute diff, keyed by (shader id, parameter name).
//!
//! ```xml
//! <CustomShader version="5">
//!     <Parameters>
//!         <Parameter name="colorScale" type="float3" defaultValue="1 1 1"/>
//!     </Parameters>
//!     <Textures>
//!         <Texture name="mTrackArray" defaultFilename="$data/shaders/default_track.png"/>
//!     </Textures>
//!     <Variations>
//!         <Variation name="DIRT"/>
//!     </Variations>
//! </CustomShader>
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use xmltree::Element;

use i3d_core::{Error, ParamValue, Result};

/// Shader id of a shader reference: its file stem
pub fn shader_id(reference: &str) -> String {
    let file = reference.rsplit(['/', '\\']).next().unwrap_or(reference);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

/// One `<Parameter>` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderParameter {
    pub name: String,
    /// Declared type (`float`, `float2`, `float3`, `float4`)
    pub param_type: String,
    pub default_value: Option<ParamValue>,
    /// Variation group the parameter belongs to, if any
    pub group: Option<String>,
}

/// One `<Texture>` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderTexture {
    pub name: String,
    pub default_filename: Option<String>,
}

/// A parsed shader template
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderTemplate {
    /// File stem of the template
    pub id: String,
    pub path: PathBuf,
    pub parameters: Vec<ShaderParameter>,
    pub textures: Vec<ShaderTexture>,
    pub variations: Vec<String>,
}

impl ShaderTemplate {
    /// Parse a template from XML
    pub fn parse<R: Read>(reader: R, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let root = Element::parse(reader).map_err(|e| Error::ShaderTemplate {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if root.name != "CustomShader" {
            return Err(Error::ShaderTemplate {
                path,
                message: format!("root element is <{}>, expected <CustomShader>", root.name),
            });
        }

        let mut parameters = Vec::new();
        for element in child_elements(&root, "Parameters", "Parameter") {
            let Some(name) = element.attributes.get("name") else {
                warn!(path = %path.display(), "Parameter without name skipped");
                continue;
            };
            let param_type = element
                .attributes
                .get("type")
                .cloned()
                .unwrap_or_else(|| "float".to_string());
            let default_value = match element.attributes.get("defaultValue") {
                Some(text) => Some(parse_default(text, &param_type).map_err(|message| {
                    Error::ShaderTemplate {
                        path: path.clone(),
                        message: format!("parameter '{}': {}", name, message),
                    }
                })?),
                None => None,
            };
            parameters.push(ShaderParameter {
                name: name.clone(),
                param_type,
                default_value,
                group: element.attributes.get("group").cloned(),
            });
        }

        let textures = child_elements(&root, "Textures", "Texture")
            .filter_map(|element| {
                Some(ShaderTexture {
                    name: element.attributes.get("name")?.clone(),
                    default_filename: element.attributes.get("defaultFilename").cloned(),
                })
            })
            .collect();

        let variations = child_elements(&root, "Variations", "Variation")
            .filter_map(|element| element.attributes.get("name").cloned())
            .collect();

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_default();

        Ok(Self {
            id,
            path,
            parameters,
            textures,
            variations,
        })
    }

    /// Parse a template file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Self::parse(std::io::BufReader::new(file), path)
    }

    pub fn parameter(&self, name: &str) -> Option<&ShaderParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Documented default of a parameter
    pub fn default_value(&self, name: &str) -> Option<&ParamValue> {
        self.parameter(name)?.default_value.as_ref()
    }

    pub fn has_variation(&self, name: &str) -> bool {
        self.variations.iter().any(|v| v == name)
    }
}

fn child_elements<'a>(
    root: &'a Element,
    container: &'a str,
    item: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    root.get_child(container)
        .into_iter()
        .flat_map(|c| c.children.iter())
        .filter_map(|node| node.as_element())
        .filter(move |e| e.name == item)
}

fn parse_default(text: &str, param_type: &str) -> std::result::Result<ParamValue, String> {
    let values = text
        .split_whitespace()
        .map(|s| s.parse::<f64>().map_err(|e| format!("'{}': {}", s, e)))
        .collect::<std::result::Result<Vec<f64>, String>>()?;

    let expected = match param_type {
        "float" => 1,
        "float2" => 2,
        "float3" => 3,
        "float4" => 4,
        other => return Err(format!("unsupported type '{}'", other)),
    };
    if values.len() != expected {
        return Err(format!(
            "{} expects {} values, got {}",
            param_type,
            expected,
            values.len()
        ));
    }
    Ok(if expected == 1 {
        ParamValue::Numeric(values[0])
    } else {
        ParamValue::Vector(values)
    })
}

/// Set of shader templates keyed by shader id
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    templates: BTreeMap<String, ShaderTemplate>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.xml` file of a directory (not recursive)
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("xml"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut library = Self::new();
        for path in paths {
            let template = ShaderTemplate::from_file(&path)?;
            debug!(shader = %template.id, parameters = template.parameters.len(), "Loaded shader template");
            library.insert(template);
        }
        Ok(library)
    }

    /// Add a template, replacing one with the same id
    pub fn insert(&mut self, template: ShaderTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<&ShaderTemplate> {
        self.templates.get(id)
    }

    /// Default of a custom parameter, keyed by (shader id, parameter name)
    pub fn default_for(&self, shader_id: &str, parameter: &str) -> Option<&ParamValue> {
        self.get(shader_id)?.default_value(parameter)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates in id order
    pub fn iter(&self) -> impl Iterator<Item = &ShaderTemplate> {
        self.templates.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<CustomShader version="5">
    <Parameters>
        <Parameter name="colorScale" type="float3" defaultValue="1 1 1"/>
        <Parameter name="dirtScale" type="float" defaultValue="0.5" group="DIRT"/>
        <Parameter name="noDefault" type="float4"/>
    </Parameters>
    <Textures>
        <Texture name="mTrackArray" defaultFilename="$data/shaders/default_track.png"/>
    </Textures>
    <Variations>
        <Variation name="DIRT"/>
    </Variations>
</CustomShader>"#;

    #[test]
    fn test_shader_id() {
        assert_eq!(shader_id("$data/shaders/vehicleShader.xml"), "vehicleShader");
        assert_eq!(shader_id("C:\\mods\\shaders\\treeShader.xml"), "treeShader");
        assert_eq!(shader_id("plain"), "plain");
    }

    #[test]
    fn test_parse_template() {
        let template = ShaderTemplate::parse(TEMPLATE.as_bytes(), "shaders/tireShader.xml").unwrap();
        assert_eq!(template.id, "tireShader");
        assert_eq!(template.parameters.len(), 3);
        assert_eq!(
            template.default_value("colorScale"),
            Some(&ParamValue::Vector(vec![1.0, 1.0, 1.0]))
        );
        assert_eq!(template.default_value("dirtScale"), Some(&ParamValue::Numeric(0.5)));
        assert_eq!(template.parameter("dirtScale").unwrap().group.as_deref(), Some("DIRT"));
        assert_eq!(template.default_value("noDefault"), None);
        assert_eq!(template.textures[0].name, "mTrackArray");
        assert!(template.has_variation("DIRT"));
    }

    #[test]
    fn test_wrong_root() {
        let err = ShaderTemplate::parse("<Shader/>".as_bytes(), "x.xml").unwrap_err();
        assert!(matches!(err, Error::ShaderTemplate { .. }));
    }

    #[test]
    fn test_value_count_mismatch() {
        let xml = r#"<CustomShader><Parameters><Parameter name="a" type="float2" defaultValue="1"/></Parameters></CustomShader>"#;
        assert!(ShaderTemplate::parse(xml.as_bytes(), "x.xml").is_err());
    }

    #[test]
    fn test_library_lookup() {
        let mut library = ShaderLibrary::new();
        library.insert(ShaderTemplate::parse(TEMPLATE.as_bytes(), "tireShader.xml").unwrap());
        assert_eq!(library.len(), 1);
        assert_eq!(
            library.default_for("tireShader", "dirtScale"),
            Some(&ParamValue::Numeric(0.5))
        );
        assert_eq!(library.default_for("vehicleShader", "dirtScale"), None);
    }
}
