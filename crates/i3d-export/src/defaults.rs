//! Documented attribute defaults and the diff against them
//!
//! An attribute is written only when its value differs from the default in
//! the table (numbers within six decimals, everything else exactly). Identity
//! fields such as `name` and `nodeId` are not part of any table; the document
//! writer always emits them.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use tracing::debug;

use i3d_core::ParamValue;
use i3d_scene::ShaderLibrary;

/// Ordered `(attribute, default)` pairs
pub type DefaultTable = Vec<(&'static str, ParamValue)>;

fn vector(values: &[f64]) -> ParamValue {
    ParamValue::Vector(values.to_vec())
}

/// Scene node attributes (transform groups, shapes, lights, cameras)
pub static NODE_DEFAULTS: Lazy<DefaultTable> = Lazy::new(|| {
    vec![
        ("translation", vector(&[0.0, 0.0, 0.0])),
        ("rotation", vector(&[0.0, 0.0, 0.0])),
        ("scale", vector(&[1.0, 1.0, 1.0])),
        ("visibility", ParamValue::Bool(true)),
        ("clipDistance", ParamValue::Numeric(0.0)),
        ("objectMask", ParamValue::Integer(255)),
        ("castsShadows", ParamValue::Bool(false)),
        ("receiveShadows", ParamValue::Bool(false)),
        ("nonRenderable", ParamValue::Bool(false)),
        ("static", ParamValue::Bool(true)),
        ("dynamic", ParamValue::Bool(false)),
        ("kinematic", ParamValue::Bool(false)),
        ("compound", ParamValue::Bool(false)),
        ("compoundChild", ParamValue::Bool(false)),
        ("collision", ParamValue::Bool(true)),
        ("collisionFilterGroup", ParamValue::Integer(255)),
        ("collisionFilterMask", ParamValue::Integer(255)),
        ("trigger", ParamValue::Bool(false)),
        ("restitution", ParamValue::Numeric(0.0)),
        ("staticFriction", ParamValue::Numeric(0.5)),
        ("dynamicFriction", ParamValue::Numeric(0.5)),
        ("linearDamping", ParamValue::Numeric(0.0)),
        ("angularDamping", ParamValue::Numeric(0.01)),
        ("density", ParamValue::Numeric(1.0)),
        ("ccd", ParamValue::Bool(false)),
        ("solverIterationCount", ParamValue::Integer(4)),
        ("decalLayer", ParamValue::Integer(0)),
        ("doubleSided", ParamValue::Bool(false)),
        ("lockedGroup", ParamValue::Bool(false)),
        ("boundingVolumeMode", ParamValue::Enum("box".into())),
        ("cpuMesh", ParamValue::Bool(false)),
        ("lod", ParamValue::Bool(false)),
        ("terrainDecal", ParamValue::Bool(false)),
    ]
});

/// `<Light>` attributes
pub static LIGHT_DEFAULTS: Lazy<DefaultTable> = Lazy::new(|| {
    vec![
        ("type", ParamValue::Enum("point".into())),
        ("color", vector(&[1.0, 1.0, 1.0])),
        ("range", ParamValue::Numeric(10.0)),
        ("coneAngle", ParamValue::Numeric(60.0)),
        ("castShadowMap", ParamValue::Bool(false)),
        ("emitDiffuse", ParamValue::Bool(true)),
        ("emitSpecular", ParamValue::Bool(true)),
    ]
});

/// `<Camera>` attributes
pub static CAMERA_DEFAULTS: Lazy<DefaultTable> = Lazy::new(|| {
    vec![
        ("fov", ParamValue::Numeric(60.0)),
        ("nearClip", ParamValue::Numeric(0.1)),
        ("farClip", ParamValue::Numeric(10000.0)),
        ("orthographic", ParamValue::Bool(false)),
    ]
});

/// `<Material>` attributes
pub static MATERIAL_DEFAULTS: Lazy<DefaultTable> = Lazy::new(|| {
    vec![
        ("diffuseColor", ParamValue::Color([0.5, 0.5, 0.5, 1.0])),
        ("specularColor", vector(&[0.5, 1.0, 0.0])),
        ("emissiveColor", ParamValue::Color([0.0, 0.0, 0.0, 1.0])),
        ("alphaBlending", ParamValue::Bool(false)),
        ("shadingRate", ParamValue::Enum("1x1".into())),
        ("refractionMap", ParamValue::Bool(false)),
    ]
});

/// Decides which attributes of one element are written
#[derive(Debug, Clone, Copy)]
pub struct AttributeDiffWriter<'a> {
    table: &'a [(&'static str, ParamValue)],
}

impl AttributeDiffWriter<'static> {
    pub fn node() -> Self {
        Self::new(&NODE_DEFAULTS)
    }

    pub fn light() -> Self {
        Self::new(&LIGHT_DEFAULTS)
    }

    pub fn camera() -> Self {
        Self::new(&CAMERA_DEFAULTS)
    }

    pub fn material() -> Self {
        Self::new(&MATERIAL_DEFAULTS)
    }
}

impl<'a> AttributeDiffWriter<'a> {
    pub fn new(table: &'a [(&'static str, ParamValue)]) -> Self {
        Self { table }
    }

    pub fn default_for(&self, name: &str) -> Option<&ParamValue> {
        self.table.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Whether `value` must be written; attributes without a default always are
    pub fn should_emit(&self, name: &str, value: &ParamValue) -> bool {
        match self.default_for(name) {
            Some(default) => value.differs_from(default),
            None => true,
        }
    }

    /// Attributes to write: tabled ones in table order, then unknown ones
    /// sorted by name
    pub fn diff(&self, values: &BTreeMap<String, ParamValue>) -> Vec<(String, ParamValue)> {
        let mut out = Vec::new();
        for (name, default) in self.table {
            if let Some(value) = values.get(*name) {
                if value.differs_from(default) {
                    out.push((name.to_string(), value.clone()));
                }
            }
        }
        for (name, value) in values {
            if self.default_for(name).is_none() {
                debug!(attribute = %name, "Attribute has no documented default, writing it");
                out.push((name.clone(), value.clone()));
            }
        }
        out
    }
}

/// Custom shader parameters to write, sorted by name.
///
/// Defaults come from the shader template; a parameter without a known
/// default is always written.
pub fn diff_custom_parameters(
    shader_id: Option<&str>,
    values: &BTreeMap<String, ParamValue>,
    library: &ShaderLibrary,
) -> Vec<(String, ParamValue)> {
    values
        .iter()
        .filter(|(name, value)| {
            match shader_id.and_then(|id| library.default_for(id, name)) {
                Some(default) => value.differs_from(default),
                None => true,
            }
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use i3d_scene::ShaderTemplate;

    fn values(pairs: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_default_never_written() {
        let writer = AttributeDiffWriter::node();
        let out = writer.diff(&values(&[
            ("visibility", ParamValue::Bool(true)),
            ("staticFriction", ParamValue::Numeric(0.5000004)),
            ("objectMask", ParamValue::Integer(255)),
        ]));
        assert!(out.is_empty());
    }

    #[test]
    fn test_changed_always_written_in_table_order() {
        let writer = AttributeDiffWriter::node();
        let out = writer.diff(&values(&[
            ("castsShadows", ParamValue::Bool(true)),
            ("visibility", ParamValue::Bool(false)),
            ("zz_custom", ParamValue::Integer(1)),
            ("aa_custom", ParamValue::Integer(2)),
        ]));
        let names: Vec<&str> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["visibility", "castsShadows", "aa_custom", "zz_custom"]);
    }

    #[test]
    fn test_vector_tolerance_and_length() {
        let writer = AttributeDiffWriter::node();
        assert!(!writer.should_emit("scale", &ParamValue::Vector(vec![1.0, 1.0000001, 1.0])));
        assert!(writer.should_emit("scale", &ParamValue::Vector(vec![1.0, 1.0])));
        assert!(writer.should_emit("scale", &ParamValue::Vector(vec![1.0, 2.0, 1.0])));
    }

    #[test]
    fn test_material_table() {
        let writer = AttributeDiffWriter::material();
        assert!(!writer.should_emit("emissiveColor", &ParamValue::Color([0.0, 0.0, 0.0, 1.0])));
        assert!(writer.should_emit("emissiveColor", &ParamValue::Color([1.0, 1.0, 1.0, 1.0])));
        assert!(writer.should_emit("shadingRate", &ParamValue::Enum("2x2".into())));
    }

    #[test]
    fn test_custom_parameters() {
        let xml = r#"<CustomShader>
            <Parameters>
                <Parameter name="dirtScale" type="float" defaultValue="1.0"/>
            </Parameters>
        </CustomShader>"#;
        let mut library = ShaderLibrary::new();
        library.insert(ShaderTemplate::parse(xml.as_bytes(), "vehicleShader.xml").unwrap());

        let params = values(&[
            ("dirtScale", ParamValue::Numeric(1.0)),
            ("wetness", ParamValue::Numeric(0.0)),
        ]);
        let out = diff_custom_parameters(Some("vehicleShader"), &params, &library);
        assert_eq!(out, vec![("wetness".to_string(), ParamValue::Numeric(0.0))]);

        // No shader: nothing has a default
        let out = diff_custom_parameters(None, &params, &library);
        assert_eq!(out.len(), 2);
    }
}
