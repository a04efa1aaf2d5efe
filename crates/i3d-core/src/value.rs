//! Typed attribute and parameter values

use serde::{Deserialize, Serialize};

/// Numeric tolerance used when diffing a value against its default (six decimals)
pub const DIFF_TOLERANCE: f64 = 1e-6;

/// A typed value of a material parameter or node attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParamValue {
    Numeric(f64),
    Integer(i64),
    Color([f64; 4]),
    Vector(Vec<f64>),
    Path(String),
    Bool(bool),
    Enum(String),
}

impl ParamValue {
    /// Whether this value must be written when `default` is the documented default.
    ///
    /// Numbers differ when they are more than [`DIFF_TOLERANCE`] apart (per
    /// component for colors and vectors); a NaN component always differs.
    /// Everything else compares exactly.
    pub fn differs_from(&self, default: &ParamValue) -> bool {
        if let (Some(a), Some(b)) = (self.components(), default.components()) {
            return a.len() != b.len()
                || a.iter().zip(b.iter()).any(|(x, y)| {
                    x.is_nan() || y.is_nan() || (x - y).abs() > DIFF_TOLERANCE
                });
        }
        self != default
    }

    /// Numeric components, if this is a numeric-like value
    fn components(&self) -> Option<Vec<f64>> {
        match self {
            ParamValue::Numeric(v) => Some(vec![*v]),
            ParamValue::Integer(v) => Some(vec![*v as f64]),
            ParamValue::Color(c) => Some(c.to_vec()),
            ParamValue::Vector(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Numeric(v) => Some(*v),
            ParamValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Path(s) | ParamValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Type name used in `<UserAttribute>` entries
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Numeric(_) => "float",
            ParamValue::Integer(_) => "integer",
            ParamValue::Color(_) | ParamValue::Vector(_) => "vector",
            ParamValue::Bool(_) => "boolean",
            ParamValue::Path(_) | ParamValue::Enum(_) => "string",
        }
    }

    /// Attribute text as written into the XML document
    pub fn to_attribute_string(&self) -> String {
        match self {
            ParamValue::Numeric(v) => format_float(*v),
            ParamValue::Integer(v) => v.to_string(),
            ParamValue::Color(c) => format_floats(c),
            ParamValue::Vector(v) => format_floats(v),
            ParamValue::Path(s) | ParamValue::Enum(s) => s.clone(),
            ParamValue::Bool(b) => b.to_string(),
        }
    }
}

/// Format a float with at most six decimals, trailing zeros trimmed, no `-0`
pub fn format_float(value: f64) -> String {
    let mut text = format!("{:.6}", value);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

/// Space separated list of formatted floats
pub fn format_floats(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_float(*v))
        .collect::<Vec<_>>()
        .join(" ")
}
