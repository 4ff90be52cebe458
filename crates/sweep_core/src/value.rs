//! Scalar values, field types and evaluation scopes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};

/// Names bound to values while rendering or evaluating for one case.
pub type Scope = BTreeMap<String, Scalar>;

/// A single parameter, expression or captured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Str(_) => None,
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Int(_) => ScalarType::Integer,
            Self::Float(_) => ScalarType::Float,
            Self::Str(_) => ScalarType::String,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.scalar_type().as_str()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 => {
                write!(f, "{value:.1}")
            }
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Integer,
    Float,
    String,
}

impl ScalarType {
    /// Parse a type description as accepted in the `types` table.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim() {
            "int" | "integer" => Ok(Self::Integer),
            "float" | "floating" | "double" => Ok(Self::Float),
            "str" | "string" => Ok(Self::String),
            other => Err(StudyError::config(format!(
                "unknown field type '{other}' (expected integer, float or string)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
        }
    }

    /// Convert a value to this type. Floats only become integers when they are integral.
    pub fn coerce(self, value: &Scalar) -> std::result::Result<Scalar, String> {
        match (self, value) {
            (Self::Integer, Scalar::Int(v)) => Ok(Scalar::Int(*v)),
            (Self::Integer, Scalar::Float(v)) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Ok(Scalar::Int(*v as i64))
            }
            (Self::Integer, Scalar::Str(text)) => self.parse_text(text),
            (Self::Float, Scalar::Int(v)) => Ok(Scalar::Float(*v as f64)),
            (Self::Float, Scalar::Float(v)) => Ok(Scalar::Float(*v)),
            (Self::Float, Scalar::Str(text)) => self.parse_text(text),
            (Self::String, Scalar::Str(text)) => Ok(Scalar::Str(text.clone())),
            (Self::String, other) => Ok(Scalar::Str(other.to_string())),
            (_, other) => Err(format!("cannot convert {} '{other}' to {}", other.type_name(), self.as_str())),
        }
    }

    /// Convert captured text to this type.
    pub fn parse_text(self, text: &str) -> std::result::Result<Scalar, String> {
        let trimmed = text.trim();
        match self {
            Self::Integer => trimmed
                .parse::<i64>()
                .map(Scalar::Int)
                .map_err(|_| format!("'{text}' is not an integer")),
            Self::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(Scalar::Float)
                .ok_or_else(|| format!("'{text}' is not a finite float")),
            Self::String => Ok(Scalar::Str(text.to_string())),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a stored field. `list` fields come from captures in mode `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub scalar: ScalarType,
    #[serde(default)]
    pub list: bool,
}

impl FieldType {
    pub fn scalar(scalar: ScalarType) -> Self {
        Self { scalar, list: false }
    }

    pub fn list(scalar: ScalarType) -> Self {
        Self { scalar, list: true }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list {
            write!(f, "list<{}>", self.scalar)
        } else {
            write!(f, "{}", self.scalar)
        }
    }
}

/// A stored value: a scalar, or the ordered matches of an `all` capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            Self::Scalar(_) => None,
            Self::List(values) => Some(values),
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::List(values) => {
                f.write_str("[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Render a scope's parameter tuple as `name=value, ...` for diagnostics.
pub fn describe_assignment<'a>(assignment: impl IntoIterator<Item = (&'a String, &'a Scalar)>) -> String {
    assignment
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}
