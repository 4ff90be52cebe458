//! The persisted description of a result array.
//!
//! A data directory is only valid for the study that created it. The manifest
//! records the array shape (every dimension with its values in order), the
//! expression names and the typed fields, plus a SHA-256 fingerprint over all
//! of it. Any structural difference is an integrity error.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StudyError};
use crate::expressions::ExpressionGraph;
use crate::parameters::{checked_len, ParameterSpace};
use crate::study::{Field, Schema};
use crate::value::Scalar;

pub const MANIFEST_SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub cardinality: usize,
    pub values: Vec<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ManifestBody<'a> {
    schema_version: &'a str,
    dimensions: &'a [Dimension],
    expressions: &'a [String],
    fields: &'a [Field],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyManifest {
    pub schema_version: String,
    pub dimensions: Vec<Dimension>,
    pub expressions: Vec<String>,
    pub fields: Vec<Field>,
    pub fingerprint: String,
}

impl StudyManifest {
    pub fn new(space: &ParameterSpace, graph: &ExpressionGraph, schema: &Schema) -> Self {
        let dimensions = space
            .parameters()
            .iter()
            .map(|parameter| Dimension {
                name: parameter.name().to_string(),
                cardinality: parameter.len(),
                values: parameter.values().to_vec(),
            })
            .collect();

        let mut manifest = Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            dimensions,
            expressions: graph.names().to_vec(),
            fields: schema.fields().to_vec(),
            fingerprint: String::new(),
        };
        manifest.fingerprint = manifest.compute_fingerprint();
        manifest
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dimensions.iter().map(|dimension| dimension.cardinality).collect()
    }

    /// Number of points in the array. Both constructors reject shapes whose
    /// size overflows.
    pub fn len(&self) -> usize {
        self.dimensions
            .iter()
            .map(|dimension| dimension.cardinality)
            .product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn compute_fingerprint(&self) -> String {
        let body = ManifestBody {
            schema_version: &self.schema_version,
            dimensions: &self.dimensions,
            expressions: &self.expressions,
            fields: &self.fields,
        };
        let mut hasher = Sha256::new();
        hasher.update(stable_contract_json(&body));
        format!("{:x}", hasher.finalize())
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(text)?;
        if manifest.fingerprint != manifest.compute_fingerprint() {
            return Err(StudyError::Integrity(
                "stored manifest does not match its own fingerprint".to_string(),
            ));
        }
        for dimension in &manifest.dimensions {
            if dimension.cardinality != dimension.values.len() {
                return Err(StudyError::Integrity(format!(
                    "stored dimension '{}' declares {} values but lists {}",
                    dimension.name,
                    dimension.cardinality,
                    dimension.values.len()
                )));
            }
        }
        if checked_len(&manifest.shape()).is_none() {
            return Err(StudyError::Integrity(format!(
                "stored shape {:?} has too many points",
                manifest.shape()
            )));
        }
        Ok(manifest)
    }

    /// Check that data stored under `stored` can be reused by this study.
    pub fn validate(&self, stored: &StudyManifest) -> Result<()> {
        let differences = self.differences(stored);
        if differences.is_empty() {
            return Ok(());
        }
        Err(StudyError::Integrity(format!(
            "stored data does not match the study:\n  {}",
            differences.join("\n  ")
        )))
    }

    fn differences(&self, stored: &StudyManifest) -> Vec<String> {
        let mut differences = Vec::new();

        if self.schema_version != stored.schema_version {
            differences.push(format!(
                "schema version {} (stored) vs {} (study)",
                stored.schema_version, self.schema_version
            ));
        }

        if self.dimensions.len() != stored.dimensions.len() {
            differences.push(format!(
                "{} dimensions (stored) vs {} (study)",
                stored.dimensions.len(),
                self.dimensions.len()
            ));
        }
        for (axis, (current, previous)) in self.dimensions.iter().zip(&stored.dimensions).enumerate() {
            if current.name != previous.name {
                differences.push(format!(
                    "dimension {axis} is '{}' (stored) vs '{}' (study)",
                    previous.name, current.name
                ));
            } else if current.cardinality != previous.cardinality {
                differences.push(format!(
                    "dimension '{}' has {} values (stored) vs {} (study)",
                    current.name, previous.cardinality, current.cardinality
                ));
            } else if current.values != previous.values {
                differences.push(format!(
                    "dimension '{}' values or their order changed",
                    current.name
                ));
            }
        }

        if self.expressions != stored.expressions {
            differences.push(format!(
                "expressions [{}] (stored) vs [{}] (study)",
                stored.expressions.join(", "),
                self.expressions.join(", ")
            ));
        }

        if self.fields.len() != stored.fields.len() {
            differences.push(format!(
                "{} fields (stored) vs {} (study)",
                stored.fields.len(),
                self.fields.len()
            ));
        }
        for (current, previous) in self.fields.iter().zip(&stored.fields) {
            if current != previous {
                differences.push(format!(
                    "field '{}' ({}) (stored) vs '{}' ({}) (study)",
                    previous.name, previous.field_type, current.name, current.field_type
                ));
            }
        }

        if differences.is_empty() && self.fingerprint != stored.fingerprint {
            differences.push("fingerprint differs".to_string());
        }
        differences
    }
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of manifest value should not fail")
}
