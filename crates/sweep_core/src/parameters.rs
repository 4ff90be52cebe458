//! Parameter space for a sweep.
//!
//! Each parameter is an ordered, non-empty value sequence given either as a
//! literal list or generated by a sampler. The declared parameter order and the
//! value order within each parameter fix the meaning of result coordinates, so
//! both are part of the persisted manifest.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};
use crate::value::{Scalar, ScalarType};

mod combinations;
mod conversion;
mod sampling;

pub use combinations::{checked_len, coordinate_of, index_of};
pub use sampling::{graded, uniform};

/// How a parameter's values are declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSpec {
    /// Literal values, used in the given order.
    Values(Vec<Scalar>),
    /// Generated numeric sampling.
    Sampler(SamplerSpec),
}

/// Deterministic numeric samplings over a closed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SamplerSpec {
    Uniform {
        interval: [f64; 2],
        num: i64,
    },
    Graded {
        interval: [f64; 2],
        num: i64,
        grading: f64,
    },
}

/// A named, ordered value sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    values: Vec<Scalar>,
    scalar_type: ScalarType,
}

impl Parameter {
    /// Build a parameter from its declaration.
    pub fn from_spec(name: impl Into<String>, spec: &ParameterSpec) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StudyError::config("parameter names must be non-empty strings"));
        }

        let (scalar_type, values) = match spec {
            ParameterSpec::Values(raw) => conversion::infer_values(&name, raw)?,
            ParameterSpec::Sampler(sampler) => {
                let values = sampler
                    .expand()
                    .map_err(|error| StudyError::config(format!("parameter '{name}': {error}")))?;
                (
                    ScalarType::Float,
                    values.into_iter().map(Scalar::Float).collect(),
                )
            }
        };

        Ok(Self {
            name,
            values,
            scalar_type,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }
}

/// Defines the parameter space of a study.
///
/// Parameters keep their declaration order; the last-declared parameter
/// varies fastest when cases are enumerated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSpace {
    parameters: Vec<Parameter>,
}

impl ParameterSpace {
    /// Build a space from ordered parameter declarations.
    pub fn build(specs: &[(String, ParameterSpec)]) -> Result<Self> {
        let mut parameters: Vec<Parameter> = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            if parameters.iter().any(|existing| existing.name == *name) {
                return Err(StudyError::config(format!(
                    "parameter '{name}' is declared more than once"
                )));
            }
            parameters.push(Parameter::from_spec(name.clone(), spec)?);
        }

        let shape: Vec<usize> = parameters.iter().map(Parameter::len).collect();
        if checked_len(&shape).is_none() {
            return Err(StudyError::config(format!(
                "parameter grid {shape:?} has too many combinations"
            )));
        }
        Ok(Self { parameters })
    }

    /// Start a builder for a grid (Cartesian product) space.
    pub fn grid() -> ParameterSpaceBuilder {
        ParameterSpaceBuilder::default()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.parameters.iter().map(|parameter| parameter.name.as_str())
    }

    /// Number of values per parameter, in declaration order.
    pub fn cardinalities(&self) -> Vec<usize> {
        self.parameters.iter().map(Parameter::len).collect()
    }

    /// Number of dimensions of the result array.
    pub fn dimensions(&self) -> usize {
        self.parameters.len()
    }

    /// Total number of combinations (1 for an empty space). `build` rejects
    /// grids whose size overflows.
    pub fn len(&self) -> usize {
        self.parameters.iter().map(Parameter::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fluent builder used by tests and library callers.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpaceBuilder {
    specs: Vec<(String, ParameterSpec)>,
}

impl ParameterSpaceBuilder {
    /// Add a parameter with literal values.
    pub fn values(mut self, name: &str, values: Vec<Scalar>) -> Self {
        self.specs
            .push((name.to_string(), ParameterSpec::Values(values)));
        self
    }

    /// Add a uniformly sampled parameter.
    pub fn uniform(mut self, name: &str, interval: [f64; 2], num: i64) -> Self {
        self.specs.push((
            name.to_string(),
            ParameterSpec::Sampler(SamplerSpec::Uniform { interval, num }),
        ));
        self
    }

    /// Add a geometrically graded parameter.
    pub fn graded(mut self, name: &str, interval: [f64; 2], num: i64, grading: f64) -> Self {
        self.specs.push((
            name.to_string(),
            ParameterSpec::Sampler(SamplerSpec::Graded {
                interval,
                num,
                grading,
            }),
        ));
        self
    }

    pub fn build(self) -> Result<ParameterSpace> {
        ParameterSpace::build(&self.specs)
    }
}
