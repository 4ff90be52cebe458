//! Regex-based extraction of result fields from command output.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};
use crate::value::{FieldType, FieldValue, ScalarType};

const INTEGER_PATTERN: &str = r"[-+]?[0-9]+";
const FLOAT_PATTERN: &str = r"[-+]?(?:[0-9]*\.[0-9]+|[0-9]+\.?)(?:[eE][-+]?[0-9]+)?";

/// Which of the matches of a rule is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    First,
    #[default]
    Last,
    All,
}

/// Predefined number rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberKind {
    Integer,
    Float,
}

impl NumberKind {
    fn pattern(self) -> &'static str {
        match self {
            Self::Integer => INTEGER_PATTERN,
            Self::Float => FLOAT_PATTERN,
        }
    }

    pub fn scalar_type(self) -> ScalarType {
        match self {
            Self::Integer => ScalarType::Integer,
            Self::Float => ScalarType::Float,
        }
    }
}

/// Raw text captured for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    One(String),
    Many(Vec<String>),
}

impl Captured {
    /// Convert captured text to the field's declared type.
    pub fn coerce(&self, field_type: FieldType) -> std::result::Result<FieldValue, String> {
        match (self, field_type.list) {
            (Self::One(text), false) => field_type.scalar.parse_text(text).map(FieldValue::Scalar),
            (Self::Many(texts), true) => texts
                .iter()
                .map(|text| field_type.scalar.parse_text(text))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(FieldValue::List),
            (Self::One(_), true) => Err(format!("expected a list for a {field_type} field")),
            (Self::Many(_), false) => Err(format!("expected a single value for a {field_type} field")),
        }
    }
}

/// A compiled capture rule. Each rule yields one or more named fields.
#[derive(Debug, Clone)]
pub struct CaptureRule {
    regex: Regex,
    fields: Vec<(String, usize)>,
    mode: CaptureMode,
    kind: Option<NumberKind>,
}

impl CaptureRule {
    /// A user regex; every named group becomes a field.
    pub fn pattern(pattern: &str, mode: CaptureMode) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|error| StudyError::config(format!("invalid capture pattern '{pattern}': {error}")))?;
        let fields: Vec<(String, usize)> = regex
            .capture_names()
            .enumerate()
            .filter_map(|(group, name)| name.map(|name| (name.to_string(), group)))
            .collect();
        if fields.is_empty() {
            return Err(StudyError::config(format!(
                "capture pattern '{pattern}' has no named groups"
            )));
        }

        Ok(Self {
            regex,
            fields,
            mode,
            kind: None,
        })
    }

    /// A number following a literal prefix, bound to `name`.
    pub fn number(kind: NumberKind, name: &str, prefix: &str, mode: CaptureMode) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(StudyError::config("capture names must be non-empty strings"));
        }
        let pattern = format!(r"{}\s*({})", regex::escape(prefix), kind.pattern());
        let regex = Regex::new(&pattern)
            .map_err(|error| StudyError::config(format!("invalid capture prefix '{prefix}': {error}")))?;

        Ok(Self {
            regex,
            fields: vec![(name.to_string(), 1)],
            mode,
            kind: Some(kind),
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Type of the rule's fields unless the study declares otherwise.
    pub fn default_type(&self) -> ScalarType {
        self.kind
            .map(NumberKind::scalar_type)
            .unwrap_or(ScalarType::String)
    }

    /// Every value of every field, in text order. Groups that did not take
    /// part in a match are skipped.
    pub fn matches(&self, text: &str) -> Vec<(String, Vec<String>)> {
        let mut values: Vec<(String, Vec<String>)> = self
            .fields
            .iter()
            .map(|(name, _)| (name.clone(), Vec::new()))
            .collect();

        for captures in self.regex.captures_iter(text) {
            for ((_, group), (_, found)) in self.fields.iter().zip(values.iter_mut()) {
                if let Some(matched) = captures.get(*group) {
                    found.push(matched.as_str().to_string());
                }
            }
        }
        values
    }

    /// Apply the rule's mode. Fields without any value are omitted.
    pub fn apply(&self, text: &str) -> Vec<(String, Captured)> {
        self.matches(text)
            .into_iter()
            .filter_map(|(name, mut found)| {
                let captured = match self.mode {
                    CaptureMode::All if found.is_empty() => return None,
                    CaptureMode::All => Captured::Many(found),
                    CaptureMode::First => Captured::One(found.into_iter().next()?),
                    CaptureMode::Last => Captured::One(found.pop()?),
                };
                Some((name, captured))
            })
            .collect()
    }
}

impl fmt::Display for CaptureRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/ ({:?})", self.regex.as_str(), self.mode)
    }
}
