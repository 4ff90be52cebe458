//! Error types shared by every stage of a study.
//!
//! `Config`, `Cycle`, `UnknownName` and `Integrity` are fatal and are raised
//! before any command runs. `Eval` is raised per case while resolving
//! expressions; the runner records it against that case only.

use thiserror::Error;

use crate::expressions::EvalFault;

/// Result type alias
pub type Result<T> = std::result::Result<T, StudyError>;

/// Study-level error types
#[derive(Error, Debug)]
pub enum StudyError {
    /// Invalid sampler parameters, unknown field type, malformed study file.
    #[error("configuration error: {0}")]
    Config(String),

    /// The expression dependency graph contains a cycle.
    #[error("expression dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// An expression references a name that is neither a parameter nor an expression.
    #[error("expression '{expression}' references unknown name '{name}'")]
    UnknownName {
        /// Offending expression
        expression: String,
        /// Name that could not be resolved
        name: String,
    },

    /// An expression failed while evaluating for one case.
    #[error("failed to evaluate '{expression}' for ({parameters}): {source}")]
    Eval {
        /// Offending expression
        expression: String,
        /// The case's parameter tuple, rendered as `name=value, ...`
        parameters: String,
        /// Underlying fault
        #[source]
        source: EvalFault,
    },

    /// The stored data directory does not match the current study.
    #[error("integrity error: {0}\nPurge the data directory before running this study")]
    Integrity(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StudyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for errors that must stop a run before any case executes.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Eval { .. })
    }
}
