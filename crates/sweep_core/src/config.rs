//! Study file format.
//!
//! The study file is YAML. Mappings keep their order: parameter order,
//! expression order and field order all follow the file. These types mirror
//! the file one to one; [`crate::study::Study`] validates and compiles them.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::capture::{CaptureMode, NumberKind};
use crate::error::{Result, StudyError};

pub const DEFAULT_STUDY_FILE: &str = "sweep.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    #[serde(default)]
    pub parameters: Mapping,
    #[serde(default)]
    pub constants: Mapping,
    #[serde(default)]
    pub evaluate: Mapping,
    #[serde(default)]
    pub types: Mapping,
    #[serde(default)]
    pub templates: Vec<FileConfig>,
    #[serde(default)]
    pub prefiles: Vec<FileConfig>,
    #[serde(default)]
    pub postfiles: Vec<FileConfig>,
    #[serde(default)]
    pub script: Vec<CommandConfig>,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// A staged or collected file: a bare path, or a source/target pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileConfig {
    Path(String),
    Mapping {
        source: String,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        mode: FileMode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    #[default]
    Simple,
    Glob,
}

/// A script entry: a shell string, an argument vector, or a full command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    Shell(String),
    Argv(Vec<String>),
    Detailed(DetailedCommand),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct DetailedCommand {
    pub command: CommandLine,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capture: Option<CaptureList>,
    #[serde(default)]
    pub capture_output: bool,
    #[serde(default)]
    pub capture_walltime: bool,
    /// Seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Shell(String),
    Argv(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureList {
    One(CaptureConfig),
    Many(Vec<CaptureConfig>),
}

impl CaptureList {
    pub fn into_vec(self) -> Vec<CaptureConfig> {
        match self {
            Self::One(capture) => vec![capture],
            Self::Many(captures) => captures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureConfig {
    /// A regex with named groups, default mode.
    Pattern(String),
    Regex {
        pattern: String,
        #[serde(default)]
        mode: CaptureMode,
    },
    Number {
        #[serde(rename = "type")]
        kind: NumberKind,
        name: String,
        prefix: String,
        #[serde(default)]
        mode: CaptureMode,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsConfig {
    /// Template for the per-case log directory.
    pub logdir: Option<String>,
    /// Default per-command timeout in seconds.
    pub timeout: Option<f64>,
    /// Number of worker threads.
    pub workers: Option<usize>,
}

impl StudyConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|error| {
            StudyError::config(format!("cannot read study file {}: {error}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }
}

/// Decode an ordered mapping section into `(name, value)` pairs.
pub(crate) fn ordered_entries<T: DeserializeOwned>(
    section: &str,
    mapping: &Mapping,
) -> Result<Vec<(String, T)>> {
    mapping
        .iter()
        .map(|(key, value)| {
            let name = key.as_str().ok_or_else(|| {
                StudyError::config(format!("{section}: keys must be strings (found {key:?})"))
            })?;
            let decoded = serde_yaml::from_value(value.clone()).map_err(|error| {
                StudyError::config(format!("{section}.{name}: {error}"))
            })?;
            Ok((name.to_string(), decoded))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{ParameterSpec, SamplerSpec};
    use crate::value::Scalar;

    const STUDY: &str = r#"
parameters:
  zeta: [1, 2]
  alpha:
    type: uniform
    interval: [0, 1]
    num: 3
constants:
  scale: 2.5
evaluate:
  doubled: zeta * 2
templates:
  - input.tpl
prefiles:
  - source: "data/*.csv"
    target: data
    mode: glob
script:
  - echo ${zeta}
  - [solver, --alpha, "${alpha}"]
  - command: ./post.sh
    name: post
    capture:
      - "norm = (?P<norm>\\S+)"
      - type: float
        name: post/energy
        prefix: "energy:"
        mode: all
    capture-walltime: true
    timeout: 30
settings:
  logdir: "run-${zeta}"
  workers: 4
"#;

    #[test]
    fn parses_every_section_in_order() {
        let config = StudyConfig::from_yaml_str(STUDY).expect("study should parse");

        let parameters: Vec<(String, ParameterSpec)> =
            ordered_entries("parameters", &config.parameters).expect("parameters should decode");
        assert_eq!(parameters[0].0, "zeta");
        assert_eq!(
            parameters[0].1,
            ParameterSpec::Values(vec![Scalar::Int(1), Scalar::Int(2)])
        );
        assert_eq!(
            parameters[1].1,
            ParameterSpec::Sampler(SamplerSpec::Uniform {
                interval: [0.0, 1.0],
                num: 3
            })
        );

        assert_eq!(config.templates, vec![FileConfig::Path("input.tpl".into())]);
        assert_eq!(
            config.prefiles[0],
            FileConfig::Mapping {
                source: "data/*.csv".into(),
                target: Some("data".into()),
                mode: FileMode::Glob,
            }
        );
        assert_eq!(config.script.len(), 3);
        assert!(matches!(config.script[1], CommandConfig::Argv(_)));

        let CommandConfig::Detailed(post) = &config.script[2] else {
            panic!("third command should be detailed");
        };
        assert_eq!(post.name.as_deref(), Some("post"));
        assert!(post.capture_walltime);
        assert_eq!(post.timeout, Some(30.0));
        let captures = post.capture.clone().expect("captures should exist").into_vec();
        assert!(matches!(captures[0], CaptureConfig::Pattern(_)));
        assert!(matches!(
            captures[1],
            CaptureConfig::Number {
                kind: NumberKind::Float,
                mode: CaptureMode::All,
                ..
            }
        ));
        assert_eq!(config.settings.workers, Some(4));
    }

    #[test]
    fn empty_file_is_an_empty_study() {
        let config = StudyConfig::from_yaml_str("  \n").expect("empty study should parse");
        assert_eq!(config, StudyConfig::default());
    }

    #[test]
    fn rejects_unknown_sections() {
        let error = StudyConfig::from_yaml_str("paramters: {a: [1]}\n").expect_err("typo should fail");
        assert!(matches!(error, StudyError::Yaml(_)));
    }

    #[test]
    fn rejects_non_string_keys() {
        let config = StudyConfig::from_yaml_str("parameters: {1: [1, 2]}\n").expect("yaml should parse");
        let error = ordered_entries::<ParameterSpec>("parameters", &config.parameters)
            .expect_err("numeric key should fail");
        assert!(error.to_string().contains("keys must be strings"));
    }
}
