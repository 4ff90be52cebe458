//! A validated, compiled study.
//!
//! Everything that can be checked without running a command is checked here:
//! the parameter space, the expression graph (cycles and unknown names), the
//! capture patterns and the result schema. A `Study` that builds is ready to
//! enumerate and run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capture::{CaptureMode, CaptureRule};
use crate::cases::CaseEnumerator;
use crate::config::{
    ordered_entries, CaptureConfig, CommandConfig, CommandLine, FileConfig, FileMode, StudyConfig,
};
use crate::error::{Result, StudyError};
use crate::expressions::{ExpressionDef, ExpressionGraph};
use crate::manifest::StudyManifest;
use crate::parameters::{ParameterSpace, ParameterSpec};
use crate::value::{FieldType, Scalar, ScalarType};

pub const WALLTIME_PREFIX: &str = "walltime/";

/// How a command is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run through `sh -c`.
    Shell(String),
    /// Run the program directly.
    Direct(Vec<String>),
}

impl Invocation {
    /// Program name: first word of a shell string, or argv[0].
    pub fn program(&self) -> Option<&str> {
        let first = match self {
            Self::Shell(line) => line.split_whitespace().next(),
            Self::Direct(argv) => argv.first().map(String::as_str),
        }?;
        Path::new(first)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: String,
    pub invocation: Invocation,
    pub capture_output: bool,
    pub capture_walltime: bool,
    pub timeout: Option<Duration>,
    pub captures: Vec<CaptureRule>,
}

impl CommandSpec {
    pub fn walltime_field(&self) -> String {
        format!("{WALLTIME_PREFIX}{}", self.name)
    }
}

/// A file copied into the sandbox before the commands run, or collected from
/// it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub source: String,
    pub target: String,
    pub mode: FileMode,
}

impl FileMapping {
    fn from_config(config: &FileConfig) -> Result<Self> {
        let (source, target, mode) = match config {
            FileConfig::Path(path) => (path.clone(), None, FileMode::Simple),
            FileConfig::Mapping {
                source,
                target,
                mode,
            } => (source.clone(), target.clone(), *mode),
        };
        if source.trim().is_empty() {
            return Err(StudyError::config("file sources must be non-empty paths"));
        }
        let target = match (target, mode) {
            (Some(target), _) => target,
            (None, FileMode::Simple) => source.clone(),
            (None, FileMode::Glob) => ".".to_string(),
        };
        Ok(Self {
            source,
            target,
            mode,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    Parameter,
    Expression,
    Capture,
    Walltime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub role: FieldRole,
}

/// Ordered, typed result fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(StudyError::config(format!(
                    "field '{}' is produced more than once",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub logdir: String,
    pub timeout: Option<Duration>,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Study {
    pub space: ParameterSpace,
    pub graph: ExpressionGraph,
    pub commands: Vec<CommandSpec>,
    pub templates: Vec<FileMapping>,
    pub prefiles: Vec<FileMapping>,
    pub postfiles: Vec<FileMapping>,
    pub schema: Schema,
    pub settings: Settings,
}

impl Study {
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_config(&StudyConfig::load(path)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_config(&StudyConfig::from_yaml_str(text)?)
    }

    pub fn from_config(config: &StudyConfig) -> Result<Self> {
        let parameter_specs: Vec<(String, ParameterSpec)> =
            ordered_entries("parameters", &config.parameters)?;
        let space = ParameterSpace::build(&parameter_specs)?;

        let constants: Vec<(String, Scalar)> = ordered_entries("constants", &config.constants)?;
        let formulas: Vec<(String, String)> = ordered_entries("evaluate", &config.evaluate)?;
        let mut graph = ExpressionGraph::new(space.names());
        for (name, value) in &constants {
            graph.register(name.clone(), ExpressionDef::Constant(value.clone()))?;
        }
        for (name, formula) in &formulas {
            graph.register(name.clone(), ExpressionDef::Formula(formula.clone()))?;
        }
        graph.check()?;

        let settings = Settings {
            logdir: config
                .settings
                .logdir
                .clone()
                .unwrap_or_else(|| default_logdir(&space)),
            timeout: config
                .settings
                .timeout
                .map(|seconds| timeout_from_secs("settings.timeout", seconds))
                .transpose()?,
            workers: match config.settings.workers {
                Some(0) => return Err(StudyError::config("settings.workers must be positive")),
                workers => workers,
            },
        };
        if settings.logdir.trim().is_empty() {
            return Err(StudyError::config("settings.logdir must not be empty"));
        }

        let commands = build_commands(&config.script, settings.timeout)?;

        let declared: Vec<(String, String)> = ordered_entries("types", &config.types)?;
        let mut types = BTreeMap::new();
        for (name, description) in declared {
            types.insert(name, ScalarType::parse(&description)?);
        }
        let schema = build_schema(&space, &constants, &formulas, &commands, &types)?;

        Ok(Self {
            space,
            graph,
            commands,
            templates: files(&config.templates)?,
            prefiles: files(&config.prefiles)?,
            postfiles: files(&config.postfiles)?,
            schema,
            settings,
        })
    }

    pub fn cases(&self) -> CaseEnumerator<'_> {
        CaseEnumerator::new(&self.space, &self.graph)
    }

    pub fn manifest(&self) -> StudyManifest {
        StudyManifest::new(&self.space, &self.graph, &self.schema)
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|command| command.name == name)
    }
}

fn files(configs: &[FileConfig]) -> Result<Vec<FileMapping>> {
    configs.iter().map(FileMapping::from_config).collect()
}

fn timeout_from_secs(context: &str, seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| StudyError::config(format!("{context} must be a positive number of seconds")))
}

/// `p1-${p1}_p2-${p2}` over every parameter, or `case` without parameters.
fn default_logdir(space: &ParameterSpace) -> String {
    let parts: Vec<String> = space
        .names()
        .map(|name| format!("{name}-${{{name}}}"))
        .collect();
    if parts.is_empty() {
        "case".to_string()
    } else {
        parts.join("_")
    }
}

fn build_commands(script: &[CommandConfig], default_timeout: Option<Duration>) -> Result<Vec<CommandSpec>> {
    let mut commands: Vec<CommandSpec> = Vec::with_capacity(script.len());

    for (position, entry) in script.iter().enumerate() {
        let (line, name, captures, capture_output, capture_walltime, timeout) = match entry {
            CommandConfig::Shell(line) => (CommandLine::Shell(line.clone()), None, Vec::new(), false, false, None),
            CommandConfig::Argv(argv) => (CommandLine::Argv(argv.clone()), None, Vec::new(), false, false, None),
            CommandConfig::Detailed(detailed) => (
                detailed.command.clone(),
                detailed.name.clone(),
                detailed.capture.clone().map(|list| list.into_vec()).unwrap_or_default(),
                detailed.capture_output,
                detailed.capture_walltime,
                detailed.timeout,
            ),
        };

        let invocation = match line {
            CommandLine::Shell(line) if line.trim().is_empty() => {
                return Err(StudyError::config(format!("script[{position}]: command is empty")))
            }
            CommandLine::Argv(argv) if argv.is_empty() => {
                return Err(StudyError::config(format!("script[{position}]: command is empty")))
            }
            CommandLine::Shell(line) => Invocation::Shell(line),
            CommandLine::Argv(argv) => Invocation::Direct(argv),
        };

        let name = match name {
            Some(name) => name,
            None => invocation
                .program()
                .map(str::to_string)
                .ok_or_else(|| StudyError::config(format!("script[{position}]: cannot derive a command name")))?,
        };
        if commands.iter().any(|command| command.name == name) {
            return Err(StudyError::config(format!(
                "command name '{name}' is used more than once; give each command a unique 'name'"
            )));
        }

        let timeout = match timeout {
            Some(seconds) => Some(timeout_from_secs(&format!("command '{name}' timeout"), seconds)?),
            None => default_timeout,
        };

        let captures = captures
            .iter()
            .map(compile_capture)
            .collect::<Result<Vec<_>>>()?;

        commands.push(CommandSpec {
            name,
            invocation,
            capture_output,
            capture_walltime,
            timeout,
            captures,
        });
    }

    Ok(commands)
}

fn compile_capture(config: &CaptureConfig) -> Result<CaptureRule> {
    match config {
        CaptureConfig::Pattern(pattern) => CaptureRule::pattern(pattern, CaptureMode::default()),
        CaptureConfig::Regex { pattern, mode } => CaptureRule::pattern(pattern, *mode),
        CaptureConfig::Number {
            kind,
            name,
            prefix,
            mode,
        } => CaptureRule::number(*kind, name, prefix, *mode),
    }
}

fn build_schema(
    space: &ParameterSpace,
    constants: &[(String, Scalar)],
    formulas: &[(String, String)],
    commands: &[CommandSpec],
    types: &BTreeMap<String, ScalarType>,
) -> Result<Schema> {
    let declared = |name: &str, fallback: ScalarType| types.get(name).copied().unwrap_or(fallback);
    let mut fields = Vec::new();

    for parameter in space.parameters() {
        fields.push(Field {
            name: parameter.name().to_string(),
            field_type: FieldType::scalar(declared(parameter.name(), parameter.scalar_type())),
            role: FieldRole::Parameter,
        });
    }
    for (name, value) in constants {
        fields.push(Field {
            name: name.clone(),
            field_type: FieldType::scalar(declared(name, value.scalar_type())),
            role: FieldRole::Expression,
        });
    }
    for (name, _) in formulas {
        fields.push(Field {
            name: name.clone(),
            field_type: FieldType::scalar(declared(name, ScalarType::String)),
            role: FieldRole::Expression,
        });
    }
    for command in commands {
        for rule in &command.captures {
            for name in rule.fields() {
                let scalar = declared(name, rule.default_type());
                let field_type = if rule.mode() == CaptureMode::All {
                    FieldType::list(scalar)
                } else {
                    FieldType::scalar(scalar)
                };
                fields.push(Field {
                    name: name.to_string(),
                    field_type,
                    role: FieldRole::Capture,
                });
            }
        }
    }
    for command in commands.iter().filter(|command| command.capture_walltime) {
        let name = command.walltime_field();
        fields.push(Field {
            field_type: FieldType::scalar(declared(&name, ScalarType::Float)),
            name,
            role: FieldRole::Walltime,
        });
    }

    let schema = Schema::new(fields)?;
    for name in types.keys() {
        if schema.get(name).is_none() {
            warn!(field = %name, "type declared for a field that is never produced");
        }
    }
    Ok(schema)
}
