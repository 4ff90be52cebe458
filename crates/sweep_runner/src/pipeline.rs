//! Runs a single case from its resolved scope to its recorded values.
//!
//! A case moves through `staging -> running -> capturing -> done | failed`.
//! Failures are contained: whatever goes wrong becomes a [`CaseError`] on the
//! returned [`CaseResult`], never an error of the run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sweep_core::cases::{Case, CaseResolutionError};
use sweep_core::storage_keys::{
    fallback_log_key, output_file_name, OutputStream, StudyPaths, SANDBOX_COPY_DIR_NAME,
};
use sweep_core::study::{CommandSpec, FieldRole, Invocation, Study};
use sweep_core::template::TemplateRenderer;
use sweep_core::value::{FieldValue, Scalar, Scope};
use tracing::{debug, warn};

use crate::error::CaseError;
use crate::process::{ProcessExecutor, ProcessOutput};
use crate::sandbox::{Sandbox, Staging};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Done,
    Failed,
}

/// What one command of a case did.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    pub name: String,
    pub success: bool,
    pub walltime: Option<f64>,
    /// Kept when the command asks for its output, or when it failed.
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub index: usize,
    pub coordinate: Vec<usize>,
    pub log_key: String,
    pub status: CaseStatus,
    pub error: Option<CaseError>,
    /// Expression, capture and walltime values produced by the case.
    pub values: BTreeMap<String, FieldValue>,
    pub commands: Vec<CommandRecord>,
    /// Capture and walltime fields the case did not produce.
    pub missing: Vec<String>,
}

impl CaseResult {
    pub fn is_done(&self) -> bool {
        self.status == CaseStatus::Done
    }

    /// Done, but some capture came back empty.
    pub fn is_incomplete(&self) -> bool {
        self.is_done() && !self.missing.is_empty()
    }
}

pub struct Pipeline<'a> {
    study: &'a Study,
    paths: &'a StudyPaths,
    executor: &'a dyn ProcessExecutor,
    renderer: &'a dyn TemplateRenderer,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        study: &'a Study,
        paths: &'a StudyPaths,
        executor: &'a dyn ProcessExecutor,
        renderer: &'a dyn TemplateRenderer,
    ) -> Self {
        Self {
            study,
            paths,
            executor,
            renderer,
        }
    }

    /// Resolve and run the case at `index`. `None` past the end of the grid.
    pub fn run_index(&self, index: usize) -> Option<CaseResult> {
        self.study.cases().case_at(index).map(|case| self.run_case(case))
    }

    pub fn run_case(&self, resolved: Result<Case, CaseResolutionError>) -> CaseResult {
        let case = match resolved {
            Ok(case) => case,
            Err(error) => {
                let scope = error.point.scope();
                let mut result = self.empty_result(error.point.index, error.point.coordinate.clone(), &scope);
                warn!(case = result.index, log_key = %result.log_key, error = %error, "case failed to resolve");
                result.fail(CaseError::Resolution(error.source.to_string()));
                return result;
            }
        };

        let scope = case.scope();
        let mut result = self.empty_result(case.index(), case.coordinate().to_vec(), &scope);

        for (name, value) in &case.expressions {
            let Some(field) = self.study.schema.get(name) else {
                continue;
            };
            match field.field_type.scalar.coerce(value) {
                Ok(coerced) => {
                    result.values.insert(name.clone(), FieldValue::Scalar(coerced));
                }
                Err(message) => {
                    result.fail(CaseError::Resolution(format!("expression '{name}': {message}")));
                    return result;
                }
            }
        }

        debug!(case = result.index, state = "staging", "case state");
        let sandbox = match Sandbox::acquire(&self.paths.work_dir, case.coordinate()) {
            Ok(sandbox) => sandbox,
            Err(error) => {
                result.fail(CaseError::Staging(format!("cannot create sandbox: {error}")));
                self.finish(&mut result, None, &scope);
                return result;
            }
        };

        if let Err(message) = self.stage(&sandbox, &scope) {
            result.fail(CaseError::Staging(message));
        } else {
            for command in &self.study.commands {
                if let Err(error) = self.run_command(command, &sandbox, &scope, &mut result) {
                    result.fail(error);
                    break;
                }
            }
        }

        self.finish(&mut result, Some(sandbox), &scope);
        result
    }

    fn empty_result(&self, index: usize, coordinate: Vec<usize>, scope: &Scope) -> CaseResult {
        CaseResult {
            index,
            coordinate,
            log_key: self.log_key(scope, index),
            status: CaseStatus::Done,
            error: None,
            values: BTreeMap::new(),
            commands: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Render the log directory key, falling back to `case-<index>`.
    pub fn log_key(&self, scope: &Scope, index: usize) -> String {
        let rendered = self
            .renderer
            .render(&self.study.settings.logdir, scope)
            .map_err(|error| error.to_string())
            .and_then(|key| self.paths.case_log_dir(&key).map(|_| key).map_err(|error| error.to_string()));
        match rendered {
            Ok(key) => key,
            Err(error) => {
                let fallback = fallback_log_key(index);
                warn!(case = index, %error, fallback = %fallback, "log directory could not be rendered");
                fallback
            }
        }
    }

    fn stage(&self, sandbox: &Sandbox, scope: &Scope) -> Result<(), String> {
        let root = &self.paths.root;
        for mapping in &self.study.prefiles {
            sandbox.stage(root, mapping, scope, self.renderer, Staging::Copy)?;
        }
        for mapping in &self.study.templates {
            sandbox.stage(root, mapping, scope, self.renderer, Staging::Render)?;
        }
        Ok(())
    }

    fn run_command(
        &self,
        command: &CommandSpec,
        sandbox: &Sandbox,
        scope: &Scope,
        result: &mut CaseResult,
    ) -> Result<(), CaseError> {
        let command_error = |reason: String| CaseError::Command {
            command: command.name.clone(),
            reason,
        };

        let invocation = self
            .render_invocation(&command.invocation, scope)
            .map_err(|error| command_error(format!("could not be rendered: {error}")))?;

        debug!(case = result.index, state = "running", command = %command.name, "case state");
        let output = self
            .executor
            .execute(&invocation, sandbox.path(), command.timeout)
            .map_err(|error| command_error(format!("failed to start: {error}")))?;

        let success = output.success();
        result.commands.push(record(command, &output, success));
        if !success {
            return Err(command_error(output.failure_reason(command.timeout)));
        }

        debug!(case = result.index, state = "capturing", command = %command.name, "case state");
        if command.capture_walltime {
            let name = command.walltime_field();
            if let Some(field) = self.study.schema.get(&name) {
                let seconds = Scalar::Float(output.walltime.as_secs_f64());
                let value = field.field_type.scalar.coerce(&seconds).map_err(|message| CaseError::Capture {
                    command: command.name.clone(),
                    field: name.clone(),
                    message,
                })?;
                result.values.insert(name, FieldValue::Scalar(value));
            }
        }

        for rule in &command.captures {
            for (field_name, captured) in rule.apply(&output.stdout) {
                let Some(field) = self.study.schema.get(&field_name) else {
                    continue;
                };
                let value = captured.coerce(field.field_type).map_err(|message| CaseError::Capture {
                    command: command.name.clone(),
                    field: field_name.clone(),
                    message,
                })?;
                result.values.insert(field_name, value);
            }
        }
        Ok(())
    }

    fn render_invocation(&self, invocation: &Invocation, scope: &Scope) -> Result<Invocation, String> {
        match invocation {
            Invocation::Shell(line) => self
                .renderer
                .render(line, scope)
                .map(Invocation::Shell)
                .map_err(|error| error.to_string()),
            Invocation::Direct(argv) => argv
                .iter()
                .map(|arg| self.renderer.render(arg, scope).map_err(|error| error.to_string()))
                .collect::<Result<Vec<_>, _>>()
                .map(Invocation::Direct),
        }
    }

    /// Write logs, collect post-files, keep the sandbox of a failed case and
    /// work out which fields are missing.
    fn finish(&self, result: &mut CaseResult, sandbox: Option<Sandbox>, scope: &Scope) {
        result.missing = self
            .study
            .schema
            .fields()
            .iter()
            .filter(|field| matches!(field.role, FieldRole::Capture | FieldRole::Walltime))
            .filter(|field| !result.values.contains_key(&field.name))
            .map(|field| field.name.clone())
            .collect();

        let log_dir = match self.paths.case_log_dir(&result.log_key) {
            Ok(dir) => dir,
            Err(error) => {
                warn!(case = result.index, %error, "no log directory for case");
                return;
            }
        };
        if let Err(error) = reset_dir(&log_dir) {
            warn!(case = result.index, dir = %log_dir.display(), %error, "cannot prepare log directory");
        }

        for command in &result.commands {
            write_output(&log_dir, &command.name, OutputStream::Stdout, command.stdout.as_deref());
            write_output(&log_dir, &command.name, OutputStream::Stderr, command.stderr.as_deref());
        }

        let Some(sandbox) = sandbox else {
            return;
        };
        for mapping in &self.study.postfiles {
            if let Err(error) = sandbox.collect(mapping, scope, self.renderer, &log_dir) {
                warn!(case = result.index, %error, "post-file not collected");
            }
        }
        if result.status == CaseStatus::Failed {
            let copy = log_dir.join(SANDBOX_COPY_DIR_NAME);
            if let Err(error) = sandbox.preserve_into(&copy) {
                warn!(case = result.index, %error, "cannot keep sandbox of failed case");
            }
        }
        if let Err(error) = sandbox.close() {
            warn!(case = result.index, %error, "cannot remove sandbox");
        }

        match &result.error {
            None => debug!(case = result.index, state = "done", "case state"),
            Some(error) => debug!(case = result.index, state = "failed", %error, "case state"),
        }
    }
}

impl CaseResult {
    fn fail(&mut self, error: CaseError) {
        self.status = CaseStatus::Failed;
        self.error = Some(error);
    }
}

fn record(command: &CommandSpec, output: &ProcessOutput, success: bool) -> CommandRecord {
    let keep = command.capture_output || !success;
    CommandRecord {
        name: command.name.clone(),
        success,
        walltime: Some(output.walltime.as_secs_f64()),
        stdout: keep.then(|| output.stdout.clone()),
        stderr: keep.then(|| output.stderr.clone()),
    }
}

fn reset_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}

fn write_output(log_dir: &Path, command: &str, stream: OutputStream, text: Option<&str>) {
    let Some(text) = text else {
        return;
    };
    let path: PathBuf = log_dir.join(output_file_name(command, stream));
    if let Err(error) = fs::write(&path, text) {
        warn!(path = %path.display(), %error, "cannot write command output");
    }
}
