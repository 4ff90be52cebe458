#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use sweep_core::study::Invocation;
use sweep_runner::process::{ProcessExecutor, ProcessOutput};

/// One call seen by a [`ScriptedExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub invocation: Invocation,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
}

/// Answers every command with a closure instead of starting a process.
pub struct ScriptedExecutor<F> {
    handler: F,
    calls: Mutex<Vec<Call>>,
}

impl<F> ScriptedExecutor<F>
where
    F: Fn(&Invocation, &Path) -> io::Result<ProcessOutput> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

impl<F> ProcessExecutor for ScriptedExecutor<F>
where
    F: Fn(&Invocation, &Path) -> io::Result<ProcessOutput> + Send + Sync,
{
    fn execute(&self, invocation: &Invocation, cwd: &Path, timeout: Option<Duration>) -> io::Result<ProcessOutput> {
        self.calls.lock().expect("calls lock").push(Call {
            invocation: invocation.clone(),
            cwd: cwd.to_path_buf(),
            timeout,
        });
        (self.handler)(invocation, cwd)
    }
}

/// A successful command printing `stdout`.
pub fn ok(stdout: impl Into<String>) -> io::Result<ProcessOutput> {
    Ok(ProcessOutput {
        exit_code: Some(0),
        stdout: stdout.into(),
        walltime: Duration::from_millis(25),
        ..ProcessOutput::default()
    })
}

/// A command exiting with `code`.
pub fn exit(code: i32, stdout: &str, stderr: &str) -> io::Result<ProcessOutput> {
    Ok(ProcessOutput {
        exit_code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        walltime: Duration::from_millis(5),
        ..ProcessOutput::default()
    })
}

/// The rendered shell line of an invocation, or argv joined by spaces.
pub fn line(invocation: &Invocation) -> String {
    match invocation {
        Invocation::Shell(line) => line.clone(),
        Invocation::Direct(argv) => argv.join(" "),
    }
}
