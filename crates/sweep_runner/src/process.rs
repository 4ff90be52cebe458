//! Running external commands.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use sweep_core::study::Invocation;
use tracing::debug;
use wait_timeout::ChildExt;

const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// What a finished (or abandoned) command left behind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub walltime: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Human readable reason for a failure, e.g. `exited with status 2`.
    pub fn failure_reason(&self, timeout: Option<Duration>) -> String {
        if self.timed_out {
            let limit = timeout.map(|t| format!(" after {:.1}s", t.as_secs_f64())).unwrap_or_default();
            return format!("timed out{limit}");
        }
        match self.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "was terminated by a signal".to_string(),
        }
    }
}

/// Starts a rendered command in a working directory.
///
/// Spawn failures are returned as `Err`; non-zero exits and timeouts are
/// reported through [`ProcessOutput`].
pub trait ProcessExecutor: Send + Sync {
    fn execute(&self, invocation: &Invocation, cwd: &Path, timeout: Option<Duration>) -> io::Result<ProcessOutput>;
}

/// Runs commands with `std::process`. Shell invocations go through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcess;

impl SystemProcess {
    fn command(invocation: &Invocation) -> io::Result<Command> {
        match invocation {
            Invocation::Shell(line) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(line);
                Ok(command)
            }
            Invocation::Direct(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"))?;
                let mut command = Command::new(program);
                command.args(args);
                Ok(command)
            }
        }
    }
}

impl ProcessExecutor for SystemProcess {
    fn execute(&self, invocation: &Invocation, cwd: &Path, timeout: Option<Duration>) -> io::Result<ProcessOutput> {
        let mut command = Self::command(invocation)?;
        command
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        own_process_group(&mut command);

        let start = Instant::now();
        let mut child = command.spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let (exit_code, timed_out) = wait(&mut child, timeout)?;
        let walltime = start.elapsed();

        let output = ProcessOutput {
            exit_code,
            timed_out,
            stdout: collect(stdout, timed_out)?,
            stderr: collect(stderr, timed_out)?,
            walltime,
        };
        debug!(
            exit_code = ?output.exit_code,
            timed_out = output.timed_out,
            walltime_s = output.walltime.as_secs_f64(),
            "process finished"
        );
        Ok(output)
    }
}

fn wait(child: &mut Child, timeout: Option<Duration>) -> io::Result<(Option<i32>, bool)> {
    let Some(limit) = timeout else {
        return Ok((child.wait()?.code(), false));
    };

    match child.wait_timeout(limit)? {
        Some(status) => Ok((status.code(), false)),
        None => {
            kill_process_group(child);
            let _ = child.kill();
            let _ = child.wait();
            Ok((None, true))
        }
    }
}

/// The command leads a new process group so a timeout can stop everything it
/// started, not only the shell.
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: `kill` has no memory-safety preconditions. The group id is the
    // child's pid, which stays reserved until `wait` reaps the child.
    let result = unsafe { libc::kill(-pid, libc::SIGKILL) };
    if result != 0 {
        debug!(pid, error = %io::Error::last_os_error(), "could not signal process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Read a pipe to the end on its own thread so a chatty process cannot block
/// on a full pipe while we wait for it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<io::Result<Vec<u8>>>> {
    pipe.map(|mut pipe| {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let result = pipe.read_to_end(&mut buffer).map(|_| buffer);
            let _ = sender.send(result);
        });
        receiver
    })
}

/// After a timeout, a process that left the group may still hold the pipe
/// open; give up on its output after a grace period.
fn collect(receiver: Option<Receiver<io::Result<Vec<u8>>>>, timed_out: bool) -> io::Result<String> {
    let Some(receiver) = receiver else {
        return Ok(String::new());
    };
    let received = if timed_out {
        receiver.recv_timeout(DRAIN_GRACE).ok()
    } else {
        receiver.recv().ok()
    };
    match received {
        Some(bytes) => Ok(String::from_utf8_lossy(&bytes?).into_owned()),
        None if timed_out => Ok(String::new()),
        None => Err(io::Error::other("output reader thread stopped unexpectedly")),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = SystemProcess
            .execute(
                &Invocation::Shell("echo out; echo err >&2; exit 3".into()),
                dir.path(),
                None,
            )
            .expect("shell should start");
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
        assert_eq!(output.failure_reason(None), "exited with status 3");
    }

    #[test]
    fn direct_invocation_runs_in_the_working_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("marker.txt"), "x").expect("write marker");
        let output = SystemProcess
            .execute(&Invocation::Direct(vec!["ls".into()]), dir.path(), None)
            .expect("ls should start");
        assert!(output.success());
        assert!(output.stdout.contains("marker.txt"));
    }

    #[test]
    fn kills_commands_that_time_out() {
        let dir = tempfile::tempdir().expect("temp dir");
        let timeout = Some(Duration::from_millis(200));
        let output = SystemProcess
            .execute(&Invocation::Direct(vec!["sleep".into(), "5".into()]), dir.path(), timeout)
            .expect("sleep should start");
        assert!(output.timed_out);
        assert!(output.walltime < Duration::from_secs(4));
        assert_eq!(output.failure_reason(timeout), "timed out after 0.2s");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = SystemProcess.execute(
            &Invocation::Direct(vec!["definitely-not-a-real-program-xyz".into()]),
            dir.path(),
            None,
        );
        assert!(result.is_err());
    }
}
