//! End-to-end runs with real processes.
#![cfg(unix)]

mod support;

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use sweep_core::study::Invocation;
use sweep_core::value::{FieldValue, Scalar};
use sweep_runner::runner::{run_study, RunOptions};
use sweep_runner::{export_to_csv, ProcessExecutor, ResultArray, SystemProcess};
use support::study_dir::StudyDir;

#[test]
fn runs_a_shell_study_end_to_end() {
    let dir = StudyDir::new(
        r#"
parameters:
  mesh: [coarse, fine]
  n: [2, 3]
evaluate:
  cells: n * n
types:
  cells: integer
prefiles:
  - source: "data/*.txt"
    mode: glob
    target: data
templates:
  - source: solver.tpl
    target: solver.sh
script:
  - command: sh solver.sh
    name: solve
    capture-output: true
    capture:
      - 'mesh=(?P<seen_mesh>\w+)'
      - type: integer
        name: total
        prefix: "total:"
  - command: [sh, -c, "ls data | wc -l > count.txt"]
    name: count
postfiles:
  - count.txt
settings:
  logdir: "${mesh}/n${n}"
"#,
    );
    dir.write("data/a.txt", "1\n");
    dir.write("data/b.txt", "2\n");
    dir.write("solver.tpl", "echo mesh=${mesh}\necho total: ${cells + 1}\n");

    let options = RunOptions {
        workers: Some(2),
        ..RunOptions::default()
    };
    let summary = run_study(&dir.study(), &dir.paths(), &options).expect("run should succeed");
    assert_eq!(summary.done, 4, "failed cases: {:?}", summary.failed);
    assert!(summary.incomplete.is_empty());

    let results = ResultArray::load(&dir.paths().data_dir).expect("results should load");
    assert_eq!(
        results.get("seen_mesh", &[1, 0]),
        Some(&FieldValue::Scalar(Scalar::from("fine")))
    );
    assert_eq!(results.get("total", &[0, 1]), Some(&FieldValue::Scalar(Scalar::Int(10))));

    let log_dir = dir.log_dir("fine/n3");
    assert_eq!(
        fs::read_to_string(log_dir.join("solve.stdout")).expect("captured output kept"),
        "mesh=fine\ntotal: 10\n"
    );
    assert_eq!(
        fs::read_to_string(log_dir.join("count.txt")).expect("post-file collected").trim(),
        "2"
    );
    assert!(!log_dir.join("count.stdout").exists());
    assert_eq!(dir.leftover_sandboxes(), 0);

    let csv_path = dir.root().join("results.csv");
    export_to_csv(&results, &csv_path).expect("csv export should succeed");
    let csv = fs::read_to_string(&csv_path).expect("csv should be written");
    assert!(csv.starts_with("mesh,n,cells,seen_mesh,total\n"));
    assert!(csv.contains("fine,3,9,fine,10\n"));
}

#[test]
fn timed_out_command_fails_only_its_case() {
    let dir = StudyDir::new(
        r#"
parameters:
  delay: [0, 5]
script:
  - command: "sleep ${delay}; echo finished=yes"
    timeout: 0.3
    capture: 'finished=(?P<finished>\w+)'
"#,
    );

    let started = Instant::now();
    let summary = run_study(&dir.study(), &dir.paths(), &RunOptions::default()).expect("run should finish");
    assert!(started.elapsed().as_secs() < 4, "timeout was not enforced");

    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].log_key, "delay-5");
    assert!(summary.failed[0].error.contains("timed out"));

    let results = ResultArray::load(&dir.paths().data_dir).expect("results should load");
    assert!(!results.is_masked("finished", &[0]));
    assert!(results.is_masked("finished", &[1]));
}

#[test]
fn timeout_stops_processes_started_by_the_command() {
    let dir = tempfile::tempdir().expect("temp dir");
    let marker = dir.path().join("survivor");
    let line = format!("(sleep 1; touch '{}'); true", marker.display());

    let output = SystemProcess
        .execute(&Invocation::Shell(line), dir.path(), Some(Duration::from_millis(200)))
        .expect("shell should start");
    assert!(output.timed_out);
    assert!(output.walltime < Duration::from_secs(1));

    thread::sleep(Duration::from_millis(1500));
    assert!(!marker.exists(), "a forked subshell outlived the timeout");
}

#[test]
fn missing_template_fails_staging() {
    let dir = StudyDir::new("parameters: {n: [1]}\ntemplates: [absent.tpl]\nscript: [\"true\"]\n");

    let summary = run_study(&dir.study(), &dir.paths(), &RunOptions::default()).expect("run should finish");
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].error.starts_with("staging failed"));
    assert!(dir.log_dir("n-1").join("sandbox").is_dir());
}
