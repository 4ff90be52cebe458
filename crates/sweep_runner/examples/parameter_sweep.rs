//! Example: sweep a small shell "solver" over a two-dimensional grid.
//!
//! This example demonstrates how to:
//! 1. Write a study with parameters, expressions, a template and captures
//! 2. Run every case in parallel
//! 3. Read values back from the result array
//! 4. Export results to CSV/JSON/Parquet
//!
//! The "solver" is a shell script, so the example needs `sh`.

use std::fs;

use sweep_core::storage_keys::StudyPaths;
use sweep_core::study::Study;
use sweep_core::value::FieldValue;
use sweep_runner::{export_to_csv, export_to_json, export_to_parquet, run_study, ResultArray, RunOptions};

const STUDY: &str = r#"
parameters:
  elements: [4, 8, 16]
  order: [1, 2]
evaluate:
  dofs: elements * order + 1
templates:
  - source: solver.in.tpl
    target: solver.in
script:
  - command: sh solve.sh
    name: solve
    capture-walltime: true
    capture:
      - type: float
        name: error
        prefix: "error:"
      - type: integer
        name: iterations
        prefix: "iterations:"
prefiles:
  - solve.sh
settings:
  logdir: "e${elements}-p${order}"
"#;

const SOLVER: &str = r#"
dofs=$(sed -n 's/^dofs = //p' solver.in)
echo "iterations: $dofs"
awk -v n="$dofs" 'BEGIN { printf "error: %.6f\n", 1.0 / (n * n) }'
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Preparing study directory...");
    let root = tempfile::tempdir()?;
    fs::write(root.path().join("sweep.yaml"), STUDY)?;
    fs::write(root.path().join("solver.in.tpl"), "dofs = ${dofs}\n")?;
    fs::write(root.path().join("solve.sh"), SOLVER)?;

    let study = Study::load(&root.path().join("sweep.yaml"))?;
    let paths = StudyPaths::for_root(root.path());
    println!("Study has {} cases", study.cases().len());

    println!("Running cases in parallel...");
    let options = RunOptions {
        show_progress: true,
        ..RunOptions::default()
    };
    let summary = run_study(&study, &paths, &options)?;
    println!(
        "Completed {} cases ({} failed)",
        summary.done,
        summary.failed.len()
    );

    let results = ResultArray::load(&paths.data_dir)?;
    println!("\n=== Discretisation error ===");
    for elements in 0..results.shape()[0] {
        for order in 0..results.shape()[1] {
            let coordinate = [elements, order];
            let error = match results.get("error", &coordinate) {
                Some(FieldValue::Scalar(value)) => value.to_string(),
                _ => "-".to_string(),
            };
            let dofs = results
                .get("dofs", &coordinate)
                .map(ToString::to_string)
                .unwrap_or_default();
            println!("dofs {dofs:>3}: error {error}");
        }
    }

    println!("\nExporting results...");
    let out = root.path().join("out");
    export_to_csv(&results, out.join("results.csv"))?;
    export_to_json(&results, out.join("results.json"))?;
    export_to_parquet(&results, out.join("results.parquet"))?;
    println!("Results written to {}", out.display());

    Ok(())
}
