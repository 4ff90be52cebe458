//! Runs parametric studies of external programs.
//!
//! A study (see [`sweep_core`]) describes a grid of parameters, derived
//! expressions, files to stage and a script of commands. This crate runs every
//! case of that grid in parallel, each in its own sandbox, and stores the
//! captured values in a masked result array.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use sweep_core::storage_keys::StudyPaths;
//! use sweep_core::study::Study;
//! use sweep_runner::{export_to_csv, run_study, ResultArray, RunOptions};
//!
//! let file = Path::new("sweep.yaml");
//! let study = Study::load(file)?;
//! let paths = StudyPaths::for_study_file(file);
//!
//! let summary = run_study(&study, &paths, &RunOptions::default())?;
//! println!("{} of {} cases done", summary.done, summary.total);
//!
//! let results = ResultArray::load(&paths.data_dir)?;
//! export_to_csv(&results, "results.csv")?;
//! # Ok::<(), sweep_runner::RunError>(())
//! ```
//!
//! # Architecture
//!
//! - [`pipeline`]: one case from staging to captured values
//! - [`sandbox`]: per-case scratch directories and file staging
//! - [`process`]: running external commands with timeouts
//! - [`runner`]: parallel execution using rayon
//! - [`store`]: the persisted result array
//! - [`export`]: result export to CSV, JSON and Parquet

pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod runner;
pub mod sandbox;
pub mod store;

pub use error::{CaseError, RunError};
pub use export::{export_to_csv, export_to_json, export_to_parquet};
pub use pipeline::{CaseResult, CaseStatus, Pipeline};
pub use process::{ProcessExecutor, ProcessOutput, SystemProcess};
pub use runner::{run_study, run_study_with, CancelFlag, RunOptions, RunSummary};
pub use store::{ResultArray, ResultStore};
