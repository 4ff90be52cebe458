use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sweep_core::config::DEFAULT_STUDY_FILE;
use sweep_core::storage_keys::StudyPaths;
use sweep_core::study::Study;
use sweep_runner::logging::init_logging;
use sweep_runner::runner::{run_study, RunOptions, RunSummary};
use sweep_runner::store::{self, ResultArray};
use sweep_runner::{export_to_csv, export_to_json, export_to_parquet, RunError};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "sweep",
    about = "Run an external program over a grid of parameters",
    long_about = "Runs every point of a parameter grid through a script of external\n\
                  commands, captures values from their output and stores them in a\n\
                  masked result array next to the study file."
)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", env = "SWEEP_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StudyArgs {
    /// Study file
    #[arg(long, short, default_value = DEFAULT_STUDY_FILE)]
    file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every case of the study
    Run {
        #[command(flatten)]
        study: StudyArgs,
        /// Number of worker threads
        #[arg(long)]
        workers: Option<NonZeroUsize>,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
        /// Stop starting new cases after the first failure
        #[arg(long)]
        fail_fast: bool,
        /// Parent directory for case sandboxes (defaults to the system temp dir)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
    /// Validate stored results against the study
    Check {
        #[command(flatten)]
        study: StudyArgs,
    },
    /// Remove stored results
    Purge {
        #[command(flatten)]
        study: StudyArgs,
    },
    /// Write stored results to a file
    Export {
        #[command(flatten)]
        study: StudyArgs,
        #[arg(long, value_enum)]
        format: ExportFormat,
        /// Output file path
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
    Parquet,
}

// ── commands ───────────────────────────────────────────────────────

fn run(
    study_args: &StudyArgs,
    workers: Option<NonZeroUsize>,
    show_progress: bool,
    fail_fast: bool,
    work_dir: Option<PathBuf>,
) -> Result<bool, RunError> {
    let study = Study::load(&study_args.file)?;
    let mut paths = StudyPaths::for_study_file(&study_args.file);
    if let Some(work_dir) = work_dir {
        paths = paths.with_work_dir(work_dir);
    }
    let options = RunOptions {
        workers: workers.map(NonZeroUsize::get),
        show_progress,
        fail_fast,
        ..RunOptions::default()
    };

    let started = Utc::now();
    let summary = run_study(&study, &paths, &options)?;
    print_summary(&summary, started);
    Ok(summary.is_success())
}

fn print_summary(summary: &RunSummary, started: chrono::DateTime<Utc>) {
    let elapsed = Utc::now() - started;
    println!(
        "{} cases: {} done, {} failed, {} skipped ({}s, started {})",
        summary.total,
        summary.done,
        summary.failed.len(),
        summary.skipped,
        elapsed.num_seconds(),
        started.to_rfc3339()
    );
    for case in &summary.incomplete {
        println!("  incomplete  {}: missing {}", case.log_key, case.missing.join(", "));
    }
    for case in &summary.failed {
        println!("  failed      {}: {}", case.log_key, case.error);
    }
}

fn check(study_args: &StudyArgs) -> Result<bool, RunError> {
    let study = Study::load(&study_args.file)?;
    let paths = StudyPaths::for_study_file(&study_args.file);
    store::check(&paths.data_dir, &study.manifest())?;
    println!(
        "{}: {} cases, stored results are consistent",
        study_args.file.display(),
        study.cases().len()
    );
    Ok(true)
}

fn purge(study_args: &StudyArgs) -> Result<bool, RunError> {
    let paths = StudyPaths::for_study_file(&study_args.file);
    if store::purge(&paths.data_dir)? {
        println!("removed {}", paths.data_dir.display());
    } else {
        println!("nothing to remove at {}", paths.data_dir.display());
    }
    Ok(true)
}

fn export(study_args: &StudyArgs, format: ExportFormat, output: &PathBuf) -> Result<bool, RunError> {
    let paths = StudyPaths::for_study_file(&study_args.file);
    let array = ResultArray::load(&paths.data_dir)?;
    match format {
        ExportFormat::Csv => export_to_csv(&array, output)?,
        ExportFormat::Json => export_to_json(&array, output)?,
        ExportFormat::Parquet => export_to_parquet(&array, output)?,
    }
    println!("wrote {} rows to {}", array.len(), output.display());
    Ok(true)
}

// ── main ───────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let outcome = match &cli.command {
        Commands::Run {
            study,
            workers,
            no_progress,
            fail_fast,
            work_dir,
        } => run(study, *workers, !no_progress, *fail_fast, work_dir.clone()),
        Commands::Check { study } => check(study),
        Commands::Purge { study } => purge(study),
        Commands::Export {
            study,
            format,
            output,
        } => export(study, *format, output),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {error}");
            if error.is_integrity() {
                eprintln!("the stored results belong to a different study; run `sweep purge` to start over");
            }
            ExitCode::FAILURE
        }
    }
}
