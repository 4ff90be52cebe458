//! Parallel study execution using rayon.
//!
//! Cases are independent: a rayon pool drains the case indices and sends each
//! finished [`CaseResult`] over a channel to the calling thread, which owns
//! the [`ResultStore`] and records results as they arrive. Results are
//! persisted once, after the last case (or after cancellation).

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use sweep_core::storage_keys::StudyPaths;
use sweep_core::study::Study;
use sweep_core::template::{PlaceholderRenderer, TemplateRenderer};
use tracing::{info, warn};

use crate::error::{Result, RunError};
use crate::pipeline::{CaseResult, Pipeline};
use crate::process::{ProcessExecutor, SystemProcess};
use crate::store::ResultStore;

/// Shared stop signal. Once raised, no new case starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker threads; falls back to `settings.workers`, then rayon's default.
    pub workers: Option<usize>,
    pub show_progress: bool,
    /// Stop starting cases after the first failure.
    pub fail_fast: bool,
    pub cancel: CancelFlag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCase {
    pub index: usize,
    pub log_key: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteCase {
    pub index: usize,
    pub log_key: String,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub done: usize,
    pub incomplete: Vec<IncompleteCase>,
    pub failed: Vec<FailedCase>,
    /// Cases never started because the run was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    fn add(&mut self, result: &CaseResult) {
        match &result.error {
            None => {
                self.done += 1;
                if result.is_incomplete() {
                    self.incomplete.push(IncompleteCase {
                        index: result.index,
                        log_key: result.log_key.clone(),
                        missing: result.missing.clone(),
                    });
                }
            }
            Some(error) => self.failed.push(FailedCase {
                index: result.index,
                log_key: result.log_key.clone(),
                error: error.to_string(),
            }),
        }
    }

    pub fn finished(&self) -> usize {
        self.done + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    fn log(&self) {
        info!(
            total = self.total,
            done = self.done,
            failed = self.failed.len(),
            incomplete = self.incomplete.len(),
            skipped = self.skipped,
            "study finished"
        );
        for case in &self.incomplete {
            warn!(case = case.index, log_key = %case.log_key, missing = ?case.missing, "case produced no value for some fields");
        }
        for case in &self.failed {
            warn!(case = case.index, log_key = %case.log_key, error = %case.error, "case failed");
        }
        if self.cancelled {
            warn!(skipped = self.skipped, "run cancelled before every case started");
        }
    }
}

/// Run every case of a study with real processes.
pub fn run_study(study: &Study, paths: &StudyPaths, options: &RunOptions) -> Result<RunSummary> {
    run_study_with(study, paths, options, &SystemProcess, &PlaceholderRenderer)
}

/// Run every case of a study with the given collaborators.
///
/// Integrity problems with stored results are reported before any command
/// runs. Case failures never make this return `Err`; they are listed in the
/// summary.
pub fn run_study_with(
    study: &Study,
    paths: &StudyPaths,
    options: &RunOptions,
    executor: &dyn ProcessExecutor,
    renderer: &dyn TemplateRenderer,
) -> Result<RunSummary> {
    let manifest = study.manifest();
    let mut store = ResultStore::open(&paths.data_dir, &manifest)?;
    fs::create_dir_all(&paths.work_dir)?;

    let total = study.cases().len();
    let mut summary = RunSummary::new(total);
    info!(cases = total, root = %paths.root.display(), "starting study");

    let pool = build_pool(options.workers.or(study.settings.workers))?;
    let pipeline = Pipeline::new(study, paths, executor, renderer);
    let progress = progress_bar(options.show_progress, total);
    let cancel = &options.cancel;
    let fail_fast = options.fail_fast;

    let (sender, receiver) = mpsc::channel::<CaseResult>();
    let mut record_error: Option<RunError> = None;

    let workers_ok = thread::scope(|scope| {
        let workers = scope.spawn(|| {
            pool.install(|| {
                (0..total).into_par_iter().for_each_with(sender, |sender, index| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let Some(result) = pipeline.run_index(index) else {
                        return;
                    };
                    if fail_fast && !result.is_done() {
                        cancel.cancel();
                    }
                    let _ = sender.send(result);
                });
            })
        });

        for result in receiver {
            summary.add(&result);
            if record_error.is_none() {
                if let Err(error) = store.record(&result) {
                    record_error = Some(error);
                }
            }
            if let Some(bar) = &progress {
                bar.inc(1);
            }
        }
        workers.join().is_ok()
    });

    if let Some(bar) = &progress {
        bar.finish_with_message("Completed");
    }

    store.persist()?;
    if let Some(error) = record_error {
        return Err(error);
    }
    if !workers_ok {
        return Err(RunError::Io(std::io::Error::other("a worker thread panicked")));
    }

    summary.skipped = total - summary.finished();
    summary.cancelled = cancel.is_cancelled() && summary.skipped > 0;
    summary.log();
    Ok(summary)
}

fn build_pool(workers: Option<usize>) -> Result<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = workers {
        builder = builder.num_threads(threads);
    }
    Ok(builder.build()?)
}

fn progress_bar(show: bool, total: usize) -> Option<ProgressBar> {
    if !show || total == 0 {
        return None;
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    Some(bar)
}
