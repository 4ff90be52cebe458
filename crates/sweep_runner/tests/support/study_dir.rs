#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sweep_core::config::DEFAULT_STUDY_FILE;
use sweep_core::storage_keys::StudyPaths;
use sweep_core::study::Study;
use tempfile::TempDir;

/// A study file and its inputs in a scratch directory, with a separate
/// scratch directory for sandboxes.
pub struct StudyDir {
    root: TempDir,
    work: TempDir,
}

impl StudyDir {
    pub fn new(yaml: &str) -> Self {
        let dir = Self {
            root: tempfile::tempdir().expect("study root should be created"),
            work: tempfile::tempdir().expect("work dir should be created"),
        };
        dir.write(DEFAULT_STUDY_FILE, yaml);
        dir
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("input directory should be created");
        }
        fs::write(&path, contents).expect("input file should be written");
        path
    }

    pub fn study_file(&self) -> PathBuf {
        self.root.path().join(DEFAULT_STUDY_FILE)
    }

    pub fn study(&self) -> Study {
        Study::load(&self.study_file()).expect("study should load")
    }

    pub fn paths(&self) -> StudyPaths {
        StudyPaths::for_root(self.root.path()).with_work_dir(self.work.path())
    }

    pub fn log_dir(&self, key: &str) -> PathBuf {
        self.paths().case_log_dir(key).expect("log key should be valid")
    }

    /// Sandboxes still present in the work directory.
    pub fn leftover_sandboxes(&self) -> usize {
        fs::read_dir(self.work.path())
            .expect("work dir should be readable")
            .count()
    }
}
