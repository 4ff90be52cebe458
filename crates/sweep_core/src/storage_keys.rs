use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StudyError};

pub const DATA_DIR_NAME: &str = ".sweepdata";
pub const LOGS_DIR_NAME: &str = "logs";
pub const SANDBOX_COPY_DIR_NAME: &str = "sandbox";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFile {
    Manifest,
    Values,
    Mask,
}

impl DataFile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manifest => "manifest.json",
            Self::Values => "values.json",
            Self::Mask => "mask.json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn extension(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Directories a study run reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyPaths {
    /// Directory holding the study file; relative file sources resolve here.
    pub root: PathBuf,
    /// `<root>/.sweepdata`.
    pub data_dir: PathBuf,
    /// Parent directory of the per-case sandboxes.
    pub work_dir: PathBuf,
}

impl StudyPaths {
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join(DATA_DIR_NAME),
            work_dir: std::env::temp_dir(),
            root,
        }
    }

    /// The study root for a study file path.
    pub fn for_study_file(path: &Path) -> Self {
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::for_root(root)
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn data_file(&self, file: DataFile) -> PathBuf {
        data_file_path(&self.data_dir, file)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR_NAME)
    }

    pub fn case_log_dir(&self, log_key: &str) -> Result<PathBuf> {
        case_log_dir(&self.data_dir, log_key)
    }
}

pub fn data_file_path(data_dir: &Path, file: DataFile) -> PathBuf {
    data_dir.join(file.as_str())
}

/// `<data_dir>/logs/<key>`. The key must be a non-empty relative path that
/// stays inside the logs directory.
pub fn case_log_dir(data_dir: &Path, log_key: &str) -> Result<PathBuf> {
    let key = Path::new(log_key);
    let mut has_normal = false;
    for component in key.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            _ => {
                return Err(StudyError::config(format!(
                    "log directory '{log_key}' must be a relative path inside the logs directory"
                )))
            }
        }
    }
    if !has_normal {
        return Err(StudyError::config("log directory must not be empty"));
    }
    Ok(data_dir.join(LOGS_DIR_NAME).join(key))
}

/// `<command>.stdout` / `<command>.stderr`, with path separators flattened.
pub fn output_file_name(command: &str, stream: OutputStream) -> String {
    let stem: String = command
        .chars()
        .map(|ch| if ch == '/' || ch == '\\' { '_' } else { ch })
        .collect();
    format!("{stem}.{}", stream.extension())
}

/// Temp-directory prefix for the sandbox of a case: `case-1-0-2-`.
pub fn sandbox_prefix(coordinate: &[usize]) -> String {
    let mut prefix = String::from("case-");
    for position in coordinate {
        prefix.push_str(&position.to_string());
        prefix.push('-');
    }
    prefix
}

/// Fallback log key when the logdir template cannot be rendered.
pub fn fallback_log_key(index: usize) -> String {
    format!("case-{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_data_file_paths() {
        let paths = StudyPaths::for_root("/studies/beam");
        assert_eq!(
            paths.data_file(DataFile::Values),
            PathBuf::from("/studies/beam/.sweepdata/values.json")
        );
        assert_eq!(
            paths.data_file(DataFile::Manifest),
            PathBuf::from("/studies/beam/.sweepdata/manifest.json")
        );
    }

    #[test]
    fn study_file_in_current_directory_uses_dot_root() {
        let paths = StudyPaths::for_study_file(Path::new("sweep.yaml"));
        assert_eq!(paths.root, PathBuf::from("."));
        assert_eq!(paths.data_dir, PathBuf::from("./.sweepdata"));
    }

    #[test]
    fn builds_case_log_dir_under_logs() {
        let dir = case_log_dir(Path::new("/d"), "n-1_mesh-fine").expect("key should be valid");
        assert_eq!(dir, PathBuf::from("/d/logs/n-1_mesh-fine"));

        let nested = case_log_dir(Path::new("/d"), "n-1/mesh-fine").expect("nested key should be valid");
        assert_eq!(nested, PathBuf::from("/d/logs/n-1/mesh-fine"));
    }

    #[test]
    fn rejects_escaping_log_keys() {
        assert!(case_log_dir(Path::new("/d"), "").is_err());
        assert!(case_log_dir(Path::new("/d"), ".").is_err());
        assert!(case_log_dir(Path::new("/d"), "../outside").is_err());
        assert!(case_log_dir(Path::new("/d"), "/abs").is_err());
    }

    #[test]
    fn builds_output_and_sandbox_names() {
        assert_eq!(output_file_name("post/step", OutputStream::Stdout), "post_step.stdout");
        assert_eq!(output_file_name("solver", OutputStream::Stderr), "solver.stderr");
        assert_eq!(sandbox_prefix(&[1, 0, 2]), "case-1-0-2-");
        assert_eq!(fallback_log_key(7), "case-7");
    }
}
