//! Per-case scratch directories.
//!
//! Every case runs in its own temporary directory under the work directory.
//! Pre-files and templates are staged into it before the first command, and
//! post-files are collected from it into the case's log directory afterwards.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use sweep_core::config::FileMode;
use sweep_core::storage_keys::sandbox_prefix;
use sweep_core::study::FileMapping;
use sweep_core::template::TemplateRenderer;
use sweep_core::value::Scope;
use tempfile::TempDir;
use tracing::debug;

/// How a staged file's contents are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staging {
    /// Copy bytes unchanged.
    Copy,
    /// Render placeholders in the file contents.
    Render,
}

#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Create a fresh directory named after the case coordinate.
    pub fn acquire(work_dir: &Path, coordinate: &[usize]) -> io::Result<Self> {
        fs::create_dir_all(work_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(&sandbox_prefix(coordinate))
            .tempdir_in(work_dir)?;
        debug!(sandbox = %dir.path().display(), "sandbox acquired");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Stage one mapping from the study root into the sandbox.
    ///
    /// Source and target are rendered against the case scope first. Returns the
    /// staged paths inside the sandbox.
    pub fn stage(
        &self,
        root: &Path,
        mapping: &FileMapping,
        scope: &Scope,
        renderer: &dyn TemplateRenderer,
        staging: Staging,
    ) -> Result<Vec<PathBuf>, String> {
        let (source, target) = render_mapping(mapping, scope, renderer)?;
        let target = contained(self.path(), &target)?;
        let pairs = resolve_sources(root, &source, mapping.mode, &target)?;

        for (from, to) in &pairs {
            create_parent(to)?;
            match staging {
                Staging::Copy => {
                    fs::copy(from, to).map_err(|e| format!("cannot copy '{}': {e}", from.display()))?;
                }
                Staging::Render => {
                    let text = fs::read_to_string(from)
                        .map_err(|e| format!("cannot read template '{}': {e}", from.display()))?;
                    let rendered = renderer
                        .render(&text, scope)
                        .map_err(|e| format!("template '{}': {e}", from.display()))?;
                    fs::write(to, rendered).map_err(|e| format!("cannot write '{}': {e}", to.display()))?;
                }
            }
        }
        Ok(pairs.into_iter().map(|(_, to)| to).collect())
    }

    /// Copy one post-file mapping from the sandbox into `destination`.
    pub fn collect(
        &self,
        mapping: &FileMapping,
        scope: &Scope,
        renderer: &dyn TemplateRenderer,
        destination: &Path,
    ) -> Result<Vec<PathBuf>, String> {
        let (source, target) = render_mapping(mapping, scope, renderer)?;
        let target = contained(destination, &target)?;
        let pairs = resolve_sources(self.path(), &source, mapping.mode, &target)?;

        for (from, to) in &pairs {
            create_parent(to)?;
            fs::copy(from, to).map_err(|e| format!("cannot collect '{}': {e}", from.display()))?;
        }
        Ok(pairs.into_iter().map(|(_, to)| to).collect())
    }

    /// Copy the whole sandbox tree to `destination`.
    pub fn preserve_into(&self, destination: &Path) -> io::Result<()> {
        if destination.exists() {
            fs::remove_dir_all(destination)?;
        }
        copy_dir_all(self.path(), destination)
    }

    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

fn render_mapping(
    mapping: &FileMapping,
    scope: &Scope,
    renderer: &dyn TemplateRenderer,
) -> Result<(String, String), String> {
    let source = renderer
        .render(&mapping.source, scope)
        .map_err(|e| format!("file source '{}': {e}", mapping.source))?;
    let target = renderer
        .render(&mapping.target, scope)
        .map_err(|e| format!("file target '{}': {e}", mapping.target))?;
    Ok((source, target))
}

/// `base/relative`, refusing paths that climb out of `base`.
fn contained(base: &Path, relative: &str) -> Result<PathBuf, String> {
    let path = Path::new(relative);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(format!("target '{relative}' must stay inside the case directory")),
        }
    }
    Ok(base.join(path))
}

/// Pairs of (existing source file, destination path).
fn resolve_sources(
    base: &Path,
    source: &str,
    mode: FileMode,
    target: &Path,
) -> Result<Vec<(PathBuf, PathBuf)>, String> {
    match mode {
        FileMode::Simple => {
            let from = base.join(source);
            if !from.is_file() {
                return Err(format!("file '{}' does not exist", from.display()));
            }
            Ok(vec![(from, target.to_path_buf())])
        }
        FileMode::Glob => {
            let pattern = base.join(source);
            let pattern = pattern
                .to_str()
                .ok_or_else(|| format!("pattern '{}' is not valid UTF-8", pattern.display()))?;
            let entries = glob::glob(pattern).map_err(|e| format!("invalid pattern '{source}': {e}"))?;

            let mut pairs = Vec::new();
            for entry in entries {
                let from = entry.map_err(|e| format!("pattern '{source}': {e}"))?;
                if !from.is_file() {
                    continue;
                }
                let Some(name) = from.file_name() else {
                    continue;
                };
                let to = target.join(name);
                pairs.push((from, to));
            }
            if pairs.is_empty() {
                return Err(format!("pattern '{source}' matched no files"));
            }
            Ok(pairs)
        }
    }
}

fn create_parent(path: &Path) -> Result<(), String> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| format!("cannot create '{}': {e}", parent.display())),
        None => Ok(()),
    }
}

pub(crate) fn copy_dir_all(source: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let to = destination.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_all(&entry.path(), &to)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &to)?;
        }
    }
    Ok(())
}
