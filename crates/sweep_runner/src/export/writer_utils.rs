use std::fs::{self, File};
use std::path::Path;

use crate::error::{Result, RunError};
use crate::store::ResultArray;

pub(crate) fn ensure_not_empty(array: &ResultArray) -> Result<()> {
    if array.is_empty() {
        return Err(RunError::Export("No results to export".to_string()));
    }

    Ok(())
}

pub(crate) fn create_output_file(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}
