//! The persisted result array of a study.
//!
//! Results are kept as one flat, row-major column per field plus a boolean
//! mask column of the same shape (`true` = no value). The data directory holds
//! three files, all written atomically:
//!
//! * `manifest.json` - shape, fields and fingerprint ([`StudyManifest`])
//! * `values.json` - the value columns, `null` where masked
//! * `mask.json` - the mask columns
//!
//! A store only ever opens a directory whose manifest matches the study.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sweep_core::manifest::StudyManifest;
use sweep_core::parameters::{coordinate_of, index_of};
use sweep_core::storage_keys::{data_file_path, DataFile};
use sweep_core::study::{Field, FieldRole};
use sweep_core::value::{FieldType, FieldValue};
use sweep_core::StudyError;
use tracing::{debug, info, warn};

use crate::error::{Result, RunError};
use crate::pipeline::CaseResult;

#[path = "store/persist.rs"]
mod persist;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ValuesFile {
    shape: Vec<usize>,
    fields: BTreeMap<String, Vec<Option<FieldValue>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MaskFile {
    shape: Vec<usize>,
    fields: BTreeMap<String, Vec<bool>>,
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    values: Vec<Option<FieldValue>>,
    mask: Vec<bool>,
}

impl Column {
    fn masked(len: usize) -> Self {
        Self {
            values: vec![None; len],
            mask: vec![true; len],
        }
    }

    fn set(&mut self, index: usize, value: FieldValue) {
        self.values[index] = Some(value);
        self.mask[index] = false;
    }

    fn clear(&mut self, index: usize) {
        self.values[index] = None;
        self.mask[index] = true;
    }
}

/// Read access to stored results.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultArray {
    manifest: StudyManifest,
    shape: Vec<usize>,
    columns: BTreeMap<String, Column>,
}

impl ResultArray {
    /// A fresh array: parameter columns filled from the grid, everything else masked.
    pub fn new(manifest: StudyManifest) -> Result<Self> {
        let shape = manifest.shape();
        let len = manifest.len();
        let mut columns: BTreeMap<String, Column> = manifest
            .fields
            .iter()
            .map(|field| (field.name.clone(), Column::masked(len)))
            .collect();

        for (axis, dimension) in manifest.dimensions.iter().enumerate() {
            let Some(field) = manifest.fields.iter().find(|field| field.name == dimension.name) else {
                continue;
            };
            let mut stored = Vec::with_capacity(dimension.values.len());
            for value in &dimension.values {
                let coerced = field.field_type.scalar.coerce(value).map_err(|message| {
                    StudyError::config(format!("parameter '{}': {message}", dimension.name))
                })?;
                stored.push(FieldValue::Scalar(coerced));
            }
            let Some(column) = columns.get_mut(&dimension.name) else {
                continue;
            };
            for index in 0..len {
                let Some(coordinate) = coordinate_of(index, &shape) else {
                    break;
                };
                column.set(index, stored[coordinate[axis]].clone());
            }
        }

        Ok(Self {
            manifest,
            shape,
            columns,
        })
    }

    /// Load the stored array of a data directory.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let manifest = read_manifest(data_dir)?
            .ok_or_else(|| RunError::Export(format!("no stored results in '{}'", data_dir.display())))?;
        Self::load_with(data_dir, manifest)?.ok_or_else(|| {
            RunError::Corrupt(format!(
                "'{}' has a manifest but no values",
                data_dir.display()
            ))
        })
    }

    fn load_with(data_dir: &Path, manifest: StudyManifest) -> Result<Option<Self>> {
        let values: Option<ValuesFile> = persist::read_json(&data_file_path(data_dir, DataFile::Values))?;
        let mask: Option<MaskFile> = persist::read_json(&data_file_path(data_dir, DataFile::Mask))?;
        let (values, mask) = match (values, mask) {
            (Some(values), Some(mask)) => (values, mask),
            (None, None) => return Ok(None),
            _ => {
                return Err(RunError::Corrupt(
                    "values.json and mask.json must be stored together".to_string(),
                ))
            }
        };
        Self::from_files(manifest, values, mask).map(Some)
    }

    fn from_files(manifest: StudyManifest, mut values: ValuesFile, mut mask: MaskFile) -> Result<Self> {
        let shape = manifest.shape();
        if values.shape != shape || mask.shape != shape {
            return Err(RunError::Corrupt(format!(
                "stored shape {:?} does not match manifest shape {shape:?}",
                values.shape
            )));
        }
        let len = manifest.len();

        let mut columns = BTreeMap::new();
        for field in &manifest.fields {
            let stored_values = values.fields.remove(&field.name);
            let stored_mask = mask.fields.remove(&field.name);
            let (stored_values, stored_mask) = match (stored_values, stored_mask) {
                (Some(v), Some(m)) if v.len() == len && m.len() == len => (v, m),
                _ => {
                    return Err(RunError::Corrupt(format!(
                        "column '{}' is missing or has the wrong length",
                        field.name
                    )))
                }
            };

            let mut column = Column::masked(len);
            for (index, (value, masked)) in stored_values.into_iter().zip(stored_mask).enumerate() {
                match (value, masked) {
                    (None, true) => {}
                    (Some(value), false) => {
                        let value = conform(&value, field.field_type).map_err(|message| {
                            RunError::Corrupt(format!("column '{}' entry {index}: {message}", field.name))
                        })?;
                        column.set(index, value);
                    }
                    _ => {
                        return Err(RunError::Corrupt(format!(
                            "column '{}' entry {index}: mask and value disagree",
                            field.name
                        )))
                    }
                }
            }
            columns.insert(field.name.clone(), column);
        }

        Ok(Self {
            manifest,
            shape,
            columns,
        })
    }

    pub fn manifest(&self) -> &StudyManifest {
        &self.manifest
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fields(&self) -> &[Field] {
        &self.manifest.fields
    }

    /// Value at a grid coordinate, `None` when masked.
    pub fn get(&self, field: &str, coordinate: &[usize]) -> Option<&FieldValue> {
        self.get_index(field, index_of(coordinate, &self.shape)?)
    }

    /// Value at a row-major position, `None` when masked.
    pub fn get_index(&self, field: &str, index: usize) -> Option<&FieldValue> {
        self.columns.get(field)?.values.get(index)?.as_ref()
    }

    /// Unknown fields and coordinates count as masked.
    pub fn is_masked(&self, field: &str, coordinate: &[usize]) -> bool {
        index_of(coordinate, &self.shape)
            .and_then(|index| self.columns.get(field)?.mask.get(index).copied())
            .unwrap_or(true)
    }

    pub fn mask(&self, field: &str) -> Option<&[bool]> {
        self.columns.get(field).map(|column| column.mask.as_slice())
    }

    /// Number of unmasked entries of a field.
    pub fn count_present(&self, field: &str) -> usize {
        self.mask(field)
            .map(|mask| mask.iter().filter(|masked| !**masked).count())
            .unwrap_or(0)
    }

    fn clear_point(&mut self, index: usize) {
        for field in &self.manifest.fields {
            if field.role == FieldRole::Parameter {
                continue;
            }
            if let Some(column) = self.columns.get_mut(&field.name) {
                column.clear(index);
            }
        }
    }

    fn to_files(&self) -> (ValuesFile, MaskFile) {
        let values = ValuesFile {
            shape: self.shape.clone(),
            fields: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.values.clone()))
                .collect(),
        };
        let mask = MaskFile {
            shape: self.shape.clone(),
            fields: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.mask.clone()))
                .collect(),
        };
        (values, mask)
    }
}

/// Bring a stored value back to its declared type.
fn conform(value: &FieldValue, field_type: FieldType) -> std::result::Result<FieldValue, String> {
    match (value, field_type.list) {
        (FieldValue::Scalar(scalar), false) => field_type.scalar.coerce(scalar).map(FieldValue::Scalar),
        (FieldValue::List(items), true) => items
            .iter()
            .map(|item| field_type.scalar.coerce(item))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(FieldValue::List),
        (_, true) => Err(format!("expected a {field_type}")),
        (_, false) => Err(format!("expected a {field_type}, found a list")),
    }
}

fn read_manifest(data_dir: &Path) -> Result<Option<StudyManifest>> {
    let path = data_file_path(data_dir, DataFile::Manifest);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(Some(StudyManifest::from_json_str(&text)?)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Owns the result array of one run. Only the thread that holds the store
/// writes to it.
#[derive(Debug)]
pub struct ResultStore {
    data_dir: PathBuf,
    array: ResultArray,
}

impl ResultStore {
    /// Open (or create) the data directory for `manifest`.
    ///
    /// A stored manifest that differs from `manifest` is an integrity error;
    /// nothing is touched in that case.
    pub fn open(data_dir: &Path, manifest: &StudyManifest) -> Result<Self> {
        fs::create_dir_all(data_dir)?;

        let array = match read_manifest(data_dir)? {
            Some(stored) => {
                manifest.validate(&stored)?;
                match ResultArray::load_with(data_dir, stored)? {
                    Some(array) => {
                        info!(data_dir = %data_dir.display(), "resuming stored results");
                        array
                    }
                    None => ResultArray::new(manifest.clone())?,
                }
            }
            None => {
                let array = ResultArray::new(manifest.clone())?;
                persist::write_json_atomic(&data_file_path(data_dir, DataFile::Manifest), manifest)?;
                array
            }
        };

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            array,
        })
    }

    pub fn array(&self) -> &ResultArray {
        &self.array
    }

    pub fn into_array(self) -> ResultArray {
        self.array
    }

    /// Overwrite the non-parameter entries of one case. Recording the same
    /// result twice leaves the array unchanged.
    pub fn record(&mut self, result: &CaseResult) -> Result<()> {
        let index = index_of(&result.coordinate, &self.array.shape)
            .filter(|index| *index == result.index)
            .ok_or_else(|| {
                RunError::Corrupt(format!(
                    "case {} has coordinate {:?} outside shape {:?}",
                    result.index, result.coordinate, self.array.shape
                ))
            })?;

        self.array.clear_point(index);
        for (name, value) in &result.values {
            let Some(field) = self.array.manifest.fields.iter().find(|field| &field.name == name) else {
                warn!(case = index, field = %name, "value for an unknown field dropped");
                continue;
            };
            if field.role == FieldRole::Parameter {
                continue;
            }
            if let Some(column) = self.array.columns.get_mut(name) {
                column.set(index, value.clone());
            }
        }
        debug!(case = index, fields = result.values.len(), "case recorded");
        Ok(())
    }

    /// Write the manifest, values and mask.
    pub fn persist(&self) -> Result<()> {
        let (values, mask) = self.array.to_files();
        persist::write_json_atomic(&data_file_path(&self.data_dir, DataFile::Manifest), &self.array.manifest)?;
        persist::write_json_atomic(&data_file_path(&self.data_dir, DataFile::Values), &values)?;
        persist::write_json_atomic(&data_file_path(&self.data_dir, DataFile::Mask), &mask)?;
        debug!(data_dir = %self.data_dir.display(), "results persisted");
        Ok(())
    }
}

/// Validate a data directory against a study manifest without opening it for
/// writing. An empty directory is valid.
pub fn check(data_dir: &Path, manifest: &StudyManifest) -> Result<()> {
    let Some(stored) = read_manifest(data_dir)? else {
        return Ok(());
    };
    manifest.validate(&stored)?;
    ResultArray::load_with(data_dir, stored)?;
    Ok(())
}

/// Remove the data directory. Returns whether there was anything to remove.
pub fn purge(data_dir: &Path) -> Result<bool> {
    if !data_dir.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(data_dir)?;
    info!(data_dir = %data_dir.display(), "data directory removed");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CaseStatus;
    use sweep_core::study::Study;
    use sweep_core::value::Scalar;

    const STUDY: &str = "parameters:\n  n: [1, 2]\n  mesh: [coarse, fine, ultra]\nscript:\n  - command: solve\n    capture: 'err=(?P<err>\\S+)'\ntypes:\n  err: float\n";

    fn manifest() -> StudyManifest {
        Study::from_yaml_str(STUDY).expect("study should build").manifest()
    }

    fn result(index: usize, err: Option<f64>) -> CaseResult {
        let shape = [2, 3];
        let mut values = BTreeMap::new();
        if let Some(err) = err {
            values.insert("err".to_string(), FieldValue::Scalar(Scalar::Float(err)));
        }
        CaseResult {
            index,
            coordinate: coordinate_of(index, &shape).expect("index inside shape"),
            log_key: format!("case-{index}"),
            status: if err.is_some() { CaseStatus::Done } else { CaseStatus::Failed },
            error: None,
            values,
            commands: Vec::new(),
            missing: Vec::new(),
        }
    }

    #[test]
    fn fresh_array_fills_parameters_and_masks_the_rest() {
        let array = ResultArray::new(manifest()).expect("array should build");
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array.get("n", &[1, 0]), Some(&FieldValue::Scalar(Scalar::Int(2))));
        assert_eq!(
            array.get("mesh", &[1, 2]),
            Some(&FieldValue::Scalar(Scalar::from("ultra")))
        );
        assert!(array.is_masked("err", &[0, 0]));
        assert_eq!(array.count_present("err"), 0);
    }

    #[test]
    fn recording_is_idempotent_and_persists() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = ResultStore::open(dir.path(), &manifest()).expect("store should open");
        store.record(&result(4, Some(0.5))).expect("record");
        let once = store.array().clone();
        store.record(&result(4, Some(0.5))).expect("record again");
        assert_eq!(store.array(), &once);
        store.persist().expect("persist");

        let loaded = ResultArray::load(dir.path()).expect("array should load");
        assert_eq!(loaded, once);
        assert_eq!(loaded.get("err", &[1, 1]), Some(&FieldValue::Scalar(Scalar::Float(0.5))));
    }

    #[test]
    fn rerecording_a_failed_case_masks_old_values() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = ResultStore::open(dir.path(), &manifest()).expect("store should open");
        store.record(&result(2, Some(1.5))).expect("record");
        store.record(&result(2, None)).expect("record failure");
        assert!(store.array().is_masked("err", &[0, 2]));
        assert!(!store.array().is_masked("n", &[0, 2]));
    }

    #[test]
    fn reopening_resumes_stored_values() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = ResultStore::open(dir.path(), &manifest()).expect("store should open");
        store.record(&result(0, Some(2.0))).expect("record");
        store.persist().expect("persist");

        let reopened = ResultStore::open(dir.path(), &manifest()).expect("store should reopen");
        assert_eq!(reopened.array().count_present("err"), 1);
    }

    #[test]
    fn a_changed_grid_is_an_integrity_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        ResultStore::open(dir.path(), &manifest()).expect("store should open");

        let changed = Study::from_yaml_str(&STUDY.replace("[1, 2]", "[1, 2, 3]"))
            .expect("study should build")
            .manifest();
        let error = ResultStore::open(dir.path(), &changed).expect_err("changed grid should fail");
        assert!(error.is_integrity());
        let error = check(dir.path(), &changed).expect_err("check should fail too");
        assert!(error.is_integrity());
        check(dir.path(), &manifest()).expect("unchanged study should pass");
    }

    #[test]
    fn disagreeing_mask_is_corrupt() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = ResultStore::open(dir.path(), &manifest()).expect("store should open");
        store.persist().expect("persist");

        let mask_path = data_file_path(dir.path(), DataFile::Mask);
        let text = fs::read_to_string(&mask_path).expect("read mask");
        fs::write(&mask_path, text.replacen("true", "false", 1)).expect("write mask");
        let error = ResultArray::load(dir.path()).expect_err("corrupt mask should fail");
        assert!(matches!(error, RunError::Corrupt(_)));
    }

    #[test]
    fn purge_removes_the_directory() {
        let parent = tempfile::tempdir().expect("temp dir");
        let data_dir = parent.path().join(".sweepdata");
        ResultStore::open(&data_dir, &manifest()).expect("store should open");
        assert!(purge(&data_dir).expect("purge"));
        assert!(!data_dir.exists());
        assert!(!purge(&data_dir).expect("second purge"));
    }
}
