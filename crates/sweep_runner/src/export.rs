//! Result export.
//!
//! Every exporter writes one row per grid point in row-major order and one
//! column per field, in manifest order.

use std::path::Path;

use crate::error::Result;
use crate::store::ResultArray;

#[path = "export/csv.rs"]
mod csv;
#[path = "export/json.rs"]
mod json;
#[path = "export/parquet.rs"]
mod parquet;
#[path = "export/writer_utils.rs"]
mod writer_utils;

/// Export results to Parquet format.
///
/// Integer, float and string fields map to `Int64`, `Float64` and `Utf8`
/// columns; list fields become `List` columns. Masked entries are null.
///
/// # Errors
///
/// Returns an error if the array is empty, or if file creation or Parquet
/// writing fails.
pub fn export_to_parquet(array: &ResultArray, path: impl AsRef<Path>) -> Result<()> {
    writer_utils::ensure_not_empty(array)?;
    let file = writer_utils::create_output_file(path)?;
    parquet::export_to_parquet_impl(array, file)
}

/// Export results to JSON format: an array of objects keyed by field name,
/// with `null` for masked entries.
pub fn export_to_json(array: &ResultArray, path: impl AsRef<Path>) -> Result<()> {
    let file = writer_utils::create_output_file(path)?;
    json::export_to_json_impl(array, file)
}

/// Export results to CSV format.
///
/// Masked entries are empty cells and list entries are joined with `;`.
///
/// # Errors
///
/// Returns an error if the array is empty, or if file creation or CSV writing
/// fails.
pub fn export_to_csv(array: &ResultArray, path: impl AsRef<Path>) -> Result<()> {
    writer_utils::ensure_not_empty(array)?;
    let file = writer_utils::create_output_file(path)?;
    csv::export_to_csv_impl(array, file)
}
