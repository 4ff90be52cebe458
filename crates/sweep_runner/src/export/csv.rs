use sweep_core::value::FieldValue;

use crate::error::Result;
use crate::store::ResultArray;

pub(crate) fn export_to_csv_impl(array: &ResultArray, file: std::fs::File) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(file);

    wtr.write_record(array.fields().iter().map(|field| field.name.as_str()))?;

    for index in 0..array.len() {
        wtr.write_record(
            array
                .fields()
                .iter()
                .map(|field| cell(array.get_index(&field.name, index))),
        )?;
    }

    wtr.flush()?;
    Ok(())
}

/// Masked entries are empty; list entries are joined with `;`.
fn cell(value: Option<&FieldValue>) -> String {
    match value {
        None => String::new(),
        Some(FieldValue::Scalar(value)) => value.to_string(),
        Some(FieldValue::List(values)) => values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";"),
    }
}
