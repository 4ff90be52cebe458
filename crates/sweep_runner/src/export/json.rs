use serde_json::{Map, Value};

use crate::error::Result;
use crate::store::ResultArray;

pub(crate) fn export_to_json_impl(array: &ResultArray, file: std::fs::File) -> Result<()> {
    let rows: Vec<Value> = (0..array.len())
        .map(|index| {
            let row: Map<String, Value> = array
                .fields()
                .iter()
                .map(|field| {
                    let value = array
                        .get_index(&field.name, index)
                        .map(serde_json::to_value)
                        .transpose()?
                        .unwrap_or(Value::Null);
                    Ok((field.name.clone(), value))
                })
                .collect::<serde_json::Result<_>>()?;
            Ok(Value::Object(row))
        })
        .collect::<serde_json::Result<_>>()?;

    serde_json::to_writer_pretty(file, &rows)?;
    Ok(())
}
