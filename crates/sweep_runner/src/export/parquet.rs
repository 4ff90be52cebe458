use std::sync::Arc;

use arrow::array::{
    ArrayBuilder, ArrayRef, Float64Array, Float64Builder, Int64Array, Int64Builder, ListBuilder,
    StringArray, StringBuilder,
};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use sweep_core::study::Field as ResultField;
use sweep_core::value::{FieldValue, Scalar, ScalarType};

use crate::error::Result;
use crate::store::ResultArray;

pub(crate) fn export_to_parquet_impl(array: &ResultArray, file: std::fs::File) -> Result<()> {
    let batch = build_record_batch(array)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

fn build_record_batch(array: &ResultArray) -> std::result::Result<RecordBatch, arrow::error::ArrowError> {
    let arrays: Vec<ArrayRef> = array.fields().iter().map(|field| build_column(array, field)).collect();
    let schema = Schema::new(
        array
            .fields()
            .iter()
            .zip(&arrays)
            .map(|(field, column)| Field::new(&field.name, column.data_type().clone(), true))
            .collect::<Vec<_>>(),
    );

    RecordBatch::try_new(Arc::new(schema), arrays)
}

/// Every column is nullable; masked entries become nulls.
fn build_column(array: &ResultArray, field: &ResultField) -> ArrayRef {
    let rows = move || (0..array.len()).map(move |index| array.get_index(&field.name, index));

    if field.field_type.list {
        let lists = rows().map(|value| value.and_then(FieldValue::as_list));
        return match field.field_type.scalar {
            ScalarType::Integer => list_column(Int64Builder::new(), lists, |b, v| b.append_option(as_i64(v))),
            ScalarType::Float => list_column(Float64Builder::new(), lists, |b, v| b.append_option(v.as_f64())),
            ScalarType::String => list_column(StringBuilder::new(), lists, |b, v| b.append_value(v.to_string())),
        };
    }

    let scalars = rows().map(|value| value.and_then(FieldValue::as_scalar));
    match field.field_type.scalar {
        ScalarType::Integer => Arc::new(Int64Array::from(
            scalars.map(|value| value.and_then(as_i64)).collect::<Vec<_>>(),
        )),
        ScalarType::Float => Arc::new(Float64Array::from(
            scalars.map(|value| value.and_then(Scalar::as_f64)).collect::<Vec<_>>(),
        )),
        ScalarType::String => Arc::new(StringArray::from(
            scalars.map(|value| value.map(|v| v.to_string())).collect::<Vec<_>>(),
        )),
    }
}

fn list_column<'a, B, F>(values: B, rows: impl Iterator<Item = Option<&'a [Scalar]>>, mut push: F) -> ArrayRef
where
    B: ArrayBuilder,
    F: FnMut(&mut B, &Scalar),
{
    let mut builder = ListBuilder::new(values);
    for row in rows {
        match row {
            Some(items) => {
                for item in items {
                    push(builder.values(), item);
                }
                builder.append(true);
            }
            None => builder.append(false),
        }
    }
    Arc::new(builder.finish())
}

fn as_i64(value: &Scalar) -> Option<i64> {
    match value {
        Scalar::Int(value) => Some(*value),
        _ => None,
    }
}
