use crate::error::{Result, StudyError};
use crate::value::{Scalar, ScalarType};

/// Infer the type of a literal value list: integers if every value is an
/// integer, floats if numbers are mixed, strings otherwise.
pub(super) fn infer_values(name: &str, raw: &[Scalar]) -> Result<(ScalarType, Vec<Scalar>)> {
    if raw.is_empty() {
        return Err(StudyError::config(format!(
            "parameter '{name}' must be a non-empty list"
        )));
    }

    let has_string = raw.iter().any(|value| matches!(value, Scalar::Str(_)));
    let has_float = raw.iter().any(|value| matches!(value, Scalar::Float(_)));

    if has_string {
        let values = raw
            .iter()
            .map(|value| Scalar::Str(value.to_string()))
            .collect();
        return Ok((ScalarType::String, values));
    }

    if has_float {
        let values = raw
            .iter()
            .map(|value| Scalar::Float(value.as_f64().unwrap_or_default()))
            .collect();
        return Ok((ScalarType::Float, values));
    }

    Ok((ScalarType::Integer, raw.to_vec()))
}
