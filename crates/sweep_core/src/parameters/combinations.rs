use super::ParameterSpace;
use crate::value::Scalar;

/// Decode a row-major index into per-dimension indices (last dimension fastest).
///
/// Returns `None` when the index is outside the space or a dimension is empty.
pub fn coordinate_of(index: usize, shape: &[usize]) -> Option<Vec<usize>> {
    let mut coordinate = vec![0; shape.len()];
    let mut remainder = index;
    for (axis, &radix) in shape.iter().enumerate().rev() {
        if radix == 0 {
            return None;
        }
        coordinate[axis] = remainder % radix;
        remainder /= radix;
    }

    if remainder != 0 {
        return None;
    }
    Some(coordinate)
}

/// Number of points in a grid of the given shape, or `None` on overflow.
pub fn checked_len(shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(1usize, |total, &radix| total.checked_mul(radix))
}

/// Encode per-dimension indices into a row-major index.
pub fn index_of(coordinate: &[usize], shape: &[usize]) -> Option<usize> {
    if coordinate.len() != shape.len() {
        return None;
    }

    let mut index = 0usize;
    for (&position, &radix) in coordinate.iter().zip(shape) {
        if position >= radix {
            return None;
        }
        index = index.checked_mul(radix)?.checked_add(position)?;
    }
    Some(index)
}

impl ParameterSpace {
    /// The parameter assignment at a row-major index, in declaration order.
    pub fn assignment_at(&self, index: usize) -> Option<(Vec<usize>, Vec<(String, Scalar)>)> {
        let coordinate = coordinate_of(index, &self.cardinalities())?;
        let assignment = self
            .parameters
            .iter()
            .zip(&coordinate)
            .map(|(parameter, &position)| {
                (parameter.name.clone(), parameter.values[position].clone())
            })
            .collect();
        Some((coordinate, assignment))
    }
}
