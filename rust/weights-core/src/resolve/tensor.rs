// rust/weights-core/src/resolve/tensor.rs

//! Rank-3 tensors and the two axis splits the resolver needs.

use crate::error::{ConvertError, Result};
use crate::store::RawTensor;

/// A tensor reshaped to exactly three dimensions `(outer, middle, inner)`.
///
/// `shape.iter().product() == data.len()` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTensor {
    pub shape: [usize; 3],
    pub data: Vec<f32>,
}

/// Reshapes `shape` to rank 3 without touching element order.
///
/// Leading dimensions are dropped while the rank exceeds 3 (each must be 1)
/// and leading 1s are inserted while it is below 3.
///
/// # Errors
///
/// Returns `Shape` if a leading dimension that must be dropped is not 1.
pub fn canonical_shape(name: &str, shape: &[usize]) -> Result<[usize; 3]> {
    let mut dims = shape.to_vec();

    while dims.len() > 3 {
        if dims[0] != 1 {
            return Err(ConvertError::shape(
                name,
                format!(
                    "cannot reduce {shape:?} to rank 3: leading dimension is {}, not 1",
                    dims[0]
                ),
            ));
        }
        dims.remove(0);
    }
    while dims.len() < 3 {
        dims.insert(0, 1);
    }

    Ok([dims[0], dims[1], dims[2]])
}

impl CanonicalTensor {
    /// Canonicalizes a raw tensor, keeping its buffer as-is.
    pub fn from_raw(raw: RawTensor) -> Result<Self> {
        let shape = canonical_shape(&raw.name, &raw.shape)?;
        Ok(Self {
            shape,
            data: raw.data,
        })
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Splits the last axis into `parts` equal, contiguous pieces.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if the last dimension is not divisible by `parts`.
    pub fn split_last_axis(&self, name: &str, parts: usize) -> Result<Vec<CanonicalTensor>> {
        let [outer, middle, inner] = self.shape;

        if parts == 0 || inner % parts != 0 {
            return Err(ConvertError::shape(
                name,
                format!(
                    "last dimension {inner} of {:?} is not divisible by {parts}",
                    self.shape
                ),
            ));
        }

        let width = inner / parts;
        let rows = outer * middle;

        let pieces = (0..parts)
            .map(|part| {
                let mut data = Vec::with_capacity(rows * width);
                for row in 0..rows {
                    let start = row * inner + part * width;
                    data.extend_from_slice(&self.data[start..start + width]);
                }
                CanonicalTensor {
                    shape: [outer, middle, width],
                    data,
                }
            })
            .collect();

        Ok(pieces)
    }

    /// Splits the middle axis into two contiguous halves. The first half
    /// holds `ceil(middle / 2)` rows, the second the rest.
    pub fn split_middle_axis(&self) -> (CanonicalTensor, CanonicalTensor) {
        let [outer, middle, inner] = self.shape;
        let head = middle.div_ceil(2);
        let tail = middle - head;

        let mut first = Vec::with_capacity(outer * head * inner);
        let mut second = Vec::with_capacity(outer * tail * inner);

        for o in 0..outer {
            let base = o * middle * inner;
            let cut = base + head * inner;
            first.extend_from_slice(&self.data[base..cut]);
            second.extend_from_slice(&self.data[cut..base + middle * inner]);
        }

        (
            CanonicalTensor {
                shape: [outer, head, inner],
                data: first,
            },
            CanonicalTensor {
                shape: [outer, tail, inner],
                data: second,
            },
        )
    }
}
