// rust/weights-core/src/store/mod.rs

//! Source checkpoint access.
//!
//! A checkpoint is anything implementing [`TensorStore`]: a list of keys and
//! a way to fetch one key as an `f32` row-major buffer. Tensors are pulled
//! one at a time through [`TensorIter`], so the whole checkpoint is never
//! decoded at once.

mod safetensors_file;

pub use safetensors_file::SafetensorsStore;

use tracing::debug;

use crate::error::{ConvertError, Result};

/// A tensor exactly as stored in the checkpoint, decoded to `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl RawTensor {
    /// Builds a tensor, checking that `shape` describes exactly `data.len()`
    /// elements.
    ///
    /// # Errors
    ///
    /// Returns `TensorRead` if the declared shape and buffer length disagree.
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        let expected: usize = shape.iter().product();

        if expected != data.len() {
            return Err(ConvertError::tensor_read(
                name,
                format!(
                    "declared shape {shape:?} holds {expected} elements, buffer has {}",
                    data.len()
                ),
            ));
        }

        Ok(Self { name, shape, data })
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

/// A keyed collection of named tensors.
pub trait TensorStore {
    /// All tensor keys, in the store's enumeration order.
    fn keys(&self) -> Vec<String>;

    /// Fetches and decodes one tensor.
    ///
    /// # Errors
    ///
    /// Returns `TensorRead` if the key is unknown, its dtype cannot be cast
    /// to `f32`, or its declared shape does not match its buffer.
    fn get(&self, key: &str) -> Result<RawTensor>;

    /// Number of tensors in the store.
    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily iterates every tensor in the store.
    fn iter(&self) -> TensorIter<'_>
    where
        Self: Sized,
    {
        TensorIter::new(self)
    }
}

/// Iterator over the tensors of a store, decoding one key per step.
pub struct TensorIter<'a> {
    store: &'a dyn TensorStore,
    keys: std::vec::IntoIter<String>,
}

impl<'a> TensorIter<'a> {
    pub fn new(store: &'a dyn TensorStore) -> Self {
        Self {
            keys: store.keys().into_iter(),
            store,
        }
    }
}

impl Iterator for TensorIter<'_> {
    type Item = Result<RawTensor>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some(self.store.get(&key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl ExactSizeIterator for TensorIter<'_> {}

/// Wraps an iterator and tracks how far through an estimated total it is.
pub struct Progress<I> {
    inner: I,
    position: usize,
    total: usize,
}

impl<I: Iterator> Progress<I> {
    /// Wraps `inner`, taking the estimated total from its size hint.
    pub fn new(inner: I) -> Self {
        let (lower, upper) = inner.size_hint();
        Self {
            total: upper.unwrap_or(lower),
            inner,
            position: 0,
        }
    }

    /// Items yielded so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Estimated number of items overall.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl<I: Iterator> Iterator for Progress<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        self.position += 1;
        // Stores without an exact size hint may undercount.
        self.total = self.total.max(self.position);
        debug!(position = self.position, total = self.total, "read tensor");
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixture helpers shared by the store, emitter and pipeline tests.

    use std::collections::BTreeMap;
    use std::path::Path;

    use safetensors::tensor::TensorView;
    use safetensors::Dtype;

    use super::{RawTensor, TensorStore};
    use crate::error::{ConvertError, Result};

    /// Writes an `F32` safetensors file with the given tensors.
    pub fn write_safetensors(path: &Path, tensors: &[(&str, Vec<usize>, Vec<f32>)]) {
        let encoded: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
            .iter()
            .map(|(name, shape, data)| {
                let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
                (name.to_string(), shape.clone(), bytes)
            })
            .collect();

        let views: Vec<(String, TensorView<'_>)> = encoded
            .iter()
            .map(|(name, shape, bytes)| {
                let view = TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap();
                (name.clone(), view)
            })
            .collect();

        safetensors::serialize_to_file(views, &None, path).unwrap();
    }

    /// Counting sequence `0.0, 1.0, 2.0, ...` of length `n`.
    pub fn iota(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    /// In-memory store used where a file on disk adds nothing.
    #[derive(Default)]
    pub struct MemoryStore {
        pub tensors: BTreeMap<String, (Vec<usize>, Vec<f32>)>,
    }

    impl MemoryStore {
        pub fn with(mut self, name: &str, shape: Vec<usize>, data: Vec<f32>) -> Self {
            self.tensors.insert(name.to_string(), (shape, data));
            self
        }
    }

    impl TensorStore for MemoryStore {
        fn keys(&self) -> Vec<String> {
            self.tensors.keys().cloned().collect()
        }

        fn get(&self, key: &str) -> Result<RawTensor> {
            let (shape, data) = self
                .tensors
                .get(key)
                .ok_or_else(|| ConvertError::tensor_read(key, "no such tensor"))?;
            RawTensor::new(key, shape.clone(), data.clone())
        }
    }
}
