// rust/weights-core/src/store/safetensors_file.rs

//! `.safetensors` checkpoint reader.
//!
//! The header is parsed once at open time; tensor payloads are sliced out of
//! the memory-mapped (or fully read) file on demand and decoded to `f32`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use safetensors::tensor::TensorInfo;
use safetensors::{Dtype, SafeTensors};
use tracing::info;

use super::{RawTensor, TensorStore};
use crate::error::{ConvertError, Result};

/// Backing bytes of an opened checkpoint.
enum Source {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl Deref for Source {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Source::Mapped(mmap) => mmap,
            Source::Buffered(buf) => buf,
        }
    }
}

/// A safetensors checkpoint opened for reading.
///
/// Keys enumerate in lexicographic order.
pub struct SafetensorsStore {
    source: Source,
    /// Byte offset of the data section (8-byte length prefix + JSON header).
    data_start: usize,
    tensors: BTreeMap<String, TensorInfo>,
}

impl SafetensorsStore {
    /// Opens a checkpoint, memory-mapping it when `use_mmap` is set.
    ///
    /// # Errors
    ///
    /// Returns `StoreOpen` if the file is missing, unreadable, or does not
    /// carry a valid safetensors header.
    pub fn open(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();

        let source = if use_mmap {
            let file = File::open(path).map_err(|e| {
                ConvertError::store_open_with_source(path, "failed to open checkpoint", e)
            })?;
            // SAFETY: The file is opened read-only and the map lives as long
            // as the store. Concurrent truncation by another process is not
            // guarded against.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                ConvertError::store_open_with_source(path, "failed to memory-map checkpoint", e)
            })?;
            Source::Mapped(mmap)
        } else {
            let buf = fs::read(path).map_err(|e| {
                ConvertError::store_open_with_source(path, "failed to read checkpoint", e)
            })?;
            Source::Buffered(buf)
        };

        let (header_len, metadata) = SafeTensors::read_metadata(&source).map_err(|e| {
            ConvertError::store_open(path, format!("invalid safetensors header: {e:?}"))
        })?;

        let tensors: BTreeMap<String, TensorInfo> = metadata
            .tensors()
            .into_iter()
            .map(|(name, info)| (name, info.clone()))
            .collect();

        info!(
            path = %path.display(),
            tensors = tensors.len(),
            bytes = source.len(),
            mmap = use_mmap,
            "opened checkpoint"
        );

        Ok(Self {
            source,
            data_start: 8 + header_len,
            tensors,
        })
    }
}

impl TensorStore for SafetensorsStore {
    fn keys(&self) -> Vec<String> {
        self.tensors.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.tensors.len()
    }

    fn get(&self, key: &str) -> Result<RawTensor> {
        let info = self
            .tensors
            .get(key)
            .ok_or_else(|| ConvertError::tensor_read(key, "no such tensor in checkpoint"))?;

        let (begin, end) = info.data_offsets;
        let start = self.data_start + begin;
        let stop = self.data_start + end;

        let bytes = self.source.get(start..stop).ok_or_else(|| {
            ConvertError::tensor_read(
                key,
                format!(
                    "data range {start}..{stop} exceeds checkpoint size {}",
                    self.source.len()
                ),
            )
        })?;

        let numel: usize = info.shape.iter().product();
        if bytes.len() != numel * info.dtype.size() {
            return Err(ConvertError::tensor_read(
                key,
                format!(
                    "declared shape {:?} ({:?}) needs {} bytes, buffer has {}",
                    info.shape,
                    info.dtype,
                    numel * info.dtype.size(),
                    bytes.len()
                ),
            ));
        }

        let data = decode_f32(key, info.dtype, bytes)?;
        RawTensor::new(key, info.shape.clone(), data)
    }
}

/// Decodes a little-endian buffer to `f32`. This is the only dtype cast in
/// the pipeline.
fn decode_f32(name: &str, dtype: Dtype, bytes: &[u8]) -> Result<Vec<f32>> {
    let data = match dtype {
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => bytes
            .chunks_exact(2)
            .map(|c| half::bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::F64 => bytes
            .chunks_exact(8)
            .map(|c| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(c);
                f64::from_le_bytes(raw) as f32
            })
            .collect(),
        other => {
            return Err(ConvertError::tensor_read(
                name,
                format!("unsupported dtype {other:?}, expected a float type"),
            ));
        }
    };

    Ok(data)
}
