// rust/weights-core/src/pipeline.rs

//! Conversion orchestration.
//!
//! The `Converter` ties the three stages together: it pulls tensors from a
//! [`TensorStore`], resolves each one, and emits the results before moving
//! on to the next tensor. Output is staged and only lands in the output
//! directory once every tensor has been converted.
//!
//! # Example
//!
//! ```no_run
//! use weights_core::{Converter, ConverterConfig};
//!
//! let mut config = ConverterConfig::default();
//! config.output.dir = "./gpt2_weights".into();
//!
//! let converter = Converter::from_config(config).unwrap();
//! let report = converter.convert_file("model.safetensors").unwrap();
//! println!("wrote {} files", report.files_written);
//!
//! converter.verify().unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::ConverterConfig;
use crate::emit::{verify_dir, BinaryEmitter, VerifyReport};
use crate::error::Result;
use crate::resolve::Resolver;
use crate::storage::{LocalStorage, StorageBackend};
use crate::store::{Progress, SafetensorsStore, TensorIter, TensorStore};

/// Totals for one conversion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub tensors_read: usize,
    /// Tensors that produced no output, such as attention masks.
    pub tensors_dropped: usize,
    pub files_written: usize,
    pub bytes_written: u64,
    /// Files from an earlier run that were replaced.
    pub overwritten: usize,
}

/// Converts checkpoints into a directory of weight files.
pub struct Converter {
    config: ConverterConfig,
    storage: Arc<dyn StorageBackend>,
    resolver: Resolver,
}

impl Converter {
    /// Creates a converter from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn from_config(config: ConverterConfig) -> Result<Self> {
        config.validate()?;

        // Output paths are relative to the working directory unless absolute.
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalStorage::new(".", config.storage.buffer_size)?);
        let resolver = Resolver::new(&config.naming);

        Ok(Self {
            config,
            storage,
            resolver,
        })
    }

    /// Opens a safetensors checkpoint using the configured read mode.
    pub fn open_store(&self, path: impl AsRef<Path>) -> Result<SafetensorsStore> {
        SafetensorsStore::open(path, self.config.storage.use_mmap)
    }

    /// Opens `checkpoint` and converts every tensor in it.
    pub fn convert_file(&self, checkpoint: impl AsRef<Path>) -> Result<ConversionReport> {
        let store = self.open_store(checkpoint)?;
        self.convert(&store)
    }

    /// Converts every tensor in `store`.
    ///
    /// # Errors
    ///
    /// Stops at the first failing tensor. Nothing from a failed run reaches
    /// the output directory, and files from earlier runs are left as they
    /// were.
    pub fn convert(&self, store: &dyn TensorStore) -> Result<ConversionReport> {
        self.convert_with_progress(store, |_, _| {})
    }

    /// Like [`convert`](Self::convert), calling `on_tensor(position, total)`
    /// after each source tensor has been written.
    pub fn convert_with_progress(
        &self,
        store: &dyn TensorStore,
        mut on_tensor: impl FnMut(usize, usize),
    ) -> Result<ConversionReport> {
        let mut emitter = BinaryEmitter::new(self.storage.clone(), self.config.output.clone())?;

        let result = self
            .emit_all(store, &mut emitter, &mut on_tensor)
            .and_then(|report| emitter.commit().map(|_| report));

        if result.is_err() {
            emitter.abort();
        }
        result
    }

    fn emit_all(
        &self,
        store: &dyn TensorStore,
        emitter: &mut BinaryEmitter,
        on_tensor: &mut impl FnMut(usize, usize),
    ) -> Result<ConversionReport> {
        let mut tensors = Progress::new(TensorIter::new(store));
        let mut report = ConversionReport::default();

        info!(
            tensors = tensors.total(),
            output_dir = %self.config.output.dir.display(),
            "starting conversion"
        );

        while let Some(raw) = tensors.next() {
            let outputs = self.resolver.resolve(raw?)?;

            report.tensors_read += 1;
            if outputs.is_empty() {
                report.tensors_dropped += 1;
            }

            for output in &outputs {
                emitter.emit(output)?;
            }

            on_tensor(tensors.position(), tensors.total());
        }

        let stats = emitter.stats();
        report.files_written = stats.files_written;
        report.bytes_written = stats.bytes_written;
        report.overwritten = stats.overwritten;

        info!(
            tensors_read = report.tensors_read,
            tensors_dropped = report.tensors_dropped,
            files_written = report.files_written,
            bytes_written = report.bytes_written,
            "conversion finished"
        );

        Ok(report)
    }

    /// Checks every weight file in the output directory.
    pub fn verify(&self) -> Result<VerifyReport> {
        verify_dir(self.storage.as_ref(), &self.config.output.dir)
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }
}
