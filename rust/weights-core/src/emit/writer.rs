// rust/weights-core/src/emit/writer.rs

//! Weight file writer.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{CollisionPolicy, OutputConfig};
use crate::error::{ConvertError, Result};
use crate::resolve::OutputTensor;
use crate::storage::StorageBackend;

use super::format::{self, BinHeader, HEADER_LEN};

/// Hidden directory inside the output directory that holds a run's files
/// until the run is committed.
pub(crate) const STAGING_DIR: &str = ".staging";

/// Counters collected while emitting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub files_written: usize,
    pub bytes_written: u64,
    /// Files that already existed on disk and were replaced.
    pub overwritten: usize,
}

/// Writes each [`OutputTensor`] to `<dir>/<name>.bin`.
///
/// The `BinaryEmitter` handles:
/// - Creating the output directory (idempotent)
/// - Staging a run's files so a failed run leaves the output directory as it was
/// - Atomic writes (write to a hidden temp file, sync, then rename)
/// - Tracking names written in this run to catch collisions
///
/// Files only appear in the output directory after [`commit`](Self::commit).
pub struct BinaryEmitter {
    storage: Arc<dyn StorageBackend>,
    config: OutputConfig,
    staging: PathBuf,
    written: BTreeSet<String>,
    stats: EmitStats,
}

impl BinaryEmitter {
    /// Creates an emitter, making sure the output directory exists and
    /// starting from an empty staging area.
    pub fn new(storage: Arc<dyn StorageBackend>, config: OutputConfig) -> Result<Self> {
        let staging = config.dir.join(STAGING_DIR);

        storage.create_dir_all(&config.dir)?;
        if storage.exists(&staging)? {
            debug!(path = %staging.display(), "removing staging area of an interrupted run");
            storage.delete(&staging)?;
        }
        storage.create_dir_all(&staging)?;

        Ok(Self {
            storage,
            config,
            staging,
            written: BTreeSet::new(),
            stats: EmitStats::default(),
        })
    }

    pub fn stats(&self) -> EmitStats {
        self.stats
    }

    /// Names written so far in this run.
    pub fn written(&self) -> &BTreeSet<String> {
        &self.written
    }

    /// Stages one tensor and returns the path its file will have once the
    /// run is committed.
    ///
    /// # Errors
    ///
    /// Returns `Collision` if the name was already written in this run and
    /// the policy is `error`, and `Write` on invalid names or any
    /// filesystem failure.
    pub fn emit(&mut self, tensor: &OutputTensor) -> Result<PathBuf> {
        let filename = format!("{}.bin", tensor.name);
        let final_path = self.config.dir.join(&filename);
        let staged_path = self.staging.join(&filename);

        validate_name(&tensor.name, &final_path)?;

        let header = BinHeader::from_shape(tensor.shape).ok_or_else(|| {
            ConvertError::write(
                &final_path,
                format!("shape {:?} does not fit a u32 header", tensor.shape),
            )
        })?;

        if !self.written.insert(tensor.name.clone()) {
            match self.config.on_collision {
                CollisionPolicy::Error => return Err(ConvertError::collision(&tensor.name)),
                CollisionPolicy::Warn => warn!(
                    output = %tensor.name,
                    "output name written twice in this run, last write wins"
                ),
            }
        } else if self.storage.exists(&final_path)? {
            warn!(
                path = %final_path.display(),
                "overwriting existing file, possible naming collision"
            );
            self.stats.overwritten += 1;
        }

        if self.config.atomic_writes {
            let temp_path = self.staging.join(format!(".{filename}.tmp"));

            if let Err(e) = self.write_to_path(&temp_path, &header, &tensor.data) {
                // The temp file may be partially written; the original error matters more.
                let _ = self.storage.delete(&temp_path);
                return Err(e);
            }
            self.storage.rename(&temp_path, &staged_path)?;
        } else {
            self.write_to_path(&staged_path, &header, &tensor.data)?;
        }

        let bytes = HEADER_LEN as u64 + header.payload_len();
        self.stats.files_written += 1;
        self.stats.bytes_written += bytes;

        debug!(
            output = %tensor.name,
            shape = ?tensor.shape,
            bytes,
            "staged tensor"
        );

        Ok(final_path)
    }

    /// Moves every staged file into the output directory and removes the
    /// staging area.
    pub fn commit(&mut self) -> Result<EmitStats> {
        for name in &self.written {
            let filename = format!("{name}.bin");
            self.storage
                .rename(&self.staging.join(&filename), &self.config.dir.join(&filename))?;
        }
        self.storage.delete(&self.staging)?;

        info!(
            dir = %self.config.dir.display(),
            files = self.written.len(),
            "committed output"
        );

        Ok(self.stats)
    }

    /// Discards everything staged in this run. Files already in the output
    /// directory are left untouched.
    pub fn abort(&mut self) {
        match self.storage.exists(&self.staging) {
            Ok(false) => {}
            Ok(true) => {
                if let Err(e) = self.storage.delete(&self.staging) {
                    warn!(error = %e, "failed to remove staging area");
                }
            }
            Err(e) => warn!(error = %e, "failed to check staging area"),
        }

        debug!(discarded = self.written.len(), "discarded staged output");
    }

    fn write_to_path(&self, path: &Path, header: &BinHeader, data: &[f32]) -> Result<()> {
        let mut writer = self.storage.open_write(path)?;
        format::write_tensor(&mut writer, header, data)
            .map_err(|e| ConvertError::write_with_source(path, "failed to write tensor data", e))?;
        writer.finish()
    }
}

/// Output names become file names; keep them inside the output directory.
fn validate_name(name: &str, path: &Path) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(ConvertError::write(
            path,
            format!("'{name}' is not a valid output file name"),
        ));
    }
    Ok(())
}
