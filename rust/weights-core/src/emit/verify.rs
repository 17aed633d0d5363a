// rust/weights-core/src/emit/verify.rs

//! Consistency check over a directory of weight files.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConvertError, Result};
use crate::storage::StorageBackend;

use super::format::{BinHeader, HEADER_LEN};

/// Summary of a successful verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Output names (file stems) that passed, sorted.
    pub files: Vec<String>,
    pub payload_bytes: u64,
}

/// Checks every `<name>.bin` file in `dir`: the header must describe exactly
/// the number of payload bytes that follow it.
///
/// Hidden files, including temp files left by an interrupted run, are
/// skipped.
///
/// # Errors
///
/// Returns `TensorRead` naming the first file whose header and length
/// disagree, and `StoreOpen` if the directory is missing or unreadable.
pub fn verify_dir(storage: &dyn StorageBackend, dir: &Path) -> Result<VerifyReport> {
    if !storage.exists(dir)? {
        return Err(ConvertError::store_open(dir, "output directory does not exist"));
    }

    let mut report = VerifyReport::default();

    for entry in storage.list(dir)? {
        let Some(stem) = entry.strip_suffix(".bin") else {
            continue;
        };
        if stem.is_empty() || entry.starts_with('.') {
            continue;
        }

        let mut reader = storage.open_read(&dir.join(&entry))?;
        let size = reader.size();
        if size < HEADER_LEN as u64 {
            return Err(ConvertError::tensor_read(
                stem,
                format!("{size} bytes is shorter than the {HEADER_LEN}-byte header"),
            ));
        }

        let header = BinHeader::read_from(&mut reader)
            .map_err(|e| ConvertError::tensor_read(stem, format!("failed to read header: {e}")))?;

        let payload = size - HEADER_LEN as u64;
        if header.payload_len() != payload {
            return Err(ConvertError::tensor_read(
                stem,
                format!(
                    "header {:?} expects {} payload bytes, file has {payload}",
                    header.shape,
                    header.payload_len()
                ),
            ));
        }

        debug!(output = stem, shape = ?header.shape, "verified");
        report.payload_bytes += payload;
        report.files.push(stem.to_string());
    }

    info!(
        dir = %dir.display(),
        files = report.files.len(),
        payload_bytes = report.payload_bytes,
        "verification passed"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::format::write_tensor;
    use crate::storage::LocalStorage;
    use std::fs;
    use tempfile::TempDir;

    fn write_bin(dir: &Path, name: &str, shape: [u32; 3], values: usize) {
        let mut buf = Vec::new();
        write_tensor(&mut buf, &BinHeader { shape }, &vec![1.0; values]).unwrap();
        fs::write(dir.join(name), buf).unwrap();
    }

    #[test]
    fn test_verify_passes() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path(), 4096).unwrap();

        write_bin(temp.path(), "b.bin", [1, 2, 3], 6);
        write_bin(temp.path(), "a.bin", [1, 1, 4], 4);
        write_bin(temp.path(), ".a.bin.tmp", [1, 1, 9], 1);
        fs::write(temp.path().join("README"), "not a weight file").unwrap();

        let report = verify_dir(&storage, Path::new("")).unwrap();
        assert_eq!(report.files, vec!["a", "b"]);
        assert_eq!(report.payload_bytes, (6 + 4) * 4);
    }

    #[test]
    fn test_verify_length_mismatch() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path(), 4096).unwrap();

        write_bin(temp.path(), "ln1.scale.bin", [1, 1, 8], 7);

        match verify_dir(&storage, Path::new("")) {
            Err(ConvertError::TensorRead { name, message }) => {
                assert_eq!(name, "ln1.scale");
                assert!(message.contains("32"), "{message}");
            }
            other => panic!("expected TensorRead, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_short_file() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path(), 4096).unwrap();

        fs::write(temp.path().join("x.bin"), [0u8; 5]).unwrap();

        assert!(matches!(
            verify_dir(&storage, Path::new("")),
            Err(ConvertError::TensorRead { .. })
        ));
    }

    #[test]
    fn test_verify_empty_dir() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path(), 4096).unwrap();

        assert_eq!(verify_dir(&storage, Path::new("")).unwrap(), VerifyReport::default());
    }

    #[test]
    fn test_verify_missing_dir() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path(), 4096).unwrap();

        assert!(matches!(
            verify_dir(&storage, Path::new("absent")),
            Err(ConvertError::StoreOpen { .. })
        ));
    }
}
