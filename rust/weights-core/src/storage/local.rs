// rust/weights-core/src/storage/local.rs

//! Local filesystem storage backend.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::traits::{StorageBackend, StorageReader, StorageWriter};
use crate::error::{ConvertError, Result};

/// Local filesystem storage backend.
///
/// Relative paths are resolved against `base_path`; absolute paths are used
/// as-is.
pub struct LocalStorage {
    /// Base path for all storage operations.
    base_path: PathBuf,
    /// Buffer size for buffered I/O operations.
    buffer_size: usize,
}

impl LocalStorage {
    /// Creates a new `LocalStorage` rooted at `base_path`.
    ///
    /// The base directory is created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>, buffer_size: usize) -> Result<Self> {
        let base_path = base_path.into();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                ConvertError::write_with_source(&base_path, "failed to create base directory", e)
            })?;
        }

        Ok(Self {
            base_path,
            buffer_size,
        })
    }

    /// Resolves a path relative to the base path.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl StorageBackend for LocalStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve_path(path).exists())
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let full_path = self.resolve_path(path);
        let file = File::open(&full_path).map_err(|e| {
            ConvertError::store_open_with_source(&full_path, "failed to open file", e)
        })?;

        let size = file
            .metadata()
            .map_err(|e| {
                ConvertError::store_open_with_source(&full_path, "failed to read file metadata", e)
            })?
            .len();

        Ok(Box::new(LocalReader::new(file, size, self.buffer_size)))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    ConvertError::write_with_source(
                        parent,
                        "failed to create parent directories",
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full_path)
            .map_err(|e| ConvertError::write_with_source(&full_path, "failed to create file", e))?;

        Ok(Box::new(LocalWriter::new(file, full_path, self.buffer_size)))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);

        if full_path.is_dir() {
            fs::remove_dir_all(&full_path).map_err(|e| {
                ConvertError::write_with_source(&full_path, "failed to delete directory", e)
            })
        } else {
            fs::remove_file(&full_path).map_err(|e| {
                ConvertError::write_with_source(&full_path, "failed to delete file", e)
            })
        }
    }

    fn list(&self, prefix: &Path) -> Result<Vec<String>> {
        let full_path = self.resolve_path(prefix);

        if !full_path.exists() {
            return Ok(Vec::new());
        }

        if !full_path.is_dir() {
            return Err(ConvertError::store_open(&full_path, "path is not a directory"));
        }

        let mut entries = Vec::new();

        for entry in fs::read_dir(&full_path).map_err(|e| {
            ConvertError::store_open_with_source(&full_path, "failed to read directory", e)
        })? {
            let entry = entry.map_err(|e| {
                ConvertError::store_open_with_source(
                    &full_path,
                    "failed to read directory entry",
                    e,
                )
            })?;

            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }

        entries.sort();
        Ok(entries)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);

        fs::rename(&from_path, &to_path).map_err(|e| {
            ConvertError::write_with_source(
                &from_path,
                format!("failed to rename to {}", to_path.display()),
                e,
            )
        })
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::create_dir_all(&full_path).map_err(|e| {
            ConvertError::write_with_source(&full_path, "failed to create directories", e)
        })
    }
}

/// Buffered file reader for local storage.
struct LocalReader {
    reader: BufReader<File>,
    size: u64,
}

impl LocalReader {
    fn new(file: File, size: u64, buffer_size: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size, file),
            size,
        }
    }
}

impl Read for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for LocalReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }
}

/// Buffered file writer for local storage.
struct LocalWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl LocalWriter {
    fn new(file: File, path: PathBuf, buffer_size: usize) -> Self {
        Self {
            writer: BufWriter::with_capacity(buffer_size, file),
            path,
        }
    }
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageWriter for LocalWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| ConvertError::write_with_source(&self.path, "failed to flush writer", e))?;

        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| {
                ConvertError::write_with_source(&self.path, "failed to sync file to disk", e)
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path(), 4096).unwrap();
        (storage, temp_dir)
    }

    fn write_file(storage: &LocalStorage, path: &str, data: &[u8]) {
        let mut writer = storage.open_write(Path::new(path)).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_new_creates_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let new_base = temp_dir.path().join("gpt2_weights");

        let _storage = LocalStorage::new(&new_base, 4096).unwrap();
        assert!(new_base.is_dir());
    }

    #[test]
    fn test_write_and_read_back() {
        let (storage, _temp) = create_test_storage();

        write_file(&storage, "ln_final.bias.bin", b"hello world");

        let mut reader = storage.open_read(Path::new("ln_final.bias.bin")).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();

        assert_eq!(buf, b"hello world");
        assert_eq!(reader.size(), 11);
    }

    #[test]
    fn test_open_read_missing_is_store_open_error() {
        let (storage, _temp) = create_test_storage();

        let result = storage.open_read(Path::new("nope.bin"));
        assert!(matches!(result, Err(ConvertError::StoreOpen { .. })));
    }

    #[test]
    fn test_overwrite_file() {
        let (storage, _temp) = create_test_storage();

        write_file(&storage, "file.bin", b"initial");
        write_file(&storage, "file.bin", b"new");

        let mut reader = storage.open_read(Path::new("file.bin")).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"new");
    }

    #[test]
    fn test_rename_replaces_destination() {
        let (storage, _temp) = create_test_storage();

        write_file(&storage, ".x.bin.tmp", b"fresh");
        write_file(&storage, "x.bin", b"stale");

        storage
            .rename(Path::new(".x.bin.tmp"), Path::new("x.bin"))
            .unwrap();

        assert!(!storage.exists(Path::new(".x.bin.tmp")).unwrap());
        let mut buf = Vec::new();
        storage
            .open_read(Path::new("x.bin"))
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"fresh");
    }

    #[test]
    fn test_rename_not_found() {
        let (storage, _temp) = create_test_storage();

        let result = storage.rename(Path::new("nonexistent.bin"), Path::new("new.bin"));
        assert!(matches!(result, Err(ConvertError::Write { .. })));
    }

    #[test]
    fn test_list_sorted_and_missing() {
        let (storage, _temp) = create_test_storage();

        for name in &["c.bin", "a.bin", "b.bin"] {
            write_file(&storage, &format!("dir/{name}"), b"data");
        }

        assert_eq!(
            storage.list(Path::new("dir")).unwrap(),
            vec!["a.bin", "b.bin", "c.bin"]
        );
        assert!(storage.list(Path::new("nonexistent")).unwrap().is_empty());
    }

    #[test]
    fn test_list_file_not_dir() {
        let (storage, _temp) = create_test_storage();

        write_file(&storage, "file.bin", b"data");
        assert!(storage.list(Path::new("file.bin")).is_err());
    }

    #[test]
    fn test_create_dir_all_idempotent() {
        let (storage, _temp) = create_test_storage();

        storage.create_dir_all(Path::new("out/nested")).unwrap();
        storage.create_dir_all(Path::new("out/nested")).unwrap();
        assert!(storage.exists(Path::new("out/nested")).unwrap());
    }

    #[test]
    fn test_delete_file() {
        let (storage, _temp) = create_test_storage();

        write_file(&storage, "gone.bin", b"x");
        storage.delete(Path::new("gone.bin")).unwrap();
        assert!(!storage.exists(Path::new("gone.bin")).unwrap());
        assert!(storage.delete(Path::new("gone.bin")).is_err());
    }

    #[test]
    fn test_object_safety() {
        let (storage, _temp) = create_test_storage();
        let backend: Box<dyn StorageBackend> = Box::new(storage);

        let mut writer = backend.open_write(Path::new("test.bin")).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();

        assert!(backend.exists(Path::new("test.bin")).unwrap());
    }
}
