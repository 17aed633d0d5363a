// rust/weights-core/src/storage/mod.rs

//! Storage abstraction for emitted weight files.
//!
//! # Example
//!
//! ```no_run
//! use weights_core::storage::{LocalStorage, StorageBackend};
//! use std::io::Write;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new("./weights", 64 * 1024).unwrap();
//!
//! let mut writer = storage.open_write(Path::new("ln_final.bias.bin")).unwrap();
//! writer.write_all(&[0u8; 12]).unwrap();
//! writer.finish().unwrap();
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{StorageBackend, StorageReader, StorageWriter};
