// rust/weights-core/src/lib.rs

//! GPT-2 Weight Converter - Core Library
//!
//! This crate converts a GPT-2 checkpoint into a directory of flat binary
//! weight files, one per tensor, each holding a rank-3 shape header and an
//! `f32` payload. It provides the checkpoint reader, the name/shape resolver,
//! the binary emitter and the pipeline that drives them.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{CollisionPolicy, ConverterConfig};
pub use error::{ConvertError, Result};
pub use storage::{LocalStorage, StorageBackend, StorageReader, StorageWriter};

pub mod store;
pub use store::{Progress, RawTensor, SafetensorsStore, TensorIter, TensorStore};

pub mod resolve;
pub use resolve::{LayerKey, NameMap, OutputTensor, Resolver};

pub mod emit;
pub use emit::{verify_dir, BinHeader, BinTensor, BinaryEmitter, EmitStats, VerifyReport};

pub mod pipeline;
pub use pipeline::{ConversionReport, Converter};
