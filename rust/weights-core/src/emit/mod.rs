// rust/weights-core/src/emit/mod.rs

//! Binary weight files.
//!
//! Every output tensor becomes one `<name>.bin` file: a 12-byte shape header
//! followed by the `f32` payload. See [`format`] for the layout.

pub mod format;
mod verify;
mod writer;

pub use format::{BinHeader, BinTensor, HEADER_LEN};
pub use verify::{verify_dir, VerifyReport};
pub use writer::{BinaryEmitter, EmitStats};
