// rust/weights-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {

    #[error("Cannot open checkpoint '{path}': {message}")]
    StoreOpen {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to read tensor '{name}': {message}")]
    TensorRead {
        name: String,
        message: String,
    },

    #[error("Shape error in tensor '{name}': {message}")]
    Shape {
        name: String,
        message: String,
    },

    #[error("Write error at '{path}': {message}")]
    Write {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Output name '{name}' was already written in this run")]
    Collision {
        name: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, ConvertError>;

// Convenience constructors
impl ConvertError {

    pub fn store_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreOpen {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn store_open_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StoreOpen {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn tensor_read(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TensorRead {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn shape(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shape {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn write_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Write {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn collision(name: impl Into<String>) -> Self {
        Self::Collision { name: name.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
