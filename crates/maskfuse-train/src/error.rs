use std::path::PathBuf;

use maskfuse_types::FuseError;
use thiserror::Error;

pub type TrainResult<T> = Result<T, TrainError>;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Data(#[from] FuseError),

    #[error("model must be compiled before {operation}")]
    NotCompiled { operation: &'static str },

    #[error("need at least one full batch: {data_size} samples < batch size {batch_size}")]
    InsufficientData { data_size: usize, batch_size: usize },

    #[error("tensor shape mismatch: {message}")]
    Shape { message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image encoding error on {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl TrainError {
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
