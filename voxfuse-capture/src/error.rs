use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while opening or reading a capture dataset.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No capture layout found in {0}")]
    UnknownLayout(PathBuf),

    #[error("Missing file: {0}")]
    MissingFile(PathBuf),

    #[error("{path}:{line}: {message}")]
    Csv {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Unsupported image: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
