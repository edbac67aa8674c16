use thiserror::Error;
use voxfuse_capture::CaptureError;
use voxfuse_data::ExportError;
use voxfuse_fusion::{ConfigError, ReconstructionError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Reconstruction failed: {0}")]
    Reconstruction(#[from] ReconstructionError),

    #[error("Reconstruction cancelled")]
    Cancelled,

    #[error("Failed to install interrupt handler: {0}")]
    Interrupt(#[from] ctrlc::Error),

    #[error("Invalid progress template: {0}")]
    ProgressStyle(#[from] indicatif::style::TemplateError),

    #[error("Failed to write report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
