//! Session-level errors and per-frame skip reasons.

use crate::config::ConfigError;
use crate::ingest::{NormalizeError, PoseError, SourceError};
use serde::Serialize;
use thiserror::Error;
use voxfuse_data::{CameraId, FrameError};
use voxfuse_gpu::GpuError;

/// Conditions that end a session. A single bad frame never produces one of
/// these; see [`SkipReason`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconstructionError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("missing stereo calibration: {0}")]
    MissingCalibration(String),
    #[error("malformed frame sequence: {0}")]
    MalformedSequence(String),
    #[error("compute backend failure: {0}")]
    Backend(String),
    #[error("frame source failure: {0}")]
    Source(String),
    #[error("volume contains no observed voxels")]
    EmptyVolume,
}

impl From<ConfigError> for ReconstructionError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<GpuError> for ReconstructionError {
    fn from(err: GpuError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<PoseError> for ReconstructionError {
    fn from(err: PoseError) -> Self {
        match err {
            PoseError::MissingCalibration(_) => Self::MissingCalibration(err.to_string()),
            PoseError::Malformed(reason) => Self::MalformedSequence(reason),
        }
    }
}

/// Why a single frame was not integrated.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    #[error("no depth")]
    NoDepth,
    #[error("degenerate depth")]
    Degenerate,
    #[error("sparse depth ({:.2}% valid)", .valid_fraction * 100.0)]
    Sparse { valid_fraction: f32 },
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("malformed pose: {0}")]
    MalformedPose(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("duplicate frame")]
    Duplicate,
    #[error("source error: {0}")]
    Source(String),
}

impl From<NormalizeError> for SkipReason {
    fn from(err: NormalizeError) -> Self {
        Self::UnsupportedEncoding(err.to_string())
    }
}

impl From<FrameError> for SkipReason {
    fn from(err: FrameError) -> Self {
        Self::MalformedFrame(err.to_string())
    }
}

impl From<SourceError> for SkipReason {
    fn from(err: SourceError) -> Self {
        Self::Source(err.to_string())
    }
}

/// Entry of the skipped-frame log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFrame {
    pub index: usize,
    pub timestamp_ms: Option<i64>,
    pub camera: Option<CameraId>,
    pub reason: SkipReason,
}
