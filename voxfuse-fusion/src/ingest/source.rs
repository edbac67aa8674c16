//! Frame source interface for capture ingestion

use super::raw::RawFrame;
use std::collections::VecDeque;
use voxfuse_data::StereoRig;

/// Trait for ordered sources of raw capture records
pub trait FrameSource {
    /// Number of records the source will yield, if known (0 otherwise)
    fn frames_total(&self) -> usize;

    /// Stereo calibration of the capturing rig, if any
    fn stereo_rig(&self) -> Option<StereoRig>;

    /// Get the next record from the source.
    /// Returns `None` when the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frames_total(&self) -> usize {
        (**self).frames_total()
    }

    fn stereo_rig(&self) -> Option<StereoRig> {
        (**self).stereo_rig()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        (**self).next_frame()
    }
}

/// Errors that can occur while reading a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A single record could not be read; the source can continue
    #[error("frame {index}: {message}")]
    Frame { index: usize, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source failed: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SourceError::Frame { .. })
    }
}

/// In-memory source over prepared records.
#[derive(Debug, Default)]
pub struct VecFrameSource {
    frames: VecDeque<Result<RawFrame, (usize, String)>>,
    total: usize,
    rig: Option<StereoRig>,
}

impl VecFrameSource {
    pub fn new(frames: Vec<RawFrame>) -> Self {
        let total = frames.len();
        Self {
            frames: frames.into_iter().map(Ok).collect(),
            total,
            rig: None,
        }
    }

    pub fn with_rig(mut self, rig: StereoRig) -> Self {
        self.rig = Some(rig);
        self
    }

    /// Append a record that fails to read with a recoverable error.
    pub fn push_unreadable(&mut self, index: usize, message: impl Into<String>) {
        self.frames.push_back(Err((index, message.into())));
        self.total += 1;
    }
}

impl FrameSource for VecFrameSource {
    fn frames_total(&self) -> usize {
        self.total
    }

    fn stereo_rig(&self) -> Option<StereoRig> {
        self.rig
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        match self.frames.pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err((index, message))) => Err(SourceError::Frame { index, message }),
            None => Ok(None),
        }
    }
}
