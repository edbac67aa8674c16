//! Color-only fallback for frames whose depth was rejected.

use crate::ingest::DepthClass;
use glam::Mat4;
use std::sync::{Arc, Mutex, PoisonError};
use voxfuse_data::{CameraId, Frame};

/// Receives frames that were not integrated because of their depth, so their
/// color can still be used (texturing, previews).
pub trait ColorSink: Send {
    fn color_only(&mut self, frame: &Frame, class: Option<DepthClass>);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ColorSink for NullSink {
    fn color_only(&mut self, _frame: &Frame, _class: Option<DepthClass>) {}
}

/// What a [`CollectingSink`] remembers about each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectedFrame {
    pub index: usize,
    pub camera: CameraId,
    pub pose: Mat4,
    pub class: Option<DepthClass>,
}

/// Sink that records the frames it received. Clones share the same log, so a
/// caller can keep one clone and hand the other to the controller.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    frames: Arc<Mutex<Vec<CollectedFrame>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the frames received so far, in arrival order.
    pub fn frames(&self) -> Vec<CollectedFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ColorSink for CollectingSink {
    fn color_only(&mut self, frame: &Frame, class: Option<DepthClass>) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CollectedFrame {
                index: frame.index(),
                camera: frame.camera(),
                pose: frame.pose(),
                class,
            });
    }
}
