//! Progress snapshots and cooperative cancellation shared with the caller.

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop flag, checked by the controller between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Immutable snapshot sent after every processed record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub frames_done: usize,
    pub frames_total: usize,
    pub frames_skipped: usize,
    pub blocks_allocated: usize,
    pub memory_bytes: usize,
    pub cancelled: bool,
}

impl ProgressUpdate {
    /// Completed share of the source in `0..=1`, if the total is known.
    pub fn fraction(&self) -> Option<f32> {
        (self.frames_total > 0)
            .then(|| (self.frames_done as f32 / self.frames_total as f32).min(1.0))
    }
}

pub type ProgressSender = Sender<ProgressUpdate>;
pub type ProgressReceiver = Receiver<ProgressUpdate>;

/// Single-producer, single-consumer channel for progress snapshots.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    unbounded()
}
