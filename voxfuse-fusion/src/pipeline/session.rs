//! Per-run state: the volume, running statistics and the skipped-frame log.

use super::progress::{CancelToken, ProgressUpdate};
use crate::error::{ReconstructionError, SkippedFrame};
use crate::volume::Volume;
use serde::Serialize;
use voxfuse_data::{Mesh, PointCloud};

/// Running counters of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Records the source announced (0 if unknown)
    pub frames_total: usize,
    /// Records consumed so far, including skipped and interval-dropped ones
    pub frames_done: usize,
    pub frames_integrated: usize,
    pub frames_skipped: usize,
    pub blocks_allocated: usize,
    pub memory_bytes: usize,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(Mesh),
    Cancelled,
    Failed(ReconstructionError),
}

impl SessionOutcome {
    pub fn mesh(&self) -> Option<&Mesh> {
        match self {
            SessionOutcome::Completed(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ReconstructionError> {
        match self {
            SessionOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Everything a finished session hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub stats: SessionStats,
    pub skipped: Vec<SkippedFrame>,
    /// Surface samples, present when requested and the session completed
    pub point_cloud: Option<PointCloud>,
}

impl SessionReport {
    pub fn failed(err: ReconstructionError, stats: SessionStats) -> Self {
        Self {
            outcome: SessionOutcome::Failed(err),
            stats,
            skipped: Vec::new(),
            point_cloud: None,
        }
    }

    pub fn into_mesh(self) -> Option<Mesh> {
        match self.outcome {
            SessionOutcome::Completed(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// A reconstruction in progress. Owns the volume for its whole lifetime.
pub struct ReconstructionSession {
    pub volume: Volume,
    pub stats: SessionStats,
    pub skipped: Vec<SkippedFrame>,
    pub cancel: CancelToken,
}

impl ReconstructionSession {
    pub fn new(volume: Volume, frames_total: usize, cancel: CancelToken) -> Self {
        Self {
            volume,
            stats: SessionStats {
                frames_total,
                ..Default::default()
            },
            skipped: Vec::new(),
            cancel,
        }
    }

    pub fn record_skip(&mut self, skipped: SkippedFrame) {
        self.stats.frames_skipped += 1;
        self.skipped.push(skipped);
    }

    /// Refresh the volume-derived counters.
    pub fn refresh_volume_stats(&mut self) {
        self.stats.blocks_allocated = self.volume.block_count();
        self.stats.memory_bytes = self.volume.memory_bytes();
    }

    pub fn progress(&self, cancelled: bool) -> ProgressUpdate {
        ProgressUpdate {
            frames_done: self.stats.frames_done,
            frames_total: self.stats.frames_total,
            frames_skipped: self.stats.frames_skipped,
            blocks_allocated: self.stats.blocks_allocated,
            memory_bytes: self.stats.memory_bytes,
            cancelled,
        }
    }

    pub fn finish(self, outcome: SessionOutcome) -> SessionReport {
        SessionReport {
            outcome,
            stats: self.stats,
            skipped: self.skipped,
            point_cloud: None,
        }
    }
}
