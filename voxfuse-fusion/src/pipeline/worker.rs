//! Runs a controller on its own thread.

use super::controller::PipelineController;
use super::progress::{CancelToken, ProgressReceiver, progress_channel};
use super::session::SessionReport;
use crate::error::ReconstructionError;
use crate::ingest::FrameSource;
use std::thread::{self, JoinHandle};
use tracing::info;

pub struct ReconstructionWorker;

impl ReconstructionWorker {
    /// Start `controller` on a dedicated thread reading from `source`.
    pub fn spawn<S>(mut controller: PipelineController, mut source: S) -> std::io::Result<WorkerHandle>
    where
        S: FrameSource + Send + 'static,
    {
        let (sender, receiver) = progress_channel();
        controller.set_progress(sender);
        let cancel = controller.cancel_token();

        let thread = thread::Builder::new()
            .name("voxfuse-worker".to_string())
            .spawn(move || controller.run(&mut source))?;
        info!("Reconstruction worker started");

        Ok(WorkerHandle {
            progress: receiver,
            cancel,
            thread,
        })
    }
}

/// Caller side of a running worker.
pub struct WorkerHandle {
    progress: ProgressReceiver,
    cancel: CancelToken,
    thread: JoinHandle<SessionReport>,
}

impl WorkerHandle {
    /// Progress snapshots; disconnects when the worker finishes.
    pub fn progress(&self) -> &ProgressReceiver {
        &self.progress
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Ask the worker to stop at the next frame boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session report.
    pub fn join(self) -> Result<SessionReport, ReconstructionError> {
        self.thread
            .join()
            .map_err(|_| ReconstructionError::Backend("reconstruction worker panicked".to_string()))
    }
}
