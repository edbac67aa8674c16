//! Session orchestration: the controller state machine, progress reporting
//! and the background worker.

pub mod controller;
pub mod progress;
pub mod session;
pub mod sink;
pub mod worker;

pub use controller::{PipelineController, PipelineState};
pub use progress::{CancelToken, ProgressReceiver, ProgressSender, ProgressUpdate, progress_channel};
pub use session::{ReconstructionSession, SessionOutcome, SessionReport, SessionStats};
pub use sink::{CollectedFrame, CollectingSink, ColorSink, NullSink};
pub use worker::{ReconstructionWorker, WorkerHandle};
