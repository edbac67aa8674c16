//! Voxfuse fusion crate
//!
//! Turns a stream of posed RGB-D frames into a colored triangle mesh by
//! integrating them into a sparse TSDF volume.
//!
//! ## Modules
//!
//! - [`ingest`]: raw frame records, image normalization, depth validation and pose resolution
//! - [`volume`]: voxel blocks, CPU/GPU block stores and the frame integrator
//! - [`mesh`]: surface extraction and post-processing
//! - [`pipeline`]: the session controller, progress reporting and background worker
//! - [`config`]: reconstruction settings

pub mod config;
pub mod error;
pub mod ingest;
pub mod mesh;
pub mod pipeline;
pub mod volume;

pub use config::{ConfigError, ReconstructionConfig};
pub use error::{ReconstructionError, SkipReason, SkippedFrame};
pub use ingest::{FrameSource, RawFrame, SourceError};
pub use mesh::{MeshExtractor, PostProcess};
pub use pipeline::{
    CancelToken, PipelineController, PipelineState, ProgressUpdate, ReconstructionWorker,
    SessionOutcome, SessionReport, SessionStats, WorkerHandle,
};
pub use volume::{Capabilities, Volume, VolumeIntegrator};
