//! Voxfuse Capture - readers for extracted headset captures
//!
//! Two on-disk layouts are understood:
//!
//! - `frames.json`: a manifest of head poses and per-camera image/depth files,
//!   with optional camera metadata
//! - `hmd_poses.csv`: the older export of a pose track next to
//!   `left_camera_raw/`, `right_camera_raw/`, `left_depth/` and `right_depth/`
//!
//! Both are read into a [`Manifest`] and served through [`DatasetSource`],
//! which implements the fusion crate's `FrameSource`.
//!
//! ## Example
//!
//! ```ignore
//! use voxfuse_capture::{CameraSelection, DatasetSource};
//! use voxfuse_fusion::FrameSource;
//!
//! let mut source = DatasetSource::open(path, CameraSelection::Both)?;
//! while let Some(record) = source.next_frame()? {
//!     // normalize and integrate...
//! }
//! ```

mod dataset;
mod error;
mod layout;
mod legacy;
mod manifest;

pub use dataset::{
    CameraSelection, DEFAULT_DEPTH_SIZE, DEFAULT_IMAGE_SIZE, DEPTH_PNG_SCALE, DESCRIPTOR_MATCH_MS,
    DatasetSource,
};
pub use error::CaptureError;
pub use layout::{CaptureLayout, FRAMES_JSON};
pub use legacy::{HMD_POSES, load_legacy, read_hmd_poses};
pub use manifest::{
    CameraFiles, CameraMetadata, CameraMetadataMap, FrameCameras, HeadPose, IntrinsicsMetadata,
    Manifest, ManifestFrame, camera_extrinsic, camera_intrinsics,
};
