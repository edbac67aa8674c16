//! Voxfuse Data Crate
//!
//! Value types shared by every voxfuse crate: camera intrinsics, depth buffers,
//! normalized frames, stereo rig calibration, triangle meshes and point clouds,
//! plus plain-text PLY/OBJ writers. This crate is GPU-agnostic and performs no reconstruction work.

pub mod export;
pub mod mesh;
pub mod point_cloud;
pub mod types;

pub use export::{
    ExportError, MeshFormat, save_mesh, save_point_cloud, write_obj, write_ply, write_point_cloud_ply,
};
pub use mesh::{Mesh, MeshVertex};
pub use point_cloud::{CloudPoint, PointCloud};
pub use types::{
    CameraId, DepthBuffer, Frame, FrameError, INVALID_DEPTH, Intrinsics, StereoRig,
};

/// RGB color image type used for frame color (re-exported from `image`).
pub use image::RgbImage;
