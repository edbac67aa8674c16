//! GPU support for voxfuse.
//!
//! Provides a headless wgpu device ([`GpuContext`]), a small buffer builder and
//! the TSDF integration compute kernel ([`TsdfKernel`]). No rendering happens
//! here; the fusion crate decides whether a GPU is used at all.

pub mod builder;
pub mod context;
pub mod kernel;
pub mod types;

pub use builder::{BufferBuildError, BufferBuilder, BufferUsage};
pub use context::{GpuContext, GpuError};
pub use kernel::{KernelFrame, KernelSettings, TsdfKernel};
pub use types::{BlockEntry, GpuVoxel, IntegrateParams, pack_rgb};

// Re-export wgpu so downstream crates use the same version
pub use wgpu;
