//! Sparse TSDF volume: voxel blocks, storage backends and the integrator.

pub mod block;
pub mod capabilities;
pub mod gpu_store;
pub mod integrator;
pub mod sparse;
pub mod store;

pub use block::{FrameView, UpdateParams, Voxel, VoxelBlock, block_of, integrate_block};
pub use capabilities::Capabilities;
pub use gpu_store::GpuBlockStore;
pub use integrator::{IntegrationResult, VolumeIntegrator};
pub use sparse::Volume;
pub use store::{BlockMap, BlockStore, CpuBlockStore};
