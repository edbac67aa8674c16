//! The sparse TSDF volume owned by a reconstruction session.

use super::block::{FrameView, UpdateParams};
use super::capabilities::Capabilities;
use super::gpu_store::GpuBlockStore;
use super::store::{BlockMap, BlockStore, CpuBlockStore};
use crate::config::ReconstructionConfig;
use crate::error::ReconstructionError;
use glam::{IVec3, Vec3};
use std::borrow::Cow;
use tracing::{info, warn};
use voxfuse_gpu::KernelSettings;

/// Block-sparse voxel grid. Blocks are created on first touch.
pub struct Volume {
    store: Box<dyn BlockStore>,
    voxel_size: f32,
}

impl Volume {
    /// Pick the backend from `config.use_gpu` and the detected capabilities.
    pub fn new(config: &ReconstructionConfig, capabilities: &Capabilities) -> Self {
        if config.use_gpu {
            if let Some(ctx) = capabilities.gpu() {
                let settings = KernelSettings {
                    block_resolution: config.block_resolution,
                    voxel_size: config.voxel_size,
                    truncation: config.truncation_distance,
                    max_weight: config.max_weight,
                    depth_max: config.depth_max,
                };
                match GpuBlockStore::new(ctx.clone(), settings) {
                    Ok(store) => {
                        info!("Using GPU block store on {}", store.adapter_name());
                        return Self::with_store(Box::new(store), config.voxel_size);
                    }
                    Err(err) => warn!("GPU block store unavailable ({}); using CPU", err),
                }
            } else {
                warn!("GPU integration requested without a GPU; using CPU");
            }
        }
        Self::cpu(config)
    }

    pub fn cpu(config: &ReconstructionConfig) -> Self {
        Self::with_store(
            Box::new(CpuBlockStore::new(config.block_resolution)),
            config.voxel_size,
        )
    }

    pub fn with_store(store: Box<dyn BlockStore>, voxel_size: f32) -> Self {
        Self { store, voxel_size }
    }

    /// Name of the active backend ("cpu" or "gpu").
    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn block_resolution(&self) -> u32 {
        self.store.block_resolution()
    }

    /// Edge length of one block in meters.
    pub fn block_size(&self) -> f32 {
        self.voxel_size * self.block_resolution() as f32
    }

    pub fn block_count(&self) -> usize {
        self.store.block_count()
    }

    pub fn memory_bytes(&self) -> usize {
        self.store.memory_bytes()
    }

    pub fn contains_block(&self, coord: IVec3) -> bool {
        self.store.contains(coord)
    }

    /// Block containing world point `p`.
    pub fn block_coord(&self, p: Vec3) -> IVec3 {
        (p / self.block_size()).floor().as_ivec3()
    }

    pub(crate) fn allocate(&mut self, coords: &[IVec3]) -> Result<usize, ReconstructionError> {
        self.store.allocate(coords)
    }

    pub(crate) fn integrate_blocks(
        &mut self,
        coords: &[IVec3],
        view: &FrameView<'_>,
        params: &UpdateParams,
    ) -> Result<(), ReconstructionError> {
        self.store.integrate(coords, view, params)
    }

    /// All blocks with their current voxels.
    pub fn snapshot(&self) -> Result<Cow<'_, BlockMap>, ReconstructionError> {
        self.store.snapshot()
    }

    /// Drop every block.
    pub fn clear(&mut self) {
        self.store.clear();
    }
}
