//! Block store backed by the wgpu TSDF kernel.

use super::block::{FrameView, UpdateParams, Voxel, VoxelBlock};
use super::store::{BlockMap, BlockStore, VOXEL_BYTES};
use crate::error::ReconstructionError;
use glam::IVec3;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use voxfuse_gpu::{
    BlockEntry, GpuContext, GpuVoxel, KernelFrame, KernelSettings, TsdfKernel, pack_rgb,
};

/// Voxels live in device memory; host copies are made only for snapshots.
pub struct GpuBlockStore {
    ctx: Arc<GpuContext>,
    kernel: TsdfKernel,
    slots: HashMap<IVec3, u32>,
}

impl GpuBlockStore {
    pub fn new(
        ctx: Arc<GpuContext>,
        settings: KernelSettings,
    ) -> Result<Self, ReconstructionError> {
        let kernel = TsdfKernel::new(&ctx, settings)?;
        Ok(Self {
            ctx,
            kernel,
            slots: HashMap::new(),
        })
    }

    pub fn adapter_name(&self) -> &str {
        self.ctx.adapter_name()
    }
}

impl BlockStore for GpuBlockStore {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn block_resolution(&self) -> u32 {
        self.kernel.settings().block_resolution
    }

    fn block_count(&self) -> usize {
        self.slots.len()
    }

    fn contains(&self, coord: IVec3) -> bool {
        self.slots.contains_key(&coord)
    }

    fn allocate(&mut self, coords: &[IVec3]) -> Result<usize, ReconstructionError> {
        let first = self.slots.len() as u32;
        let mut next = first;
        let mut fresh = Vec::new();
        for &coord in coords {
            if !self.slots.contains_key(&coord) {
                self.slots.insert(coord, next);
                fresh.push(coord);
                next += 1;
            }
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.kernel.ensure_capacity(&self.ctx, next) {
            for coord in &fresh {
                self.slots.remove(coord);
            }
            return Err(err.into());
        }
        self.kernel.init_slots(&self.ctx, first, next - first);
        debug!("Allocated {} GPU blocks (slots {}..{})", fresh.len(), first, next);
        Ok(fresh.len())
    }

    fn integrate(
        &mut self,
        coords: &[IVec3],
        view: &FrameView<'_>,
        params: &UpdateParams,
    ) -> Result<(), ReconstructionError> {
        let blocks: Vec<BlockEntry> = coords
            .iter()
            .filter_map(|coord| {
                self.slots.get(coord).map(|&slot| BlockEntry {
                    x: coord.x,
                    y: coord.y,
                    z: coord.z,
                    slot: slot as i32,
                })
            })
            .collect();
        let colors: Vec<u32> = view.color.pixels().map(|p| pack_rgb(p.0)).collect();
        let k = view.intrinsics;
        let (width, height) = view.depth.dimensions();
        let frame = KernelFrame {
            world_to_cam: view.world_to_cam,
            intrinsics: [k.fx, k.fy, k.cx, k.cy],
            width,
            height,
            depth: view.depth.as_slice(),
            color: &colors,
        };
        self.kernel
            .integrate(&self.ctx, &frame, &blocks, params.sample_weight)?;
        Ok(())
    }

    fn snapshot(&self) -> Result<Cow<'_, BlockMap>, ReconstructionError> {
        let resolution = self.block_resolution();
        let per_block = self.kernel.voxels_per_block() as usize;
        let voxels = self.kernel.read_slots(&self.ctx, 0, self.slots.len() as u32)?;

        let mut map = BlockMap::with_capacity(self.slots.len());
        for (&coord, &slot) in &self.slots {
            let start = slot as usize * per_block;
            let Some(chunk) = voxels.get(start..start + per_block) else {
                return Err(ReconstructionError::Backend(format!(
                    "readback is missing slot {slot}"
                )));
            };
            let block_voxels = chunk.iter().map(voxel_from_gpu).collect();
            if let Some(block) = VoxelBlock::from_voxels(resolution, block_voxels) {
                map.insert(coord, block);
            }
        }
        Ok(Cow::Owned(map))
    }

    fn clear(&mut self) {
        // slots are reinitialized on reuse, so the pool itself is kept
        self.slots.clear();
    }

    fn memory_bytes(&self) -> usize {
        self.kernel.capacity() as usize * self.kernel.voxels_per_block() as usize * VOXEL_BYTES
    }
}

fn voxel_from_gpu(v: &GpuVoxel) -> Voxel {
    Voxel {
        tsdf: v.tsdf,
        weight: v.weight,
        color: [v.r, v.g, v.b],
    }
}
