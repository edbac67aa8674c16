//! Sparse block storage behind the [`BlockStore`] trait.

use super::block::{FrameView, UpdateParams, VoxelBlock, integrate_block};
use crate::error::ReconstructionError;
use glam::IVec3;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

/// Allocated blocks keyed by block coordinate.
pub type BlockMap = HashMap<IVec3, VoxelBlock>;

/// Storage and update backend for a sparse voxel volume.
///
/// Implementations run the same arithmetic as [`integrate_block`].
pub trait BlockStore: Send {
    fn name(&self) -> &'static str;

    fn block_resolution(&self) -> u32;

    fn block_count(&self) -> usize;

    fn contains(&self, coord: IVec3) -> bool;

    /// Allocate every missing block in `coords`. Returns how many were new.
    fn allocate(&mut self, coords: &[IVec3]) -> Result<usize, ReconstructionError>;

    /// Integrate one frame into the listed, already allocated blocks.
    fn integrate(
        &mut self,
        coords: &[IVec3],
        view: &FrameView<'_>,
        params: &UpdateParams,
    ) -> Result<(), ReconstructionError>;

    /// Current contents of all blocks.
    fn snapshot(&self) -> Result<Cow<'_, BlockMap>, ReconstructionError>;

    /// Drop every block.
    fn clear(&mut self);

    /// Approximate bytes held by voxel storage.
    fn memory_bytes(&self) -> usize;
}

/// Size of one voxel in either backend's storage.
pub(crate) const VOXEL_BYTES: usize = 20;

/// Host-memory store; touched blocks update in parallel with rayon.
#[derive(Debug)]
pub struct CpuBlockStore {
    resolution: u32,
    blocks: BlockMap,
}

impl CpuBlockStore {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution,
            blocks: BlockMap::new(),
        }
    }
}

impl BlockStore for CpuBlockStore {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn block_resolution(&self) -> u32 {
        self.resolution
    }

    fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn contains(&self, coord: IVec3) -> bool {
        self.blocks.contains_key(&coord)
    }

    fn allocate(&mut self, coords: &[IVec3]) -> Result<usize, ReconstructionError> {
        let mut allocated = 0;
        for &coord in coords {
            self.blocks.entry(coord).or_insert_with(|| {
                allocated += 1;
                VoxelBlock::new(self.resolution)
            });
        }
        Ok(allocated)
    }

    fn integrate(
        &mut self,
        coords: &[IVec3],
        view: &FrameView<'_>,
        params: &UpdateParams,
    ) -> Result<(), ReconstructionError> {
        let touched: HashSet<IVec3> = coords.iter().copied().collect();
        // each block is owned by exactly one task
        let work: Vec<(&IVec3, &mut VoxelBlock)> = self
            .blocks
            .iter_mut()
            .filter(|(coord, _)| touched.contains(*coord))
            .collect();
        work.into_par_iter()
            .for_each(|(coord, block)| integrate_block(block, *coord, view, params));
        Ok(())
    }

    fn snapshot(&self) -> Result<Cow<'_, BlockMap>, ReconstructionError> {
        Ok(Cow::Borrowed(&self.blocks))
    }

    fn clear(&mut self) {
        self.blocks.clear();
    }

    fn memory_bytes(&self) -> usize {
        self.blocks.len() * self.resolution.pow(3) as usize * VOXEL_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_idempotent() {
        let mut store = CpuBlockStore::new(4);
        let coords = [IVec3::ZERO, IVec3::X, IVec3::ZERO];
        assert_eq!(store.allocate(&coords).unwrap(), 2);
        assert_eq!(store.allocate(&[IVec3::X, IVec3::Y]).unwrap(), 1);
        assert_eq!(store.block_count(), 3);
        assert!(store.contains(IVec3::Y));
        assert_eq!(store.memory_bytes(), 3 * 64 * VOXEL_BYTES);

        store.clear();
        assert_eq!(store.block_count(), 0);
    }

    #[test]
    fn test_new_blocks_are_unobserved() {
        let mut store = CpuBlockStore::new(4);
        store.allocate(&[IVec3::NEG_ONE]).unwrap();
        let snapshot = store.snapshot().unwrap();
        let block = &snapshot[&IVec3::NEG_ONE];
        assert!(block.voxels().iter().all(|v| v.tsdf == 1.0 && v.weight == 0.0));
    }
}
