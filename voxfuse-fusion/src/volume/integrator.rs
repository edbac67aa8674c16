//! Frame-by-frame TSDF integration.

use super::block::{FrameView, UpdateParams};
use super::sparse::Volume;
use crate::config::ReconstructionConfig;
use crate::error::{ReconstructionError, SkipReason};
use crate::ingest::{DepthClass, DepthValidator};
use glam::{IVec3, Vec3};
use std::collections::HashSet;
use tracing::debug;
use voxfuse_data::Frame;

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationResult {
    pub accepted: bool,
    pub reason: Option<SkipReason>,
    pub class: Option<DepthClass>,
    pub blocks_touched: usize,
    pub blocks_allocated: usize,
}

impl IntegrationResult {
    fn rejected(reason: SkipReason, class: Option<DepthClass>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            class,
            blocks_touched: 0,
            blocks_allocated: 0,
        }
    }
}

/// Validates depth and folds frames into a [`Volume`].
#[derive(Debug, Clone)]
pub struct VolumeIntegrator {
    validator: DepthValidator,
    truncation: f32,
    max_weight: f32,
    allocation_stride: u32,
}

impl VolumeIntegrator {
    pub fn new(config: &ReconstructionConfig) -> Self {
        Self {
            validator: DepthValidator::new(config),
            truncation: config.truncation_distance,
            max_weight: config.max_weight,
            allocation_stride: config.allocation_stride.max(1),
        }
    }

    /// Integrate `frame` with unit sample weight.
    pub fn integrate(
        &self,
        frame: &Frame,
        volume: &mut Volume,
    ) -> Result<IntegrationResult, ReconstructionError> {
        self.integrate_with_weight(frame, volume, 1.0)
    }

    /// Integrate `frame`, weighting its samples by `sample_weight`.
    ///
    /// Frames without usable depth are rejected without touching the volume.
    /// Errors are backend failures only.
    pub fn integrate_with_weight(
        &self,
        frame: &Frame,
        volume: &mut Volume,
        sample_weight: f32,
    ) -> Result<IntegrationResult, ReconstructionError> {
        let Some(depth) = frame.depth() else {
            return Ok(IntegrationResult::rejected(SkipReason::NoDepth, None));
        };
        let class = self.validator.classify(depth);
        match class {
            DepthClass::Usable => {}
            DepthClass::Degenerate => {
                return Ok(IntegrationResult::rejected(SkipReason::Degenerate, Some(class)));
            }
            DepthClass::Sparse { valid_fraction } => {
                return Ok(IntegrationResult::rejected(
                    SkipReason::Sparse { valid_fraction },
                    Some(class),
                ));
            }
        }

        let touched = self.footprint(frame, volume);
        let blocks_allocated = volume.allocate(&touched)?;

        let view = FrameView {
            world_to_cam: frame.pose().inverse(),
            intrinsics: frame.intrinsics(),
            depth,
            color: frame.color(),
        };
        let params = UpdateParams {
            voxel_size: volume.voxel_size(),
            truncation: self.truncation,
            max_weight: self.max_weight,
            sample_weight,
            depth_max: self.validator.depth_max,
        };
        volume.integrate_blocks(&touched, &view, &params)?;

        debug!(
            "Frame {} ({}) touched {} blocks, {} new",
            frame.index(),
            frame.camera(),
            touched.len(),
            blocks_allocated
        );

        Ok(IntegrationResult {
            accepted: true,
            reason: None,
            class: Some(class),
            blocks_touched: touched.len(),
            blocks_allocated,
        })
    }

    /// Blocks within the truncation band of the back-projected depth samples,
    /// sorted by coordinate.
    fn footprint(&self, frame: &Frame, volume: &Volume) -> Vec<IVec3> {
        let mut touched = HashSet::new();
        let Some(depth) = frame.depth() else {
            return Vec::new();
        };
        let pose = frame.pose();
        let intrinsics = frame.intrinsics();
        let band = Vec3::splat(self.truncation);
        let stride = self.allocation_stride as usize;

        for v in (0..depth.height()).step_by(stride) {
            for u in (0..depth.width()).step_by(stride) {
                let Some(d) = depth.get(u, v) else { continue };
                if !self.validator.is_valid(d) {
                    continue;
                }
                let p = pose.transform_point3(intrinsics.unproject(u as f32, v as f32, d));
                let lo = volume.block_coord(p - band);
                let hi = volume.block_coord(p + band);
                for z in lo.z..=hi.z {
                    for y in lo.y..=hi.y {
                        for x in lo.x..=hi.x {
                            touched.insert(IVec3::new(x, y, z));
                        }
                    }
                }
            }
        }

        let mut touched: Vec<IVec3> = touched.into_iter().collect();
        touched.sort_unstable_by_key(|c| (c.x, c.y, c.z));
        touched
    }
}
