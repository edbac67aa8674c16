//! Reconstruction configuration.
//!
//! Every field is optional in JSON; missing fields take the defaults below.
//! Call [`ReconstructionConfig::validate`] after applying overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use voxfuse_data::StereoRig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Voxel edge length in meters
    pub voxel_size: f32,
    /// Truncation band of the signed distance, in meters
    pub truncation_distance: f32,
    /// Minimum fraction of valid depth samples for a frame to be integrated
    pub depth_valid_min_fraction: f32,
    pub stereo_enabled: bool,
    /// Overrides the baseline reported by the frame source
    pub stereo_baseline: Option<f32>,
    pub smooth_iterations: u32,
    pub decimate_ratio: f32,
    pub use_gpu: bool,
    /// Voxels per block edge
    pub block_resolution: u32,
    /// Depth samples beyond this range (meters) are ignored
    pub depth_max: f32,
    pub max_weight: f32,
    pub degenerate_tolerance: f32,
    /// Pixel stride used when allocating blocks from a depth image
    pub allocation_stride: u32,
    /// Integrate every n-th timestamp
    pub frame_interval: u32,
    /// Components with fewer triangles are dropped after post-processing
    pub min_component_triangles: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.01,
            truncation_distance: 0.04,
            depth_valid_min_fraction: 0.01,
            stereo_enabled: false,
            stereo_baseline: None,
            smooth_iterations: 0,
            decimate_ratio: 1.0,
            use_gpu: false,
            block_resolution: 16,
            depth_max: 3.0,
            max_weight: 100.0,
            degenerate_tolerance: 1e-4,
            allocation_stride: 4,
            frame_interval: 1,
            min_component_triangles: 0,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl ReconstructionConfig {
    /// Load from a JSON file.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(invalid("voxel_size", "must be > 0"));
        }
        if !(self.truncation_distance.is_finite() && self.truncation_distance > 0.0) {
            return Err(invalid("truncation_distance", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.depth_valid_min_fraction) {
            return Err(invalid("depth_valid_min_fraction", "must be in [0, 1]"));
        }
        if let Some(baseline) = self.stereo_baseline {
            if !(baseline.is_finite() && baseline > 0.0) {
                return Err(invalid("stereo_baseline", "must be > 0"));
            }
        }
        if !(self.decimate_ratio > 0.0 && self.decimate_ratio <= 1.0) {
            return Err(invalid("decimate_ratio", "must be in (0, 1]"));
        }
        if !(4..=32).contains(&self.block_resolution) || self.block_resolution % 4 != 0 {
            return Err(invalid(
                "block_resolution",
                "must be a multiple of 4 in 4..=32",
            ));
        }
        if !(self.depth_max.is_finite() && self.depth_max > 0.0) {
            return Err(invalid("depth_max", "must be > 0"));
        }
        if !(self.max_weight.is_finite() && self.max_weight > 0.0) {
            return Err(invalid("max_weight", "must be > 0"));
        }
        if !(self.degenerate_tolerance.is_finite() && self.degenerate_tolerance >= 0.0) {
            return Err(invalid("degenerate_tolerance", "must be >= 0"));
        }
        if self.allocation_stride == 0 {
            return Err(invalid("allocation_stride", "must be >= 1"));
        }
        if self.frame_interval == 0 {
            return Err(invalid("frame_interval", "must be >= 1"));
        }
        Ok(())
    }

    /// Combine the source's rig with the configured baseline override. The
    /// override also respaces any explicit per-eye extrinsics.
    pub fn stereo_rig(&self, source_rig: Option<StereoRig>) -> Option<StereoRig> {
        match (source_rig, self.stereo_baseline) {
            (Some(rig), Some(baseline)) => Some(rig.with_baseline(baseline)),
            (None, Some(baseline)) => Some(StereoRig::new(baseline)),
            (rig, None) => rig,
        }
    }

    /// Edge length of one voxel block in meters.
    pub fn block_size(&self) -> f32 {
        self.voxel_size * self.block_resolution as f32
    }
}
