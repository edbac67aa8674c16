//! Plain-old-data types shared with `tsdf_integrate.wgsl`.
//!
//! Field order and padding must match the WGSL declarations.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// One voxel as stored in the GPU voxel pool.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuVoxel {
    pub tsdf: f32,
    pub weight: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for GpuVoxel {
    fn default() -> Self {
        Self {
            tsdf: 1.0,
            weight: 0.0,
            r: 0.0,
            g: 0.0,
            b: 0.0,
        }
    }
}

/// A block scheduled for update: block coordinate plus its slot in the pool.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BlockEntry {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub slot: i32,
}

/// Per-dispatch uniform parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct IntegrateParams {
    pub world_to_cam: [[f32; 4]; 4],
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
    pub voxel_size: f32,
    pub truncation: f32,
    pub max_weight: f32,
    pub sample_weight: f32,
    pub depth_max: f32,
    pub block_resolution: u32,
    pub block_count: u32,
    pub _pad: [u32; 3],
}

impl IntegrateParams {
    pub fn set_world_to_cam(&mut self, m: Mat4) {
        self.world_to_cam = m.to_cols_array_2d();
    }
}

/// Pack an RGB triple as `r | g << 8 | b << 16`.
pub fn pack_rgb([r, g, b]: [u8; 3]) -> u32 {
    r as u32 | (g as u32) << 8 | (b as u32) << 16
}
