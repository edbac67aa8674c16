//! Voxels, dense voxel blocks and the per-voxel TSDF update.

use glam::{IVec3, Mat4, UVec3, Vec3};
use image::RgbImage;
use voxfuse_data::{DepthBuffer, Intrinsics};

/// A single TSDF voxel. Color channels are running means in `0.0..=255.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voxel {
    pub tsdf: f32,
    pub weight: f32,
    pub color: [f32; 3],
}

impl Default for Voxel {
    fn default() -> Self {
        Self {
            tsdf: 1.0,
            weight: 0.0,
            color: [0.0; 3],
        }
    }
}

impl Voxel {
    pub fn is_observed(&self) -> bool {
        self.weight > 0.0
    }

    /// Color quantized to 8 bits.
    pub fn rgb(&self) -> [u8; 3] {
        self.color.map(|c| c.round().clamp(0.0, 255.0) as u8)
    }
}

/// Dense cube of `resolution³` voxels, stored x-fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelBlock {
    resolution: u32,
    voxels: Vec<Voxel>,
}

impl VoxelBlock {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution,
            voxels: vec![Voxel::default(); resolution.pow(3) as usize],
        }
    }

    /// Wrap existing voxels. Returns `None` if the count does not match.
    pub fn from_voxels(resolution: u32, voxels: Vec<Voxel>) -> Option<Self> {
        (voxels.len() == resolution.pow(3) as usize).then_some(Self { resolution, voxels })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    #[inline]
    pub fn index(&self, local: UVec3) -> usize {
        let r = self.resolution as usize;
        local.x as usize + local.y as usize * r + local.z as usize * r * r
    }

    #[inline]
    pub fn local_coord(&self, index: usize) -> UVec3 {
        let r = self.resolution as usize;
        UVec3::new((index % r) as u32, ((index / r) % r) as u32, (index / (r * r)) as u32)
    }

    pub fn get(&self, local: UVec3) -> &Voxel {
        &self.voxels[self.index(local)]
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    pub fn observed_count(&self) -> usize {
        self.voxels.iter().filter(|v| v.is_observed()).count()
    }
}

/// Block containing the global voxel index `voxel`.
#[inline]
pub fn block_of(voxel: IVec3, resolution: u32) -> (IVec3, UVec3) {
    let r = resolution as i32;
    let block = voxel.div_euclid(IVec3::splat(r));
    let local = voxel.rem_euclid(IVec3::splat(r));
    (block, local.as_uvec3())
}

/// Frame data seen by a block update.
pub struct FrameView<'a> {
    pub world_to_cam: Mat4,
    pub intrinsics: &'a Intrinsics,
    pub depth: &'a DepthBuffer,
    pub color: &'a RgbImage,
}

/// Scalars of the weighted TSDF update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    pub voxel_size: f32,
    pub truncation: f32,
    pub max_weight: f32,
    pub sample_weight: f32,
    pub depth_max: f32,
}

/// Fold one frame into every voxel of `block`.
///
/// Mirrors `tsdf_integrate.wgsl`; keep the two in step.
pub fn integrate_block(
    block: &mut VoxelBlock,
    coord: IVec3,
    view: &FrameView<'_>,
    params: &UpdateParams,
) {
    let res = block.resolution;
    let origin = coord * res as i32;
    let (width, height) = view.depth.dimensions();
    let depth = view.depth.as_slice();
    let k = view.intrinsics;

    let r = res as usize;
    for (i, voxel) in block.voxels.iter_mut().enumerate() {
        let local = IVec3::new((i % r) as i32, ((i / r) % r) as i32, (i / (r * r)) as i32);
        let center = ((origin + local).as_vec3() + Vec3::splat(0.5)) * params.voxel_size;

        let cam = view.world_to_cam * center.extend(1.0);
        if cam.z <= 0.0 {
            continue;
        }
        let u = (k.fx * cam.x / cam.z + k.cx + 0.5).floor();
        let v = (k.fy * cam.y / cam.z + k.cy + 0.5).floor();
        if u < 0.0 || v < 0.0 || u >= width as f32 || v >= height as f32 {
            continue;
        }
        let pixel = v as usize * width as usize + u as usize;

        let d = depth[pixel];
        if !(d > 0.0) || d > params.depth_max {
            continue;
        }
        let sdf = d - cam.z;
        if sdf < -params.truncation {
            continue;
        }
        let tsdf = (sdf / params.truncation).min(1.0);
        let rgb = view.color.get_pixel(u as u32, v as u32).0;

        let s = params.sample_weight;
        let total = voxel.weight + s;
        voxel.tsdf = (voxel.weight * voxel.tsdf + s * tsdf) / total;
        for (c, sample) in voxel.color.iter_mut().zip(rgb) {
            *c = (voxel.weight * *c + s * sample as f32) / total;
        }
        voxel.weight = total.min(params.max_weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_of_handles_negative_coords() {
        assert_eq!(
            block_of(IVec3::new(-1, 0, 17), 16),
            (IVec3::new(-1, 0, 1), UVec3::new(15, 0, 1))
        );
        assert_eq!(
            block_of(IVec3::new(-16, -17, 15), 16),
            (IVec3::new(-1, -2, 0), UVec3::new(0, 15, 15))
        );
    }

    #[test]
    fn test_index_round_trip() {
        let block = VoxelBlock::new(8);
        for i in [0usize, 7, 8, 63, 64, 511] {
            assert_eq!(block.index(block.local_coord(i)), i);
        }
        assert_eq!(block.voxels().len(), 512);
        assert_eq!(block.observed_count(), 0);
    }

    #[test]
    fn test_update_is_weighted_mean() {
        let intrinsics = Intrinsics::new(10.0, 10.0, 0.0, 0.0, 8, 8);
        let depth = DepthBuffer::filled(8, 8, 0.05);
        let color = RgbImage::from_pixel(8, 8, image::Rgb([100, 150, 200]));
        let view = FrameView {
            world_to_cam: Mat4::IDENTITY,
            intrinsics: &intrinsics,
            depth: &depth,
            color: &color,
        };
        let params = UpdateParams {
            voxel_size: 0.01,
            truncation: 0.04,
            max_weight: 100.0,
            sample_weight: 1.0,
            depth_max: 3.0,
        };
        let mut block = VoxelBlock::new(4);
        integrate_block(&mut block, IVec3::ZERO, &view, &params);

        // voxel (0,0,2): center z = 0.025, sdf = 0.025
        let v = block.get(UVec3::new(0, 0, 2));
        assert_eq!(v.weight, 1.0);
        assert!((v.tsdf - 0.625).abs() < 1e-5);
        assert_eq!(v.rgb(), [100, 150, 200]);

        integrate_block(&mut block, IVec3::ZERO, &view, &params);
        let v = block.get(UVec3::new(0, 0, 2));
        assert_eq!(v.weight, 2.0);
        assert!((v.tsdf - 0.625).abs() < 1e-5);
    }
}
