//! TSDF integration compute kernel.
//!
//! Voxels live in one pooled storage buffer; each allocated block owns a slot of
//! `block_resolution³` consecutive voxels, indexed `x + y·r + z·r²` inside the
//! slot. A dispatch updates only the blocks passed to [`TsdfKernel::integrate`].

use crate::builder::{BufferBuilder, BufferUsage, compute_entry};
use crate::context::{GpuContext, GpuError};
use crate::types::{BlockEntry, GpuVoxel, IntegrateParams};
use glam::Mat4;
use tracing::debug;

const WORKGROUP_SIZE: u32 = 64;
const MAX_ROWS: u32 = 65535;
const VOXEL_BYTES: u64 = std::mem::size_of::<GpuVoxel>() as u64;

/// Session-constant kernel settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSettings {
    pub block_resolution: u32,
    pub voxel_size: f32,
    pub truncation: f32,
    pub max_weight: f32,
    pub depth_max: f32,
}

/// One frame's inputs, already flattened for upload.
pub struct KernelFrame<'a> {
    pub world_to_cam: Mat4,
    /// `[fx, fy, cx, cy]`
    pub intrinsics: [f32; 4],
    pub width: u32,
    pub height: u32,
    pub depth: &'a [f32],
    /// Packed with [`crate::pack_rgb`]
    pub color: &'a [u32],
}

pub struct TsdfKernel {
    settings: KernelSettings,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    voxels: wgpu::Buffer,
    capacity: u32,
}

impl TsdfKernel {
    pub fn new(ctx: &GpuContext, settings: KernelSettings) -> Result<Self, GpuError> {
        let device = ctx.device();
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tsdf_integrate"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/tsdf_integrate.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("TSDF Bind Group Layout"),
            entries: &[
                compute_entry(0, wgpu::BufferBindingType::Uniform),
                compute_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                compute_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                compute_entry(3, wgpu::BufferBindingType::Storage { read_only: true }),
                compute_entry(4, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("TSDF Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("TSDF Integrate Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        let params = BufferBuilder::new(device, "TSDF Params")
            .size(std::mem::size_of::<IntegrateParams>() as u64)
            .usage(BufferUsage::Uniform)
            .build()?;

        let voxels = BufferBuilder::new(device, "Voxel Pool")
            .size(0)
            .usage(BufferUsage::Storage { read_only: false })
            .build()?;

        Ok(Self {
            settings,
            pipeline,
            layout,
            params,
            voxels,
            capacity: 0,
        })
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    pub fn voxels_per_block(&self) -> u32 {
        self.settings.block_resolution.pow(3)
    }

    fn slot_bytes(&self) -> u64 {
        self.voxels_per_block() as u64 * VOXEL_BYTES
    }

    /// Slots currently backed by device memory.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Grow the pool to hold at least `slots` blocks, preserving contents.
    pub fn ensure_capacity(&mut self, ctx: &GpuContext, slots: u32) -> Result<(), GpuError> {
        if slots <= self.capacity {
            return Ok(());
        }

        let slot_bytes = self.slot_bytes();
        let limit = ctx.max_storage_bytes();
        let max_slots = (limit / slot_bytes).min(u32::MAX as u64) as u32;
        if slots > max_slots {
            return Err(GpuError::OutOfDeviceMemory {
                requested: slots as u64 * slot_bytes,
                limit,
            });
        }

        let new_capacity = slots.max(self.capacity.saturating_mul(2)).max(64).min(max_slots);
        let grown = BufferBuilder::new(ctx.device(), "Voxel Pool")
            .size(new_capacity as u64 * slot_bytes)
            .usage(BufferUsage::Storage { read_only: false })
            .build()?;

        if self.capacity > 0 {
            let mut encoder = ctx
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Voxel Pool Grow Encoder"),
                });
            encoder.copy_buffer_to_buffer(
                &self.voxels,
                0,
                &grown,
                0,
                self.capacity as u64 * slot_bytes,
            );
            ctx.queue().submit(Some(encoder.finish()));
        }

        debug!("Voxel pool grown {} -> {} slots", self.capacity, new_capacity);
        self.voxels = grown;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Reset `count` slots starting at `first` to empty voxels.
    pub fn init_slots(&self, ctx: &GpuContext, first: u32, count: u32) {
        if count == 0 {
            return;
        }
        let empty = vec![GpuVoxel::default(); (count * self.voxels_per_block()) as usize];
        ctx.queue().write_buffer(
            &self.voxels,
            first as u64 * self.slot_bytes(),
            bytemuck::cast_slice(&empty),
        );
    }

    /// Integrate one frame into the listed blocks.
    pub fn integrate(
        &self,
        ctx: &GpuContext,
        frame: &KernelFrame<'_>,
        blocks: &[BlockEntry],
        sample_weight: f32,
    ) -> Result<(), GpuError> {
        if blocks.is_empty() {
            return Ok(());
        }
        let device = ctx.device();

        let [fx, fy, cx, cy] = frame.intrinsics;
        let mut params = IntegrateParams {
            world_to_cam: [[0.0; 4]; 4],
            fx,
            fy,
            cx,
            cy,
            width: frame.width,
            height: frame.height,
            voxel_size: self.settings.voxel_size,
            truncation: self.settings.truncation,
            max_weight: self.settings.max_weight,
            sample_weight,
            depth_max: self.settings.depth_max,
            block_resolution: self.settings.block_resolution,
            block_count: blocks.len() as u32,
            _pad: [0; 3],
        };
        params.set_world_to_cam(frame.world_to_cam);
        ctx.queue()
            .write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let block_buffer = BufferBuilder::new(device, "Block List")
            .with_pod_data(blocks)
            .build()?;
        let depth_buffer = BufferBuilder::new(device, "Depth")
            .with_pod_data(frame.depth)
            .build()?;
        let color_buffer = BufferBuilder::new(device, "Color")
            .with_pod_data(frame.color)
            .build()?;

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("TSDF Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: block_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: depth_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: color_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.voxels.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("TSDF Integrate Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("TSDF Integrate Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let (x, y, z) = dispatch_size(self.voxels_per_block(), blocks.len() as u32);
            pass.dispatch_workgroups(x, y, z);
        }
        ctx.queue().submit(Some(encoder.finish()));
        Ok(())
    }

    /// Read back `count` slots starting at `first`.
    pub fn read_slots(
        &self,
        ctx: &GpuContext,
        first: u32,
        count: u32,
    ) -> Result<Vec<GpuVoxel>, GpuError> {
        let count = count.min(self.capacity.saturating_sub(first));
        ctx.read_buffer(
            &self.voxels,
            first as u64 * self.slot_bytes(),
            count as u64 * self.slot_bytes(),
        )
    }
}

/// Workgroup grid: x covers one block's voxels, y and z enumerate blocks.
fn dispatch_size(voxels_per_block: u32, blocks: u32) -> (u32, u32, u32) {
    let x = voxels_per_block.div_ceil(WORKGROUP_SIZE);
    let y = blocks.min(MAX_ROWS);
    let z = blocks.div_ceil(MAX_ROWS);
    (x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_size_splits_rows() {
        assert_eq!(dispatch_size(4096, 10), (64, 10, 1));
        assert_eq!(dispatch_size(64, 70000), (1, 65535, 2));
    }
}
