//! Integrates a single synthetic wall into one block on the GPU and prints the
//! resulting voxel column.
//!
//! Run with: `cargo run -p voxfuse-gpu --example integrate`

use glam::Mat4;
use voxfuse_gpu::{BlockEntry, GpuContext, KernelFrame, KernelSettings, TsdfKernel, pack_rgb};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let Some(ctx) = GpuContext::probe() else {
        println!("No GPU adapter available");
        return Ok(());
    };
    println!("Using adapter: {}", ctx.adapter_name());

    let settings = KernelSettings {
        block_resolution: 8,
        voxel_size: 0.01,
        truncation: 0.04,
        max_weight: 100.0,
        depth_max: 3.0,
    };
    let mut kernel = TsdfKernel::new(&ctx, settings)?;
    kernel.ensure_capacity(&ctx, 1)?;
    kernel.init_slots(&ctx, 0, 1);

    // 64x64 camera looking down +Z at a wall 5cm away
    let (width, height) = (64u32, 64u32);
    let depth = vec![0.05f32; (width * height) as usize];
    let color = vec![pack_rgb([200, 100, 50]); depth.len()];
    let frame = KernelFrame {
        world_to_cam: Mat4::IDENTITY,
        intrinsics: [64.0, 64.0, 0.0, 0.0],
        width,
        height,
        depth: &depth,
        color: &color,
    };
    let block = BlockEntry {
        x: 0,
        y: 0,
        z: 0,
        slot: 0,
    };
    kernel.integrate(&ctx, &frame, &[block], 1.0)?;

    let voxels = kernel.read_slots(&ctx, 0, 1)?;
    for z in 0..settings.block_resolution {
        let v = voxels[(z * 64) as usize];
        println!(
            "z={:.3}m tsdf={:+.3} weight={} rgb=({:.0},{:.0},{:.0})",
            (z as f32 + 0.5) * settings.voxel_size,
            v.tsdf,
            v.weight,
            v.r,
            v.g,
            v.b
        );
    }

    Ok(())
}
