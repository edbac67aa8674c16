mod common;

use common::{HEIGHT, WIDTH, intrinsics, wall_samples};
use glam::{Mat4, Vec3};
use image::RgbImage;
use voxfuse_data::{CameraId, DepthBuffer, Frame, StereoRig};
use voxfuse_fusion::ingest::{PoseResolver, PoseSource};
use voxfuse_fusion::volume::BlockMap;
use voxfuse_fusion::{Capabilities, ReconstructionConfig, Volume, VolumeIntegrator};

fn config() -> ReconstructionConfig {
    ReconstructionConfig {
        block_resolution: 8,
        ..Default::default()
    }
}

fn frame_with(camera: CameraId, pose: Mat4, depth: DepthBuffer) -> Frame {
    Frame::new(
        0,
        0,
        camera,
        RgbImage::from_pixel(WIDTH, HEIGHT, image::Rgb(common::COLOR)),
        Some(depth),
        pose,
        intrinsics(),
    )
    .unwrap()
}

fn wall_frame(camera: CameraId, pose: Mat4) -> Frame {
    let depth = DepthBuffer::new(WIDTH, HEIGHT, wall_samples()).unwrap();
    frame_with(camera, pose, depth)
}

/// Assert two snapshots hold the same blocks with matching voxels.
fn assert_same_volume(a: &BlockMap, b: &BlockMap, tsdf_tol: f32, color_tol: f32) {
    assert_eq!(a.len(), b.len());
    for (coord, block_a) in a {
        let block_b = &b[coord];
        for (va, vb) in block_a.voxels().iter().zip(block_b.voxels()) {
            assert!((va.tsdf - vb.tsdf).abs() <= tsdf_tol, "{coord}: {va:?} vs {vb:?}");
            assert!((va.weight - vb.weight).abs() <= tsdf_tol, "{coord}: {va:?} vs {vb:?}");
            for c in 0..3 {
                assert!((va.color[c] - vb.color[c]).abs() <= color_tol, "{coord}: {va:?} vs {vb:?}");
            }
        }
    }
}

#[test]
fn test_same_frame_twice_equals_doubled_weight() {
    let config = config();
    let integrator = VolumeIntegrator::new(&config);
    let frame = wall_frame(CameraId::Center, Mat4::IDENTITY);

    let mut twice = Volume::cpu(&config);
    integrator.integrate(&frame, &mut twice).unwrap();
    integrator.integrate(&frame, &mut twice).unwrap();

    let mut doubled = Volume::cpu(&config);
    integrator.integrate_with_weight(&frame, &mut doubled, 2.0).unwrap();

    let twice = twice.snapshot().unwrap();
    let doubled = doubled.snapshot().unwrap();
    assert_same_volume(&twice, &doubled, 1e-6, 1e-4);
    let max_weight = twice
        .values()
        .flat_map(|b| b.voxels())
        .map(|v| v.weight)
        .fold(0.0, f32::max);
    assert_eq!(max_weight, 2.0);
}

#[test]
fn test_weight_is_capped() {
    let config = ReconstructionConfig {
        max_weight: 3.0,
        ..config()
    };
    let integrator = VolumeIntegrator::new(&config);
    let frame = wall_frame(CameraId::Center, Mat4::IDENTITY);
    let mut volume = Volume::cpu(&config);
    for _ in 0..5 {
        integrator.integrate(&frame, &mut volume).unwrap();
    }
    let snapshot = volume.snapshot().unwrap();
    assert!(snapshot.values().flat_map(|b| b.voxels()).all(|v| v.weight <= 3.0));
}

#[test]
fn test_stereo_order_commutes_below_cap() {
    let config = config();
    let resolver = PoseResolver::new(Some(StereoRig::new(0.064)));
    let head = PoseSource::Head(Mat4::IDENTITY);
    let left = resolver.resolve(head, CameraId::Left).unwrap();
    let right = resolver.resolve(head, CameraId::Right).unwrap();
    assert!((left.w_axis.truncate() - Vec3::new(-0.032, 0.0, 0.0)).length() < 1e-6);
    assert!((right.w_axis.truncate() - Vec3::new(0.032, 0.0, 0.0)).length() < 1e-6);

    let left = wall_frame(CameraId::Left, left);
    let right = wall_frame(CameraId::Right, right);
    let integrator = VolumeIntegrator::new(&config);

    let mut lr = Volume::cpu(&config);
    integrator.integrate(&left, &mut lr).unwrap();
    integrator.integrate(&right, &mut lr).unwrap();
    let mut rl = Volume::cpu(&config);
    integrator.integrate(&right, &mut rl).unwrap();
    integrator.integrate(&left, &mut rl).unwrap();

    assert_same_volume(&lr.snapshot().unwrap(), &rl.snapshot().unwrap(), 1e-5, 1e-3);
}

#[test]
fn test_cpu_and_gpu_stores_agree() {
    let capabilities = Capabilities::detect(true);
    if !capabilities.has_gpu() {
        eprintln!("no GPU adapter, skipping");
        return;
    }
    let config = ReconstructionConfig {
        use_gpu: true,
        ..config()
    };

    // piecewise-constant depth keeps pixel rounding from mattering
    let depth = DepthBuffer::from_fn(WIDTH, HEIGHT, |x, y| if x < 4 && y < 4 { 0.62 } else { 0.6 });
    let frame = frame_with(CameraId::Center, Mat4::IDENTITY, depth);
    let integrator = VolumeIntegrator::new(&config);

    let mut gpu = Volume::new(&config, &capabilities);
    assert_eq!(gpu.backend(), "gpu");
    let mut cpu = Volume::cpu(&config);
    for _ in 0..2 {
        integrator.integrate(&frame, &mut gpu).unwrap();
        integrator.integrate(&frame, &mut cpu).unwrap();
    }

    assert_eq!(gpu.block_count(), cpu.block_count());
    assert_same_volume(&cpu.snapshot().unwrap(), &gpu.snapshot().unwrap(), 1e-4, 1e-2);
}
