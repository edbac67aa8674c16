//! Reconstructs a sphere from a ring of synthetic depth views and writes the
//! mesh as PLY.
//!
//! Run with: `cargo run -p voxfuse-fusion --example synthetic_sphere -- out.ply`

use glam::{Mat4, Vec3};
use tracing_subscriber::EnvFilter;
use voxfuse_data::{CameraId, Intrinsics, MeshFormat, save_mesh};
use voxfuse_fusion::ingest::{ColorEncoding, PoseSource, RawColor, RawDepth, RawFrame, VecFrameSource};
use voxfuse_fusion::pipeline::progress_channel;
use voxfuse_fusion::{Capabilities, PipelineController, ReconstructionConfig};

const RADIUS: f32 = 0.15;
const SIZE: u32 = 96;

/// Ray-sphere depth along the camera z axis for every pixel.
fn render(pose: Mat4, intrinsics: &Intrinsics) -> Vec<f32> {
    let origin = pose.w_axis.truncate();
    let mut depth = Vec::with_capacity((SIZE * SIZE) as usize);
    for v in 0..SIZE {
        for u in 0..SIZE {
            let ray_cam = intrinsics.unproject(u as f32, v as f32, 1.0);
            let dir = pose.transform_vector3(ray_cam).normalize();
            let b = origin.dot(dir);
            let disc = b * b - (origin.length_squared() - RADIUS * RADIUS);
            let d = if disc > 0.0 {
                let t = -b - disc.sqrt();
                t / ray_cam.length()
            } else {
                0.0
            };
            depth.push(d);
        }
    }
    depth
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let output = std::env::args().nth(1).unwrap_or_else(|| "sphere.ply".to_string());
    let intrinsics = Intrinsics::new(96.0, 96.0, 48.0, 48.0, SIZE, SIZE);

    let frames: Vec<RawFrame> = (0..24)
        .map(|i| {
            let angle = i as f32 / 24.0 * std::f32::consts::TAU;
            let eye = Vec3::new(angle.sin(), 0.2, -angle.cos()) * 0.6;
            // camera looks down +Z, so invert a look-at toward the origin
            let pose = Mat4::look_to_lh(eye, -eye, Vec3::Y).inverse();
            let shade = [(120.0 + 100.0 * angle.cos()) as u8, 140, (120.0 + 100.0 * angle.sin()) as u8];
            RawFrame {
                index: i,
                timestamp_ms: i as i64 * 33,
                camera: CameraId::Center,
                color: RawColor {
                    data: shade.repeat((SIZE * SIZE) as usize),
                    width: SIZE,
                    height: SIZE,
                    encoding: ColorEncoding::Rgb8,
                },
                depth: Some(RawDepth::from_meters(SIZE, SIZE, &render(pose, &intrinsics))),
                pose: PoseSource::Camera(pose),
                intrinsics,
            }
        })
        .collect();

    let config = ReconstructionConfig {
        voxel_size: 0.005,
        truncation_distance: 0.02,
        smooth_iterations: 2,
        decimate_ratio: 0.5,
        ..Default::default()
    };
    let (sender, receiver) = progress_channel();
    let mut controller =
        PipelineController::new(config, Capabilities::detect(false)).with_progress(sender);
    let report = controller.run(&mut VecFrameSource::new(frames));

    for update in receiver.try_iter().filter(|u| u.frames_done % 6 == 0) {
        println!(
            "{}/{} frames, {} blocks",
            update.frames_done, update.frames_total, update.blocks_allocated
        );
    }

    match report.into_mesh() {
        Some(mesh) => {
            println!("{} vertices, {} triangles", mesh.vertex_count(), mesh.triangle_count());
            let path = std::path::Path::new(&output);
            save_mesh(&mesh, path, MeshFormat::from_path(path).unwrap_or(MeshFormat::Ply))?;
        }
        None => println!("No mesh produced"),
    }
    Ok(())
}
