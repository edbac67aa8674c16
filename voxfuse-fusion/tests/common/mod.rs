#![allow(dead_code)]

use glam::Mat4;
use voxfuse_data::{CameraId, Intrinsics};
use voxfuse_fusion::ingest::{ColorEncoding, PoseSource, RawColor, RawDepth, RawFrame};

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;
pub const COLOR: [u8; 3] = [200, 120, 40];

pub fn intrinsics() -> Intrinsics {
    Intrinsics::new(32.0, 32.0, 16.0, 12.0, WIDTH, HEIGHT)
}

/// Depth of the tilted test wall at pixel column `u`.
pub fn wall_depth(u: f32) -> f32 {
    0.6 + 0.0005 * u
}

pub fn wall_samples() -> Vec<f32> {
    (0..HEIGHT)
        .flat_map(|_| (0..WIDTH).map(|x| wall_depth(x as f32)))
        .collect()
}

pub fn solid_color() -> RawColor {
    RawColor {
        data: COLOR.repeat((WIDTH * HEIGHT) as usize),
        width: WIDTH,
        height: HEIGHT,
        encoding: ColorEncoding::Rgb8,
    }
}

pub fn record(index: usize, timestamp_ms: i64, camera: CameraId, pose: PoseSource) -> RawFrame {
    RawFrame {
        index,
        timestamp_ms,
        camera,
        color: solid_color(),
        depth: Some(RawDepth::from_meters(WIDTH, HEIGHT, &wall_samples())),
        pose,
        intrinsics: intrinsics(),
    }
}

/// Center-camera view of the wall from the origin.
pub fn wall_record(index: usize, timestamp_ms: i64) -> RawFrame {
    record(index, timestamp_ms, CameraId::Center, PoseSource::Camera(Mat4::IDENTITY))
}

/// A record whose depth is all invalid.
pub fn blank_record(index: usize, timestamp_ms: i64) -> RawFrame {
    let mut frame = wall_record(index, timestamp_ms);
    frame.depth = Some(RawDepth::from_meters(
        WIDTH,
        HEIGHT,
        &vec![0.0; (WIDTH * HEIGHT) as usize],
    ));
    frame
}
