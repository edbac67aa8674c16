//! Raw frame records as delivered by a [`FrameSource`](super::FrameSource),
//! before normalization.

use glam::Mat4;
use serde::{Deserialize, Serialize};
use voxfuse_data::{CameraId, Intrinsics};

/// Pixel layout of a raw color buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorEncoding {
    /// Detect from the buffer length
    #[default]
    Auto,
    Rgb8,
    Rgba8,
    /// Planar YUV 4:2:0, planes ordered Y, U, V
    I420,
    /// Planar YUV 4:2:0, planes ordered Y, V, U
    Yv12,
}

/// Sample type of a raw depth buffer. Multi-byte samples are little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthEncoding {
    U8,
    U16,
    F32,
}

impl DepthEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            DepthEncoding::U8 => 1,
            DepthEncoding::U16 => 2,
            DepthEncoding::F32 => 4,
        }
    }
}

/// Where a frame's pose came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseSource {
    /// Camera-to-world pose of the physical camera
    Camera(Mat4),
    /// Head-to-world pose; the camera pose is derived from the stereo rig
    Head(Mat4),
}

impl PoseSource {
    pub fn matrix(&self) -> Mat4 {
        match self {
            PoseSource::Camera(m) | PoseSource::Head(m) => *m,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawColor {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: ColorEncoding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDepth {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: DepthEncoding,
    /// Meters per stored unit
    pub scale: f32,
}

impl RawDepth {
    /// Depth from float meters.
    pub fn from_meters(width: u32, height: u32, samples: &[f32]) -> Self {
        Self {
            data: samples.iter().flat_map(|d| d.to_le_bytes()).collect(),
            width,
            height,
            encoding: DepthEncoding::F32,
            scale: 1.0,
        }
    }
}

/// One record of a capture sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Position in the source sequence
    pub index: usize,
    pub timestamp_ms: i64,
    pub camera: CameraId,
    pub color: RawColor,
    pub depth: Option<RawDepth>,
    pub pose: PoseSource,
    pub intrinsics: Intrinsics,
}
