//! Core data types for posed RGB-D frames.
//!
//! These are CPU-side representations consumed by the fusion pipeline. Raw,
//! not-yet-normalized capture records live in `voxfuse-fusion::ingest`.

use glam::{Mat4, Vec3};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Depth value marking a sample with no measurement.
pub const INVALID_DEPTH: f32 = 0.0;

/// Errors raised when assembling a frame from inconsistent parts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("depth buffer has {actual} samples, expected {expected} for {width}x{height}")]
    DepthLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("depth is {depth:?} but color is {color:?}")]
    ResolutionMismatch { color: (u32, u32), depth: (u32, u32) },

    #[error("pose contains non-finite values")]
    NonFinitePose,

    #[error("invalid intrinsics: {0}")]
    InvalidIntrinsics(String),
}

/// Pinhole camera intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
}

impl Intrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Check focal lengths and principal point are usable.
    pub fn validate(&self) -> Result<(), FrameError> {
        let values = [self.fx, self.fy, self.cx, self.cy];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FrameError::InvalidIntrinsics(
                "non-finite parameter".to_string(),
            ));
        }
        if self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(FrameError::InvalidIntrinsics(format!(
                "focal length must be positive (fx={}, fy={})",
                self.fx, self.fy
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::InvalidIntrinsics("zero image size".to_string()));
        }
        Ok(())
    }

    /// Back-project pixel `(u, v)` at `depth` meters into camera space.
    pub fn unproject(&self, u: f32, v: f32, depth: f32) -> Vec3 {
        Vec3::new(
            (u - self.cx) * depth / self.fx,
            (v - self.cy) * depth / self.fy,
            depth,
        )
    }

    /// Project a camera-space point to continuous pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera plane.
    pub fn project(&self, point: Vec3) -> Option<(f32, f32)> {
        if point.z <= 0.0 {
            return None;
        }
        Some((
            self.fx * point.x / point.z + self.cx,
            self.fy * point.y / point.z + self.cy,
        ))
    }

    /// Rescale to a different image resolution.
    pub fn scaled(&self, width: u32, height: u32) -> Self {
        let sx = width as f32 / self.width as f32;
        let sy = height as f32 / self.height as f32;
        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
            width,
            height,
        }
    }
}

/// Which physical camera of the rig produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraId {
    Center,
    Left,
    Right,
}

impl CameraId {
    /// Integration order within one timestamp.
    pub fn order(self) -> u8 {
        match self {
            CameraId::Center => 0,
            CameraId::Left => 1,
            CameraId::Right => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraId::Center => "center",
            CameraId::Left => "left",
            CameraId::Right => "right",
        }
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-major float depth image in meters.
///
/// Non-finite and non-positive samples are replaced by [`INVALID_DEPTH`] on
/// construction, so downstream arithmetic never sees `NaN` or `inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::DepthLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::from_sized(width, height, data))
    }

    // Caller guarantees `data.len() == width * height`.
    fn from_sized(width: u32, height: u32, mut data: Vec<f32>) -> Self {
        for d in data.iter_mut() {
            if !Self::is_valid_sample(*d) {
                *d = INVALID_DEPTH;
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Buffer with every sample set to `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self::from_sized(width, height, vec![value; width as usize * height as usize])
    }

    /// Build a buffer by evaluating `f(x, y)` per pixel.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::from_sized(width, height, data)
    }

    /// A sample carries a measurement when it is finite and positive.
    #[inline]
    pub fn is_valid_sample(depth: f32) -> bool {
        depth.is_finite() && depth > 0.0
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y as usize * self.width as usize + x as usize])
    }

    /// Number of samples carrying a measurement.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| Self::is_valid_sample(**d)).count()
    }

    /// Nearest-neighbour resample to `width` x `height`.
    pub fn resize_nearest(&self, width: u32, height: u32) -> Self {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        if self.is_empty() {
            return Self::filled(width, height, INVALID_DEPTH);
        }
        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        Self::from_fn(width, height, |x, y| {
            let src_x = (((x as f32 + 0.5) * sx) as u32).min(self.width - 1);
            let src_y = (((y as f32 + 0.5) * sy) as u32).min(self.height - 1);
            self.data[src_y as usize * self.width as usize + src_x as usize]
        })
    }
}

/// Fixed stereo calibration of a head-mounted rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoRig {
    /// Lateral distance between the two cameras in meters.
    pub baseline: f32,
    /// Offset of the rig center from the head origin, in head space.
    pub ipd_offset: Vec3,
    /// Explicit head-to-left-camera transform, overriding the baseline model.
    pub left_extrinsic: Option<Mat4>,
    /// Explicit head-to-right-camera transform, overriding the baseline model.
    pub right_extrinsic: Option<Mat4>,
}

impl StereoRig {
    pub fn new(baseline: f32) -> Self {
        Self {
            baseline,
            ipd_offset: Vec3::ZERO,
            left_extrinsic: None,
            right_extrinsic: None,
        }
    }

    pub fn with_ipd_offset(mut self, offset: Vec3) -> Self {
        self.ipd_offset = offset;
        self
    }

    pub fn with_extrinsics(mut self, left: Mat4, right: Mat4) -> Self {
        self.left_extrinsic = Some(left);
        self.right_extrinsic = Some(right);
        self
    }

    /// Replace the baseline. Explicit extrinsics keep their rotations and rig
    /// center; their camera positions move apart or together along the line
    /// joining them (rig X when they coincide) to match the new baseline.
    pub fn with_baseline(mut self, baseline: f32) -> Self {
        self.baseline = baseline;
        if let (Some(left), Some(right)) = (self.left_extrinsic, self.right_extrinsic) {
            let (l, r) = (left.w_axis.truncate(), right.w_axis.truncate());
            let center = (l + r) * 0.5;
            let axis = (r - l).try_normalize().unwrap_or(Vec3::X);
            let half = axis * (baseline * 0.5);
            self.left_extrinsic = Some(with_translation(left, center - half));
            self.right_extrinsic = Some(with_translation(right, center + half));
        }
        self
    }

    /// A baseline is usable when it is finite and strictly positive.
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_finite() && self.baseline > 0.0
    }
}

fn with_translation(mut m: Mat4, t: Vec3) -> Mat4 {
    m.w_axis = t.extend(1.0);
    m
}

/// A normalized, posed RGB-D frame ready for integration.
#[derive(Debug, Clone)]
pub struct Frame {
    index: usize,
    timestamp_ms: i64,
    camera: CameraId,
    color: RgbImage,
    depth: Option<DepthBuffer>,
    pose: Mat4,
    intrinsics: Intrinsics,
}

impl Frame {
    /// Assemble a frame, checking resolutions and pose.
    ///
    /// `pose` is the camera-to-world transform of the physical camera.
    pub fn new(
        index: usize,
        timestamp_ms: i64,
        camera: CameraId,
        color: RgbImage,
        depth: Option<DepthBuffer>,
        pose: Mat4,
        intrinsics: Intrinsics,
    ) -> Result<Self, FrameError> {
        if let Some(depth) = &depth {
            if depth.dimensions() != color.dimensions() {
                return Err(FrameError::ResolutionMismatch {
                    color: color.dimensions(),
                    depth: depth.dimensions(),
                });
            }
        }
        if !pose.is_finite() {
            return Err(FrameError::NonFinitePose);
        }
        intrinsics.validate()?;

        Ok(Self {
            index,
            timestamp_ms,
            camera,
            color,
            depth,
            pose,
            intrinsics,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn depth(&self) -> Option<&DepthBuffer> {
        self.depth.as_ref()
    }

    pub fn pose(&self) -> Mat4 {
        self.pose
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// Get image dimensions (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }

    /// Consume the frame, keeping only its color image.
    pub fn into_color(self) -> RgbImage {
        self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_buffer_sanitizes_non_finite() {
        let depth = DepthBuffer::new(2, 2, vec![1.0, f32::NAN, f32::INFINITY, -0.5]).unwrap();
        assert_eq!(depth.as_slice(), &[1.0, INVALID_DEPTH, INVALID_DEPTH, INVALID_DEPTH]);
        assert_eq!(depth.valid_count(), 1);
    }

    #[test]
    fn test_depth_buffer_length_mismatch() {
        let result = DepthBuffer::new(3, 3, vec![1.0; 4]);
        assert!(matches!(result, Err(FrameError::DepthLength { expected: 9, actual: 4, .. })));
    }

    #[test]
    fn test_resize_nearest_upsamples() {
        let depth = DepthBuffer::from_fn(2, 2, |x, y| 1.0 + x as f32 + 2.0 * y as f32);
        let resized = depth.resize_nearest(4, 4);
        assert_eq!(resized.dimensions(), (4, 4));
        assert_eq!(resized.get(0, 0), Some(1.0));
        assert_eq!(resized.get(3, 0), Some(2.0));
        assert_eq!(resized.get(0, 3), Some(3.0));
        assert_eq!(resized.get(3, 3), Some(4.0));
    }

    #[test]
    fn test_intrinsics_project_unproject() {
        let k = Intrinsics::new(500.0, 500.0, 320.0, 240.0, 640, 480);
        let p = k.unproject(400.0, 100.0, 2.0);
        let (u, v) = k.project(p).unwrap();
        assert!((u - 400.0).abs() < 1e-3);
        assert!((v - 100.0).abs() < 1e-3);
        assert!(k.project(Vec3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_intrinsics_scaled() {
        let k = Intrinsics::new(500.0, 400.0, 320.0, 240.0, 640, 480);
        let half = k.scaled(320, 240);
        assert_eq!(half.fx, 250.0);
        assert_eq!(half.fy, 200.0);
        assert_eq!(half.cx, 160.0);
        assert_eq!(half.cy, 120.0);
    }

    #[test]
    fn test_frame_rejects_resolution_mismatch() {
        let color = RgbImage::new(4, 4);
        let depth = DepthBuffer::filled(2, 2, 1.0);
        let k = Intrinsics::new(2.0, 2.0, 2.0, 2.0, 4, 4);
        let result = Frame::new(0, 0, CameraId::Center, color, Some(depth), Mat4::IDENTITY, k);
        assert!(matches!(result, Err(FrameError::ResolutionMismatch { .. })));
    }

    #[test]
    fn test_frame_rejects_non_finite_pose() {
        let color = RgbImage::new(2, 2);
        let k = Intrinsics::new(2.0, 2.0, 1.0, 1.0, 2, 2);
        let mut pose = Mat4::IDENTITY;
        pose.w_axis.x = f32::NAN;
        let result = Frame::new(0, 0, CameraId::Left, color, None, pose, k);
        assert_eq!(result.unwrap_err(), FrameError::NonFinitePose);
    }

    #[test]
    fn test_stereo_rig_baseline() {
        assert!(StereoRig::new(0.064).has_baseline());
        assert!(!StereoRig::new(0.0).has_baseline());
        assert!(!StereoRig::new(f32::NAN).has_baseline());
    }

    #[test]
    fn test_with_baseline_keeps_extrinsic_rotation() {
        let turn = Mat4::from_rotation_y(0.1);
        let rig = StereoRig::new(0.064)
            .with_extrinsics(
                Mat4::from_translation(Vec3::new(-0.032, 0.0, 0.0)) * turn,
                Mat4::from_translation(Vec3::new(0.032, 0.0, 0.0)) * turn,
            )
            .with_baseline(0.08);
        let left = rig.left_extrinsic.unwrap();
        assert_eq!(rig.baseline, 0.08);
        assert!((left.w_axis.truncate() - Vec3::new(-0.04, 0.0, 0.0)).length() < 1e-6);
        assert!((left.x_axis - turn.x_axis).length() < 1e-6);

        let plain = StereoRig::new(0.064).with_baseline(0.07);
        assert_eq!(plain.baseline, 0.07);
        assert!(plain.left_extrinsic.is_none());
    }

    #[test]
    fn test_camera_id_names_and_order() {
        assert_eq!(CameraId::Left.to_string(), "left");
        assert!(CameraId::Left.order() < CameraId::Right.order());
    }
}
