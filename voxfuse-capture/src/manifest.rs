//! The `frames.json` dataset manifest.

use crate::error::CaptureError;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use voxfuse_data::{CameraId, Intrinsics, StereoRig};
use voxfuse_fusion::ingest::pose_from_position_quaternion;

/// Focal length used when a camera's metadata has none.
pub const DEFAULT_FOCAL: f32 = 867.0;
/// Principal point used when a camera's metadata has none.
pub const DEFAULT_PRINCIPAL_POINT: f32 = 640.0;
/// Half of the default interpupillary distance.
pub const DEFAULT_EYE_OFFSET: f32 = 0.032;

/// Root of `frames.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub camera_metadata: CameraMetadataMap,
    #[serde(default)]
    pub frames: Vec<ManifestFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraMetadataMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<CameraMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<CameraMetadata>,
}

impl CameraMetadataMap {
    pub fn get(&self, camera: CameraId) -> Option<&CameraMetadata> {
        match camera {
            CameraId::Left => self.left.as_ref(),
            CameraId::Right => self.right.as_ref(),
            CameraId::Center => None,
        }
    }
}

/// Per-camera calibration. Unknown fields of the device's characteristics
/// dump are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsics: Option<IntrinsicsMetadata>,
    /// Head-to-camera translation in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f32; 3]>,
    /// Head-to-camera rotation as `[w, x, y, z]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_quat: Option<[f32; 4]>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsMetadata {
    pub fx: Option<f32>,
    pub fy: Option<f32>,
    pub cx: Option<f32>,
    pub cy: Option<f32>,
}

/// Intrinsics for `camera` at the given color resolution, with device
/// defaults for anything the metadata leaves out.
pub fn camera_intrinsics(meta: Option<&CameraMetadata>, width: u32, height: u32) -> Intrinsics {
    let k = meta.and_then(|m| m.intrinsics).unwrap_or_default();
    Intrinsics::new(
        k.fx.unwrap_or(DEFAULT_FOCAL),
        k.fy.unwrap_or(DEFAULT_FOCAL),
        k.cx.unwrap_or(DEFAULT_PRINCIPAL_POINT),
        k.cy.unwrap_or(DEFAULT_PRINCIPAL_POINT),
        width,
        height,
    )
}

/// Head-to-camera transform for `camera`. Defaults to a pure lateral offset of
/// half the interpupillary distance.
pub fn camera_extrinsic(meta: Option<&CameraMetadata>, camera: CameraId) -> Mat4 {
    let default_x = match camera {
        CameraId::Left => -DEFAULT_EYE_OFFSET,
        CameraId::Right => DEFAULT_EYE_OFFSET,
        CameraId::Center => 0.0,
    };
    let translation = meta
        .and_then(|m| m.translation)
        .unwrap_or([default_x, 0.0, 0.0]);
    let rotation = meta.and_then(|m| m.rotation_quat).unwrap_or([1.0, 0.0, 0.0, 0.0]);
    pose_from_position_quaternion(translation, rotation)
}

impl Manifest {
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let text = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        info!("Loaded manifest with {} frames", manifest.frames.len());
        Ok(manifest)
    }

    /// Stereo calibration from the camera metadata.
    pub fn stereo_rig(&self) -> StereoRig {
        let left = camera_extrinsic(self.camera_metadata.left.as_ref(), CameraId::Left);
        let right = camera_extrinsic(self.camera_metadata.right.as_ref(), CameraId::Right);
        let baseline = left.w_axis.truncate().distance(right.w_axis.truncate());
        let center = (left.w_axis.truncate() + right.w_axis.truncate()) * 0.5;
        StereoRig::new(baseline)
            .with_ipd_offset(Vec3::new(0.0, center.y, center.z))
            .with_extrinsics(left, right)
    }
}

/// One head pose sample and the files recorded with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFrame {
    pub frame_id: usize,
    /// Unix time in milliseconds
    pub timestamp: i64,
    pub pose: HeadPose,
    #[serde(default)]
    pub cameras: FrameCameras,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub position: [f32; 3],
    /// `[w, x, y, z]`
    pub rotation: [f32; 4],
}

impl HeadPose {
    pub fn matrix(&self) -> Mat4 {
        pose_from_position_quaternion(self.position, self.rotation)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameCameras {
    #[serde(default)]
    pub left: Option<CameraFiles>,
    #[serde(default)]
    pub right: Option<CameraFiles>,
}

impl FrameCameras {
    pub fn get(&self, camera: CameraId) -> Option<&CameraFiles> {
        match camera {
            CameraId::Left => self.left.as_ref(),
            CameraId::Right => self.right.as_ref(),
            CameraId::Center => None,
        }
    }
}

/// Dataset-relative paths of one camera's files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraFiles {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub depth: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "version": "1.0",
        "camera_metadata": {
            "left": { "intrinsics": { "fx": 500.0, "cx": 320.0 }, "sensor": "ignored" }
        },
        "frames": [
            {
                "frame_id": 0,
                "timestamp": 1700000000000,
                "pose": { "position": [0.0, 1.6, 0.0], "rotation": [1.0, 0.0, 0.0, 0.0] },
                "cameras": {
                    "left": { "image": "left_camera_raw/0.yuv", "depth": "left_depth/0.raw" },
                    "right": { "image": null, "depth": null }
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest: Manifest = serde_json::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.frames.len(), 1);
        let frame = &manifest.frames[0];
        assert_eq!(frame.timestamp, 1_700_000_000_000);
        assert_eq!(
            frame.cameras.get(CameraId::Left).and_then(|c| c.depth.as_deref()),
            Some("left_depth/0.raw")
        );
        assert!(frame.cameras.get(CameraId::Right).unwrap().image.is_none());
        assert_eq!(frame.pose.matrix().w_axis.truncate(), Vec3::new(0.0, 1.6, 0.0));
    }

    #[test]
    fn test_intrinsics_fall_back_to_defaults() {
        let manifest: Manifest = serde_json::from_str(MANIFEST).unwrap();
        let left = camera_intrinsics(manifest.camera_metadata.get(CameraId::Left), 640, 480);
        assert_eq!((left.fx, left.fy, left.cx, left.cy), (500.0, DEFAULT_FOCAL, 320.0, DEFAULT_PRINCIPAL_POINT));
        let right = camera_intrinsics(manifest.camera_metadata.get(CameraId::Right), 640, 480);
        assert_eq!(right.fx, DEFAULT_FOCAL);
        assert_eq!((right.width, right.height), (640, 480));
    }

    #[test]
    fn test_default_rig_is_64mm() {
        let rig = Manifest::default().stereo_rig();
        assert!((rig.baseline - 0.064).abs() < 1e-6);
        let left = rig.left_extrinsic.unwrap();
        assert!((left.w_axis.truncate() - Vec3::new(-0.032, 0.0, 0.0)).length() < 1e-6);
    }
}
