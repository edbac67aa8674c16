//! Camera pose derivation for single cameras and head-mounted stereo rigs.

use super::raw::PoseSource;
use glam::{Mat3, Mat4, Quat, Vec3, Vec4};
use thiserror::Error;
use voxfuse_data::{CameraId, StereoRig};

const ORTHONORMAL_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoseError {
    #[error("{0} camera needs a stereo rig with a positive baseline or explicit extrinsics")]
    MissingCalibration(CameraId),
    #[error("{0}")]
    Malformed(String),
}

/// Check that `m` is a finite rigid transform.
pub fn validate_pose(m: &Mat4) -> Result<(), PoseError> {
    if !m.is_finite() {
        return Err(PoseError::Malformed("non-finite element".to_string()));
    }
    if (m.row(3) - Vec4::W).abs().max_element() > ORTHONORMAL_TOLERANCE {
        return Err(PoseError::Malformed(format!(
            "bottom row is {:?}, expected [0, 0, 0, 1]",
            m.row(3).to_array()
        )));
    }

    let r = Mat3::from_mat4(*m);
    let gram = r.transpose() * r;
    let off_identity = (gram - Mat3::IDENTITY)
        .to_cols_array()
        .iter()
        .fold(0.0f32, |acc, v| acc.max(v.abs()));
    if off_identity > ORTHONORMAL_TOLERANCE {
        return Err(PoseError::Malformed(format!(
            "rotation is not orthonormal (error {off_identity:.2e})"
        )));
    }
    if (r.determinant() - 1.0).abs() > ORTHONORMAL_TOLERANCE {
        return Err(PoseError::Malformed(format!(
            "rotation determinant is {:.4}",
            r.determinant()
        )));
    }
    Ok(())
}

/// Head pose from a position and a `[w, x, y, z]` quaternion.
///
/// The quaternion is normalized; a zero quaternion yields identity rotation.
pub fn pose_from_position_quaternion(position: [f32; 3], rotation_wxyz: [f32; 4]) -> Mat4 {
    let [w, x, y, z] = rotation_wxyz;
    let q = Quat::from_xyzw(x, y, z, w);
    let q = if q.length_squared() > 0.0 {
        q.normalize()
    } else {
        Quat::IDENTITY
    };
    Mat4::from_rotation_translation(q, Vec3::from_array(position))
}

/// Resolves world-space camera poses from frame pose sources.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoseResolver {
    rig: Option<StereoRig>,
}

impl PoseResolver {
    pub fn new(rig: Option<StereoRig>) -> Self {
        Self { rig }
    }

    pub fn rig(&self) -> Option<&StereoRig> {
        self.rig.as_ref()
    }

    /// Whether left and right poses can be derived from a head pose.
    pub fn supports_stereo(&self) -> bool {
        self.rig.is_some_and(|rig| {
            rig.has_baseline() || (rig.left_extrinsic.is_some() && rig.right_extrinsic.is_some())
        })
    }

    /// Camera-to-world pose for `camera`.
    pub fn resolve(&self, source: PoseSource, camera: CameraId) -> Result<Mat4, PoseError> {
        let head = match source {
            PoseSource::Camera(m) => return Ok(m),
            PoseSource::Head(h) => h,
        };
        if camera == CameraId::Center {
            return Ok(head);
        }

        let rig = self.rig.ok_or(PoseError::MissingCalibration(camera))?;
        let extrinsic = match camera {
            CameraId::Left => rig.left_extrinsic,
            CameraId::Right => rig.right_extrinsic,
            CameraId::Center => None,
        };
        if let Some(extrinsic) = extrinsic {
            return Ok(head * extrinsic);
        }
        if !rig.has_baseline() {
            return Err(PoseError::MissingCalibration(camera));
        }

        let half = rig.baseline / 2.0;
        let lateral = if camera == CameraId::Left { -half } else { half };
        Ok(head * Mat4::from_translation(rig.ipd_offset + Vec3::X * lateral))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_head_stereo_offsets() {
        let resolver = PoseResolver::new(Some(StereoRig::new(0.064)));
        let head = PoseSource::Head(Mat4::IDENTITY);
        let left = resolver.resolve(head, CameraId::Left).unwrap();
        let right = resolver.resolve(head, CameraId::Right).unwrap();

        assert!((left.w_axis.truncate() - Vec3::new(-0.032, 0.0, 0.0)).length() < 1e-6);
        assert!((right.w_axis.truncate() - Vec3::new(0.032, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(Mat3::from_mat4(left), Mat3::IDENTITY);
        assert_eq!(Mat3::from_mat4(right), Mat3::IDENTITY);
    }

    #[test]
    fn test_offset_follows_head_rotation() {
        let resolver = PoseResolver::new(Some(StereoRig::new(0.064)));
        let head = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let right = resolver.resolve(PoseSource::Head(head), CameraId::Right).unwrap();
        // rig X maps to world -Z after a quarter turn about Y
        assert!((right.w_axis.truncate() - Vec3::new(0.0, 0.0, -0.032)).length() < 1e-6);
    }

    #[test]
    fn test_camera_pose_and_center_pass_through() {
        let resolver = PoseResolver::default();
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(resolver.resolve(PoseSource::Camera(m), CameraId::Left).unwrap(), m);
        assert_eq!(resolver.resolve(PoseSource::Head(m), CameraId::Center).unwrap(), m);
    }

    #[test]
    fn test_missing_calibration() {
        let head = PoseSource::Head(Mat4::IDENTITY);
        assert_eq!(
            PoseResolver::default().resolve(head, CameraId::Left),
            Err(PoseError::MissingCalibration(CameraId::Left))
        );
        let zero = PoseResolver::new(Some(StereoRig::new(0.0)));
        assert!(!zero.supports_stereo());
        assert!(zero.resolve(head, CameraId::Right).is_err());
    }

    #[test]
    fn test_explicit_extrinsics_override_baseline() {
        let left = Mat4::from_translation(Vec3::new(-0.05, 0.01, 0.0));
        let right = Mat4::from_translation(Vec3::new(0.05, 0.01, 0.0));
        let resolver = PoseResolver::new(Some(StereoRig::new(0.0).with_extrinsics(left, right)));
        assert!(resolver.supports_stereo());
        let head = Mat4::from_translation(Vec3::Z);
        let pose = resolver.resolve(PoseSource::Head(head), CameraId::Left).unwrap();
        assert!((pose.w_axis.truncate() - Vec3::new(-0.05, 0.01, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_validate_pose() {
        assert!(validate_pose(&Mat4::IDENTITY).is_ok());
        assert!(validate_pose(&pose_from_position_quaternion([1.0, 2.0, 3.0], [0.7071, 0.7071, 0.0, 0.0])).is_ok());

        let scaled = Mat4::from_scale(Vec3::splat(2.0));
        assert!(validate_pose(&scaled).is_err());

        let mirrored = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        assert!(validate_pose(&mirrored).is_err());

        let mut projective = Mat4::IDENTITY;
        projective.x_axis.w = 0.5;
        assert!(validate_pose(&projective).is_err());

        let mut nan = Mat4::IDENTITY;
        nan.w_axis.x = f32::NAN;
        assert!(validate_pose(&nan).is_err());
    }

    #[test]
    fn test_quaternion_is_wxyz() {
        // 90 degrees about Z
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let m = pose_from_position_quaternion([0.0, 0.0, 0.0], [s, 0.0, 0.0, s]);
        let x = m.transform_vector3(Vec3::X);
        assert!((x - Vec3::Y).length() < 1e-6);
    }
}
