mod common;

use common::{blank_record, record, wall_depth, wall_record};
use glam::{Mat4, Vec3};
use voxfuse_data::{CameraId, StereoRig};
use voxfuse_fusion::ingest::{
    FrameSource, PoseSource, RawDepth, RawFrame, SourceError, VecFrameSource,
};
use voxfuse_fusion::pipeline::{CollectingSink, progress_channel};
use voxfuse_fusion::{
    CancelToken, Capabilities, PipelineController, PipelineState, ReconstructionConfig,
    ReconstructionError, ReconstructionWorker, SessionOutcome, SkipReason,
};

fn controller(config: ReconstructionConfig) -> PipelineController {
    PipelineController::new(config, Capabilities::cpu_only())
}

fn small_blocks() -> ReconstructionConfig {
    ReconstructionConfig {
        block_resolution: 8,
        ..Default::default()
    }
}

/// Cancels `token` when the given record is about to be handed out.
struct CancelAt {
    inner: VecFrameSource,
    token: CancelToken,
    at: usize,
    served: usize,
}

impl FrameSource for CancelAt {
    fn frames_total(&self) -> usize {
        self.inner.frames_total()
    }

    fn stereo_rig(&self) -> Option<StereoRig> {
        self.inner.stereo_rig()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        if self.served == self.at {
            self.token.cancel();
        }
        self.served += 1;
        self.inner.next_frame()
    }
}

#[test]
fn test_planar_surface_within_truncation() {
    let config = small_blocks();
    let truncation = config.truncation_distance;
    let mut source = VecFrameSource::new((0..3).map(|i| wall_record(i, i as i64 * 33)).collect());
    let mut controller = controller(config);
    let report = controller.run(&mut source);

    assert_eq!(controller.state(), PipelineState::Completed);
    assert_eq!(report.stats.frames_integrated, 3);
    assert!(report.skipped.is_empty());
    let mesh = report.into_mesh().unwrap();
    assert!(mesh.triangle_count() > 0);
    for v in &mesh.vertices {
        let u = 32.0 * v.position.x / v.position.z + 16.0;
        assert!((v.position.z - wall_depth(u)).abs() < truncation, "{:?}", v.position);
        assert_eq!(v.color, common::COLOR);
    }
}

#[test]
fn test_point_cloud_samples_the_wall() {
    let config = small_blocks();
    let truncation = config.truncation_distance;
    let mut source = VecFrameSource::new((0..2).map(|i| wall_record(i, i as i64 * 33)).collect());
    let report = controller(config).with_point_cloud(true).run(&mut source);

    assert!(report.outcome.mesh().is_some());
    let cloud = report.point_cloud.expect("point cloud requested");
    assert!(!cloud.is_empty());
    for point in &cloud.points {
        let p = point.position;
        let u = p.x / p.z * 32.0 + 16.0;
        assert!((p.z - wall_depth(u)).abs() < truncation, "{p:?}");
    }

    let mut source = VecFrameSource::new(vec![wall_record(0, 0)]);
    assert!(controller(small_blocks()).run(&mut source).point_cloud.is_none());
}

#[test]
fn test_all_frames_rejected_is_empty_volume() {
    let mut source = VecFrameSource::new((0..4).map(|i| blank_record(i, i as i64)).collect());
    let report = controller(small_blocks()).run(&mut source);

    assert_eq!(
        report.outcome,
        SessionOutcome::Failed(ReconstructionError::EmptyVolume)
    );
    assert_eq!(report.stats.frames_done, 4);
    assert_eq!(report.stats.frames_skipped, 4);
}

#[test]
fn test_cancel_mid_run() {
    let token = CancelToken::new();
    let (sender, receiver) = progress_channel();
    let mut source = CancelAt {
        inner: VecFrameSource::new((0..10).map(|i| wall_record(i, i as i64 * 10)).collect()),
        token: token.clone(),
        at: 3,
        served: 0,
    };
    let mut controller = controller(small_blocks())
        .with_cancel_token(token)
        .with_progress(sender);
    let report = controller.run(&mut source);

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(controller.state(), PipelineState::Cancelled);
    assert!(report.stats.frames_done < report.stats.frames_total);
    assert!(report.outcome.mesh().is_none());

    let updates: Vec<_> = receiver.try_iter().collect();
    let last = updates.last().unwrap();
    assert!(last.cancelled);
    assert_eq!(last.blocks_allocated, 0);
    assert!(updates[..updates.len() - 1].iter().all(|u| !u.cancelled));
}

#[test]
fn test_duplicate_record_is_skipped() {
    let mut source = VecFrameSource::new(vec![wall_record(0, 0), wall_record(1, 0), wall_record(2, 5)]);
    let report = controller(small_blocks()).run(&mut source);

    assert!(report.outcome.mesh().is_some());
    assert_eq!(report.stats.frames_integrated, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 1);
    assert_eq!(report.skipped[0].reason, SkipReason::Duplicate);
}

#[test]
fn test_backwards_timestamps_fail() {
    let mut source = VecFrameSource::new(vec![wall_record(0, 100), wall_record(1, 50)]);
    let mut controller = controller(small_blocks());
    let report = controller.run(&mut source);

    assert!(matches!(
        report.outcome,
        SessionOutcome::Failed(ReconstructionError::MalformedSequence(_))
    ));
    assert_eq!(controller.state(), PipelineState::Failed);
}

#[test]
fn test_unreadable_record_is_skipped() {
    let mut source = VecFrameSource::new(vec![wall_record(0, 0)]);
    source.push_unreadable(1, "bad file");
    let report = controller(small_blocks()).run(&mut source);

    assert!(report.outcome.mesh().is_some());
    assert_eq!(report.stats.frames_done, 2);
    assert!(matches!(report.skipped[0].reason, SkipReason::Source(_)));
}

#[test]
fn test_frame_interval_selects_timestamps() {
    let config = ReconstructionConfig {
        frame_interval: 3,
        ..small_blocks()
    };
    let mut source = VecFrameSource::new((0..7).map(|i| wall_record(i, i as i64)).collect());
    let report = controller(config).run(&mut source);

    // timestamps 0, 3 and 6
    assert_eq!(report.stats.frames_integrated, 3);
    assert_eq!(report.stats.frames_done, 7);
    assert!(report.skipped.is_empty());
}

#[test]
fn test_stereo_pair_from_head_pose() {
    let config = ReconstructionConfig {
        stereo_enabled: true,
        stereo_baseline: Some(0.064),
        ..small_blocks()
    };
    let head = PoseSource::Head(Mat4::from_translation(Vec3::new(0.0, 0.0, -0.05)));
    let mut source = VecFrameSource::new(vec![
        record(0, 0, CameraId::Right, head),
        record(1, 0, CameraId::Left, head),
        record(2, 33, CameraId::Left, head),
        record(3, 33, CameraId::Right, head),
    ]);
    let report = controller(config).run(&mut source);

    assert!(report.outcome.mesh().is_some(), "{:?}", report.outcome.error());
    assert_eq!(report.stats.frames_integrated, 4);
}

#[test]
fn test_baseline_override_applies_to_capture_extrinsics() {
    let config = ReconstructionConfig {
        stereo_enabled: true,
        stereo_baseline: Some(0.1),
        ..small_blocks()
    };
    // a capture rig with explicit per-eye extrinsics, as frames.json provides
    let rig = StereoRig::new(0.064).with_extrinsics(
        Mat4::from_translation(Vec3::new(-0.032, 0.0, 0.0)),
        Mat4::from_translation(Vec3::new(0.032, 0.0, 0.0)),
    );
    let head = PoseSource::Head(Mat4::IDENTITY);
    let empty = RawDepth::from_meters(
        common::WIDTH,
        common::HEIGHT,
        &vec![0.0; (common::WIDTH * common::HEIGHT) as usize],
    );
    let records = [CameraId::Left, CameraId::Right]
        .into_iter()
        .enumerate()
        .map(|(i, camera)| RawFrame {
            depth: Some(empty.clone()),
            ..record(i, 0, camera, head)
        })
        .collect();
    let mut source = VecFrameSource::new(records).with_rig(rig);

    let sink = CollectingSink::new();
    let mut controller = controller(config).with_color_sink(Box::new(sink.clone()));
    controller.run(&mut source);

    let frames = sink.frames();
    assert_eq!(frames.len(), 2);
    let left = frames.iter().find(|f| f.camera == CameraId::Left).unwrap();
    let right = frames.iter().find(|f| f.camera == CameraId::Right).unwrap();
    assert!((left.pose.w_axis.truncate() - Vec3::new(-0.05, 0.0, 0.0)).length() < 1e-6);
    assert!((right.pose.w_axis.truncate() - Vec3::new(0.05, 0.0, 0.0)).length() < 1e-6);
}

#[test]
fn test_head_pose_eye_without_calibration_fails() {
    let mut source = VecFrameSource::new(vec![record(
        0,
        0,
        CameraId::Left,
        PoseSource::Head(Mat4::IDENTITY),
    )]);
    let report = controller(small_blocks()).run(&mut source);
    assert!(matches!(
        report.outcome,
        SessionOutcome::Failed(ReconstructionError::MissingCalibration(_))
    ));
}

#[test]
fn test_malformed_pose_is_skipped() {
    let skewed = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
    let mut source = VecFrameSource::new(vec![
        record(0, 0, CameraId::Center, PoseSource::Camera(skewed)),
        wall_record(1, 1),
    ]);
    let report = controller(small_blocks()).run(&mut source);

    assert!(report.outcome.mesh().is_some());
    assert!(matches!(report.skipped[0].reason, SkipReason::MalformedPose(_)));
}

#[test]
fn test_worker_reports_progress() {
    let source = VecFrameSource::new((0..4).map(|i| wall_record(i, i as i64)).collect());
    let handle = ReconstructionWorker::spawn(controller(small_blocks()), source).unwrap();

    let updates: Vec<_> = handle.progress().iter().collect();
    let report = handle.join().unwrap();

    assert_eq!(updates.len(), 4);
    assert_eq!(updates.last().unwrap().frames_done, 4);
    assert!(updates.windows(2).all(|w| w[0].frames_done < w[1].frames_done));
    assert!(report.outcome.mesh().is_some());
}
