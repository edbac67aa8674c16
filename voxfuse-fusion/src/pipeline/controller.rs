//! The frame loop: read, normalize, resolve, integrate, then extract.

use super::progress::{CancelToken, ProgressSender};
use super::session::{ReconstructionSession, SessionOutcome, SessionReport, SessionStats};
use super::sink::{ColorSink, NullSink};
use crate::config::ReconstructionConfig;
use crate::error::{ReconstructionError, SkipReason, SkippedFrame};
use crate::ingest::{
    FrameSource, PoseResolver, RawFrame, SourceError, align_depth, normalize_color,
    normalize_depth, validate_pose,
};
use crate::mesh::{MeshExtractor, PostProcess};
use crate::volume::{Capabilities, Volume, VolumeIntegrator};
use tracing::{debug, info, warn};
use voxfuse_data::{CameraId, Frame};

/// Lifecycle of a controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            SessionOutcome::Completed(_) => PipelineState::Completed,
            SessionOutcome::Cancelled => PipelineState::Cancelled,
            SessionOutcome::Failed(_) => PipelineState::Failed,
        }
    }
}

/// Why a record was not turned into an integrated frame.
enum Rejection {
    Skip(SkipReason),
    Fatal(ReconstructionError),
}

impl From<SkipReason> for Rejection {
    fn from(reason: SkipReason) -> Self {
        Rejection::Skip(reason)
    }
}

impl From<ReconstructionError> for Rejection {
    fn from(err: ReconstructionError) -> Self {
        Rejection::Fatal(err)
    }
}

/// Reads records grouped by timestamp, one record of lookahead.
struct GroupReader<'a> {
    source: &'a mut dyn FrameSource,
    pending: Option<Result<Option<RawFrame>, SourceError>>,
}

impl<'a> GroupReader<'a> {
    fn new(source: &'a mut dyn FrameSource) -> Self {
        Self {
            source,
            pending: None,
        }
    }

    fn pull(&mut self) -> Result<Option<RawFrame>, SourceError> {
        match self.pending.take() {
            Some(next) => next,
            None => self.source.next_frame(),
        }
    }

    /// Next run of records sharing a timestamp, ordered Center, Left, Right.
    /// Source order is kept among records of the same camera.
    fn next_group(&mut self) -> Result<Option<Vec<RawFrame>>, SourceError> {
        let Some(first) = self.pull()? else {
            return Ok(None);
        };
        let timestamp = first.timestamp_ms;
        let mut group = vec![first];
        loop {
            match self.source.next_frame() {
                Ok(Some(frame)) if frame.timestamp_ms == timestamp => group.push(frame),
                next => {
                    self.pending = Some(next);
                    break;
                }
            }
        }
        group.sort_by_key(|frame| frame.camera.order());
        Ok(Some(group))
    }
}

/// Drives one reconstruction session over a [`FrameSource`].
pub struct PipelineController {
    config: ReconstructionConfig,
    capabilities: Capabilities,
    state: PipelineState,
    cancel: CancelToken,
    progress: Option<ProgressSender>,
    sink: Box<dyn ColorSink>,
    point_cloud: bool,
}

impl PipelineController {
    pub fn new(config: ReconstructionConfig, capabilities: Capabilities) -> Self {
        Self {
            config,
            capabilities,
            state: PipelineState::Idle,
            cancel: CancelToken::new(),
            progress: None,
            sink: Box::new(NullSink),
            point_cloud: false,
        }
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Also sample the surface as a point cloud before post-processing.
    pub fn with_point_cloud(mut self, enabled: bool) -> Self {
        self.point_cloud = enabled;
        self
    }

    pub fn with_color_sink(mut self, sink: Box<dyn ColorSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub(crate) fn set_progress(&mut self, sender: ProgressSender) {
        self.progress = Some(sender);
    }

    /// Run a full session: integrate every selected record, then extract and
    /// post-process the mesh.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> SessionReport {
        self.state = PipelineState::Running;
        let report = match self.open(source) {
            Ok((session, resolver)) => self.drive(session, resolver, source),
            Err(err) => {
                warn!("Session failed to start: {}", err);
                let stats = SessionStats {
                    frames_total: source.frames_total(),
                    ..Default::default()
                };
                SessionReport::failed(err, stats)
            }
        };
        self.state = report.outcome.state();
        info!(
            "Session finished: {:?}, {} of {} records, {} integrated, {} skipped",
            self.state,
            report.stats.frames_done,
            report.stats.frames_total,
            report.stats.frames_integrated,
            report.stats.frames_skipped
        );
        report
    }

    /// Validate the configuration and calibration before any frame is read.
    fn open(
        &self,
        source: &dyn FrameSource,
    ) -> Result<(ReconstructionSession, PoseResolver), ReconstructionError> {
        self.config.validate()?;
        let resolver = PoseResolver::new(self.config.stereo_rig(source.stereo_rig()));
        if self.config.stereo_enabled && !resolver.supports_stereo() {
            return Err(ReconstructionError::MissingCalibration(
                "stereo enabled but no baseline or extrinsics available".to_string(),
            ));
        }
        let volume = Volume::new(&self.config, &self.capabilities);
        info!(
            "Starting session: {} records, {} backend, voxel {} m",
            source.frames_total(),
            volume.backend(),
            self.config.voxel_size
        );
        Ok((
            ReconstructionSession::new(volume, source.frames_total(), self.cancel.clone()),
            resolver,
        ))
    }

    fn drive(
        &mut self,
        mut session: ReconstructionSession,
        resolver: PoseResolver,
        source: &mut dyn FrameSource,
    ) -> SessionReport {
        let integrator = VolumeIntegrator::new(&self.config);
        let interval = self.config.frame_interval.max(1) as usize;
        let mut reader = GroupReader::new(source);
        let mut last_timestamp = None;
        let mut group_number = 0usize;

        loop {
            if session.cancel.is_cancelled() {
                return self.cancelled(session);
            }
            let group = match reader.next_group() {
                Ok(Some(group)) => group,
                Ok(None) => break,
                Err(SourceError::Frame { index, message }) => {
                    warn!("Skipping unreadable record {}: {}", index, message);
                    session.stats.frames_done += 1;
                    session.record_skip(SkippedFrame {
                        index,
                        timestamp_ms: None,
                        camera: None,
                        reason: SkipReason::Source(message),
                    });
                    self.emit(&session, false);
                    continue;
                }
                Err(err) => {
                    let err = ReconstructionError::Source(err.to_string());
                    return session.finish(SessionOutcome::Failed(err));
                }
            };

            let timestamp = group[0].timestamp_ms;
            if let Some(last) = last_timestamp {
                if timestamp < last {
                    let err = ReconstructionError::MalformedSequence(format!(
                        "timestamp {} ms follows {} ms",
                        timestamp, last
                    ));
                    return session.finish(SessionOutcome::Failed(err));
                }
            }
            last_timestamp = Some(timestamp);
            let selected = group_number % interval == 0;
            group_number += 1;

            let mut seen: Vec<CameraId> = Vec::with_capacity(group.len());
            for raw in group {
                if session.cancel.is_cancelled() {
                    return self.cancelled(session);
                }
                session.stats.frames_done += 1;
                if selected {
                    if seen.contains(&raw.camera) {
                        warn!("Skipping duplicate record {} ({} @ {} ms)", raw.index, raw.camera, timestamp);
                        session.record_skip(SkippedFrame {
                            index: raw.index,
                            timestamp_ms: Some(timestamp),
                            camera: Some(raw.camera),
                            reason: SkipReason::Duplicate,
                        });
                    } else {
                        seen.push(raw.camera);
                        if let Err(err) = self.process(raw, &mut session, &resolver, &integrator) {
                            return session.finish(SessionOutcome::Failed(err));
                        }
                    }
                }
                self.emit(&session, false);
            }
        }

        self.extract(session)
    }

    /// Integrate one record. Only session-wide failures are returned as errors.
    fn process(
        &mut self,
        raw: RawFrame,
        session: &mut ReconstructionSession,
        resolver: &PoseResolver,
        integrator: &VolumeIntegrator,
    ) -> Result<(), ReconstructionError> {
        let (index, timestamp, camera) = (raw.index, raw.timestamp_ms, raw.camera);
        let frame = match prepare(raw, resolver) {
            Ok(frame) => frame,
            Err(Rejection::Fatal(err)) => return Err(err),
            Err(Rejection::Skip(reason)) => {
                warn!("Skipping record {} ({}): {}", index, camera, reason);
                session.record_skip(SkippedFrame {
                    index,
                    timestamp_ms: Some(timestamp),
                    camera: Some(camera),
                    reason,
                });
                return Ok(());
            }
        };

        let result = integrator.integrate(&frame, &mut session.volume)?;
        if result.accepted {
            session.stats.frames_integrated += 1;
            session.refresh_volume_stats();
            debug!(
                "Integrated record {} ({}), {} blocks",
                index, camera, session.stats.blocks_allocated
            );
        } else {
            let reason = result.reason.unwrap_or(SkipReason::NoDepth);
            warn!("Skipping depth of record {} ({}): {}", index, camera, reason);
            self.sink.color_only(&frame, result.class);
            session.record_skip(SkippedFrame {
                index,
                timestamp_ms: Some(timestamp),
                camera: Some(camera),
                reason,
            });
        }
        Ok(())
    }

    fn extract(&self, session: ReconstructionSession) -> SessionReport {
        let extractor = MeshExtractor::new();
        let mesh = match extractor.extract(&session.volume) {
            Ok(mesh) => mesh,
            Err(err) => return session.finish(SessionOutcome::Failed(err)),
        };
        let point_cloud = if self.point_cloud {
            match extractor.extract_point_cloud(&session.volume) {
                Ok(cloud) => Some(cloud),
                Err(err) => return session.finish(SessionOutcome::Failed(err)),
            }
        } else {
            None
        };
        let mesh = extractor.postprocess(mesh, &PostProcess::from_config(&self.config));
        let mut report = session.finish(SessionOutcome::Completed(mesh));
        report.point_cloud = point_cloud;
        report
    }

    fn cancelled(&self, mut session: ReconstructionSession) -> SessionReport {
        info!(
            "Session cancelled after {} of {} records",
            session.stats.frames_done, session.stats.frames_total
        );
        session.volume.clear();
        session.refresh_volume_stats();
        self.emit(&session, true);
        session.finish(SessionOutcome::Cancelled)
    }

    fn emit(&self, session: &ReconstructionSession, cancelled: bool) {
        if let Some(sender) = &self.progress {
            // the receiver may be gone; the run continues regardless
            let _ = sender.send(session.progress(cancelled));
        }
    }
}

/// Normalize a raw record and resolve its camera pose.
fn prepare(raw: RawFrame, resolver: &PoseResolver) -> Result<Frame, Rejection> {
    let color = normalize_color(
        &raw.color.data,
        raw.color.width,
        raw.color.height,
        raw.color.encoding,
    )
    .map_err(SkipReason::from)?;
    let (width, height) = color.dimensions();

    let depth = match &raw.depth {
        Some(d) => {
            let depth = normalize_depth(&d.data, d.width, d.height, d.encoding, d.scale)
                .map_err(SkipReason::from)?;
            Some(align_depth(&depth, width, height))
        }
        None => None,
    };

    let intrinsics = if (raw.intrinsics.width, raw.intrinsics.height) == (width, height) {
        raw.intrinsics
    } else {
        raw.intrinsics.scaled(width, height)
    };

    validate_pose(&raw.pose.matrix()).map_err(|err| SkipReason::MalformedPose(err.to_string()))?;
    let pose = resolver
        .resolve(raw.pose, raw.camera)
        .map_err(ReconstructionError::from)?;

    let frame = Frame::new(
        raw.index,
        raw.timestamp_ms,
        raw.camera,
        color,
        depth,
        pose,
        intrinsics,
    )
    .map_err(SkipReason::from)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ColorEncoding, DepthClass, PoseSource, RawColor, RawDepth, VecFrameSource};
    use crate::pipeline::sink::CollectingSink;
    use glam::Mat4;
    use voxfuse_data::Intrinsics;

    fn record(index: usize, timestamp_ms: i64, camera: CameraId) -> RawFrame {
        let (w, h) = (8, 8);
        RawFrame {
            index,
            timestamp_ms,
            camera,
            color: RawColor {
                data: vec![128; (w * h * 3) as usize],
                width: w,
                height: h,
                encoding: ColorEncoding::Rgb8,
            },
            depth: Some(RawDepth::from_meters(w, h, &vec![0.0; (w * h) as usize])),
            pose: PoseSource::Camera(Mat4::IDENTITY),
            intrinsics: Intrinsics::new(8.0, 8.0, 4.0, 4.0, w, h),
        }
    }

    #[test]
    fn test_group_reader_orders_cameras() {
        let mut source = VecFrameSource::new(vec![
            record(0, 10, CameraId::Right),
            record(1, 10, CameraId::Left),
            record(2, 20, CameraId::Left),
        ]);
        let mut reader = GroupReader::new(&mut source);
        let first = reader.next_group().unwrap().unwrap();
        assert_eq!(
            first.iter().map(|f| f.camera).collect::<Vec<_>>(),
            vec![CameraId::Left, CameraId::Right]
        );
        assert_eq!(reader.next_group().unwrap().unwrap().len(), 1);
        assert!(reader.next_group().unwrap().is_none());
    }

    #[test]
    fn test_group_reader_surfaces_unreadable_records() {
        let mut source = VecFrameSource::new(vec![record(0, 10, CameraId::Center)]);
        source.push_unreadable(1, "truncated");
        let mut reader = GroupReader::new(&mut source);
        assert_eq!(reader.next_group().unwrap().unwrap().len(), 1);
        assert!(matches!(
            reader.next_group(),
            Err(SourceError::Frame { index: 1, .. })
        ));
        assert!(reader.next_group().unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_fails_before_reading() {
        let config = ReconstructionConfig {
            voxel_size: 0.0,
            ..Default::default()
        };
        let mut controller = PipelineController::new(config, Capabilities::cpu_only());
        let mut source = VecFrameSource::new(vec![record(0, 0, CameraId::Center)]);
        let report = controller.run(&mut source);
        assert!(matches!(
            report.outcome,
            SessionOutcome::Failed(ReconstructionError::InvalidConfig(_))
        ));
        assert_eq!(report.stats.frames_done, 0);
        assert_eq!(controller.state(), PipelineState::Failed);
    }

    #[test]
    fn test_stereo_without_rig_is_missing_calibration() {
        let config = ReconstructionConfig {
            stereo_enabled: true,
            ..Default::default()
        };
        let mut controller = PipelineController::new(config, Capabilities::cpu_only());
        let mut source = VecFrameSource::new(vec![record(0, 0, CameraId::Left)]);
        let report = controller.run(&mut source);
        assert!(matches!(
            report.outcome,
            SessionOutcome::Failed(ReconstructionError::MissingCalibration(_))
        ));
    }

    #[test]
    fn test_rejected_depth_goes_to_color_sink() {
        let sink = CollectingSink::new();
        let mut controller =
            PipelineController::new(ReconstructionConfig::default(), Capabilities::cpu_only())
                .with_color_sink(Box::new(sink.clone()));
        let mut source = VecFrameSource::new(vec![
            record(0, 0, CameraId::Center),
            record(1, 1, CameraId::Center),
        ]);
        let report = controller.run(&mut source);

        let seen = sink.frames();
        assert_eq!(seen.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0, 1]);
        assert!(
            seen.iter()
                .all(|f| matches!(f.class, Some(DepthClass::Sparse { .. })))
        );
        assert_eq!(report.outcome, SessionOutcome::Failed(ReconstructionError::EmptyVolume));
        assert_eq!(report.stats.frames_skipped, 2);
        assert!(
            report
                .skipped
                .iter()
                .all(|s| matches!(s.reason, SkipReason::Sparse { .. }))
        );
    }
}
