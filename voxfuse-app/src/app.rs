use crate::error::AppError;
use crate::report::{MeshSummary, PointCloudSummary, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use voxfuse_capture::{CameraSelection, DatasetSource};
use voxfuse_data::{MeshFormat, save_mesh, save_point_cloud};
use voxfuse_fusion::{
    CancelToken, Capabilities, PipelineController, ReconstructionConfig, ReconstructionWorker,
    SessionOutcome, SessionReport, WorkerHandle,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub enable_tracy: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_tracy: false,
        }
    }
}

impl LoggingConfig {
    pub fn init(&self) {
        #[cfg(feature = "tracy")]
        {
            if self.enable_tracy {
                use tracing_subscriber::Layer;
                use tracing_subscriber::layer::SubscriberExt;
                use tracing_subscriber::util::SubscriberInitExt;
                tracing_subscriber::registry()
                    .with(tracing_tracy::TracyLayer::default())
                    .with(
                        tracing_subscriber::fmt::layer().with_target(false).with_filter(
                            tracing_subscriber::EnvFilter::try_from_default_env()
                                .unwrap_or_else(|_| self.level.clone().into()),
                        ),
                    )
                    .init();
                return;
            }
        }

        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.level)),
            )
            .with_target(false)
            .init();
    }
}

/// Overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub frame_interval: Option<u32>,
    pub voxel_size: Option<f32>,
    pub truncation_distance: Option<f32>,
    pub smooth_iterations: Option<u32>,
    pub decimate_ratio: Option<f32>,
    pub stereo: bool,
    pub stereo_baseline: Option<f32>,
    pub use_gpu: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ReconstructionConfig) {
        if let Some(v) = self.frame_interval {
            config.frame_interval = v;
        }
        if let Some(v) = self.voxel_size {
            config.voxel_size = v;
        }
        if let Some(v) = self.truncation_distance {
            config.truncation_distance = v;
        }
        if let Some(v) = self.smooth_iterations {
            config.smooth_iterations = v;
        }
        if let Some(v) = self.decimate_ratio {
            config.decimate_ratio = v;
        }
        if let Some(v) = self.stereo_baseline {
            config.stereo_baseline = Some(v);
        }
        config.stereo_enabled |= self.stereo;
        config.use_gpu |= self.use_gpu;
    }
}

/// One reconstruction run as requested on the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dataset: PathBuf,
    pub config_path: Option<PathBuf>,
    pub camera: CameraSelection,
    pub overrides: ConfigOverrides,
    pub output: PathBuf,
    pub format: Option<MeshFormat>,
    /// Also write the surface samples as a PLY point cloud
    pub point_cloud: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub show_progress: bool,
}

impl RunOptions {
    /// Loaded config with overrides applied, validated.
    pub fn resolve_config(&self) -> Result<ReconstructionConfig, AppError> {
        let mut config = match &self.config_path {
            Some(path) => ReconstructionConfig::from_json_file(path)?,
            None => ReconstructionConfig::default(),
        };
        self.overrides.apply(&mut config);
        if self.camera == CameraSelection::Both {
            config.stereo_enabled = true;
        }
        config.validate()?;
        Ok(config)
    }

    fn mesh_format(&self) -> Result<MeshFormat, AppError> {
        match self.format {
            Some(format) => Ok(format),
            None => Ok(MeshFormat::from_path(&self.output)?),
        }
    }
}

pub fn run(options: &RunOptions) -> Result<(), AppError> {
    let config = options.resolve_config()?;
    let format = options.mesh_format()?;
    info!(
        "Reconstructing {} (camera: {}, voxel size {} m)",
        options.dataset.display(),
        options.camera,
        config.voxel_size
    );

    let source = DatasetSource::open(&options.dataset, options.camera)?;
    let capabilities = Capabilities::detect(config.use_gpu);
    let controller = PipelineController::new(config, capabilities)
        .with_point_cloud(options.point_cloud.is_some());
    let worker = ReconstructionWorker::spawn(controller, source)?;
    cancel_on_interrupt(worker.cancel_token())?;

    let bar = if options.show_progress {
        Some(progress_bar()?)
    } else {
        None
    };
    let report = await_report(worker, bar.as_ref())?;
    conclude(options, format, &report)
}

/// Ctrl-C requests a cooperative stop; the worker finishes the current frame.
fn cancel_on_interrupt(token: CancelToken) -> Result<(), AppError> {
    ctrlc::set_handler(move || {
        if !token.is_cancelled() {
            warn!("Interrupt received, cancelling after the current frame");
        }
        token.cancel();
    })?;
    Ok(())
}

/// Drain progress snapshots until the worker exits, then join it.
fn await_report(
    worker: WorkerHandle,
    bar: Option<&ProgressBar>,
) -> Result<SessionReport, AppError> {
    for update in worker.progress().iter() {
        let Some(bar) = bar else { continue };
        bar.set_length(update.frames_total as u64);
        bar.set_position(update.frames_done as u64);
        if update.cancelled {
            bar.set_message("cancelling");
        } else {
            bar.set_message(format!(
                "{} blocks, {} skipped",
                update.blocks_allocated, update.frames_skipped
            ));
        }
    }
    let report = worker.join()?;
    if let Some(bar) = bar {
        bar.finish_with_message(outcome_label(&report.outcome));
    }
    Ok(report)
}

/// Write the outputs of a finished session and map its outcome to a result.
fn conclude(
    options: &RunOptions,
    format: MeshFormat,
    report: &SessionReport,
) -> Result<(), AppError> {
    let mesh = match &report.outcome {
        SessionOutcome::Completed(mesh) => {
            save_mesh(mesh, &options.output, format)?;
            Some(MeshSummary {
                path: options.output.clone(),
                vertices: mesh.vertex_count(),
                triangles: mesh.triangle_count(),
            })
        }
        _ => None,
    };
    let points = match (&options.point_cloud, &report.point_cloud) {
        (Some(path), Some(cloud)) => {
            save_point_cloud(cloud, path)?;
            Some(PointCloudSummary {
                path: path.clone(),
                points: cloud.len(),
            })
        }
        _ => None,
    };

    log_skipped(report);
    if let Some(path) = &options.report {
        RunReport::new(&options.dataset, report, mesh, points).write(path)?;
        info!("Report written to {}", path.display());
    }

    match &report.outcome {
        SessionOutcome::Completed(_) => Ok(()),
        SessionOutcome::Cancelled => Err(AppError::Cancelled),
        SessionOutcome::Failed(err) => Err(err.clone().into()),
    }
}

fn progress_bar() -> Result<ProgressBar, AppError> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) {msg}")?
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    bar.set_message("opening dataset");
    Ok(bar)
}

fn outcome_label(outcome: &SessionOutcome) -> &'static str {
    match outcome {
        SessionOutcome::Completed(_) => "done",
        SessionOutcome::Cancelled => "cancelled",
        SessionOutcome::Failed(_) => "failed",
    }
}

fn log_skipped(report: &SessionReport) {
    if report.skipped.is_empty() {
        return;
    }
    warn!(
        "{} of {} frames skipped",
        report.skipped.len(),
        report.stats.frames_total
    );
}

/// Default output path next to the dataset when none is given.
pub fn default_output(dataset: &Path) -> PathBuf {
    dataset.join("mesh.ply")
}
