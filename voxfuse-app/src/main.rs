mod app;
mod error;
mod report;

use app::{ConfigOverrides, LoggingConfig, RunOptions};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use voxfuse_capture::CameraSelection;
use voxfuse_data::MeshFormat;

#[derive(Parser, Debug)]
#[command(name = "voxfuse")]
#[command(about = "Reconstruct a colored mesh from a headset RGB-D capture")]
struct Args {
    /// Capture directory (frames.json or legacy hmd_poses.csv layout)
    dataset: PathBuf,

    /// JSON reconstruction config; CLI flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera stream(s) to integrate: left, right or both
    #[arg(long, default_value = "left")]
    camera: CameraSelection,

    /// Integrate every n-th timestamp
    #[arg(long)]
    frame_interval: Option<u32>,

    /// Voxel edge length in meters
    #[arg(long)]
    voxel_size: Option<f32>,

    /// Truncation distance in meters
    #[arg(long)]
    truncation: Option<f32>,

    /// Laplacian smoothing iterations
    #[arg(long)]
    smooth: Option<u32>,

    /// Fraction of triangles kept by decimation, in (0, 1]
    #[arg(long)]
    decimate: Option<f32>,

    /// Derive left/right eye poses from the head pose
    #[arg(long)]
    stereo: bool,

    /// Stereo baseline in meters, overriding the capture's calibration
    #[arg(long)]
    baseline: Option<f32>,

    /// Integrate on the GPU when an adapter is available
    #[arg(long)]
    use_gpu: bool,

    /// Output mesh path (defaults to <dataset>/mesh.ply)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format; inferred from the output extension when omitted
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Also write the reconstructed surface as a PLY point cloud
    #[arg(long, value_name = "PATH")]
    point_cloud: Option<PathBuf>,

    /// Write a JSON run report (stats and skipped frames)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    quiet: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Stream spans to Tracy (requires the `tracy` feature)
    #[arg(long)]
    tracy: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Ply,
    Obj,
}

impl From<FormatArg> for MeshFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Ply => MeshFormat::Ply,
            FormatArg::Obj => MeshFormat::Obj,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    LoggingConfig {
        level: args.log_level.clone(),
        enable_tracy: args.tracy,
    }
    .init();

    let options = RunOptions {
        output: args
            .output
            .clone()
            .unwrap_or_else(|| app::default_output(&args.dataset)),
        dataset: args.dataset,
        config_path: args.config,
        camera: args.camera,
        overrides: ConfigOverrides {
            frame_interval: args.frame_interval,
            voxel_size: args.voxel_size,
            truncation_distance: args.truncation,
            smooth_iterations: args.smooth,
            decimate_ratio: args.decimate,
            stereo: args.stereo,
            stereo_baseline: args.baseline,
            use_gpu: args.use_gpu,
        },
        format: args.format.map(MeshFormat::from),
        point_cloud: args.point_cloud,
        report: args.report,
        show_progress: !args.quiet,
    };

    match app::run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
