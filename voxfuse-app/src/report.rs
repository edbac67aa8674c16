//! JSON summary of a run: outcome, counters and the skipped-frame log.

use crate::error::AppError;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use voxfuse_fusion::{SessionOutcome, SessionReport, SessionStats, SkippedFrame};

#[derive(Debug, Serialize)]
pub struct MeshSummary {
    pub path: PathBuf,
    pub vertices: usize,
    pub triangles: usize,
}

#[derive(Debug, Serialize)]
pub struct PointCloudSummary {
    pub path: PathBuf,
    pub points: usize,
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub dataset: &'a Path,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stats: SessionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_cloud: Option<PointCloudSummary>,
    pub skipped: &'a [SkippedFrame],
}

impl<'a> RunReport<'a> {
    pub fn new(
        dataset: &'a Path,
        report: &'a SessionReport,
        mesh: Option<MeshSummary>,
        point_cloud: Option<PointCloudSummary>,
    ) -> Self {
        let (outcome, error) = match &report.outcome {
            SessionOutcome::Completed(_) => ("completed", None),
            SessionOutcome::Cancelled => ("cancelled", None),
            SessionOutcome::Failed(err) => ("failed", Some(err.to_string())),
        };
        Self {
            dataset,
            outcome,
            error,
            stats: report.stats,
            mesh,
            point_cloud,
            skipped: &report.skipped,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
