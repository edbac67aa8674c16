//! Mesh writers (PLY and OBJ text formats)

mod obj;
mod ply;

pub use obj::write_obj;
pub use ply::{write_point_cloud_ply, write_ply};

use crate::mesh::Mesh;
use crate::point_cloud::PointCloud;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported mesh format: {0}")]
    UnsupportedFormat(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output format for [`save_mesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Ply,
    Obj,
}

impl MeshFormat {
    /// Pick the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "ply" => Ok(Self::Ply),
            "obj" => Ok(Self::Obj),
            _ => Err(ExportError::UnsupportedFormat(ext)),
        }
    }
}

/// Write `mesh` to `path` in the given format.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn save_mesh(mesh: &Mesh, path: &Path, format: MeshFormat) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        MeshFormat::Ply => write_ply(mesh, &mut writer)?,
        MeshFormat::Obj => write_obj(mesh, &mut writer)?,
    }
    info!(
        "Wrote {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(())
}

/// Write `cloud` to `path` as PLY. Point clouds have no OBJ form here.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn save_point_cloud(cloud: &PointCloud, path: &Path) -> Result<(), ExportError> {
    if MeshFormat::from_path(path)? != MeshFormat::Ply {
        return Err(ExportError::UnsupportedFormat("obj".to_string()));
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_point_cloud_ply(cloud, &mut writer)?;
    info!("Wrote {} points", cloud.len());
    Ok(())
}
