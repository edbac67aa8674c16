//! Surface extraction and mesh post-processing.

pub mod cleanup;
pub mod decimation;
pub mod extractor;
pub mod smoothing;

pub use cleanup::{cleanup, remove_small_components};
pub use decimation::decimate;
pub use extractor::MeshExtractor;
pub use smoothing::{LAPLACIAN_LAMBDA, laplacian_smooth};

use crate::config::ReconstructionConfig;
use tracing::info;
use voxfuse_data::Mesh;

/// Post-processing applied to an extracted mesh, in order: smoothing,
/// decimation, cleanup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcess {
    pub smooth_iterations: u32,
    pub decimate_target_ratio: f32,
    pub min_component_triangles: usize,
}

impl Default for PostProcess {
    fn default() -> Self {
        Self {
            smooth_iterations: 0,
            decimate_target_ratio: 1.0,
            min_component_triangles: 0,
        }
    }
}

impl PostProcess {
    pub fn from_config(config: &ReconstructionConfig) -> Self {
        Self {
            smooth_iterations: config.smooth_iterations,
            decimate_target_ratio: config.decimate_ratio,
            min_component_triangles: config.min_component_triangles,
        }
    }
}

impl MeshExtractor {
    pub fn postprocess(&self, mut mesh: Mesh, options: &PostProcess) -> Mesh {
        let before = mesh.triangle_count();
        laplacian_smooth(&mut mesh, options.smooth_iterations, LAPLACIAN_LAMBDA);
        let mut mesh = decimate(&mesh, options.decimate_target_ratio);
        cleanup(&mut mesh, options.min_component_triangles);
        info!(
            "Post-processed mesh: {} -> {} triangles, {} vertices",
            before,
            mesh.triangle_count(),
            mesh.vertex_count()
        );
        mesh
    }
}
