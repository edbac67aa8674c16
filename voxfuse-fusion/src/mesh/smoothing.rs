//! Uniform Laplacian smoothing.

use glam::Vec3;
use voxfuse_data::Mesh;

/// Step size of each smoothing iteration.
pub const LAPLACIAN_LAMBDA: f32 = 0.5;

/// Move every vertex `lambda` of the way toward the mean of its neighbours,
/// `iterations` times. Isolated vertices stay put.
pub fn laplacian_smooth(mesh: &mut Mesh, iterations: u32, lambda: f32) {
    if iterations == 0 || mesh.is_empty() {
        return;
    }
    let neighbors = mesh.vertex_neighbors();
    let mut positions: Vec<Vec3> = mesh.vertices.iter().map(|v| v.position).collect();
    let mut next = positions.clone();

    for _ in 0..iterations {
        for (i, adjacent) in neighbors.iter().enumerate() {
            if adjacent.is_empty() {
                continue;
            }
            let mean = adjacent.iter().map(|&j| positions[j as usize]).sum::<Vec3>()
                / adjacent.len() as f32;
            next[i] = positions[i] + lambda * (mean - positions[i]);
        }
        std::mem::swap(&mut positions, &mut next);
    }

    for (vertex, p) in mesh.vertices.iter_mut().zip(positions) {
        vertex.position = p;
    }
}
