//! Final mesh hygiene after post-processing.

use std::collections::{HashMap, HashSet};
use voxfuse_data::Mesh;

/// Merge vertices at bit-identical positions onto the first occurrence.
fn merge_duplicate_vertices(mesh: &mut Mesh) {
    let mut first: HashMap<[u32; 3], u32> = HashMap::new();
    let remap: Vec<u32> = mesh
        .vertices
        .iter()
        .enumerate()
        .map(|(i, v)| *first.entry(v.position.to_array().map(f32::to_bits)).or_insert(i as u32))
        .collect();
    for tri in &mut mesh.triangles {
        for v in tri.iter_mut() {
            *v = remap[*v as usize];
        }
    }
}

/// Drop triangles that repeat an index or repeat another triangle's vertex set.
fn drop_degenerate_triangles(mesh: &mut Mesh) {
    let mut seen = HashSet::new();
    mesh.triangles.retain(|&[a, b, c]| {
        if a == b || b == c || a == c {
            return false;
        }
        let mut key = [a, b, c];
        key.sort_unstable();
        seen.insert(key)
    });
}

/// Drop connected components with fewer than `min_triangles` triangles.
pub fn remove_small_components(mesh: &mut Mesh, min_triangles: usize) {
    if min_triangles == 0 || mesh.is_empty() {
        return;
    }
    let (labels, count) = mesh.triangle_components();
    let mut sizes = vec![0usize; count];
    for &label in &labels {
        sizes[label] += 1;
    }
    let mut labels = labels.into_iter();
    mesh.triangles
        .retain(|_| labels.next().is_some_and(|l| sizes[l] >= min_triangles));
}

/// Remove degenerate and duplicate geometry, optionally small islands, then
/// recompute vertex normals.
pub fn cleanup(mesh: &mut Mesh, min_component_triangles: usize) {
    merge_duplicate_vertices(mesh);
    drop_degenerate_triangles(mesh);
    remove_small_components(mesh, min_component_triangles);
    mesh.remove_unreferenced_vertices();
    mesh.compute_vertex_normals();
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use voxfuse_data::MeshVertex;

    fn vertex(x: f32, y: f32) -> MeshVertex {
        MeshVertex::new(Vec3::new(x, y, 0.0), [10, 20, 30])
    }

    #[test]
    fn test_drops_degenerate_and_duplicate_triangles() {
        let vertices = vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0)];
        let mut mesh = Mesh::new(vertices, vec![[0, 1, 2], [1, 2, 0], [0, 0, 1], [2, 1, 0]]);
        cleanup(&mut mesh, 0);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
        assert!((mesh.vertices[0].normal - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_merges_coincident_vertices() {
        let vertices = vec![
            vertex(0.0, 0.0),
            vertex(1.0, 0.0),
            vertex(0.0, 1.0),
            vertex(1.0, 0.0),
            vertex(1.0, 1.0),
        ];
        let mut mesh = Mesh::new(vertices, vec![[0, 1, 2], [3, 4, 2]]);
        cleanup(&mut mesh, 0);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.connected_components(), 1);
    }

    #[test]
    fn test_small_components_removed_and_vertices_compacted() {
        let mut vertices = vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0), vertex(1.0, 1.0)];
        vertices.extend([vertex(5.0, 0.0), vertex(6.0, 0.0), vertex(5.0, 1.0)]);
        let mut mesh = Mesh::new(vertices, vec![[0, 1, 2], [1, 3, 2], [4, 5, 6]]);

        let mut kept = mesh.clone();
        cleanup(&mut kept, 0);
        assert_eq!(kept.triangle_count(), 3);

        cleanup(&mut mesh, 2);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }
}
