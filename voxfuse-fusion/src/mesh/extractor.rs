//! Surface nets over the zero level of the TSDF.

use crate::error::ReconstructionError;
use crate::volume::{BlockMap, Volume, Voxel, block_of};
use glam::{IVec3, Vec3};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::info;
use voxfuse_data::{CloudPoint, Mesh, MeshVertex, PointCloud};

const CORNERS: [IVec3; 8] = [
    IVec3::new(0, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(1, 0, 1),
    IVec3::new(0, 1, 1),
    IVec3::new(1, 1, 1),
];

// Corner index pairs of the 12 cube edges.
const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Global voxel lookup over a block snapshot, returning only observed voxels.
struct Lattice<'a> {
    blocks: &'a BlockMap,
    resolution: u32,
}

impl Lattice<'_> {
    fn observed(&self, index: IVec3) -> Option<&Voxel> {
        let (block, local) = block_of(index, self.resolution);
        self.blocks
            .get(&block)
            .map(|b| b.get(local))
            .filter(|v| v.is_observed())
    }

    fn corners(&self, cell: IVec3) -> Option<[&Voxel; 8]> {
        let mut out = [self.observed(cell)?; 8];
        for (slot, offset) in out.iter_mut().zip(CORNERS).skip(1) {
            *slot = self.observed(cell + offset)?;
        }
        Some(out)
    }
}

/// Place the vertex of `cell` at the mean of its edge zero crossings.
fn cell_vertex(cell: IVec3, corners: &[&Voxel; 8], voxel_size: f32) -> Option<MeshVertex> {
    let mut position = Vec3::ZERO;
    let mut color = Vec3::ZERO;
    let mut crossings = 0;
    for (a, b) in EDGES {
        let (va, vb) = (corners[a], corners[b]);
        if (va.tsdf < 0.0) == (vb.tsdf < 0.0) {
            continue;
        }
        let t = va.tsdf / (va.tsdf - vb.tsdf);
        let pa = CORNERS[a].as_vec3();
        let pb = CORNERS[b].as_vec3();
        position += pa.lerp(pb, t);
        color += Vec3::from_array(va.color).lerp(Vec3::from_array(vb.color), t);
        crossings += 1;
    }
    if crossings == 0 {
        return None;
    }

    let n = crossings as f32;
    // voxel centers sit at (index + 0.5) * voxel_size
    let local = position / n + Vec3::splat(0.5);
    let world = (cell.as_vec3() + local) * voxel_size;
    let rgb = (color / n).round().clamp(Vec3::ZERO, Vec3::splat(255.0));
    Some(MeshVertex::new(world, [rgb.x as u8, rgb.y as u8, rgb.z as u8]))
}

/// Converts a volume into a triangle mesh.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshExtractor;

impl MeshExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the zero level set. Fails with `EmptyVolume` when no voxel has
    /// been observed.
    #[tracing::instrument(skip_all, fields(blocks = volume.block_count()))]
    pub fn extract(&self, volume: &Volume) -> Result<Mesh, ReconstructionError> {
        let snapshot = volume.snapshot()?;
        let blocks: &BlockMap = &snapshot;
        ensure_observed(blocks)?;

        let resolution = volume.block_resolution();
        let voxel_size = volume.voxel_size();
        let lattice = Lattice { blocks, resolution };

        let mut coords: Vec<IVec3> = blocks.keys().copied().collect();
        coords.sort_unstable_by_key(|c| (c.x, c.y, c.z));

        let r = resolution as i32;

        // vertex pass
        let per_block: Vec<Vec<(IVec3, MeshVertex)>> = coords
            .par_iter()
            .map(|&coord| {
                block_cells(coord, r)
                    .filter_map(|cell| {
                        let corners = lattice.corners(cell)?;
                        cell_vertex(cell, &corners, voxel_size).map(|v| (cell, v))
                    })
                    .collect()
            })
            .collect();

        let mut vertices = Vec::new();
        let mut cell_index: HashMap<IVec3, u32> = HashMap::new();
        for (cell, vertex) in per_block.into_iter().flatten() {
            cell_index.insert(cell, vertices.len() as u32);
            vertices.push(vertex);
        }

        // face pass: one quad per sign-changing lattice edge
        let per_block: Vec<Vec<[u32; 3]>> = coords
            .par_iter()
            .map(|&coord| {
                let mut triangles = Vec::new();
                for p in block_cells(coord, r) {
                    let Some(vp) = lattice.observed(p) else { continue };
                    for axis in 0..3 {
                        emit_quad(&lattice, &cell_index, p, vp, axis, &mut triangles);
                    }
                }
                triangles
            })
            .collect();
        let triangles: Vec<[u32; 3]> = per_block.into_iter().flatten().collect();

        let mut mesh = Mesh::new(vertices, triangles);
        mesh.compute_vertex_normals();
        info!(
            "Extracted {} vertices, {} triangles",
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }
}

impl MeshExtractor {
    /// Sample the zero level set as colored points: one point per sign change
    /// between observed neighbours along each lattice axis, interpolated like
    /// the mesh vertices. Fails with `EmptyVolume` like [`Self::extract`].
    #[tracing::instrument(skip_all, fields(blocks = volume.block_count()))]
    pub fn extract_point_cloud(&self, volume: &Volume) -> Result<PointCloud, ReconstructionError> {
        let snapshot = volume.snapshot()?;
        let blocks: &BlockMap = &snapshot;
        ensure_observed(blocks)?;

        let resolution = volume.block_resolution();
        let voxel_size = volume.voxel_size();
        let lattice = Lattice { blocks, resolution };
        let mut coords: Vec<IVec3> = blocks.keys().copied().collect();
        coords.sort_unstable_by_key(|c| (c.x, c.y, c.z));

        let r = resolution as i32;
        let per_block: Vec<Vec<CloudPoint>> = coords
            .par_iter()
            .map(|&coord| {
                let mut points = Vec::new();
                for p in block_cells(coord, r) {
                    let Some(vp) = lattice.observed(p) else { continue };
                    for axis in IVec3::AXES {
                        let Some(vq) = lattice.observed(p + axis) else { continue };
                        if (vp.tsdf < 0.0) == (vq.tsdf < 0.0) {
                            continue;
                        }
                        let t = vp.tsdf / (vp.tsdf - vq.tsdf);
                        let center = p.as_vec3() + Vec3::splat(0.5);
                        let position = (center + axis.as_vec3() * t) * voxel_size;
                        let rgb = Vec3::from_array(vp.color)
                            .lerp(Vec3::from_array(vq.color), t)
                            .round()
                            .clamp(Vec3::ZERO, Vec3::splat(255.0));
                        points.push(CloudPoint {
                            position,
                            color: [rgb.x as u8, rgb.y as u8, rgb.z as u8],
                        });
                    }
                }
                points
            })
            .collect();

        let cloud = PointCloud::new(per_block.into_iter().flatten().collect());
        info!("Extracted {} surface points", cloud.len());
        Ok(cloud)
    }
}

fn ensure_observed(blocks: &BlockMap) -> Result<(), ReconstructionError> {
    if blocks.values().any(|b| b.voxels().iter().any(Voxel::is_observed)) {
        Ok(())
    } else {
        Err(ReconstructionError::EmptyVolume)
    }
}

/// Global indices of every voxel in block `coord`.
fn block_cells(coord: IVec3, r: i32) -> impl Iterator<Item = IVec3> {
    let origin = coord * r;
    (0..r).flat_map(move |z| {
        (0..r).flat_map(move |y| (0..r).map(move |x| origin + IVec3::new(x, y, z)))
    })
}

fn emit_quad(
    lattice: &Lattice<'_>,
    cell_index: &HashMap<IVec3, u32>,
    p: IVec3,
    vp: &Voxel,
    axis: usize,
    triangles: &mut Vec<[u32; 3]>,
) {
    let ea = IVec3::AXES[axis];
    let eb = IVec3::AXES[(axis + 1) % 3];
    let ec = IVec3::AXES[(axis + 2) % 3];

    let Some(vq) = lattice.observed(p + ea) else { return };
    let inside_p = vp.tsdf < 0.0;
    if inside_p == (vq.tsdf < 0.0) {
        return;
    }

    // the four cells sharing edge p -> p + ea, counter-clockwise about +ea
    let cells = [p - eb - ec, p - ec, p, p - eb];
    let mut quad = [0u32; 4];
    for (slot, cell) in quad.iter_mut().zip(cells) {
        match cell_index.get(&cell) {
            Some(&i) => *slot = i,
            None => return,
        }
    }

    let [a, b, c, d] = quad;
    if inside_p {
        // tsdf rises along +ea, so the normal points along +ea
        triangles.push([a, b, c]);
        triangles.push([a, c, d]);
    } else {
        triangles.push([a, c, b]);
        triangles.push([a, d, c]);
    }
}
