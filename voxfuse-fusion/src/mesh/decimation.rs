//! Quadric-error edge-collapse decimation.
//!
//! Each vertex carries the sum of the plane quadrics of its faces, plus heavily
//! weighted planes through boundary edges so open borders keep their shape.
//! Collapses are taken cheapest-first from a lazily invalidated heap.

use glam::{DMat3, DVec3, Vec3};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;
use voxfuse_data::{Mesh, MeshVertex};

const BOUNDARY_WEIGHT: f64 = 1000.0;

/// Symmetric 4x4 error quadric, upper triangle stored row by row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Quadric([f64; 10]);

impl Quadric {
    fn plane(normal: DVec3, point: DVec3, weight: f64) -> Self {
        let (a, b, c) = (normal.x, normal.y, normal.z);
        let d = -normal.dot(point);
        Self(
            [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ]
            .map(|v| v * weight),
        )
    }

    fn add(&mut self, other: &Quadric) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a += b;
        }
    }

    fn sum(a: &Quadric, b: &Quadric) -> Quadric {
        let mut q = *a;
        q.add(b);
        q
    }

    fn error(&self, p: DVec3) -> f64 {
        let q = &self.0;
        let (x, y, z) = (p.x, p.y, p.z);
        q[0] * x * x
            + 2.0 * q[1] * x * y
            + 2.0 * q[2] * x * z
            + 2.0 * q[3] * x
            + q[4] * y * y
            + 2.0 * q[5] * y * z
            + 2.0 * q[6] * y
            + q[7] * z * z
            + 2.0 * q[8] * z
            + q[9]
    }

    /// Point minimizing the error, if the system is well conditioned.
    fn optimum(&self) -> Option<DVec3> {
        let q = &self.0;
        let m = DMat3::from_cols(
            DVec3::new(q[0], q[1], q[2]),
            DVec3::new(q[1], q[4], q[5]),
            DVec3::new(q[2], q[5], q[7]),
        );
        if m.determinant().abs() < 1e-12 {
            return None;
        }
        let p = m.inverse() * -DVec3::new(q[3], q[6], q[8]);
        p.is_finite().then_some(p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    cost: OrderedFloat<f64>,
    a: u32,
    b: u32,
    stamp: (u32, u32),
}

struct Collapser {
    positions: Vec<DVec3>,
    colors: Vec<Vec3>,
    quadrics: Vec<Quadric>,
    vertex_alive: Vec<bool>,
    version: Vec<u32>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<u32>>,
    live_faces: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl Collapser {
    fn new(mesh: &Mesh) -> Self {
        let n = mesh.vertex_count();
        let positions: Vec<DVec3> = mesh.vertices.iter().map(|v| v.position.as_dvec3()).collect();
        let colors = mesh
            .vertices
            .iter()
            .map(|v| Vec3::new(v.color[0] as f32, v.color[1] as f32, v.color[2] as f32))
            .collect();

        let mut vertex_faces = vec![Vec::new(); n];
        for (f, tri) in mesh.triangles.iter().enumerate() {
            for &v in tri {
                vertex_faces[v as usize].push(f as u32);
            }
        }

        let mut collapser = Self {
            positions,
            colors,
            quadrics: vec![Quadric::default(); n],
            vertex_alive: vec![true; n],
            version: vec![0; n],
            faces: mesh.triangles.clone(),
            face_alive: vec![true; mesh.triangle_count()],
            vertex_faces,
            live_faces: mesh.triangle_count(),
            heap: BinaryHeap::new(),
        };
        collapser.init_quadrics();

        let mut edges = HashSet::new();
        for tri in &collapser.faces {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                if a != b {
                    edges.insert((a.min(b), a.max(b)));
                }
            }
        }
        let mut edges: Vec<(u32, u32)> = edges.into_iter().collect();
        edges.sort_unstable();
        for (a, b) in edges {
            collapser.push_candidate(a, b);
        }
        collapser
    }

    fn face_normal(&self, tri: [u32; 3]) -> DVec3 {
        let [p0, p1, p2] = tri.map(|v| self.positions[v as usize]);
        (p1 - p0).cross(p2 - p0)
    }

    fn init_quadrics(&mut self) {
        let mut edge_use: HashMap<(u32, u32), (u32, usize)> = HashMap::new();
        for (f, tri) in self.faces.iter().enumerate() {
            let n = self.face_normal(*tri);
            let area2 = n.length();
            if area2 <= 0.0 {
                continue;
            }
            let q = Quadric::plane(n / area2, self.positions[tri[0] as usize], area2 * 0.5);
            for &v in tri {
                self.quadrics[v as usize].add(&q);
            }
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                let entry = edge_use.entry((a.min(b), a.max(b))).or_insert((0, f));
                entry.0 += 1;
            }
        }

        // constraint planes perpendicular to faces along open edges
        for ((a, b), (uses, f)) in edge_use {
            if uses != 1 {
                continue;
            }
            let n = self.face_normal(self.faces[f]).normalize_or_zero();
            let (pa, pb) = (self.positions[a as usize], self.positions[b as usize]);
            let edge = pb - pa;
            let side = edge.cross(n).normalize_or_zero();
            if side == DVec3::ZERO {
                continue;
            }
            let q = Quadric::plane(side, pa, BOUNDARY_WEIGHT * edge.length_squared());
            self.quadrics[a as usize].add(&q);
            self.quadrics[b as usize].add(&q);
        }
    }

    /// Cheapest placement for collapsing `a`-`b` and its cost.
    fn placement(&self, a: u32, b: u32) -> (DVec3, f64) {
        let q = Quadric::sum(&self.quadrics[a as usize], &self.quadrics[b as usize]);
        let (pa, pb) = (self.positions[a as usize], self.positions[b as usize]);
        let mid = (pa + pb) * 0.5;
        let reach = (pb - pa).length() * 2.0;

        let mut options = vec![pa, pb, mid];
        if let Some(p) = q.optimum().filter(|p| p.distance(mid) <= reach) {
            options.push(p);
        }
        options
            .into_iter()
            .map(|p| (p, q.error(p).max(0.0)))
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .unwrap_or((mid, 0.0))
    }

    fn push_candidate(&mut self, a: u32, b: u32) {
        let (_, cost) = self.placement(a, b);
        self.heap.push(Reverse(Candidate {
            cost: OrderedFloat(cost),
            a,
            b,
            stamp: (self.version[a as usize], self.version[b as usize]),
        }));
    }

    fn alive_faces(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .copied()
            .filter(|&f| self.face_alive[f as usize])
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        self.alive_faces(v)
            .flat_map(|f| self.faces[f as usize])
            .filter(|&u| u != v)
            .collect()
    }

    /// Checks that keep the mesh manifold, connected and unflipped.
    fn can_collapse(&self, a: u32, b: u32, target: DVec3, shared: &[u32]) -> bool {
        let common = self.neighbors(a).intersection(&self.neighbors(b)).count();
        if common > shared.len() {
            return false;
        }

        // every third vertex of a removed face must stay on a surviving face
        // with the merged vertex
        for &f in shared {
            let Some(c) = self.faces[f as usize].into_iter().find(|&v| v != a && v != b) else {
                continue;
            };
            let attached = self.alive_faces(c).any(|g| {
                !shared.contains(&g) && self.faces[g as usize].iter().any(|&v| v == a || v == b)
            });
            if !attached {
                return false;
            }
        }

        for v in [a, b] {
            for f in self.alive_faces(v) {
                if shared.contains(&f) {
                    continue;
                }
                let tri = self.faces[f as usize];
                let before = self.face_normal(tri);
                let moved = tri.map(|u| if u == a || u == b { u32::MAX } else { u });
                let [p0, p1, p2] =
                    moved.map(|u| if u == u32::MAX { target } else { self.positions[u as usize] });
                let after = (p1 - p0).cross(p2 - p0);
                if before.dot(after) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn collapse(&mut self, a: u32, b: u32, target: DVec3, shared: &[u32]) {
        let (pa, pb) = (self.positions[a as usize], self.positions[b as usize]);
        let span = (pb - pa).length_squared();
        let t = if span > 0.0 {
            ((target - pa).dot(pb - pa) / span).clamp(0.0, 1.0) as f32
        } else {
            0.5
        };
        self.colors[a as usize] = self.colors[a as usize].lerp(self.colors[b as usize], t);
        self.positions[a as usize] = target;
        let qb = self.quadrics[b as usize];
        self.quadrics[a as usize].add(&qb);

        for &f in shared {
            self.face_alive[f as usize] = false;
        }
        self.live_faces -= shared.len();

        let moved: Vec<u32> = self.alive_faces(b).collect();
        for f in moved {
            for v in self.faces[f as usize].iter_mut() {
                if *v == b {
                    *v = a;
                }
            }
            self.vertex_faces[a as usize].push(f);
        }
        self.vertex_faces[b as usize].clear();
        self.vertex_alive[b as usize] = false;
        self.version[a as usize] += 1;
        self.version[b as usize] += 1;

        let mut neighbors: Vec<u32> = self.neighbors(a).into_iter().collect();
        neighbors.sort_unstable();
        for n in neighbors {
            self.push_candidate(a.min(n), a.max(n));
        }
    }

    fn run(&mut self, target_faces: usize) {
        while self.live_faces > target_faces {
            let Some(Reverse(candidate)) = self.heap.pop() else {
                break;
            };
            let (a, b) = (candidate.a, candidate.b);
            if !self.vertex_alive[a as usize]
                || !self.vertex_alive[b as usize]
                || candidate.stamp != (self.version[a as usize], self.version[b as usize])
            {
                continue;
            }

            let shared: Vec<u32> = self
                .alive_faces(a)
                .filter(|&f| self.faces[f as usize].contains(&b))
                .collect();
            if shared.is_empty() {
                continue;
            }

            let (target, _) = self.placement(a, b);
            if self.can_collapse(a, b, target, &shared) {
                self.collapse(a, b, target, &shared);
            }
        }
    }

    fn into_mesh(self) -> Mesh {
        let vertices = self
            .positions
            .iter()
            .zip(&self.colors)
            .map(|(p, c)| {
                let rgb = c.round().clamp(Vec3::ZERO, Vec3::splat(255.0));
                MeshVertex::new(p.as_vec3(), [rgb.x as u8, rgb.y as u8, rgb.z as u8])
            })
            .collect();
        let triangles = self
            .faces
            .iter()
            .zip(&self.face_alive)
            .filter(|(_, alive)| **alive)
            .map(|(tri, _)| *tri)
            .collect();
        let mut mesh = Mesh::new(vertices, triangles);
        mesh.remove_unreferenced_vertices();
        mesh.compute_vertex_normals();
        mesh
    }
}

/// Simplify toward `ceil(triangles · ratio)` triangles.
///
/// Never adds triangles or splits a connected component. `ratio >= 1` returns
/// the mesh unchanged.
pub fn decimate(mesh: &Mesh, ratio: f32) -> Mesh {
    if ratio >= 1.0 || mesh.is_empty() {
        return mesh.clone();
    }
    let target = (mesh.triangle_count() as f64 * ratio.max(0.0) as f64).ceil() as usize;
    let mut collapser = Collapser::new(mesh);
    collapser.run(target);
    let out = collapser.into_mesh();
    debug!(
        "Decimated {} -> {} triangles (target {})",
        mesh.triangle_count(),
        out.triangle_count(),
        target
    );
    out
}
