//! Indexed triangle mesh produced by surface extraction.

use glam::Vec3;

/// A mesh vertex with position, unit normal and 8-bit color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: [u8; 3],
}

impl MeshVertex {
    pub fn new(position: Vec3, color: [u8; 3]) -> Self {
        Self {
            position,
            normal: Vec3::ZERO,
            color,
        }
    }
}

/// Ordered vertex list plus triangle index list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(vertices: Vec<MeshVertex>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Axis-aligned bounds of all vertices.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.vertices.first()?.position;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), v| {
            (lo.min(v.position), hi.max(v.position))
        }))
    }

    /// Compute the (non-normalized) normal of triangle `index`.
    pub fn triangle_normal(&self, index: usize) -> Vec3 {
        let [a, b, c] = self.triangles[index];
        let p0 = self.vertices[a as usize].position;
        let p1 = self.vertices[b as usize].position;
        let p2 = self.vertices[c as usize].position;
        (p1 - p0).cross(p2 - p0)
    }

    /// Recompute area-weighted vertex normals from the triangles.
    pub fn compute_vertex_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];
        for i in 0..self.triangles.len() {
            let n = self.triangle_normal(i);
            for &v in &self.triangles[i] {
                accum[v as usize] += n;
            }
        }
        for (vertex, n) in self.vertices.iter_mut().zip(accum) {
            vertex.normal = n.normalize_or_zero();
        }
    }

    /// Per-vertex neighbour lists (vertices sharing a triangle edge).
    pub fn vertex_neighbors(&self) -> Vec<Vec<u32>> {
        let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); self.vertices.len()];
        for tri in &self.triangles {
            for k in 0..3 {
                let a = tri[k];
                let b = tri[(k + 1) % 3];
                neighbors[a as usize].push(b);
                neighbors[b as usize].push(a);
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }
        neighbors
    }

    /// Label each triangle with its connected component.
    ///
    /// Triangles are connected when they share a vertex. Returns the labels and
    /// the number of components.
    pub fn triangle_components(&self) -> (Vec<usize>, usize) {
        let mut sets = DisjointSet::new(self.vertices.len());
        for tri in &self.triangles {
            sets.union(tri[0] as usize, tri[1] as usize);
            sets.union(tri[0] as usize, tri[2] as usize);
        }

        let mut root_label = std::collections::HashMap::new();
        let labels = self
            .triangles
            .iter()
            .map(|tri| {
                let root = sets.find(tri[0] as usize);
                let next = root_label.len();
                *root_label.entry(root).or_insert(next)
            })
            .collect();
        (labels, root_label.len())
    }

    /// Number of connected components among the triangles.
    pub fn connected_components(&self) -> usize {
        self.triangle_components().1
    }

    /// Drop vertices no triangle references and remap indices.
    pub fn remove_unreferenced_vertices(&mut self) {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        for tri in &self.triangles {
            for &v in tri {
                remap[v as usize] = 0;
            }
        }

        let mut kept = Vec::with_capacity(self.vertices.len());
        for (i, vertex) in self.vertices.iter().enumerate() {
            if remap[i] != u32::MAX {
                remap[i] = kept.len() as u32;
                kept.push(*vertex);
            }
        }

        for tri in &mut self.triangles {
            for v in tri.iter_mut() {
                *v = remap[*v as usize];
            }
        }
        self.vertices = kept;
    }
}

/// Union-find over vertex indices.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
