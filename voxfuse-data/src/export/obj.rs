use crate::mesh::Mesh;
use std::io::{self, Write};

/// Write a Wavefront OBJ. Vertex colors use the common `v x y z r g b` extension
/// with channels in 0..=1.
pub fn write_obj<W: Write>(mesh: &Mesh, out: &mut W) -> io::Result<()> {
    writeln!(out, "# voxfuse mesh")?;
    writeln!(
        out,
        "# {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.triangle_count()
    )?;
    for v in &mesh.vertices {
        let p = v.position;
        let [r, g, b] = v.color.map(|c| c as f32 / 255.0);
        writeln!(out, "v {} {} {} {r:.4} {g:.4} {b:.4}", p.x, p.y, p.z)?;
    }
    for v in &mesh.vertices {
        let n = v.normal;
        writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
    }
    // OBJ indices are 1-based
    for tri in &mesh.triangles {
        let [a, b, c] = tri.map(|i| i + 1);
        writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshVertex;
    use glam::Vec3;

    #[test]
    fn test_obj_uses_one_based_indices() {
        let mesh = Mesh::new(
            vec![
                MeshVertex::new(Vec3::ZERO, [255, 0, 0]),
                MeshVertex::new(Vec3::X, [0, 255, 0]),
                MeshVertex::new(Vec3::Y, [0, 0, 255]),
            ],
            vec![[0, 1, 2]],
        );
        let mut buf = Vec::new();
        write_obj(&mesh, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("v 0 0 0 1.0000 0.0000 0.0000"));
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), 3);
        assert!(text.contains("f 1//1 2//2 3//3"));
    }
}
