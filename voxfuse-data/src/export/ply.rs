use crate::mesh::Mesh;
use crate::point_cloud::PointCloud;
use std::io::{self, Write};

/// Write an ASCII PLY with positions, normals and vertex colors.
pub fn write_ply<W: Write>(mesh: &Mesh, out: &mut W) -> io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "comment generated by voxfuse")?;
    writeln!(out, "element vertex {}", mesh.vertex_count())?;
    for axis in ["x", "y", "z", "nx", "ny", "nz"] {
        writeln!(out, "property float {axis}")?;
    }
    for channel in ["red", "green", "blue"] {
        writeln!(out, "property uchar {channel}")?;
    }
    writeln!(out, "element face {}", mesh.triangle_count())?;
    writeln!(out, "property list uchar int vertex_indices")?;
    writeln!(out, "end_header")?;

    for v in &mesh.vertices {
        let p = v.position;
        let n = v.normal;
        let [r, g, b] = v.color;
        writeln!(
            out,
            "{} {} {} {} {} {} {r} {g} {b}",
            p.x, p.y, p.z, n.x, n.y, n.z
        )?;
    }
    for [a, b, c] in &mesh.triangles {
        writeln!(out, "3 {a} {b} {c}")?;
    }
    out.flush()
}

/// Write an ASCII PLY holding only colored vertices.
pub fn write_point_cloud_ply<W: Write>(cloud: &PointCloud, out: &mut W) -> io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "comment generated by voxfuse")?;
    writeln!(out, "element vertex {}", cloud.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(out, "property float {axis}")?;
    }
    for channel in ["red", "green", "blue"] {
        writeln!(out, "property uchar {channel}")?;
    }
    writeln!(out, "end_header")?;

    for point in &cloud.points {
        let p = point.position;
        let [r, g, b] = point.color;
        writeln!(out, "{} {} {} {r} {g} {b}", p.x, p.y, p.z)?;
    }
    out.flush()
}
