//! Core data types: point samples and the output polygon mesh.

use nalgebra::{Point3, Vector3};

/// RGB color with 8-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl VertexColor {
    /// Create a new color from RGB components.
    #[inline]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a color from floating point values in [0, 1] range.
    #[inline]
    pub fn from_float(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: (r.clamp(0.0, 1.0) * 255.0) as u8,
            g: (g.clamp(0.0, 1.0) * 255.0) as u8,
            b: (b.clamp(0.0, 1.0) * 255.0) as u8,
        }
    }
}

/// A single point sample from the input cloud.
#[derive(Debug, Clone)]
pub struct PointSample {
    /// 3D position.
    pub position: Point3<f64>,

    /// Unit normal vector (from the scanner or estimated upstream).
    pub normal: Option<Vector3<f64>>,

    /// Point color (RGB).
    pub color: Option<VertexColor>,
}

impl PointSample {
    /// Create a sample with only position set.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            color: None,
        }
    }

    /// Create a sample from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Create a sample with position and normal.
    #[inline]
    pub fn with_normal(position: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            position,
            normal: Some(normal),
            color: None,
        }
    }
}

/// A polygonal mesh with indexed vertices and ordered face loops.
///
/// Unlike a triangle mesh, each face is an arbitrary-length loop of vertex
/// indices; reconstruction outputs one loop per selected planar face.
/// Winding is counter-clockwise when viewed from outside for closed
/// components.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolygonMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,

    /// Face loops as indices into the vertex array.
    pub faces: Vec<Vec<u32>>,
}

impl PolygonMesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices in the mesh.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces in the mesh.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty (no vertices or faces).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Compute the axis-aligned bounding box.
    /// Returns (min_corner, max_corner) or None if the mesh is empty.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        if self.vertices.is_empty() {
            return None;
        }

        let mut min = self.vertices[0];
        let mut max = self.vertices[0];

        for p in &self.vertices[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some((min, max))
    }

    /// Total surface area, summing fan-triangulated face areas.
    pub fn surface_area(&self) -> f64 {
        let mut area = 0.0;
        for face in &self.faces {
            for i in 1..face.len().saturating_sub(1) {
                let a = &self.vertices[face[0] as usize];
                let b = &self.vertices[face[i] as usize];
                let c = &self.vertices[face[i + 1] as usize];
                area += 0.5 * (b - a).cross(&(c - a)).norm();
            }
        }
        area
    }

    /// Signed volume via the divergence theorem over fan-triangulated faces.
    ///
    /// Positive for a closed mesh with outward-facing (CCW from outside)
    /// winding; not meaningful for open meshes.
    pub fn signed_volume(&self) -> f64 {
        let mut volume = 0.0;
        for face in &self.faces {
            for i in 1..face.len().saturating_sub(1) {
                let v0 = self.vertices[face[0] as usize].coords;
                let v1 = self.vertices[face[i] as usize].coords;
                let v2 = self.vertices[face[i + 1] as usize].coords;
                volume += v0.dot(&v1.cross(&v2)) / 6.0;
            }
        }
        volume
    }

    /// Reverse the winding of every face loop.
    pub fn flip(&mut self) {
        for face in &mut self.faces {
            face.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square_mesh() -> PolygonMesh {
        PolygonMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2, 3]],
        }
    }

    #[test]
    fn quad_area() {
        let mesh = unit_square_mesh();
        assert_relative_eq!(mesh.surface_area(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let mesh = unit_square_mesh();
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn empty_mesh_has_no_bounds() {
        let mesh = PolygonMesh::new();
        assert!(mesh.is_empty());
        assert!(mesh.bounds().is_none());
    }

    #[test]
    fn flip_negates_volume() {
        // Unit tetrahedron with outward winding.
        let mut mesh = PolygonMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            faces: vec![
                vec![0, 2, 1],
                vec![0, 1, 3],
                vec![1, 2, 3],
                vec![2, 0, 3],
            ],
        };
        let v = mesh.signed_volume();
        assert_relative_eq!(v, 1.0 / 6.0, epsilon = 1e-12);
        mesh.flip();
        assert_relative_eq!(mesh.signed_volume(), -v, epsilon = 1e-12);
    }
}
