//! Output surface validation and reporting.

use hashbrown::HashMap;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::PolygonMesh;

/// Validation report for a reconstructed surface.
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceReport {
    /// Whether the mesh has no boundary edges.
    pub is_watertight: bool,

    /// Whether all edges have at most 2 incident faces.
    pub is_manifold: bool,

    /// Number of boundary edges (edges with 1 incident face).
    pub boundary_edge_count: usize,

    /// Number of non-manifold edges (edges with more than 2 incident faces).
    pub non_manifold_edge_count: usize,

    /// Total edge count.
    pub edge_count: usize,

    /// Total vertex count.
    pub vertex_count: usize,

    /// Total face count.
    pub face_count: usize,

    /// Bounding box as (min_corner, max_corner).
    #[serde(skip)]
    pub bounds: Option<(Point3<f64>, Point3<f64>)>,

    /// Total surface area.
    pub surface_area: f64,

    /// Signed volume (meaningful for watertight meshes only).
    pub signed_volume: f64,

    /// Whether the mesh appears inside-out (closed with negative volume).
    pub is_inside_out: bool,
}

impl SurfaceReport {
    /// Basic validity: a non-empty surface.
    pub fn is_valid(&self) -> bool {
        self.vertex_count > 0 && self.face_count > 0
    }

    /// Whether the surface is a closed, consistently oriented solid.
    pub fn is_closed_solid(&self) -> bool {
        self.is_watertight && self.is_manifold && !self.is_inside_out
    }
}

impl std::fmt::Display for SurfaceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Surface Report:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Faces: {}", self.face_count)?;
        writeln!(f, "  Edges: {}", self.edge_count)?;

        if let Some((min, max)) = &self.bounds {
            writeln!(
                f,
                "  Bounds: [{:.2}, {:.2}, {:.2}] to [{:.2}, {:.2}, {:.2}]",
                min.x, min.y, min.z, max.x, max.y, max.z
            )?;
        }

        writeln!(f, "  Surface Area: {:.4}", self.surface_area)?;
        writeln!(f, "  Volume: {:.4}", self.signed_volume.abs())?;

        writeln!(
            f,
            "  Watertight: {} (boundary edges: {})",
            if self.is_watertight { "yes" } else { "NO" },
            self.boundary_edge_count
        )?;
        writeln!(
            f,
            "  Manifold: {} (non-manifold edges: {})",
            if self.is_manifold { "yes" } else { "NO" },
            self.non_manifold_edge_count
        )?;

        Ok(())
    }
}

/// Validate a polygon mesh and return a report.
pub fn validate_surface(mesh: &PolygonMesh) -> SurfaceReport {
    let mut edge_faces: HashMap<(u32, u32), usize> = HashMap::new();
    for face in &mesh.faces {
        let n = face.len();
        for k in 0..n {
            let (a, b) = (face[k], face[(k + 1) % n]);
            if a == b {
                continue;
            }
            *edge_faces.entry((a.min(b), a.max(b))).or_default() += 1;
        }
    }

    let boundary_edge_count = edge_faces.values().filter(|&&c| c == 1).count();
    let non_manifold_edge_count = edge_faces.values().filter(|&&c| c > 2).count();
    let is_watertight = boundary_edge_count == 0 && !mesh.is_empty();

    let signed_volume = mesh.signed_volume();
    let is_inside_out = is_watertight && signed_volume < 0.0;

    let report = SurfaceReport {
        is_watertight,
        is_manifold: non_manifold_edge_count == 0,
        boundary_edge_count,
        non_manifold_edge_count,
        edge_count: edge_faces.len(),
        vertex_count: mesh.vertex_count(),
        face_count: mesh.face_count(),
        bounds: mesh.bounds(),
        surface_area: mesh.surface_area(),
        signed_volume,
        is_inside_out,
    };

    if !report.is_watertight && report.is_valid() {
        debug!(
            boundary_edges = report.boundary_edge_count,
            "surface has open boundaries"
        );
    }
    if !report.is_manifold {
        warn!(
            non_manifold_edges = report.non_manifold_edge_count,
            "surface is non-manifold"
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn tetrahedron() -> PolygonMesh {
        PolygonMesh {
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
        }
    }

    #[test]
    fn closed_tetrahedron_is_watertight() {
        let report = validate_surface(&tetrahedron());
        assert!(report.is_watertight);
        assert!(report.is_manifold);
        assert!(!report.is_inside_out);
        assert!(report.is_closed_solid());
        assert_eq!(report.edge_count, 6);
        assert_eq!(report.boundary_edge_count, 0);
    }

    #[test]
    fn open_surface_reports_boundary() {
        let mut mesh = tetrahedron();
        mesh.faces.pop();
        let report = validate_surface(&mesh);
        assert!(!report.is_watertight);
        assert_eq!(report.boundary_edge_count, 3);
        assert!(report.is_manifold);
    }

    #[test]
    fn inverted_solid_is_flagged() {
        let mut mesh = tetrahedron();
        mesh.flip();
        let report = validate_surface(&mesh);
        assert!(report.is_watertight);
        assert!(report.is_inside_out);
        assert!(!report.is_closed_solid());
    }

    #[test]
    fn empty_mesh_report() {
        let report = validate_surface(&PolygonMesh::new());
        assert!(!report.is_valid());
        assert!(!report.is_watertight);
        assert_eq!(report.edge_count, 0);
    }
}
