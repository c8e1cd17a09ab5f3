//! The reconstruction façade: validate, extract, hypothesize, select,
//! assemble.

use nalgebra::Point2;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alpha::{self, AlphaShape};
use crate::config::ReconstructionParams;
use crate::error::{ReconstructError, ReconstructResult};
use crate::hypothesis;
use crate::kernel::PlaneFrame;
use crate::segment::{PlanarSegment, merge_coplanar_segments};
use crate::selection;
use crate::solver::{BinarySolver, BranchBoundSolver, SolveStatus};
use crate::tracing_ext::StageTimer;
use crate::types::PolygonMesh;

/// Angular tolerance for treating two supporting planes as the same plane.
const COPLANAR_ANGLE_TOLERANCE: f64 = 1e-4;

/// Offset tolerance for coincident planes, as a fraction of the bounding
/// box diagonal.
const COPLANAR_OFFSET_SCALE: f64 = 1e-6;

/// Scalar diagnostics emitted alongside the mesh.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Achieved objective value.
    pub objective: f64,

    /// Fraction of total point support captured by the selection.
    pub fit_fraction: f64,

    /// Fraction of total alpha-shape area covered by the selection.
    pub coverage_fraction: f64,

    /// Crease edges in the output.
    pub sharp_edge_count: usize,

    /// Selected face count.
    pub selected_face_count: usize,

    /// Candidate face count in the hypothesis graph.
    pub candidate_face_count: usize,

    /// Candidate edge count in the hypothesis graph.
    pub candidate_edge_count: usize,

    /// Solver terminal status.
    pub solver_status: SolveStatus,

    /// Wall-clock time of the whole reconstruction, in milliseconds.
    pub elapsed_ms: f64,

    /// Present when the result is empty for a benign reason.
    pub note: Option<String>,
}

/// A reconstructed surface with its diagnostics.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub mesh: PolygonMesh,
    pub diagnostics: Diagnostics,
}

/// Reconstruct a surface with the default branch-and-bound solver.
///
/// # Example
///
/// ```no_run
/// use polyfit::{reconstruct, PlanarSegment, ReconstructionParams};
///
/// let segments: Vec<PlanarSegment> = load_segments();
/// let result = reconstruct(&segments, &ReconstructionParams::default()).unwrap();
/// println!("{} faces selected", result.mesh.face_count());
/// # fn load_segments() -> Vec<polyfit::PlanarSegment> { Vec::new() }
/// ```
pub fn reconstruct(
    segments: &[PlanarSegment],
    params: &ReconstructionParams,
) -> ReconstructResult<Reconstruction> {
    reconstruct_with_solver(segments, params, &BranchBoundSolver::new())
}

/// Reconstruct a surface with a caller-provided solver backend.
///
/// The function is transactional: it either returns a mesh with
/// diagnostics or fails without observable side effects. An empty
/// hypothesis graph or an all-zero selection is reported as an empty mesh
/// with a descriptive note, not an error.
pub fn reconstruct_with_solver(
    segments: &[PlanarSegment],
    params: &ReconstructionParams,
    solver: &dyn BinarySolver,
) -> ReconstructResult<Reconstruction> {
    let timer = StageTimer::new("reconstruct");
    let _guard = timer.span().clone().entered();

    // 1. Input validation.
    params.validate()?;
    if segments.is_empty() {
        return Err(ReconstructError::InvalidInput {
            details: "at least one planar segment is required".into(),
        });
    }
    for (index, segment) in segments.iter().enumerate() {
        segment.validate(index)?;
    }

    // 2. Merge segments sharing a supporting plane.
    let diagonal = point_cloud_diagonal(segments);
    let merged = merge_coplanar_segments(
        segments.to_vec(),
        COPLANAR_ANGLE_TOLERANCE,
        COPLANAR_OFFSET_SCALE * diagonal.max(1.0),
    );
    if merged.len() < segments.len() {
        info!(
            input = segments.len(),
            merged = merged.len(),
            "merged segments with coincident supporting planes"
        );
    }

    // 3. Per-segment alpha shapes. Independent per segment; the
    //    order-preserving collect keeps downstream ids deterministic.
    let shape_timer = StageTimer::new("alpha_shapes");
    let extracted: Vec<(AlphaShape, Option<f64>)> = merged
        .par_iter()
        .map(|segment| {
            let frame = PlaneFrame::for_plane(&segment.plane);
            let projected: Vec<Point2<f64>> = segment
                .points
                .iter()
                .map(|p| frame.to_plane(&p.position))
                .collect();
            alpha::extract_auto(&projected, params.alpha_scale)
        })
        .collect();
    drop(shape_timer);

    let shapes: Vec<AlphaShape> = extracted.iter().map(|(s, _)| s.clone()).collect();
    let mean_spacing = pooled_spacing(&merged, &extracted).unwrap_or_else(|| {
        warn!("could not estimate point spacing; falling back to 1% of the diagonal");
        diagonal * 0.01
    });
    for (i, shape) in shapes.iter().enumerate() {
        if shape.is_empty() {
            debug!(segment = i, "segment has an empty alpha shape; coverage is zero");
        }
    }

    // 4. Hypothesis generation and scoring.
    let graph = {
        let _timer = StageTimer::new("hypothesis");
        hypothesis::generate(&merged, &shapes, mean_spacing, params)?
    };

    if graph.is_empty() {
        return Ok(empty_result(
            &graph,
            timer.elapsed_ms(),
            "hypothesis graph is empty: fewer than two intersecting supporting planes",
        ));
    }

    // 5. Face selection.
    let selection = {
        let _timer = StageTimer::new("selection");
        selection::select_faces(&graph, params, solver)?
    };

    if selection::is_all_zero(&selection.selected) {
        let mut result = empty_result(
            &graph,
            timer.elapsed_ms(),
            "solver selected no faces; the empty surface is optimal for these weights",
        );
        result.diagnostics.objective = selection.objective;
        result.diagnostics.solver_status = selection.status;
        return Ok(result);
    }

    // 6. Output assembly.
    let mesh = selection::assemble_mesh(&graph, &selection.selected);

    let diagnostics = Diagnostics {
        objective: selection.objective,
        fit_fraction: selection.fit_fraction,
        coverage_fraction: selection.coverage_fraction,
        sharp_edge_count: selection.sharp_edge_count,
        selected_face_count: selection.selected_count(),
        candidate_face_count: graph.faces.len(),
        candidate_edge_count: graph.edges.len(),
        solver_status: selection.status,
        elapsed_ms: timer.elapsed_ms(),
        note: None,
    };

    info!(
        faces = diagnostics.selected_face_count,
        vertices = mesh.vertex_count(),
        objective = format!("{:.6}", diagnostics.objective),
        "reconstruction complete"
    );

    Ok(Reconstruction { mesh, diagnostics })
}

fn empty_result(
    graph: &hypothesis::HypothesisGraph,
    elapsed_ms: f64,
    note: &str,
) -> Reconstruction {
    debug!(note, "returning empty reconstruction");
    Reconstruction {
        mesh: PolygonMesh::new(),
        diagnostics: Diagnostics {
            objective: 0.0,
            fit_fraction: 0.0,
            coverage_fraction: 0.0,
            sharp_edge_count: 0,
            selected_face_count: 0,
            candidate_face_count: graph.faces.len(),
            candidate_edge_count: graph.edges.len(),
            solver_status: SolveStatus::Optimal,
            elapsed_ms,
            note: Some(note.to_string()),
        },
    }
}

/// Diagonal of the bounding box over all segment points.
fn point_cloud_diagonal(segments: &[PlanarSegment]) -> f64 {
    let mut iter = segments.iter().flat_map(|s| &s.points);
    let Some(first) = iter.next() else {
        return 0.0;
    };
    let mut min = first.position;
    let mut max = first.position;
    for p in iter {
        min.x = min.x.min(p.position.x);
        min.y = min.y.min(p.position.y);
        min.z = min.z.min(p.position.z);
        max.x = max.x.max(p.position.x);
        max.y = max.y.max(p.position.y);
        max.z = max.z.max(p.position.z);
    }
    (max - min).norm()
}

/// Point-count-weighted mean of the per-segment spacing estimates.
fn pooled_spacing(
    segments: &[PlanarSegment],
    extracted: &[(AlphaShape, Option<f64>)],
) -> Option<f64> {
    let mut weighted = 0.0;
    let mut weight = 0.0;
    for (segment, (_, spacing)) in segments.iter().zip(extracted) {
        if let Some(s) = spacing {
            weighted += s * segment.len() as f64;
            weight += segment.len() as f64;
        }
    }
    if weight > 0.0 { Some(weighted / weight) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Plane;
    use crate::types::PointSample;
    use nalgebra::Vector3;

    fn z_grid(z: f64, n: usize) -> PlanarSegment {
        let step = 1.0 / (n - 1) as f64;
        let points = (0..n * n)
            .map(|i| {
                PointSample::from_coords((i % n) as f64 * step, (i / n) as f64 * step, z)
            })
            .collect();
        PlanarSegment::new(points, Plane::new(Vector3::z(), -z).unwrap())
    }

    #[test]
    fn rejects_empty_input() {
        let result = reconstruct(&[], &ReconstructionParams::default());
        assert!(matches!(
            result,
            Err(ReconstructError::InvalidInput { .. })
        ));
    }

    #[test]
    fn rejects_bad_weights() {
        let params = ReconstructionParams {
            fit_weight: 0.9,
            ..Default::default()
        };
        let result = reconstruct(&[z_grid(0.0, 5)], &params);
        assert!(matches!(
            result,
            Err(ReconstructError::InvalidWeights { .. })
        ));
    }

    #[test]
    fn single_plane_returns_empty_mesh_with_note() {
        let result = reconstruct(&[z_grid(0.0, 6)], &ReconstructionParams::default()).unwrap();
        assert!(result.mesh.is_empty());
        assert!(result.diagnostics.note.is_some());
        assert_eq!(result.diagnostics.selected_face_count, 0);
    }

    #[test]
    fn parallel_planes_return_empty_mesh() {
        let segments = vec![z_grid(0.0, 6), z_grid(1.0, 6)];
        let result = reconstruct(&segments, &ReconstructionParams::default()).unwrap();
        assert!(result.mesh.is_empty());
        assert!(result.diagnostics.note.is_some());
    }

    #[test]
    fn duplicated_plane_segments_are_merged_before_arrangement() {
        // Two segments on the same plane plus a crossing plane: the
        // arrangement must treat the duplicated plane once.
        let crossing = {
            let plane = Plane::new(Vector3::x(), 0.5).unwrap();
            let points = (0..36)
                .map(|i| {
                    PointSample::from_coords(
                        -0.5,
                        (i % 6) as f64 * 0.2,
                        (i / 6) as f64 * 0.2,
                    )
                })
                .collect();
            PlanarSegment::new(points, plane)
        };
        let segments = vec![z_grid(0.0, 6), z_grid(0.0, 5), crossing];
        let result = reconstruct(&segments, &ReconstructionParams::default()).unwrap();
        // Two distinct planes -> at most 4 candidate faces.
        assert!(result.diagnostics.candidate_face_count <= 4);
    }
}
