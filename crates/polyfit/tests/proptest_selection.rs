//! Property-based tests for the selection invariants.
//!
//! Random axis-aligned plane configurations are reconstructed and the
//! manifold and determinism guarantees checked on the result.

use nalgebra::{Point3, Vector3};
use polyfit::{
    Plane, PlanarSegment, PointSample, ReconstructionParams, reconstruct, validate_surface,
};
use proptest::prelude::*;

/// A plane `axis = offset` with a 5x5 grid of supporting points spanning
/// [-0.5, 0.5]^2 in the other two axes.
fn axis_plane_segment(axis: usize, offset: f64) -> PlanarSegment {
    let mut normal = Vector3::zeros();
    normal[axis] = 1.0;
    let plane = Plane::new(normal, -offset).unwrap();

    let (u_axis, v_axis) = ((axis + 1) % 3, (axis + 2) % 3);
    let n = 5;
    let step = 1.0 / (n - 1) as f64;
    let mut points = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let mut p = Point3::origin();
            p[axis] = offset;
            p[u_axis] = -0.5 + i as f64 * step;
            p[v_axis] = -0.5 + j as f64 * step;
            points.push(PointSample::new(p));
        }
    }
    PlanarSegment::new(points, plane)
}

/// Up to four distinct axis-aligned planes.
fn arb_plane_set() -> impl Strategy<Value = Vec<(usize, f64)>> {
    prop::collection::vec((0usize..3, prop::sample::select(vec![-0.5f64, 0.0, 0.5])), 1..=4)
        .prop_map(|mut specs| {
            specs.sort_by(|a, b| a.partial_cmp(b).unwrap());
            specs.dedup_by(|a, b| a.0 == b.0 && (a.1 - b.1).abs() < 1e-12);
            specs
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn reconstruction_is_manifold(specs in arb_plane_set()) {
        let segments: Vec<PlanarSegment> = specs
            .iter()
            .map(|&(axis, offset)| axis_plane_segment(axis, offset))
            .collect();

        let result = reconstruct(&segments, &ReconstructionParams::default()).unwrap();
        let report = validate_surface(&result.mesh);

        // No edge of the output may carry more than two faces.
        prop_assert_eq!(report.non_manifold_edge_count, 0);

        // Every face index is in range and every loop is a proper cycle.
        for face in &result.mesh.faces {
            prop_assert!(face.len() >= 3);
            for &v in face {
                prop_assert!((v as usize) < result.mesh.vertex_count());
            }
        }
    }

    #[test]
    fn reconstruction_is_deterministic(specs in arb_plane_set()) {
        let build = || -> Vec<PlanarSegment> {
            specs
                .iter()
                .map(|&(axis, offset)| axis_plane_segment(axis, offset))
                .collect()
        };

        let params = ReconstructionParams::default();
        let first = reconstruct(&build(), &params).unwrap();
        let second = reconstruct(&build(), &params).unwrap();

        prop_assert_eq!(first.mesh, second.mesh);
        prop_assert_eq!(first.diagnostics.objective, second.diagnostics.objective);
    }

    #[test]
    fn pure_complexity_weight_selects_nothing(specs in arb_plane_set()) {
        let segments: Vec<PlanarSegment> = specs
            .iter()
            .map(|&(axis, offset)| axis_plane_segment(axis, offset))
            .collect();

        let params = ReconstructionParams {
            fit_weight: 0.0,
            coverage_weight: 0.0,
            complexity_weight: 1.0,
            ..Default::default()
        };
        let result = reconstruct(&segments, &params).unwrap();
        prop_assert!(result.mesh.is_empty());
    }
}
