//! Reconstruct a unit cube from six synthetic planar segments and print
//! the surface report.
//!
//! Run with: cargo run -p polyfit --example unit_cube

use nalgebra::{Point3, Vector3};
use polyfit::{Plane, PlanarSegment, PointSample, ReconstructionParams, reconstruct};

fn cube_face(axis: usize, sign: f64, n: usize) -> PlanarSegment {
    let mut normal = Vector3::zeros();
    normal[axis] = sign;
    let plane = Plane::new(normal, -0.5).unwrap();

    let (u_axis, v_axis) = ((axis + 1) % 3, (axis + 2) % 3);
    let step = 1.0 / (n - 1) as f64;
    let mut points = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let mut p = Point3::origin();
            p[axis] = sign * 0.5;
            p[u_axis] = -0.5 + i as f64 * step;
            p[v_axis] = -0.5 + j as f64 * step;
            points.push(PointSample::new(p));
        }
    }
    PlanarSegment::new(points, plane)
}

fn main() {
    tracing_setup();

    let mut segments = Vec::new();
    for axis in 0..3 {
        for sign in [-1.0, 1.0] {
            segments.push(cube_face(axis, sign, 10));
        }
    }

    let result = reconstruct(&segments, &ReconstructionParams::default())
        .expect("cube reconstruction failed");

    println!("{}", result.mesh.validate());
    println!(
        "objective {:.4} (fit {:.3}, coverage {:.3}, {} sharp edges) in {:.1} ms",
        result.diagnostics.objective,
        result.diagnostics.fit_fraction,
        result.diagnostics.coverage_fraction,
        result.diagnostics.sharp_edge_count,
        result.diagnostics.elapsed_ms,
    );
}

fn tracing_setup() {
    // Honors RUST_LOG, e.g. RUST_LOG=polyfit=debug.
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
