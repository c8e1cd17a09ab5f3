//! Criterion benchmarks over the reconstruction pipeline.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};
use polyfit::{Plane, PlanarSegment, PointSample, ReconstructionParams, reconstruct};

fn cube_segments(n: usize) -> Vec<PlanarSegment> {
    let mut segments = Vec::new();
    for axis in 0..3 {
        for sign in [-1.0, 1.0] {
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
            segments.push(PlanarSegment::new(points, plane));
        }
    }
    segments
}

fn bench_cube_reconstruction(c: &mut Criterion) {
    let params = ReconstructionParams::default();

    let mut group = c.benchmark_group("reconstruct_cube");
    for n in [10, 20, 40] {
        let segments = cube_segments(n);
        group.bench_function(format!("{n}x{n}_per_face"), |b| {
            b.iter(|| reconstruct(black_box(&segments), black_box(&params)).unwrap())
        });
    }
    group.finish();
}

fn bench_alpha_extraction(c: &mut Criterion) {
    use nalgebra::Point2;

    let points: Vec<Point2<f64>> = (0..60 * 60)
        .map(|i| Point2::new((i % 60) as f64 * 0.1, (i / 60) as f64 * 0.1))
        .collect();

    c.bench_function("alpha_shape_3600_points", |b| {
        b.iter(|| polyfit::alpha::extract(black_box(&points), black_box(0.5)))
    });
}

criterion_group!(benches, bench_cube_reconstruction, bench_alpha_extraction);
criterion_main!(benches);
