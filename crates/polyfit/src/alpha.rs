//! Alpha-shape extraction over a planar segment's projected points.
//!
//! The alpha shape approximates the region of the supporting plane that is
//! actually covered by samples; scoring later uses it as a coverage test.
//! The triangulation is an incremental Bowyer-Watson Delaunay over the 2D
//! projections, filtered by circumradius.

use hashbrown::{HashMap, HashSet};
use kiddo::KdTree;
use nalgebra::Point2;
use tracing::{debug, trace};

use crate::kernel::orient2d;
use crate::polygon::signed_area;

/// Relative slack on the in-circumcircle test; keeps cavities closed when a
/// point lands on a shared circumcircle.
const INCIRCLE_SLACK: f64 = 1.0 + 1e-12;

/// A filtered triangle set on a supporting plane, in frame coordinates.
#[derive(Debug, Clone, Default)]
pub struct AlphaShape {
    /// Retained triangles, counter-clockwise.
    pub triangles: Vec<[Point2<f64>; 3]>,

    /// The radius used for filtering.
    pub alpha: f64,

    /// Sum of retained triangle areas.
    pub total_area: f64,
}

impl AlphaShape {
    /// An empty shape: no coverage anywhere on the plane.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the shape covers nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Mean nearest-neighbor distance over a 2D point set.
///
/// Returns `None` for fewer than two distinct points. Coincident duplicates
/// are skipped rather than dragging the mean to zero.
pub fn mean_neighbor_spacing(points: &[Point2<f64>]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let mut tree: KdTree<f64, 2> = KdTree::new();
    for (i, p) in points.iter().enumerate() {
        tree.add(&[p.x, p.y], i as u64);
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for p in points {
        let neighbors = tree.nearest_n::<kiddo::SquaredEuclidean>(&[p.x, p.y], 2);
        // First hit is the point itself at distance zero.
        if let Some(nearest) = neighbors.iter().find(|n| n.distance > 0.0) {
            sum += nearest.distance.sqrt();
            count += 1;
        }
    }

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Extract the alpha shape of a projected point set with an explicit
/// radius. Fewer than 3 points, collinear input, or a non-positive alpha
/// yield an empty shape.
pub fn extract(points: &[Point2<f64>], alpha: f64) -> AlphaShape {
    if points.len() < 3 || !(alpha > 0.0) {
        return AlphaShape::empty();
    }

    let vertices = dedup_points(points);
    if vertices.len() < 3 {
        return AlphaShape::empty();
    }

    let triangulation = bowyer_watson(&vertices);
    if triangulation.is_empty() {
        return AlphaShape::empty();
    }

    let alpha2 = alpha * alpha;
    let mut triangles = Vec::new();
    let mut total_area = 0.0;
    for tri in &triangulation {
        if tri.radius2 <= alpha2 {
            let corners = [
                vertices[tri.v[0]],
                vertices[tri.v[1]],
                vertices[tri.v[2]],
            ];
            total_area += signed_area(&corners).abs();
            triangles.push(corners);
        }
    }

    trace!(
        input = points.len(),
        kept = triangles.len(),
        dropped = triangulation.len() - triangles.len(),
        "alpha filter applied"
    );

    AlphaShape {
        triangles,
        alpha,
        total_area,
    }
}

/// Extract with an automatically derived radius: `alpha_scale` times the
/// mean nearest-neighbor spacing. Also returns the spacing estimate for
/// reuse by the residual tolerance default.
pub fn extract_auto(points: &[Point2<f64>], alpha_scale: f64) -> (AlphaShape, Option<f64>) {
    let Some(spacing) = mean_neighbor_spacing(points) else {
        return (AlphaShape::empty(), None);
    };
    let alpha = alpha_scale * spacing;
    debug!(
        spacing = format!("{spacing:.5}"),
        alpha = format!("{alpha:.5}"),
        "derived alpha radius from sampling density"
    );
    (extract(points, alpha), Some(spacing))
}

/// Drop bit-identical duplicates, preserving first-seen order.
fn dedup_points(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut seen: HashSet<(u64, u64)> = HashSet::with_capacity(points.len());
    let mut out = Vec::with_capacity(points.len());
    for p in points {
        if seen.insert((p.x.to_bits(), p.y.to_bits())) {
            out.push(*p);
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct Triangle {
    v: [usize; 3],
    circumcenter: Point2<f64>,
    radius2: f64,
}

impl Triangle {
    fn new(v: [usize; 3], vertices: &[Point2<f64>]) -> Self {
        let (circumcenter, radius2) =
            circumcircle(&vertices[v[0]], &vertices[v[1]], &vertices[v[2]]);
        Self {
            v,
            circumcenter,
            radius2,
        }
    }

    fn contains_in_circumcircle(&self, p: &Point2<f64>) -> bool {
        let d = p - self.circumcenter;
        d.norm_squared() <= self.radius2 * INCIRCLE_SLACK
    }
}

/// Circumcenter and squared circumradius. Collinear corners report an
/// infinite radius, which makes the triangle swallow every later insertion
/// and disappear from the final set.
fn circumcircle(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> (Point2<f64>, f64) {
    let d = 2.0 * orient2d(a, b, c);
    if d.abs() < f64::MIN_POSITIVE * 4.0 {
        return (Point2::origin(), f64::INFINITY);
    }

    let a2 = a.coords.norm_squared();
    let b2 = b.coords.norm_squared();
    let c2 = c.coords.norm_squared();
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let center = Point2::new(ux, uy);
    let radius2 = (a - center).norm_squared();
    (center, radius2)
}

/// Incremental Bowyer-Watson Delaunay triangulation.
///
/// Insertion order follows the input, so the result is deterministic for a
/// fixed point sequence.
fn bowyer_watson(vertices: &[Point2<f64>]) -> Vec<Triangle> {
    let n = vertices.len();

    // Super-triangle generously enclosing every point.
    let mut min = vertices[0];
    let mut max = vertices[0];
    for p in vertices {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    let span = (max.x - min.x).max(max.y - min.y).max(1.0);
    let center = Point2::new((min.x + max.x) * 0.5, (min.y + max.y) * 0.5);

    let mut all: Vec<Point2<f64>> = vertices.to_vec();
    all.push(Point2::new(center.x - 20.0 * span, center.y - 10.0 * span));
    all.push(Point2::new(center.x + 20.0 * span, center.y - 10.0 * span));
    all.push(Point2::new(center.x, center.y + 20.0 * span));

    let mut triangles = vec![Triangle::new([n, n + 1, n + 2], &all)];

    for i in 0..n {
        let p = all[i];

        // Cavity: triangles whose circumcircle contains the new point.
        let mut bad = Vec::new();
        for (t, tri) in triangles.iter().enumerate() {
            if tri.contains_in_circumcircle(&p) {
                bad.push(t);
            }
        }

        // Cavity boundary: edges used by exactly one bad triangle.
        let mut edge_use: HashMap<(usize, usize), usize> = HashMap::new();
        for &t in &bad {
            let v = triangles[t].v;
            for k in 0..3 {
                let (a, b) = (v[k], v[(k + 1) % 3]);
                let key = (a.min(b), a.max(b));
                *edge_use.entry(key).or_insert(0) += 1;
            }
        }

        let mut boundary = Vec::new();
        for &t in &bad {
            let v = triangles[t].v;
            for k in 0..3 {
                let (a, b) = (v[k], v[(k + 1) % 3]);
                let key = (a.min(b), a.max(b));
                if edge_use[&key] == 1 {
                    boundary.push((a, b));
                }
            }
        }

        // Remove the cavity (descending index keeps swap_remove stable
        // against the collected indices).
        for &t in bad.iter().rev() {
            triangles.swap_remove(t);
        }

        // Re-triangulate the cavity around the new point.
        for (a, b) in boundary {
            let v = if orient2d(&all[a], &all[b], &p) > 0.0 {
                [a, b, i]
            } else {
                [b, a, i]
            };
            triangles.push(Triangle::new(v, &all));
        }
    }

    // Strip everything attached to the super-triangle.
    triangles.retain(|t| t.v.iter().all(|&v| v < n) && t.radius2.is_finite());
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(n: usize, step: f64) -> Vec<Point2<f64>> {
        (0..n * n)
            .map(|i| Point2::new((i % n) as f64 * step, (i / n) as f64 * step))
            .collect()
    }

    #[test]
    fn spacing_of_unit_grid() {
        let points = grid(5, 1.0);
        let spacing = mean_neighbor_spacing(&points).unwrap();
        assert_relative_eq!(spacing, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn spacing_needs_two_points() {
        assert!(mean_neighbor_spacing(&[Point2::new(0.0, 0.0)]).is_none());
    }

    #[test]
    fn grid_shape_covers_grid_area() {
        let points = grid(6, 1.0);
        let shape = extract(&points, 2.0);
        assert!(!shape.is_empty());
        // A 6x6 unit grid spans a 5x5 square.
        assert_relative_eq!(shape.total_area, 25.0, epsilon = 1e-9);
    }

    #[test]
    fn auto_alpha_matches_explicit() {
        let points = grid(6, 0.5);
        let (auto_shape, spacing) = extract_auto(&points, 5.0);
        let explicit = extract(&points, 5.0 * spacing.unwrap());
        assert_eq!(auto_shape.triangles.len(), explicit.triangles.len());
        assert_relative_eq!(auto_shape.total_area, explicit.total_area, epsilon = 1e-12);
    }

    #[test]
    fn tiny_alpha_drops_everything() {
        let points = grid(5, 1.0);
        let shape = extract(&points, 0.1);
        assert!(shape.is_empty());
    }

    #[test]
    fn collinear_points_yield_empty_shape() {
        let points: Vec<_> = (0..10).map(|i| Point2::new(i as f64, 0.0)).collect();
        assert!(extract(&points, 5.0).is_empty());
    }

    #[test]
    fn fewer_than_three_points_yield_empty_shape() {
        let points = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)];
        assert!(extract(&points, 5.0).is_empty());
    }

    #[test]
    fn concave_notch_is_respected() {
        // Two 5x2 strips of unit-spaced points, one unit apart: a small
        // alpha must not bridge the gap.
        let mut points = Vec::new();
        for y in 0..2 {
            for x in 0..6 {
                points.push(Point2::new(x as f64, y as f64));
                points.push(Point2::new(x as f64, y as f64 + 4.0));
            }
        }
        let shape = extract(&points, 1.2);
        // Each strip spans 5x1; the 5x2 gap between them stays uncovered.
        assert_relative_eq!(shape.total_area, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn duplicate_points_are_ignored() {
        let mut points = grid(4, 1.0);
        points.extend(grid(4, 1.0));
        let shape = extract(&points, 2.0);
        assert_relative_eq!(shape.total_area, 9.0, epsilon = 1e-9);
    }
}
