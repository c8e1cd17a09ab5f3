//! Convex 2D polygon operations used by the per-plane arrangements.
//!
//! Every candidate face is a cell of a convex subdivision, so all clipping
//! and splitting here assumes (and preserves) convexity. Vertices are kept
//! counter-clockwise.

use nalgebra::Point2;

use crate::kernel::orient2d;

/// Area below which a polygon is treated as collapsed.
pub const DEGENERATE_AREA: f64 = 1e-12;

/// Signed area of a closed 2D loop (positive for counter-clockwise).
pub fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = &points[i];
        let b = &points[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// A convex polygon with counter-clockwise vertices and positive area.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexPolygon {
    vertices: Vec<Point2<f64>>,
}

impl ConvexPolygon {
    /// Build a polygon from a vertex loop, normalizing the winding to
    /// counter-clockwise. Returns `None` for loops with fewer than 3
    /// vertices or a collapsed area.
    pub fn from_loop(mut vertices: Vec<Point2<f64>>) -> Option<Self> {
        dedup_consecutive(&mut vertices);
        if vertices.len() < 3 {
            return None;
        }
        let area = signed_area(&vertices);
        if area.abs() < DEGENERATE_AREA {
            return None;
        }
        if area < 0.0 {
            vertices.reverse();
        }
        Some(Self { vertices })
    }

    /// An axis-aligned rectangle, used as the seed for plane-box clipping.
    pub fn rectangle(min: Point2<f64>, max: Point2<f64>) -> Option<Self> {
        Self::from_loop(vec![
            min,
            Point2::new(max.x, min.y),
            max,
            Point2::new(min.x, max.y),
        ])
    }

    /// Vertex loop (counter-clockwise).
    #[inline]
    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    /// Number of vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Always false once constructed; kept for symmetry with collection APIs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Polygon area (positive).
    pub fn area(&self) -> f64 {
        signed_area(&self.vertices)
    }

    /// Area centroid.
    pub fn centroid(&self) -> Point2<f64> {
        let mut cx = 0.0;
        let mut cy = 0.0;
        let mut area_sum = 0.0;
        let n = self.vertices.len();
        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[(i + 1) % n];
            let cross = a.x * b.y - b.x * a.y;
            cx += (a.x + b.x) * cross;
            cy += (a.y + b.y) * cross;
            area_sum += cross;
        }
        // area_sum is twice the signed area; non-zero by construction.
        Point2::new(cx / (3.0 * area_sum), cy / (3.0 * area_sum))
    }

    /// Whether a point lies inside or on the boundary, with a tolerance in
    /// coordinate units.
    pub fn contains(&self, p: &Point2<f64>, tolerance: f64) -> bool {
        let n = self.vertices.len();
        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[(i + 1) % n];
            let edge_len = (b - a).norm();
            if orient2d(a, b, p) < -tolerance * edge_len {
                return false;
            }
        }
        true
    }

    /// Whether a point lies strictly inside, at least `margin` away from
    /// every edge. Points on a shared cell boundary then belong to no
    /// cell, which keeps support attribution unambiguous.
    pub fn strictly_contains(&self, p: &Point2<f64>, margin: f64) -> bool {
        let n = self.vertices.len();
        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[(i + 1) % n];
            let edge_len = (b - a).norm();
            if orient2d(a, b, p) < margin * edge_len {
                return false;
            }
        }
        true
    }

    /// Clip against the half-plane `a*x + b*y + c <= 0`.
    /// Returns `None` when nothing of positive area remains.
    pub fn clip_halfplane(&self, a: f64, b: f64, c: f64) -> Option<Self> {
        let distances: Vec<f64> = self
            .vertices
            .iter()
            .map(|p| a * p.x + b * p.y + c)
            .collect();

        let mut out = Vec::with_capacity(self.vertices.len() + 1);
        let n = self.vertices.len();
        for i in 0..n {
            let j = (i + 1) % n;
            let (pi, pj) = (&self.vertices[i], &self.vertices[j]);
            let (di, dj) = (distances[i], distances[j]);

            if di <= 0.0 {
                out.push(*pi);
            }
            if (di < 0.0 && dj > 0.0) || (di > 0.0 && dj < 0.0) {
                let t = di / (di - dj);
                out.push(Point2::new(
                    pi.x + t * (pj.x - pi.x),
                    pi.y + t * (pj.y - pi.y),
                ));
            }
        }

        ConvexPolygon::from_loop(out)
    }

    /// Split by the line `a*x + b*y + c = 0` into the negative-side and
    /// positive-side parts. A part collapsed below `min_area` is reported
    /// as `None`, so a line grazing a vertex or running along an edge does
    /// not produce sliver cells.
    pub fn split_by_line(
        &self,
        a: f64,
        b: f64,
        c: f64,
        min_area: f64,
    ) -> (Option<Self>, Option<Self>) {
        let negative = self.clip_halfplane(a, b, c);
        let positive = self.clip_halfplane(-a, -b, -c);

        let keep = |side: Option<Self>| side.filter(|p| p.area() >= min_area);
        let negative = keep(negative);
        let positive = keep(positive);

        // A grazing line leaves one side essentially equal to the whole
        // polygon; report that as "no split".
        match (&negative, &positive) {
            (Some(_), Some(_)) => (negative, positive),
            (Some(_), None) => (Some(self.clone()), None),
            (None, Some(_)) => (None, Some(self.clone())),
            (None, None) => (Some(self.clone()), None),
        }
    }

    /// Intersection with another convex polygon, by successive half-plane
    /// clips against the other polygon's edges.
    pub fn intersect(&self, other: &ConvexPolygon) -> Option<Self> {
        let mut current = self.clone();
        let n = other.vertices.len();
        for i in 0..n {
            let p = &other.vertices[i];
            let q = &other.vertices[(i + 1) % n];
            // Inward half-plane of the CCW edge p -> q: a*x + b*y + c <= 0
            // holds exactly for points on the interior side.
            let a = q.y - p.y;
            let b = p.x - q.x;
            let c = -(a * p.x + b * p.y);
            current = current.clip_halfplane(a, b, c)?;
        }
        Some(current)
    }

    /// Area of the intersection with another convex polygon.
    pub fn intersection_area(&self, other: &ConvexPolygon) -> f64 {
        self.intersect(other).map_or(0.0, |p| p.area())
    }
}

fn dedup_consecutive(vertices: &mut Vec<Point2<f64>>) {
    vertices.dedup_by(|a, b| (a.x - b.x).abs() < 1e-12 && (a.y - b.y).abs() < 1e-12);
    if vertices.len() > 1 {
        let first = vertices[0];
        let last = vertices[vertices.len() - 1];
        if (first.x - last.x).abs() < 1e-12 && (first.y - last.y).abs() < 1e-12 {
            vertices.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> ConvexPolygon {
        ConvexPolygon::rectangle(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)).unwrap()
    }

    #[test]
    fn winding_is_normalized() {
        let cw = ConvexPolygon::from_loop(vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 0.0),
        ])
        .unwrap();
        assert!(signed_area(cw.vertices()) > 0.0);
    }

    #[test]
    fn degenerate_loops_are_rejected() {
        assert!(ConvexPolygon::from_loop(vec![]).is_none());
        assert!(
            ConvexPolygon::from_loop(vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(2.0, 0.0),
            ])
            .is_none()
        );
    }

    #[test]
    fn centroid_of_square() {
        let square = unit_square();
        assert_relative_eq!(square.centroid(), Point2::new(0.5, 0.5), epsilon = 1e-12);
    }

    #[test]
    fn contains_interior_and_boundary() {
        let square = unit_square();
        assert!(square.contains(&Point2::new(0.5, 0.5), 1e-9));
        assert!(square.contains(&Point2::new(0.0, 0.5), 1e-9));
        assert!(!square.contains(&Point2::new(1.5, 0.5), 1e-9));
    }

    #[test]
    fn clip_keeps_negative_side() {
        let square = unit_square();
        // x <= 0.25
        let clipped = square.clip_halfplane(1.0, 0.0, -0.25).unwrap();
        assert_relative_eq!(clipped.area(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn clip_outside_returns_none() {
        let square = unit_square();
        // x <= -1
        assert!(square.clip_halfplane(1.0, 0.0, 1.0).is_none());
    }

    #[test]
    fn split_produces_both_sides() {
        let square = unit_square();
        let (neg, pos) = square.split_by_line(1.0, 0.0, -0.5, 1e-9);
        let neg = neg.unwrap();
        let pos = pos.unwrap();
        assert_relative_eq!(neg.area(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(pos.area(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn grazing_split_is_a_no_op() {
        let square = unit_square();
        // Line along the x = 0 edge.
        let (neg, pos) = square.split_by_line(1.0, 0.0, 0.0, 1e-9);
        assert_eq!(neg.is_some() as u8 + pos.is_some() as u8, 1);
        let kept = neg.or(pos).unwrap();
        assert_relative_eq!(kept.area(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn intersection_of_offset_squares() {
        let a = unit_square();
        let b =
            ConvexPolygon::rectangle(Point2::new(0.5, 0.5), Point2::new(1.5, 1.5)).unwrap();
        assert_relative_eq!(a.intersection_area(&b), 0.25, epsilon = 1e-12);
        assert_relative_eq!(b.intersection_area(&a), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = unit_square();
        let b =
            ConvexPolygon::rectangle(Point2::new(2.0, 2.0), Point2::new(3.0, 3.0)).unwrap();
        assert!(a.intersect(&b).is_none());
        assert_eq!(a.intersection_area(&b), 0.0);
    }
}
