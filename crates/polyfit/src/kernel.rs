//! Geometry kernel: planes, frames, intersections, and robust predicates.
//!
//! Arrangement construction works on constructed coordinates (points where
//! three planes meet). Predicates use a float filter with a fused-multiply-add
//! fallback for near-degenerate input; constructed vertices get a quantized
//! identity key through [`VertexPool`], the one place where equality over
//! constructed coordinates is needed. Everything downstream of the hypothesis
//! graph works on plain `f64`.

use hashbrown::HashMap;
use nalgebra::{Matrix3, Point2, Point3, SymmetricEigen, Vector2, Vector3};

use crate::error::{ReconstructError, ReconstructResult};

/// Cross products below this norm mean parallel planes.
const PARALLEL_EPSILON: f64 = 1e-9;

/// Determinants below this (relative) magnitude mean no unique triple point.
const TRIPLE_POINT_EPSILON: f64 = 1e-10;

/// Shewchuk-style float filter constant for the 2D orientation test.
const ORIENT2D_FILTER: f64 = 3.33e-16;

/// An oriented plane in Hessian normal form: `normal . p + offset = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vector3<f64>,

    /// Signed offset from the origin.
    pub offset: f64,
}

impl Plane {
    /// Create a plane from a (not necessarily unit) normal and offset,
    /// normalizing both.
    pub fn new(normal: Vector3<f64>, offset: f64) -> ReconstructResult<Self> {
        let norm = normal.norm();
        if norm < PARALLEL_EPSILON {
            return Err(ReconstructError::Geometry {
                details: format!("plane normal has near-zero length {norm:e}"),
            });
        }
        Ok(Self {
            normal: normal / norm,
            offset: offset / norm,
        })
    }

    /// Create a plane through `point` with the given normal.
    pub fn from_point_normal(point: Point3<f64>, normal: Vector3<f64>) -> ReconstructResult<Self> {
        let norm = normal.norm();
        if norm < PARALLEL_EPSILON {
            return Err(ReconstructError::Geometry {
                details: format!("plane normal has near-zero length {norm:e}"),
            });
        }
        let n = normal / norm;
        Ok(Self {
            normal: n,
            offset: -n.dot(&point.coords),
        })
    }

    /// Least-squares plane through a point set.
    ///
    /// Uses the centroid and the eigenvector of the covariance matrix with
    /// the smallest eigenvalue. Returns an error for fewer than 3 points or
    /// a collinear/coincident set.
    pub fn fit(points: &[Point3<f64>]) -> ReconstructResult<Self> {
        if points.len() < 3 {
            return Err(ReconstructError::Geometry {
                details: format!("cannot fit a plane through {} points", points.len()),
            });
        }

        let centroid = points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords)
            / points.len() as f64;

        let mut covariance = Matrix3::zeros();
        for p in points {
            let d = p.coords - centroid;
            covariance += d * d.transpose();
        }

        let eigen = SymmetricEigen::new(covariance);
        let (mut min_index, mut mid_value) = (0, f64::INFINITY);
        for i in 0..3 {
            if eigen.eigenvalues[i] < eigen.eigenvalues[min_index] {
                min_index = i;
            }
        }
        for i in 0..3 {
            if i != min_index {
                mid_value = mid_value.min(eigen.eigenvalues[i]);
            }
        }
        // The two larger eigenvalues must carry actual spread, otherwise the
        // points are collinear and the normal direction is arbitrary.
        if mid_value <= f64::EPSILON * eigen.eigenvalues.amax().max(1.0) {
            return Err(ReconstructError::Geometry {
                details: "points are collinear; plane fit is underdetermined".into(),
            });
        }

        let normal = eigen.eigenvectors.column(min_index).into_owned();
        Plane::from_point_normal(Point3::from(centroid), normal)
    }

    /// Signed distance from a point to the plane.
    #[inline]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.offset
    }

    /// Orthogonal projection of a point onto the plane.
    #[inline]
    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }

    /// Whether `other` describes the same (possibly flipped) plane within
    /// the given angular and offset tolerances.
    pub fn coincides_with(&self, other: &Plane, angle_tol: f64, offset_tol: f64) -> bool {
        let dot = self.normal.dot(&other.normal);
        if dot.abs() < (1.0 - angle_tol) {
            return false;
        }
        let offset = if dot >= 0.0 {
            other.offset
        } else {
            -other.offset
        };
        (self.offset - offset).abs() <= offset_tol
    }

    /// Flip the plane orientation in place.
    pub fn flip(&mut self) {
        self.normal = -self.normal;
        self.offset = -self.offset;
    }
}

/// A line in 3D given by a point and a unit direction.
#[derive(Debug, Clone, Copy)]
pub struct Line3 {
    pub point: Point3<f64>,
    pub direction: Vector3<f64>,
}

/// Intersect two planes. Returns `None` when they are parallel
/// (coincident or not).
pub fn intersect_planes(a: &Plane, b: &Plane) -> Option<Line3> {
    let direction = a.normal.cross(&b.normal);
    let norm = direction.norm();
    if norm < PARALLEL_EPSILON {
        return None;
    }
    let direction = direction / norm;

    // Solve [n_a; n_b; dir] p = [-d_a; -d_b; 0]; the third row pins the
    // solution to the point on the line closest to the origin.
    let m = Matrix3::from_rows(&[
        a.normal.transpose(),
        b.normal.transpose(),
        direction.transpose(),
    ]);
    let rhs = Vector3::new(-a.offset, -b.offset, 0.0);
    let point = m.lu().solve(&rhs)?;

    Some(Line3 {
        point: Point3::from(point),
        direction,
    })
}

/// Intersect three planes in a single point. Returns `None` when any pair
/// is parallel or all three share a line.
pub fn intersect_three_planes(a: &Plane, b: &Plane, c: &Plane) -> Option<Point3<f64>> {
    let m = Matrix3::from_rows(&[
        a.normal.transpose(),
        b.normal.transpose(),
        c.normal.transpose(),
    ]);
    if m.determinant().abs() < TRIPLE_POINT_EPSILON {
        return None;
    }
    let rhs = Vector3::new(-a.offset, -b.offset, -c.offset);
    m.lu().solve(&rhs).map(Point3::from)
}

/// A 2D orthonormal frame embedded in a supporting plane.
///
/// Both the alpha shape and the arrangement on a plane use the same frame,
/// so 2D coordinates are directly comparable across the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PlaneFrame {
    pub origin: Point3<f64>,
    pub u: Vector3<f64>,
    pub v: Vector3<f64>,
    pub normal: Vector3<f64>,
}

impl PlaneFrame {
    /// Build a deterministic frame for a plane: the u axis comes from the
    /// world axis least aligned with the normal.
    pub fn for_plane(plane: &Plane) -> Self {
        let n = plane.normal;
        let abs = n.map(f64::abs);
        let seed = if abs.x <= abs.y && abs.x <= abs.z {
            Vector3::x()
        } else if abs.y <= abs.z {
            Vector3::y()
        } else {
            Vector3::z()
        };
        let u = n.cross(&seed).normalize();
        let v = n.cross(&u);
        Self {
            origin: plane.project(&Point3::origin()),
            u,
            v,
            normal: n,
        }
    }

    /// Project a 3D point into frame coordinates (dropping the normal
    /// component).
    #[inline]
    pub fn to_plane(&self, p: &Point3<f64>) -> Point2<f64> {
        let d = p - self.origin;
        Point2::new(d.dot(&self.u), d.dot(&self.v))
    }

    /// Lift 2D frame coordinates back to 3D.
    #[inline]
    pub fn to_world(&self, p: &Point2<f64>) -> Point3<f64> {
        self.origin + self.u * p.x + self.v * p.y
    }

    /// Restrict another plane's signed-distance function to this frame,
    /// yielding the 2D line `a*x + b*y + c = 0`. Returns `None` when the
    /// other plane is parallel to this one.
    pub fn restrict(&self, other: &Plane) -> Option<(f64, f64, f64)> {
        let a = other.normal.dot(&self.u);
        let b = other.normal.dot(&self.v);
        if Vector2::new(a, b).norm() < PARALLEL_EPSILON {
            return None;
        }
        let c = other.normal.dot(&self.origin.coords) + other.offset;
        Some((a, b, c))
    }
}

/// Orientation of `c` relative to the directed line `a -> b`.
///
/// Positive for counter-clockwise. A float filter catches the common case;
/// near-degenerate input is recomputed with fused multiply-adds, which
/// halves the rounding error of the naive determinant.
pub fn orient2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    let det_left = (a.x - c.x) * (b.y - c.y);
    let det_right = (a.y - c.y) * (b.x - c.x);
    let det = det_left - det_right;

    let det_sum = det_left.abs() + det_right.abs();
    if det.abs() >= ORIENT2D_FILTER * det_sum {
        return det;
    }

    let ax = a.x - c.x;
    let ay = a.y - c.y;
    let bx = b.x - c.x;
    let by = b.y - c.y;
    ax.mul_add(by, -(ay * bx))
}

/// Deduplicating pool of constructed 3D vertices.
///
/// Vertices from different planes that describe the same triple-plane
/// intersection differ by floating-point noise; the pool merges them with a
/// spatial hash over cells of twice the tolerance, scanning the 3x3x3
/// neighborhood so near-boundary points still collapse. Identifiers are
/// assigned in insertion order, which keeps the hypothesis graph
/// deterministic for a fixed input order.
#[derive(Debug)]
pub struct VertexPool {
    epsilon: f64,
    cell_size: f64,
    cells: HashMap<(i64, i64, i64), Vec<u32>>,
    points: Vec<Point3<f64>>,
}

impl VertexPool {
    /// Create a pool merging vertices closer than `epsilon`.
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            cell_size: epsilon * 2.0,
            cells: HashMap::new(),
            points: Vec::new(),
        }
    }

    fn cell_of(&self, p: &Point3<f64>) -> (i64, i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    /// Insert a point, returning the identifier of the canonical vertex
    /// within tolerance (the nearest one, lowest id on ties) or a fresh id.
    pub fn insert(&mut self, p: Point3<f64>) -> u32 {
        let cell = self.cell_of(&p);

        let mut best: Option<(f64, u32)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let neighbor = (cell.0 + dx, cell.1 + dy, cell.2 + dz);
                    let Some(candidates) = self.cells.get(&neighbor) else {
                        continue;
                    };
                    for &id in candidates {
                        let dist = (self.points[id as usize] - p).norm();
                        if dist < self.epsilon {
                            let better = match best {
                                None => true,
                                Some((best_dist, best_id)) => {
                                    dist < best_dist || (dist == best_dist && id < best_id)
                                }
                            };
                            if better {
                                best = Some((dist, id));
                            }
                        }
                    }
                }
            }
        }

        if let Some((_, id)) = best {
            return id;
        }

        let id = self.points.len() as u32;
        self.points.push(p);
        self.cells.entry(cell).or_default().push(id);
        id
    }

    /// Number of distinct vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Slice of canonical vertex positions, indexed by identifier.
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Consume the pool, returning the vertex positions.
    pub fn into_points(self) -> Vec<Point3<f64>> {
        self.points
    }
}
