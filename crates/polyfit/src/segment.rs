//! Planar segments: point subsets with a supporting plane.

use nalgebra::Point3;
use tracing::debug;

use crate::error::{ReconstructError, ReconstructResult};
use crate::kernel::Plane;
use crate::types::{PointSample, VertexColor};

/// A subset of the input cloud supported by a single plane.
///
/// Segments are produced by an upstream plane-detection step (RANSAC,
/// region growing, ...) and are immutable inputs here. Every member point
/// is expected to lie on the supporting plane within sampling noise.
#[derive(Debug, Clone)]
pub struct PlanarSegment {
    /// Member point samples.
    pub points: Vec<PointSample>,

    /// Supporting plane (unit normal + signed offset).
    pub plane: Plane,

    /// Segment color, if the detector assigned one.
    pub color: Option<VertexColor>,
}

impl PlanarSegment {
    /// Create a segment from points and a known supporting plane.
    pub fn new(points: Vec<PointSample>, plane: Plane) -> Self {
        Self {
            points,
            plane,
            color: None,
        }
    }

    /// Create a segment by least-squares fitting the supporting plane
    /// through the points.
    pub fn from_points(points: Vec<PointSample>) -> ReconstructResult<Self> {
        let positions: Vec<Point3<f64>> = points.iter().map(|p| p.position).collect();
        let plane = Plane::fit(&positions)?;
        Ok(Self::new(points, plane))
    }

    /// Number of member points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the segment has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Largest absolute point-to-plane distance over the members.
    pub fn max_plane_distance(&self) -> f64 {
        self.points
            .iter()
            .map(|p| self.plane.signed_distance(&p.position).abs())
            .fold(0.0, f64::max)
    }

    /// Validate the segment for use in reconstruction.
    pub fn validate(&self, index: usize) -> ReconstructResult<()> {
        if self.points.len() < 3 {
            return Err(ReconstructError::DegenerateSegment {
                index,
                details: format!("has only {} points (need at least 3)", self.points.len()),
            });
        }
        let norm = self.plane.normal.norm();
        if (norm - 1.0).abs() > 1e-6 {
            return Err(ReconstructError::InvalidInput {
                details: format!("segment {index} has a non-unit plane normal (length {norm})"),
            });
        }
        Ok(())
    }
}

/// Merge segments whose supporting planes coincide within tolerance.
///
/// The arrangement treats each supporting plane once, so duplicated planes
/// must be unioned before hypothesis generation. The merged plane is refit
/// from the unioned points; when the refit is degenerate the first
/// segment's plane is kept.
pub fn merge_coplanar_segments(
    segments: Vec<PlanarSegment>,
    angle_tolerance: f64,
    offset_tolerance: f64,
) -> Vec<PlanarSegment> {
    let mut merged: Vec<PlanarSegment> = Vec::with_capacity(segments.len());

    for segment in segments {
        let existing = merged.iter_mut().find(|kept| {
            kept.plane
                .coincides_with(&segment.plane, angle_tolerance, offset_tolerance)
        });

        match existing {
            Some(kept) => {
                debug!(
                    points = segment.len(),
                    "merging segment into coincident supporting plane"
                );
                kept.points.extend(segment.points);
                let positions: Vec<Point3<f64>> =
                    kept.points.iter().map(|p| p.position).collect();
                if let Ok(refit) = Plane::fit(&positions) {
                    // Keep the original orientation so downstream normals
                    // stay stable.
                    let mut refit = refit;
                    if refit.normal.dot(&kept.plane.normal) < 0.0 {
                        refit.flip();
                    }
                    kept.plane = refit;
                }
                if kept.color.is_none() {
                    kept.color = segment.color;
                }
            }
            None => merged.push(segment),
        }
    }

    merged
}
