//! Piecewise-planar surface reconstruction from segmented point clouds.
//!
//! Given a point cloud partitioned into planar segments (each with a
//! supporting plane, as produced by RANSAC or region growing), this crate
//! reconstructs a lightweight polygonal surface whose faces are a subset
//! of a candidate arrangement of the supporting planes:
//!
//! 1. **Hypothesis generation** - every supporting plane is clipped to an
//!    inflated bounding box and subdivided by its intersections with the
//!    other planes; the resulting convex cells are the candidate faces.
//! 2. **Face selection** - a 0/1 linear program chooses the subset of
//!    candidates that best balances data fit, point coverage, and model
//!    complexity, subject to per-edge manifold constraints.
//!
//! The output is watertight wherever the input evidence allows a closed
//! surface, and consistently oriented per connected component.
//!
//! # Quick Start
//!
//! ```no_run
//! use polyfit::{reconstruct, PlanarSegment, PointSample, Plane, ReconstructionParams};
//! use nalgebra::Vector3;
//!
//! // One segment per detected plane.
//! let points = vec![PointSample::from_coords(0.0, 0.0, 0.0) /* ... */];
//! let plane = Plane::new(Vector3::z(), 0.0).unwrap();
//! let segments = vec![PlanarSegment::new(points, plane)];
//!
//! let result = reconstruct(&segments, &ReconstructionParams::default()).unwrap();
//! println!(
//!     "{} faces, objective {:.4}",
//!     result.mesh.face_count(),
//!     result.diagnostics.objective
//! );
//! ```
//!
//! # Weights
//!
//! The objective blends three normalized terms whose weights must sum
//! to 1: `fit_weight` rewards faces supported by many points,
//! `coverage_weight` rewards faces covered by the segment's alpha shape,
//! and `complexity_weight` penalizes crease edges. Heavier complexity
//! weights produce simpler, more regularized models;
//! `ReconstructionParams::for_buildings()` is a preset in that direction.
//!
//! # Solver
//!
//! Face selection runs through the [`BinarySolver`] trait. The bundled
//! [`BranchBoundSolver`] handles the small programs this pipeline
//! produces; any external MIP backend can be plugged in via
//! [`reconstruct_with_solver`].
//!
//! # Logging
//!
//! All stages log through `tracing`; set `RUST_LOG=polyfit=debug` (with a
//! subscriber installed) for per-stage detail, or
//! `RUST_LOG=polyfit::timing=info` for stage timing only.

mod error;
mod types;

pub mod alpha;
pub mod config;
pub mod hypothesis;
pub mod kernel;
pub mod polygon;
pub mod reconstruct;
pub mod segment;
pub mod selection;
pub mod solver;
pub mod tracing_ext;
pub mod validate;

pub use config::ReconstructionParams;
pub use error::{ReconstructError, ReconstructResult};
pub use kernel::{Plane, PlaneFrame};
pub use reconstruct::{Diagnostics, Reconstruction, reconstruct, reconstruct_with_solver};
pub use segment::{PlanarSegment, merge_coplanar_segments};
pub use selection::{Selection, assemble_mesh, select_faces, selection_is_manifold};
pub use solver::{
    BinarySolver, BipProblem, BipSolution, BranchBoundSolver, ConstraintSense, LinearConstraint,
    SolveStatus, VarKind,
};
pub use types::{PointSample, PolygonMesh, VertexColor};
pub use validate::{SurfaceReport, validate_surface};

impl PolygonMesh {
    /// Validate the surface and return a report.
    pub fn validate(&self) -> SurfaceReport {
        validate::validate_surface(self)
    }
}
