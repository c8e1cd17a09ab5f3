//! Error types for surface reconstruction.

use thiserror::Error;

/// Result type alias for reconstruction operations.
pub type ReconstructResult<T> = Result<T, ReconstructError>;

/// Errors that can occur during surface reconstruction.
///
/// An empty hypothesis graph or an all-zero selection is *not* an error:
/// [`reconstruct`](crate::reconstruct) returns an empty mesh with a
/// descriptive diagnostic in that case.
#[derive(Debug, Error)]
pub enum ReconstructError {
    /// The input segments or parameters are malformed.
    #[error("invalid input: {details}")]
    InvalidInput { details: String },

    /// The objective weights do not form a convex combination.
    #[error(
        "objective weights must sum to 1 (fit {fit} + coverage {coverage} + complexity {complexity} = {sum})"
    )]
    InvalidWeights {
        fit: f64,
        coverage: f64,
        complexity: f64,
        sum: f64,
    },

    /// A segment is too small or degenerate to participate.
    #[error("segment {index} is degenerate: {details}")]
    DegenerateSegment { index: usize, details: String },

    /// The geometry kernel hit an unrecoverable condition.
    #[error("geometry failure: {details}")]
    Geometry { details: String },

    /// No solver backend could be constructed or reached.
    #[error("solver unavailable: {details}")]
    SolverUnavailable { details: String },

    /// The solver backend reported a hard failure.
    #[error("solver error: {details}")]
    Solver { details: String },
}

impl ReconstructError {
    /// Short machine-readable code, used by the CLI for error rendering.
    pub fn code(&self) -> &'static str {
        match self {
            ReconstructError::InvalidInput { .. } => "invalid_input",
            ReconstructError::InvalidWeights { .. } => "invalid_weights",
            ReconstructError::DegenerateSegment { .. } => "degenerate_segment",
            ReconstructError::Geometry { .. } => "geometry_failure",
            ReconstructError::SolverUnavailable { .. } => "solver_unavailable",
            ReconstructError::Solver { .. } => "solver_error",
        }
    }

    /// Actionable suggestion for recovering from this error.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ReconstructError::InvalidInput { .. } => {
                "check that every segment has at least 3 points and a unit plane normal"
            }
            ReconstructError::InvalidWeights { .. } => {
                "rescale fit_weight, coverage_weight and complexity_weight so they sum to 1"
            }
            ReconstructError::DegenerateSegment { .. } => {
                "drop or re-segment clusters with fewer than 3 non-collinear points"
            }
            ReconstructError::Geometry { .. } => {
                "verify the supporting planes are not all parallel or coincident"
            }
            ReconstructError::SolverUnavailable { .. } => {
                "construct the solver backend explicitly and pass it to reconstruct_with_solver"
            }
            ReconstructError::Solver { .. } => {
                "raise the solver time limit or loosen the optimality gap"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ReconstructError::InvalidWeights {
            fit: 0.5,
            coverage: 0.5,
            complexity: 0.5,
            sum: 1.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("sum to 1"));
        assert!(msg.contains("1.5"));
        assert_eq!(err.code(), "invalid_weights");
    }

    #[test]
    fn codes_are_stable() {
        let err = ReconstructError::Geometry {
            details: "all planes parallel".into(),
        };
        assert_eq!(err.code(), "geometry_failure");
        assert!(!err.recovery_suggestion().is_empty());
    }
}
