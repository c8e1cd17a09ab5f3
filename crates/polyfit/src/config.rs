//! Reconstruction parameters and presets.

use serde::{Deserialize, Serialize};

use crate::error::{ReconstructError, ReconstructResult};

/// Tolerance for the weight-sum check. Weights are user input and often
/// arrive as rounded decimals.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Parameters controlling hypothesis generation and face selection.
///
/// The three objective weights must sum to 1. `validate()` is called at
/// the start of every reconstruction; construct params through the
/// presets or `Default` to stay in the valid region.
///
/// # Example
///
/// ```
/// use polyfit::ReconstructionParams;
///
/// let params = ReconstructionParams {
///     complexity_weight: 0.5,
///     fit_weight: 0.3,
///     coverage_weight: 0.2,
///     ..Default::default()
/// };
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionParams {
    /// Weight of the data-fit term in the objective.
    pub fit_weight: f64,

    /// Weight of the point-coverage term in the objective.
    pub coverage_weight: f64,

    /// Weight of the model-complexity (sharp edge) term in the objective.
    pub complexity_weight: f64,

    /// Multiplier on the mean nearest-neighbor distance used to derive
    /// the alpha-shape radius.
    pub alpha_scale: f64,

    /// Residual tolerance for the support term. `None` derives
    /// 3x the mean point spacing.
    pub residual_tolerance: Option<f64>,

    /// Bounding-box inflation as a fraction of the diagonal.
    pub bbox_margin: f64,

    /// Allow faces lying on the bounding box into the candidate set,
    /// letting the solver close surfaces through the box.
    pub include_bbox_faces: bool,

    /// Solver wall-clock budget in seconds. 0 means unlimited.
    pub solver_time_limit_seconds: f64,

    /// Relative optimality gap at which the solver may stop.
    pub solver_gap: f64,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            fit_weight: 0.43,
            coverage_weight: 0.27,
            complexity_weight: 0.30,
            alpha_scale: 5.0,
            residual_tolerance: None,
            bbox_margin: 0.05,
            include_bbox_faces: false,
            solver_time_limit_seconds: 0.0,
            solver_gap: 0.0,
        }
    }
}

impl ReconstructionParams {
    /// Preset for building exteriors: favors simple, strongly regularized
    /// models over squeezing out the last bit of data fit.
    pub fn for_buildings() -> Self {
        Self {
            fit_weight: 0.30,
            coverage_weight: 0.20,
            complexity_weight: 0.50,
            ..Default::default()
        }
    }

    /// Preset for noisy scanner data: wider alpha radius so coverage
    /// survives sampling gaps, looser residual band.
    pub fn for_noisy_scans() -> Self {
        Self {
            fit_weight: 0.50,
            coverage_weight: 0.30,
            complexity_weight: 0.20,
            alpha_scale: 8.0,
            ..Default::default()
        }
    }

    /// Check all parameter ranges.
    pub fn validate(&self) -> ReconstructResult<()> {
        let sum = self.fit_weight + self.coverage_weight + self.complexity_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ReconstructError::InvalidWeights {
                fit: self.fit_weight,
                coverage: self.coverage_weight,
                complexity: self.complexity_weight,
                sum,
            });
        }

        for (name, value) in [
            ("fit_weight", self.fit_weight),
            ("coverage_weight", self.coverage_weight),
            ("complexity_weight", self.complexity_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReconstructError::InvalidInput {
                    details: format!("{name} must lie in [0, 1], got {value}"),
                });
            }
        }

        if !(self.alpha_scale > 0.0) {
            return Err(ReconstructError::InvalidInput {
                details: format!("alpha_scale must be positive, got {}", self.alpha_scale),
            });
        }

        if let Some(eps) = self.residual_tolerance
            && !(eps > 0.0)
        {
            return Err(ReconstructError::InvalidInput {
                details: format!("residual_tolerance must be positive, got {eps}"),
            });
        }

        if !(0.0..=1.0).contains(&self.bbox_margin) {
            return Err(ReconstructError::InvalidInput {
                details: format!("bbox_margin must lie in [0, 1], got {}", self.bbox_margin),
            });
        }

        if !(self.solver_time_limit_seconds >= 0.0) {
            return Err(ReconstructError::InvalidInput {
                details: format!(
                    "solver_time_limit_seconds must be non-negative, got {}",
                    self.solver_time_limit_seconds
                ),
            });
        }

        if !(0.0..=1.0).contains(&self.solver_gap) {
            return Err(ReconstructError::InvalidInput {
                details: format!("solver_gap must lie in [0, 1], got {}", self.solver_gap),
            });
        }

        Ok(())
    }
}
