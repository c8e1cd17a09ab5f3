//! Binary linear program contract and the default branch-and-bound backend.
//!
//! Face selection formulates a 0/1 program and hands it to any
//! [`BinarySolver`]. The shipped [`BranchBoundSolver`] is a deterministic
//! depth-first branch-and-bound with constraint interval pruning and unit
//! propagation on equalities; it makes the crate usable without an external
//! MIP binding, and nothing in the formulation depends on it.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{ReconstructError, ReconstructResult};

/// Comparison tolerance for constraint arithmetic. Coefficients here are
/// small integers, so this is generous.
const FEASIBILITY_EPSILON: f64 = 1e-9;

/// How often the search polls the wall clock, in explored nodes.
const TIME_CHECK_INTERVAL: u64 = 1024;

/// Kind of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Integer,
}

/// Sense of a linear constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSense {
    Equal,
    LessEq,
    GreaterEq,
}

/// A sparse linear constraint `sum(coeff * var) sense rhs`.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub terms: Vec<(u32, f64)>,
    pub sense: ConstraintSense,
    pub rhs: f64,
}

/// A binary/integer linear program in minimization form.
#[derive(Debug, Clone)]
pub struct BipProblem {
    /// Objective coefficients, one per variable; the solver minimizes
    /// `objective . x + constant`.
    pub objective: Vec<f64>,

    /// Constant objective term, carried so reported objectives match the
    /// model the caller reasons about.
    pub constant: f64,

    /// Constraint rows.
    pub constraints: Vec<LinearConstraint>,

    /// Variable kinds, one per variable.
    pub kinds: Vec<VarKind>,

    /// Wall-clock budget; `None` is unlimited.
    pub time_limit: Option<Duration>,

    /// Relative optimality gap at which a feasible incumbent may be
    /// returned early.
    pub gap: f64,
}

impl BipProblem {
    /// Number of variables.
    #[inline]
    pub fn num_vars(&self) -> usize {
        self.objective.len()
    }
}

/// Terminal state reported by a solver backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// The incumbent is proven optimal.
    Optimal,
    /// Search stopped inside the requested optimality gap.
    FeasibleGapReached,
    /// The time budget expired; the best incumbent is returned.
    TimeLimit,
    /// No feasible assignment exists.
    Infeasible,
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::FeasibleGapReached => "feasible_gap_reached",
            SolveStatus::TimeLimit => "time_limit",
            SolveStatus::Infeasible => "infeasible",
        };
        f.write_str(s)
    }
}

/// A solver result: status, assignment, and achieved objective.
#[derive(Debug, Clone)]
pub struct BipSolution {
    pub status: SolveStatus,
    pub values: Vec<bool>,
    pub objective: f64,
}

/// Abstract 0/1 program solver.
///
/// Any MIP backend can sit behind this trait; the selection stage never
/// assumes a particular algorithm. Hard backend failures surface as
/// [`ReconstructError::Solver`].
pub trait BinarySolver {
    /// Solve the program, returning the best assignment found.
    fn solve_bip(&self, problem: &BipProblem) -> ReconstructResult<BipSolution>;
}

/// Deterministic depth-first branch-and-bound over binary variables.
///
/// Branching follows a static order (ascending objective coefficient,
/// index on ties) and tries the cheaper value first, so repeated runs on
/// the same problem return the same incumbent even among equal optima.
#[derive(Debug, Clone, Default)]
pub struct BranchBoundSolver;

impl BranchBoundSolver {
    pub fn new() -> Self {
        Self
    }
}

impl BinarySolver for BranchBoundSolver {
    fn solve_bip(&self, problem: &BipProblem) -> ReconstructResult<BipSolution> {
        if problem.kinds.len() != problem.num_vars() {
            return Err(ReconstructError::Solver {
                details: format!(
                    "kind count {} does not match variable count {}",
                    problem.kinds.len(),
                    problem.num_vars()
                ),
            });
        }
        if problem.kinds.iter().any(|k| *k != VarKind::Binary) {
            return Err(ReconstructError::Solver {
                details: "branch-and-bound backend supports binary variables only".into(),
            });
        }
        for constraint in &problem.constraints {
            for &(var, _) in &constraint.terms {
                if var as usize >= problem.num_vars() {
                    return Err(ReconstructError::Solver {
                        details: format!("constraint references unknown variable {var}"),
                    });
                }
            }
        }

        let mut search = Search::new(problem);
        search.run();

        let status = search.status();
        let (values, objective) = match search.incumbent {
            Some((values, objective)) => (values, objective),
            None => (vec![false; problem.num_vars()], f64::INFINITY),
        };

        debug!(
            nodes = search.nodes,
            status = %status,
            objective = format!("{objective:.6}"),
            "branch-and-bound finished"
        );

        Ok(BipSolution {
            status,
            values,
            objective,
        })
    }
}

/// Per-constraint running state plus the incumbent bookkeeping.
struct Search<'a> {
    problem: &'a BipProblem,
    /// -1 unassigned, 0/1 assigned.
    values: Vec<i8>,
    /// Constraints touching each variable, with the coefficient.
    var_constraints: Vec<Vec<(u32, f64)>>,
    /// Assigned portion of each constraint row.
    sums: Vec<f64>,
    /// Smallest achievable remaining contribution per row.
    min_rem: Vec<f64>,
    /// Largest achievable remaining contribution per row.
    max_rem: Vec<f64>,
    /// Objective cost of the current partial assignment.
    assigned_cost: f64,
    /// Sum of `min(0, c)` over unassigned variables; together with
    /// `assigned_cost` this is an admissible lower bound.
    bound_rem: f64,
    /// Static branching order.
    order: Vec<u32>,
    incumbent: Option<(Vec<bool>, f64)>,
    nodes: u64,
    deadline: Option<Instant>,
    timed_out: bool,
    gap_pruned: bool,
}

impl<'a> Search<'a> {
    fn new(problem: &'a BipProblem) -> Self {
        let n = problem.num_vars();
        let m = problem.constraints.len();

        let mut var_constraints: Vec<Vec<(u32, f64)>> = vec![Vec::new(); n];
        let mut min_rem = vec![0.0; m];
        let mut max_rem = vec![0.0; m];
        for (ci, constraint) in problem.constraints.iter().enumerate() {
            for &(var, coeff) in &constraint.terms {
                var_constraints[var as usize].push((ci as u32, coeff));
                min_rem[ci] += coeff.min(0.0);
                max_rem[ci] += coeff.max(0.0);
            }
        }

        let mut order: Vec<u32> = (0..n as u32).collect();
        order.sort_by(|&a, &b| {
            problem.objective[a as usize]
                .partial_cmp(&problem.objective[b as usize])
                .expect("objective coefficients are finite")
                .then(a.cmp(&b))
        });

        let bound_rem = problem.objective.iter().map(|c| c.min(0.0)).sum();

        Self {
            problem,
            values: vec![-1; n],
            var_constraints,
            sums: vec![0.0; m],
            min_rem,
            max_rem,
            assigned_cost: 0.0,
            bound_rem,
            order,
            incumbent: None,
            nodes: 0,
            deadline: problem.time_limit.map(|limit| Instant::now() + limit),
            timed_out: false,
            gap_pruned: false,
        }
    }

    fn status(&self) -> SolveStatus {
        if self.incumbent.is_none() {
            SolveStatus::Infeasible
        } else if self.timed_out {
            SolveStatus::TimeLimit
        } else if self.gap_pruned {
            SolveStatus::FeasibleGapReached
        } else {
            SolveStatus::Optimal
        }
    }

    fn run(&mut self) {
        self.dfs(0);
    }

    fn row_violated(&self, ci: usize) -> bool {
        let constraint = &self.problem.constraints[ci];
        let low = self.sums[ci] + self.min_rem[ci];
        let high = self.sums[ci] + self.max_rem[ci];
        match constraint.sense {
            ConstraintSense::Equal => {
                low > constraint.rhs + FEASIBILITY_EPSILON
                    || high < constraint.rhs - FEASIBILITY_EPSILON
            }
            ConstraintSense::LessEq => low > constraint.rhs + FEASIBILITY_EPSILON,
            ConstraintSense::GreaterEq => high < constraint.rhs - FEASIBILITY_EPSILON,
        }
    }

    /// Assign `var := val`, updating row intervals. Returns false on an
    /// immediate conflict. Touched rows are queued for forcing checks.
    fn assign(
        &mut self,
        var: u32,
        val: i8,
        trail: &mut Vec<u32>,
        queue: &mut Vec<u32>,
    ) -> bool {
        debug_assert_eq!(self.values[var as usize], -1);
        self.values[var as usize] = val;
        trail.push(var);

        let coeff = self.problem.objective[var as usize];
        if val == 1 {
            self.assigned_cost += coeff;
        }
        self.bound_rem -= coeff.min(0.0);

        let mut ok = true;
        for k in 0..self.var_constraints[var as usize].len() {
            let (ci, c) = self.var_constraints[var as usize][k];
            let ci = ci as usize;
            if val == 1 {
                self.sums[ci] += c;
            }
            self.min_rem[ci] -= c.min(0.0);
            self.max_rem[ci] -= c.max(0.0);
            if self.row_violated(ci) {
                ok = false;
            }
            queue.push(ci as u32);
        }
        ok
    }

    fn unassign(&mut self, var: u32) {
        let val = self.values[var as usize];
        debug_assert!(val >= 0);
        self.values[var as usize] = -1;

        let coeff = self.problem.objective[var as usize];
        if val == 1 {
            self.assigned_cost -= coeff;
        }
        self.bound_rem += coeff.min(0.0);

        for k in 0..self.var_constraints[var as usize].len() {
            let (ci, c) = self.var_constraints[var as usize][k];
            let ci = ci as usize;
            if val == 1 {
                self.sums[ci] -= c;
            }
            self.min_rem[ci] += c.min(0.0);
            self.max_rem[ci] += c.max(0.0);
        }
    }

    /// Assign and run forcing to a fixpoint. On conflict the trail still
    /// records every assignment made, so the caller can undo.
    fn assign_and_propagate(&mut self, var: u32, val: i8, trail: &mut Vec<u32>) -> bool {
        let mut queue: Vec<u32> = Vec::new();
        if !self.assign(var, val, trail, &mut queue) {
            return false;
        }

        while let Some(ci) = queue.pop() {
            let ci = ci as usize;
            let constraint = &self.problem.constraints[ci];
            let low = self.sums[ci] + self.min_rem[ci];
            let high = self.sums[ci] + self.max_rem[ci];

            // A row pinned to one end of its interval forces every
            // remaining variable to the corresponding extreme value.
            let force_max = match constraint.sense {
                ConstraintSense::Equal | ConstraintSense::GreaterEq => {
                    high <= constraint.rhs + FEASIBILITY_EPSILON
                        && high >= constraint.rhs - FEASIBILITY_EPSILON
                }
                ConstraintSense::LessEq => false,
            };
            let force_min = match constraint.sense {
                ConstraintSense::Equal | ConstraintSense::LessEq => {
                    low >= constraint.rhs - FEASIBILITY_EPSILON
                        && low <= constraint.rhs + FEASIBILITY_EPSILON
                }
                ConstraintSense::GreaterEq => false,
            };
            if !force_max && !force_min {
                continue;
            }

            let terms = constraint.terms.clone();
            for (var, coeff) in terms {
                if self.values[var as usize] != -1 {
                    continue;
                }
                let forced = if force_max {
                    if coeff > 0.0 { 1 } else { 0 }
                } else if coeff > 0.0 {
                    0
                } else {
                    1
                };
                trace!(var, forced, row = ci, "propagation forced assignment");
                if !self.assign(var, forced, trail, &mut queue) {
                    return false;
                }
            }
        }

        true
    }

    fn undo(&mut self, trail: &[u32]) {
        for &var in trail.iter().rev() {
            self.unassign(var);
        }
    }

    fn out_of_time(&mut self) -> bool {
        if self.timed_out {
            return true;
        }
        if self.nodes % TIME_CHECK_INTERVAL == 0
            && let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.timed_out = true;
        }
        self.timed_out
    }

    fn dfs(&mut self, from: usize) {
        self.nodes += 1;
        if self.out_of_time() {
            return;
        }

        // Bound pruning, widened by the requested gap.
        if let Some((_, incumbent)) = &self.incumbent {
            let bound = self.problem.constant + self.assigned_cost + self.bound_rem;
            let margin = self.problem.gap * incumbent.abs();
            if bound >= incumbent - margin - FEASIBILITY_EPSILON {
                if bound < incumbent - FEASIBILITY_EPSILON {
                    self.gap_pruned = true;
                }
                return;
            }
        }

        // Next unassigned variable in the static order.
        let next = self.order[from..]
            .iter()
            .position(|&v| self.values[v as usize] == -1)
            .map(|offset| from + offset);

        let Some(position) = next else {
            // Complete assignment; rows were interval-checked on the way.
            let objective = self.problem.constant + self.assigned_cost;
            let better = match &self.incumbent {
                None => true,
                Some((_, best)) => objective < best - FEASIBILITY_EPSILON,
            };
            if better {
                let values = self.values.iter().map(|&v| v == 1).collect();
                trace!(objective = format!("{objective:.6}"), "new incumbent");
                self.incumbent = Some((values, objective));
            }
            return;
        };
        let var = self.order[position];

        // Try the objective-preferred value first.
        let preferred: [i8; 2] = if self.problem.objective[var as usize] < 0.0 {
            [1, 0]
        } else {
            [0, 1]
        };

        for val in preferred {
            let mut trail = Vec::new();
            if self.assign_and_propagate(var, val, &mut trail) {
                self.dfs(position + 1);
            }
            self.undo(&trail);
            if self.timed_out {
                return;
            }
        }
    }
}
