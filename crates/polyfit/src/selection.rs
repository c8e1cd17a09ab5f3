//! Face selection: binary program formulation and output assembly.
//!
//! One binary per candidate face, plus per-edge auxiliaries: `z_e` encodes
//! the 0-or-2 manifold equality on interior edges, `y_e` flags a crease
//! (two selected faces from different planes). Edges on the bounding-box
//! surface are only capped at two faces, which is what allows open
//! outputs to terminate at the box.

use hashbrown::HashMap;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::config::ReconstructionParams;
use crate::error::ReconstructResult;
use crate::hypothesis::HypothesisGraph;
use crate::solver::{
    BinarySolver, BipProblem, ConstraintSense, LinearConstraint, SolveStatus, VarKind,
};
use crate::types::PolygonMesh;

/// Outcome of the selection stage.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Per-candidate-face decision.
    pub selected: Vec<bool>,

    /// Solver terminal status.
    pub status: SolveStatus,

    /// Achieved objective value.
    pub objective: f64,

    /// Fraction of total support captured by the selected faces.
    pub fit_fraction: f64,

    /// Fraction of total alpha-shape area covered by the selected faces.
    pub coverage_fraction: f64,

    /// Crease edges in the selected surface.
    pub sharp_edge_count: usize,
}

impl Selection {
    /// Number of selected faces.
    pub fn selected_count(&self) -> usize {
        self.selected.iter().filter(|&&v| v).count()
    }
}

/// Build the 0/1 program for a hypothesis graph.
///
/// Variable layout: faces first, then one `z` per manifold-equality edge,
/// then one `y` per sharp-candidate edge. Edges on the bounding box get
/// the relaxed at-most-2 row instead of an equality, which is what keeps
/// open reconstructions representable.
pub fn build_problem(graph: &HypothesisGraph, params: &ReconstructionParams) -> BipProblem {
    let num_faces = graph.faces.len();
    let sharp_edges: Vec<usize> = graph
        .edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_sharp_candidate())
        .map(|(i, _)| i)
        .collect();
    let equality_edges: Vec<usize> = graph
        .edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.requires_manifold_equality())
        .map(|(i, _)| i)
        .collect();
    let num_sharp = sharp_edges.len();

    let z_base = num_faces;
    let y_base = num_faces + equality_edges.len();
    let num_vars = y_base + num_sharp;

    // Objective: lambda_fit * (1 - sum supp x / supp_total)
    //          + lambda_cmpl * (sum y) / num_sharp
    //          + lambda_cov * (1 - sum cov x / area_total).
    // Terms with a zero normalizer are dropped.
    let mut objective = vec![0.0; num_vars];
    let mut constant = 0.0;

    if graph.support_total > 0.0 {
        constant += params.fit_weight;
        for (fi, face) in graph.faces.iter().enumerate() {
            objective[fi] -= params.fit_weight * face.support / graph.support_total;
        }
    }
    if graph.alpha_area_total > 0.0 {
        constant += params.coverage_weight;
        for (fi, face) in graph.faces.iter().enumerate() {
            objective[fi] -= params.coverage_weight * face.coverage / graph.alpha_area_total;
        }
    }
    if num_sharp > 0 {
        let per_edge = params.complexity_weight / num_sharp as f64;
        for k in 0..num_sharp {
            objective[y_base + k] = per_edge;
        }
    }

    let mut constraints = Vec::new();

    // Strict manifold equality on interior edges: sum x - 2 z = 0.
    for (k, &ei) in equality_edges.iter().enumerate() {
        let edge = &graph.edges[ei];
        let mut terms: Vec<(u32, f64)> = edge.faces.iter().map(|&f| (f, 1.0)).collect();
        terms.push(((z_base + k) as u32, -2.0));
        constraints.push(LinearConstraint {
            terms,
            sense: ConstraintSense::Equal,
            rhs: 0.0,
        });
    }

    for (k, &ei) in sharp_edges.iter().enumerate() {
        let edge = &graph.edges[ei];

        // Box-surface edges may stay open but never exceed two faces.
        if edge.on_box && edge.faces.len() > 2 {
            constraints.push(LinearConstraint {
                terms: edge.faces.iter().map(|&f| (f, 1.0)).collect(),
                sense: ConstraintSense::LessEq,
                rhs: 2.0,
            });
        }

        // Crease linearization: y >= x_f + x_g - 1 for every cross-plane
        // incident pair.
        for (i, &fa) in edge.faces.iter().enumerate() {
            for &fb in &edge.faces[i + 1..] {
                if graph.faces[fa as usize].plane_index == graph.faces[fb as usize].plane_index
                {
                    continue;
                }
                constraints.push(LinearConstraint {
                    terms: vec![((y_base + k) as u32, 1.0), (fa, -1.0), (fb, -1.0)],
                    sense: ConstraintSense::GreaterEq,
                    rhs: -1.0,
                });
            }
        }
    }

    let time_limit = if params.solver_time_limit_seconds > 0.0 {
        Some(std::time::Duration::from_secs_f64(
            params.solver_time_limit_seconds,
        ))
    } else {
        None
    };

    BipProblem {
        objective,
        constant,
        constraints,
        kinds: vec![VarKind::Binary; num_vars],
        time_limit,
        gap: params.solver_gap,
    }
}

/// Formulate and solve the selection program.
pub fn select_faces(
    graph: &HypothesisGraph,
    params: &ReconstructionParams,
    solver: &dyn BinarySolver,
) -> ReconstructResult<Selection> {
    if graph.is_empty() {
        return Ok(Selection {
            selected: Vec::new(),
            status: SolveStatus::Optimal,
            objective: 0.0,
            fit_fraction: 0.0,
            coverage_fraction: 0.0,
            sharp_edge_count: 0,
        });
    }

    let problem = build_problem(graph, params);
    debug!(
        variables = problem.num_vars(),
        constraints = problem.constraints.len(),
        "selection program built"
    );

    let solution = solver.solve_bip(&problem)?;
    let selected: Vec<bool> = solution.values[..graph.faces.len()].to_vec();

    // Recompute the achieved terms from the decision itself rather than
    // trusting auxiliary variables.
    let support: f64 = graph
        .faces
        .iter()
        .zip(&selected)
        .filter(|&(_, &s)| s)
        .map(|(f, _)| f.support)
        .sum();
    let coverage: f64 = graph
        .faces
        .iter()
        .zip(&selected)
        .filter(|&(_, &s)| s)
        .map(|(f, _)| f.coverage)
        .sum();
    let fit_fraction = if graph.support_total > 0.0 {
        support / graph.support_total
    } else {
        0.0
    };
    let coverage_fraction = if graph.alpha_area_total > 0.0 {
        coverage / graph.alpha_area_total
    } else {
        0.0
    };
    let sharp_edge_count = count_sharp_edges(graph, &selected);

    info!(
        faces = selected.iter().filter(|&&v| v).count(),
        sharp_edges = sharp_edge_count,
        status = %solution.status,
        objective = format!("{:.6}", solution.objective),
        "face selection solved"
    );

    Ok(Selection {
        selected,
        status: solution.status,
        objective: solution.objective,
        fit_fraction,
        coverage_fraction,
        sharp_edge_count,
    })
}

/// Count edges whose two selected incident faces lie on different planes.
fn count_sharp_edges(graph: &HypothesisGraph, selected: &[bool]) -> usize {
    graph
        .edges
        .iter()
        .filter(|edge| {
            let chosen: Vec<u32> = edge
                .faces
                .iter()
                .copied()
                .filter(|&f| selected[f as usize])
                .collect();
            chosen.len() == 2
                && graph.faces[chosen[0] as usize].plane_index
                    != graph.faces[chosen[1] as usize].plane_index
        })
        .count()
}

/// Materialize the selected faces as a polygon mesh with consistent
/// winding per connected component, outward for closed components.
pub fn assemble_mesh(graph: &HypothesisGraph, selected: &[bool]) -> PolygonMesh {
    let chosen: Vec<usize> = (0..graph.faces.len()).filter(|&f| selected[f]).collect();
    if chosen.is_empty() {
        return PolygonMesh::new();
    }

    // Working loops in hypothesis-graph vertex ids.
    let mut loops: Vec<Vec<u32>> = chosen
        .iter()
        .map(|&f| graph.faces[f].boundary.clone())
        .collect();

    // Adjacency over selected faces: edge key -> positions in `loops`.
    let mut edge_faces: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (pos, l) in loops.iter().enumerate() {
        let n = l.len();
        for k in 0..n {
            let (a, b) = (l[k], l[(k + 1) % n]);
            if a == b {
                continue;
            }
            edge_faces.entry((a.min(b), a.max(b))).or_default().push(pos);
        }
    }

    orient_consistently(&mut loops, &edge_faces, graph);

    // Remap vertices in first-use order.
    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut faces = Vec::with_capacity(loops.len());
    for l in &loops {
        let face: Vec<u32> = l
            .iter()
            .map(|&vid| {
                *remap.entry(vid).or_insert_with(|| {
                    vertices.push(graph.vertices[vid as usize]);
                    (vertices.len() - 1) as u32
                })
            })
            .collect();
        faces.push(face);
    }

    PolygonMesh { vertices, faces }
}

/// Flood-fill winding propagation: adjacent loops must traverse a shared
/// edge in opposite directions. Closed components are then flipped outward
/// by signed volume.
fn orient_consistently(
    loops: &mut [Vec<u32>],
    edge_faces: &HashMap<(u32, u32), Vec<usize>>,
    graph: &HypothesisGraph,
) {
    let count = loops.len();
    let mut visited = vec![false; count];
    let mut component_of = vec![usize::MAX; count];
    let mut flip = vec![false; count];
    let mut component_count = 0;

    for start in 0..count {
        if visited[start] {
            continue;
        }
        let component = component_count;
        component_count += 1;

        let mut queue = VecDeque::new();
        visited[start] = true;
        component_of[start] = component;
        queue.push_back(start);

        while let Some(pos) = queue.pop_front() {
            let n = loops[pos].len();
            for k in 0..n {
                let a = loops[pos][k];
                let b = loops[pos][(k + 1) % n];
                let key = (a.min(b), a.max(b));
                let Some(incident) = edge_faces.get(&key) else {
                    continue;
                };
                // Only manifold adjacency propagates orientation.
                if incident.len() != 2 {
                    continue;
                }
                for &neighbor in incident {
                    if neighbor == pos || visited[neighbor] {
                        continue;
                    }
                    visited[neighbor] = true;
                    component_of[neighbor] = component;

                    // The edge runs a -> b here (before any flip); with
                    // opposite winding the neighbor must run it b -> a.
                    let here_forward = !flip[pos];
                    let there_forward =
                        edge_direction_in_loop(&loops[neighbor], a, b).unwrap_or(true);
                    flip[neighbor] = (here_forward && there_forward)
                        || (!here_forward && !there_forward);

                    queue.push_back(neighbor);
                }
            }
        }
    }

    for (pos, l) in loops.iter_mut().enumerate() {
        if flip[pos] {
            l.reverse();
        }
    }

    // Outward orientation for closed components.
    for component in 0..component_count {
        let members: Vec<usize> = (0..count)
            .filter(|&p| component_of[p] == component)
            .collect();

        let closed = members.iter().all(|&pos| {
            let l = &loops[pos];
            let n = l.len();
            (0..n).all(|k| {
                let (a, b) = (l[k], l[(k + 1) % n]);
                a == b
                    || edge_faces
                        .get(&(a.min(b), a.max(b)))
                        .is_some_and(|faces| faces.len() == 2)
            })
        });
        if !closed {
            continue;
        }

        let mut volume = 0.0;
        for &pos in &members {
            let l = &loops[pos];
            for i in 1..l.len().saturating_sub(1) {
                let v0 = graph.vertices[l[0] as usize].coords;
                let v1 = graph.vertices[l[i] as usize].coords;
                let v2 = graph.vertices[l[i + 1] as usize].coords;
                volume += v0.dot(&v1.cross(&v2)) / 6.0;
            }
        }
        if volume < 0.0 {
            debug!(component, "flipping inside-out component");
            for &pos in &members {
                loops[pos].reverse();
            }
        }
    }
}

/// Whether edge (a, b) appears in the loop in that direction.
/// `Some(true)` for a -> b, `Some(false)` for b -> a, `None` if absent.
fn edge_direction_in_loop(l: &[u32], a: u32, b: u32) -> Option<bool> {
    let n = l.len();
    for k in 0..n {
        let (v0, v1) = (l[k], l[(k + 1) % n]);
        if v0 == a && v1 == b {
            return Some(true);
        }
        if v0 == b && v1 == a {
            return Some(false);
        }
    }
    None
}

/// Check the manifold invariant over the selected submesh: interior
/// sharp-candidate edges see exactly 0 or 2 selected faces; bounding-box
/// edges (the allowed open rim) see at most 2.
pub fn selection_is_manifold(graph: &HypothesisGraph, selected: &[bool]) -> bool {
    graph.edges.iter().all(|edge| {
        let chosen = edge
            .faces
            .iter()
            .filter(|&&f| selected[f as usize])
            .count();
        if edge.requires_manifold_equality() {
            chosen == 0 || chosen == 2
        } else {
            chosen <= 2
        }
    })
}

/// Dead-simple selection check used by tests and diagnostics: a selected
/// set with no faces.
pub fn is_all_zero(selected: &[bool]) -> bool {
    selected.iter().all(|&v| !v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alpha;
    use hashbrown::HashSet;
    use crate::hypothesis;
    use crate::kernel::{Plane, PlaneFrame};
    use crate::segment::PlanarSegment;
    use crate::solver::BranchBoundSolver;
    use crate::types::PointSample;
    use nalgebra::Vector3;

    fn plane_grid(normal: Vector3<f64>, offset: f64, n: usize) -> PlanarSegment {
        let plane = Plane::new(normal, offset).unwrap();
        let frame = PlaneFrame::for_plane(&plane);
        let step = 1.0 / (n - 1) as f64;
        let points = (0..n * n)
            .map(|i| {
                let u = (i % n) as f64 * step;
                let v = (i / n) as f64 * step;
                PointSample::new(frame.to_world(&nalgebra::Point2::new(u, v)))
            })
            .collect();
        PlanarSegment::new(points, plane)
    }

    fn graph_for(segments: &[PlanarSegment], params: &ReconstructionParams) -> HypothesisGraph {
        let shapes: Vec<_> = segments
            .iter()
            .map(|s| {
                let frame = PlaneFrame::for_plane(&s.plane);
                let projected: Vec<_> =
                    s.points.iter().map(|p| frame.to_plane(&p.position)).collect();
                alpha::extract_auto(&projected, params.alpha_scale).0
            })
            .collect();
        hypothesis::generate(segments, &shapes, 0.2, params).unwrap()
    }

    #[test]
    fn empty_graph_selects_nothing() {
        let graph = HypothesisGraph::default();
        let selection = select_faces(
            &graph,
            &ReconstructionParams::default(),
            &BranchBoundSolver::new(),
        )
        .unwrap();
        assert!(selection.selected.is_empty());
        assert_eq!(selection.status, SolveStatus::Optimal);
    }

    #[test]
    fn crossing_planes_select_a_corner() {
        let segments = vec![
            plane_grid(Vector3::z(), 0.0, 7),
            plane_grid(Vector3::x(), 0.0, 7),
        ];
        let params = ReconstructionParams::default();
        let graph = graph_for(&segments, &params);
        let selection =
            select_faces(&graph, &params, &BranchBoundSolver::new()).unwrap();

        assert_eq!(selection.selected_count(), 2);
        assert_eq!(selection.sharp_edge_count, 1);
        assert!(selection_is_manifold(&graph, &selection.selected));

        // The two selected faces lie on different planes.
        let planes: HashSet<usize> = graph
            .faces
            .iter()
            .zip(&selection.selected)
            .filter(|&(_, &s)| s)
            .map(|(f, _)| f.plane_index)
            .collect();
        assert_eq!(planes.len(), 2);
    }

    #[test]
    fn pure_complexity_weight_selects_nothing() {
        let segments = vec![
            plane_grid(Vector3::z(), 0.0, 7),
            plane_grid(Vector3::x(), 0.0, 7),
        ];
        let params = ReconstructionParams {
            fit_weight: 0.0,
            coverage_weight: 0.0,
            complexity_weight: 1.0,
            ..Default::default()
        };
        let graph = graph_for(&segments, &params);
        let selection =
            select_faces(&graph, &params, &BranchBoundSolver::new()).unwrap();
        assert!(is_all_zero(&selection.selected));
        assert!((selection.objective).abs() < 1e-9);
    }

    #[test]
    fn selection_is_idempotent() {
        let segments = vec![
            plane_grid(Vector3::z(), 0.0, 6),
            plane_grid(Vector3::x(), 0.0, 6),
        ];
        let params = ReconstructionParams::default();
        let graph = graph_for(&segments, &params);
        let first = select_faces(&graph, &params, &BranchBoundSolver::new()).unwrap();
        let second = select_faces(&graph, &params, &BranchBoundSolver::new()).unwrap();
        assert_eq!(first.selected, second.selected);
        assert_eq!(first.objective, second.objective);
    }

    #[test]
    fn assembled_mesh_has_consistent_winding() {
        let segments = vec![
            plane_grid(Vector3::z(), 0.0, 7),
            plane_grid(Vector3::x(), 0.0, 7),
        ];
        let params = ReconstructionParams::default();
        let graph = graph_for(&segments, &params);
        let selection =
            select_faces(&graph, &params, &BranchBoundSolver::new()).unwrap();
        let mesh = assemble_mesh(&graph, &selection.selected);

        assert_eq!(mesh.face_count(), 2);
        assert!(mesh.vertex_count() >= 6);

        // The shared edge must be traversed in opposite directions.
        let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
        for face in &mesh.faces {
            let n = face.len();
            for k in 0..n {
                *directed.entry((face[k], face[(k + 1) % n])).or_default() += 1;
            }
        }
        for (&(a, b), &count) in &directed {
            assert_eq!(count, 1, "directed edge ({a}, {b}) repeated");
            if let Some(&reverse) = directed.get(&(b, a)) {
                assert_eq!(reverse, 1);
            }
        }
    }

    #[test]
    fn assemble_empty_selection() {
        let segments = vec![
            plane_grid(Vector3::z(), 0.0, 5),
            plane_grid(Vector3::x(), 0.0, 5),
        ];
        let params = ReconstructionParams::default();
        let graph = graph_for(&segments, &params);
        let mesh = assemble_mesh(&graph, &vec![false; graph.faces.len()]);
        assert!(mesh.is_empty());
    }
}
