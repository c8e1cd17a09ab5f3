//! Candidate-face hypothesis generation.
//!
//! Every supporting plane is clipped to an inflated bounding box of the
//! input and subdivided by its intersection chords with every other plane.
//! The resulting cells are the candidate faces; cell corners are merged
//! into a shared vertex pool so coincident edges across planes resolve to
//! the same identifier, which is what the per-edge manifold constraints
//! key on.

use hashbrown::HashMap;
use nalgebra::{Point2, Point3, Vector3};
use tracing::{debug, info};

use crate::alpha::AlphaShape;
use crate::config::ReconstructionParams;
use crate::error::{ReconstructError, ReconstructResult};
use crate::kernel::{Plane, PlaneFrame, VertexPool};
use crate::polygon::ConvexPolygon;
use crate::segment::PlanarSegment;

/// Relative vertex-merge tolerance, scaled by the bounding-box diagonal.
const VERTEX_EPSILON_SCALE: f64 = 1e-8;

/// Cells below this fraction of their plane polygon are treated as slivers
/// and not split off.
const MIN_CELL_AREA_SCALE: f64 = 1e-9;

/// A candidate polygonal face: one cell of a plane's arrangement.
#[derive(Debug, Clone)]
pub struct CandidateFace {
    /// Index into the generator's plane list.
    pub plane_index: usize,

    /// Supporting plane normal (unit).
    pub normal: Vector3<f64>,

    /// Cell polygon in the plane's 2D frame.
    pub polygon: ConvexPolygon,

    /// Boundary loop of vertex identifiers, counter-clockwise in the frame.
    pub boundary: Vec<u32>,

    /// Cell area.
    pub area: f64,

    /// Inexact 3D centroid.
    pub centroid: Point3<f64>,

    /// Support score: accumulated residual-weighted votes of member points
    /// projecting into this cell.
    pub support: f64,

    /// Confidence: fraction of the cell covered by the segment's alpha
    /// shape.
    pub confidence: f64,

    /// Coverage: confidence times area.
    pub coverage: f64,

    /// Whether the face lies on one of the bounding-box planes.
    pub on_bbox: bool,
}

/// A candidate edge: a maximal straight segment shared between cells.
#[derive(Debug, Clone)]
pub struct CandidateEdge {
    /// Endpoint vertex identifiers (ordered low, high).
    pub vertices: (u32, u32),

    /// Incident candidate faces.
    pub faces: Vec<u32>,

    /// Number of distinct supporting planes among the incident faces.
    pub distinct_planes: usize,

    /// Whether the edge lies on the bounding-box surface. Such edges may
    /// stay open in the output, so they get a relaxed at-most-2 constraint
    /// instead of the strict 0-or-2 equality.
    pub on_box: bool,
}

impl CandidateEdge {
    /// Whether selecting two faces from different planes here would form a
    /// crease in the output.
    #[inline]
    pub fn is_sharp_candidate(&self) -> bool {
        self.distinct_planes >= 2
    }

    /// Whether the strict 0-or-2 manifold equality applies. Edges on the
    /// bounding box are exempt; they form the open rim when closure is not
    /// selected.
    #[inline]
    pub fn requires_manifold_equality(&self) -> bool {
        self.is_sharp_candidate() && !self.on_box
    }
}

/// The candidate arrangement: vertices, edges, faces, and score totals.
#[derive(Debug, Clone, Default)]
pub struct HypothesisGraph {
    /// Deduplicated vertex positions, indexed by identifier.
    pub vertices: Vec<Point3<f64>>,

    /// Candidate edges with face incidence.
    pub edges: Vec<CandidateEdge>,

    /// Candidate faces.
    pub faces: Vec<CandidateFace>,

    /// Sum of face support scores.
    pub support_total: f64,

    /// Sum of alpha-shape areas across all segments.
    pub alpha_area_total: f64,
}

impl HypothesisGraph {
    /// Whether the arrangement produced no candidate faces.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Number of edges that could become creases.
    pub fn sharp_candidate_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_sharp_candidate()).count()
    }
}

struct PlaneEntry {
    plane: Plane,
    frame: PlaneFrame,
    segment: Option<usize>,
}

/// Generate the hypothesis graph for a set of (already merged) segments.
///
/// `shapes` must be parallel to `segments` and expressed in each plane's
/// canonical frame (`PlaneFrame::for_plane`). `mean_spacing` is the global
/// mean nearest-neighbor distance, used for the residual tolerance default.
pub fn generate(
    segments: &[PlanarSegment],
    shapes: &[AlphaShape],
    mean_spacing: f64,
    params: &ReconstructionParams,
) -> ReconstructResult<HypothesisGraph> {
    debug_assert_eq!(segments.len(), shapes.len());

    let (box_min, box_max) = inflated_bounds(segments, params.bbox_margin)?;
    let diagonal = (box_max - box_min).norm();
    let vertex_epsilon = diagonal * VERTEX_EPSILON_SCALE;

    // Plane list: one entry per segment, then the six box planes when
    // box-closure faces are allowed.
    let mut planes: Vec<PlaneEntry> = segments
        .iter()
        .enumerate()
        .map(|(i, s)| PlaneEntry {
            plane: s.plane,
            frame: PlaneFrame::for_plane(&s.plane),
            segment: Some(i),
        })
        .collect();
    if params.include_bbox_faces {
        for plane in box_planes(&box_min, &box_max) {
            planes.push(PlaneEntry {
                frame: PlaneFrame::for_plane(&plane),
                plane,
                segment: None,
            });
        }
    }

    if !has_intersecting_pair(&planes) {
        info!(
            planes = planes.len(),
            "no intersecting plane pair; hypothesis graph is empty"
        );
        return Ok(HypothesisGraph {
            alpha_area_total: shapes.iter().map(|s| s.total_area).sum(),
            ..Default::default()
        });
    }

    // Per-plane arrangement: clip to the box, then subdivide by every
    // other plane's chord.
    let mut pool = VertexPool::new(vertex_epsilon);
    let mut faces: Vec<CandidateFace> = Vec::new();

    for (pi, entry) in planes.iter().enumerate() {
        let Some(base) = plane_box_polygon(entry, &box_min, &box_max, diagonal) else {
            debug!(plane = pi, "plane misses the bounding box");
            continue;
        };
        let min_cell_area = base.area() * MIN_CELL_AREA_SCALE;

        let mut cells = vec![base];
        for (pj, other) in planes.iter().enumerate() {
            if pj == pi {
                continue;
            }
            let Some((a, b, c)) = entry.frame.restrict(&other.plane) else {
                continue;
            };
            let mut next = Vec::with_capacity(cells.len() + 1);
            for cell in cells {
                let (neg, pos) = cell.split_by_line(a, b, c, min_cell_area);
                next.extend(neg);
                next.extend(pos);
            }
            cells = next;
        }

        debug!(plane = pi, cells = cells.len(), "plane subdivided");

        for cell in cells {
            let mut boundary: Vec<u32> = cell
                .vertices()
                .iter()
                .map(|v| pool.insert(entry.frame.to_world(v)))
                .collect();
            dedup_cycle(&mut boundary);
            if boundary.len() < 3 {
                continue;
            }

            let area = cell.area();
            let centroid = entry.frame.to_world(&cell.centroid());
            faces.push(CandidateFace {
                plane_index: pi,
                normal: entry.plane.normal,
                polygon: cell,
                boundary,
                area,
                centroid,
                support: 0.0,
                confidence: 0.0,
                coverage: 0.0,
                on_bbox: entry.segment.is_none(),
            });
        }
    }

    // Insert pool vertices that land on a face edge into that boundary, so
    // coincident chords subdivided differently on two planes still produce
    // matching edge chains.
    refine_boundaries(&mut faces, pool.points(), vertex_epsilon);

    // Edge registry keyed by the unordered endpoint pair.
    let mut edge_map: HashMap<(u32, u32), u32> = HashMap::new();
    let mut edges: Vec<CandidateEdge> = Vec::new();
    for (fi, face) in faces.iter().enumerate() {
        let n = face.boundary.len();
        for k in 0..n {
            let a = face.boundary[k];
            let b = face.boundary[(k + 1) % n];
            if a == b {
                continue;
            }
            let key = (a.min(b), a.max(b));
            let ei = *edge_map.entry(key).or_insert_with(|| {
                edges.push(CandidateEdge {
                    vertices: key,
                    faces: Vec::new(),
                    distinct_planes: 0,
                    on_box: false,
                });
                (edges.len() - 1) as u32
            });
            edges[ei as usize].faces.push(fi as u32);
        }
    }
    let box_faces = box_planes(&box_min, &box_max);
    for edge in &mut edges {
        let mut plane_indices: Vec<usize> = edge
            .faces
            .iter()
            .map(|&f| faces[f as usize].plane_index)
            .collect();
        plane_indices.sort_unstable();
        plane_indices.dedup();
        edge.distinct_planes = plane_indices.len();

        let a = pool.points()[edge.vertices.0 as usize];
        let b = pool.points()[edge.vertices.1 as usize];
        edge.on_box = box_faces.iter().any(|plane| {
            plane.signed_distance(&a).abs() <= vertex_epsilon
                && plane.signed_distance(&b).abs() <= vertex_epsilon
        });
    }

    let mut graph = HypothesisGraph {
        vertices: pool.into_points(),
        edges,
        faces,
        support_total: 0.0,
        alpha_area_total: shapes.iter().map(|s| s.total_area).sum(),
    };

    score_faces(
        &mut graph,
        &planes,
        segments,
        shapes,
        mean_spacing,
        vertex_epsilon,
        params,
    );

    info!(
        vertices = graph.vertices.len(),
        edges = graph.edges.len(),
        faces = graph.faces.len(),
        sharp_candidates = graph.sharp_candidate_count(),
        "hypothesis graph built"
    );

    Ok(graph)
}

/// Bounding box of all segment points, inflated by the margin fraction of
/// the diagonal on every side.
fn inflated_bounds(
    segments: &[PlanarSegment],
    margin: f64,
) -> ReconstructResult<(Point3<f64>, Point3<f64>)> {
    let mut iter = segments.iter().flat_map(|s| &s.points);
    let first = iter.next().ok_or_else(|| ReconstructError::InvalidInput {
        details: "no points in any segment".into(),
    })?;

    let mut min = first.position;
    let mut max = first.position;
    for p in iter {
        min.x = min.x.min(p.position.x);
        min.y = min.y.min(p.position.y);
        min.z = min.z.min(p.position.z);
        max.x = max.x.max(p.position.x);
        max.y = max.y.max(p.position.y);
        max.z = max.z.max(p.position.z);
    }

    let diagonal = (max - min).norm();
    if diagonal <= 0.0 {
        return Err(ReconstructError::Geometry {
            details: "all input points coincide; bounding box is degenerate".into(),
        });
    }

    let pad = 0.5 * margin * diagonal;
    let pad = Vector3::new(pad, pad, pad);
    Ok((min - pad, max + pad))
}

/// The six box planes with outward normals.
fn box_planes(min: &Point3<f64>, max: &Point3<f64>) -> Vec<Plane> {
    vec![
        Plane {
            normal: -Vector3::x(),
            offset: min.x,
        },
        Plane {
            normal: Vector3::x(),
            offset: -max.x,
        },
        Plane {
            normal: -Vector3::y(),
            offset: min.y,
        },
        Plane {
            normal: Vector3::y(),
            offset: -max.y,
        },
        Plane {
            normal: -Vector3::z(),
            offset: min.z,
        },
        Plane {
            normal: Vector3::z(),
            offset: -max.z,
        },
    ]
}

fn has_intersecting_pair(planes: &[PlaneEntry]) -> bool {
    for i in 0..planes.len() {
        for j in (i + 1)..planes.len() {
            if crate::kernel::intersect_planes(&planes[i].plane, &planes[j].plane).is_some() {
                return true;
            }
        }
    }
    false
}

/// Convex polygon of `plane ∩ box`, in the plane's frame.
fn plane_box_polygon(
    entry: &PlaneEntry,
    box_min: &Point3<f64>,
    box_max: &Point3<f64>,
    diagonal: f64,
) -> Option<ConvexPolygon> {
    // Seed rectangle: the frame projection of the box corners, padded.
    let corners = [
        Point3::new(box_min.x, box_min.y, box_min.z),
        Point3::new(box_max.x, box_min.y, box_min.z),
        Point3::new(box_min.x, box_max.y, box_min.z),
        Point3::new(box_max.x, box_max.y, box_min.z),
        Point3::new(box_min.x, box_min.y, box_max.z),
        Point3::new(box_max.x, box_min.y, box_max.z),
        Point3::new(box_min.x, box_max.y, box_max.z),
        Point3::new(box_max.x, box_max.y, box_max.z),
    ];
    let mut min2 = entry.frame.to_plane(&corners[0]);
    let mut max2 = min2;
    for c in &corners[1..] {
        let p = entry.frame.to_plane(c);
        min2.x = min2.x.min(p.x);
        min2.y = min2.y.min(p.y);
        max2.x = max2.x.max(p.x);
        max2.y = max2.y.max(p.y);
    }
    let pad = diagonal;
    let mut polygon = ConvexPolygon::rectangle(
        Point2::new(min2.x - pad, min2.y - pad),
        Point2::new(max2.x + pad, max2.y + pad),
    )?;

    for box_plane in box_planes(box_min, box_max) {
        match entry.frame.restrict(&box_plane) {
            Some((a, b, c)) => {
                polygon = polygon.clip_halfplane(a, b, c)?;
            }
            None => {
                // Parallel: the whole plane is inside or outside this slab
                // side. Slightly positive offsets (the plane sits on the
                // box face) still count as inside.
                if box_plane.signed_distance(&entry.frame.origin) > 1e-9 * diagonal {
                    return None;
                }
            }
        }
    }

    Some(polygon)
}

/// Remove consecutive duplicates in a cyclic id loop.
fn dedup_cycle(boundary: &mut Vec<u32>) {
    boundary.dedup();
    while boundary.len() > 1 && boundary.first() == boundary.last() {
        boundary.pop();
    }
}

/// Splice vertices lying on a boundary edge into that boundary.
fn refine_boundaries(faces: &mut [CandidateFace], points: &[Point3<f64>], epsilon: f64) {
    for face in faces.iter_mut() {
        let n = face.boundary.len();
        let mut refined: Vec<u32> = Vec::with_capacity(n);

        for k in 0..n {
            let a = face.boundary[k];
            let b = face.boundary[(k + 1) % n];
            refined.push(a);

            let pa = points[a as usize];
            let pb = points[b as usize];
            let dir = pb - pa;
            let len2 = dir.norm_squared();
            if len2 <= epsilon * epsilon {
                continue;
            }

            let mut between: Vec<(f64, u32)> = Vec::new();
            for (id, p) in points.iter().enumerate() {
                let id = id as u32;
                if id == a || id == b {
                    continue;
                }
                let t = (p - pa).dot(&dir) / len2;
                if t <= 0.0 || t >= 1.0 {
                    continue;
                }
                let foot = pa + dir * t;
                if (p - foot).norm() < epsilon {
                    between.push((t, id));
                }
            }
            between.sort_by(|x, y| x.partial_cmp(y).expect("parameters are finite"));
            refined.extend(between.into_iter().map(|(_, id)| id));
        }

        face.boundary = refined;
    }
}

/// Fill in support, confidence, and coverage for every face.
fn score_faces(
    graph: &mut HypothesisGraph,
    planes: &[PlaneEntry],
    segments: &[PlanarSegment],
    shapes: &[AlphaShape],
    mean_spacing: f64,
    vertex_epsilon: f64,
    params: &ReconstructionParams,
) {
    let residual_tolerance = params
        .residual_tolerance
        .unwrap_or(3.0 * mean_spacing)
        .max(f64::MIN_POSITIVE);
    let residual_tolerance2 = residual_tolerance * residual_tolerance;

    // Faces are stored contiguously per plane; gather the index ranges.
    let mut plane_faces: Vec<Vec<usize>> = vec![Vec::new(); planes.len()];
    for (fi, face) in graph.faces.iter().enumerate() {
        plane_faces[face.plane_index].push(fi);
    }

    for (pi, entry) in planes.iter().enumerate() {
        let Some(si) = entry.segment else {
            continue;
        };
        let segment = &segments[si];
        let shape = &shapes[si];
        let cell_indices = &plane_faces[pi];
        if cell_indices.is_empty() {
            continue;
        }

        // Support: each point votes for the cell strictly containing its
        // projection, weighted by how well it sits on the plane. Points
        // landing exactly on a cell boundary vote for no cell.
        for point in &segment.points {
            let distance = entry.plane.signed_distance(&point.position);
            let weight = 1.0 - (distance * distance) / residual_tolerance2;
            if weight <= 0.0 {
                continue;
            }
            let q = entry.frame.to_plane(&point.position);
            for &fi in cell_indices {
                if graph.faces[fi].polygon.strictly_contains(&q, vertex_epsilon) {
                    graph.faces[fi].support += weight;
                    break;
                }
            }
        }

        // Confidence: area fraction of each cell covered by the alpha
        // shape, via convex clipping of the shape triangles.
        for triangle in &shape.triangles {
            let Some(tri) = ConvexPolygon::from_loop(triangle.to_vec()) else {
                continue;
            };
            for &fi in cell_indices {
                let overlap = graph.faces[fi].polygon.intersection_area(&tri);
                if overlap > 0.0 {
                    graph.faces[fi].confidence += overlap;
                }
            }
        }

        for &fi in cell_indices {
            let face = &mut graph.faces[fi];
            // So far `confidence` holds the covered area; normalize.
            face.confidence = (face.confidence / face.area).clamp(0.0, 1.0);
            face.coverage = face.confidence * face.area;
        }
    }

    graph.support_total = graph.faces.iter().map(|f| f.support).sum();

    debug!(
        support_total = format!("{:.3}", graph.support_total),
        alpha_area_total = format!("{:.3}", graph.alpha_area_total),
        residual_tolerance = format!("{residual_tolerance:.5}"),
        "faces scored"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alpha;
    use crate::types::PointSample;
    use nalgebra::Vector3;

    /// Grid of points on the plane z = `z`, spanning [0, 1]^2.
    fn z_plane_segment(z: f64, n: usize) -> PlanarSegment {
        let step = 1.0 / (n - 1) as f64;
        let points = (0..n * n)
            .map(|i| {
                PointSample::from_coords((i % n) as f64 * step, (i / n) as f64 * step, z)
            })
            .collect();
        PlanarSegment::new(points, Plane::new(Vector3::z(), -z).unwrap())
    }

    /// Grid of points on the plane x = `x`, spanning [0, 1]^2 in (y, z).
    fn x_plane_segment(x: f64, n: usize) -> PlanarSegment {
        let step = 1.0 / (n - 1) as f64;
        let points = (0..n * n)
            .map(|i| {
                PointSample::from_coords(x, (i % n) as f64 * step, (i / n) as f64 * step)
            })
            .collect();
        PlanarSegment::new(points, Plane::new(Vector3::x(), -x).unwrap())
    }

    fn shapes_for(segments: &[PlanarSegment], alpha_scale: f64) -> Vec<AlphaShape> {
        segments
            .iter()
            .map(|s| {
                let frame = PlaneFrame::for_plane(&s.plane);
                let projected: Vec<_> =
                    s.points.iter().map(|p| frame.to_plane(&p.position)).collect();
                alpha::extract_auto(&projected, alpha_scale).0
            })
            .collect()
    }

    fn generate_graph(segments: &[PlanarSegment]) -> HypothesisGraph {
        let shapes = shapes_for(segments, 5.0);
        let params = ReconstructionParams::default();
        generate(segments, &shapes, 0.1, &params).unwrap()
    }

    #[test]
    fn single_plane_yields_empty_graph() {
        let segments = vec![z_plane_segment(0.0, 5)];
        let graph = generate_graph(&segments);
        assert!(graph.is_empty());
    }

    #[test]
    fn parallel_planes_yield_empty_graph() {
        let segments = vec![z_plane_segment(0.0, 5), z_plane_segment(1.0, 5)];
        let graph = generate_graph(&segments);
        assert!(graph.is_empty());
    }

    #[test]
    fn two_crossing_planes_make_four_cells() {
        let segments = vec![z_plane_segment(0.5, 5), x_plane_segment(0.5, 5)];
        let graph = generate_graph(&segments);
        // Each plane is split once by the other's chord.
        assert_eq!(graph.faces.len(), 4);
        assert_eq!(graph.sharp_candidate_count(), 1);

        let sharp: Vec<_> = graph
            .edges
            .iter()
            .filter(|e| e.is_sharp_candidate())
            .collect();
        assert_eq!(sharp[0].faces.len(), 4);
    }

    #[test]
    fn supported_cells_outscore_empty_cells() {
        // Planes offset so neither chord touches the other's support grid;
        // every point then projects strictly inside one cell.
        let segments = vec![z_plane_segment(-0.25, 7), x_plane_segment(-0.25, 7)];
        let graph = generate_graph(&segments);

        for plane_index in 0..2 {
            let (best, rest): (Vec<_>, Vec<_>) = graph
                .faces
                .iter()
                .filter(|f| f.plane_index == plane_index)
                .partition(|f| f.support > 0.0);
            assert_eq!(best.len(), 1, "one supported cell per plane");
            assert!(best[0].confidence > 0.4);
            for face in rest {
                assert_eq!(face.support, 0.0);
                assert!(face.confidence < 0.05);
            }
        }
    }

    #[test]
    fn support_total_counts_every_on_plane_point() {
        // Grid step 0.2 keeps every sample strictly off the 0.5 chords.
        let segments = vec![z_plane_segment(0.5, 6), x_plane_segment(0.5, 6)];
        let graph = generate_graph(&segments);
        // All 36 + 36 points lie exactly on their planes, weight 1 each.
        assert!((graph.support_total - 72.0).abs() < 1e-6);
    }

    #[test]
    fn edges_are_deduplicated_across_planes() {
        let segments = vec![z_plane_segment(0.5, 5), x_plane_segment(0.5, 5)];
        let graph = generate_graph(&segments);

        // Every edge id pair appears once.
        let mut seen = std::collections::HashSet::new();
        for edge in &graph.edges {
            assert!(seen.insert(edge.vertices), "duplicate edge {:?}", edge.vertices);
            assert!(edge.vertices.0 < edge.vertices.1);
        }
    }

    #[test]
    fn boundary_loops_are_cycles_over_edges() {
        let segments = vec![z_plane_segment(0.5, 5), x_plane_segment(0.5, 5)];
        let graph = generate_graph(&segments);

        for edge in &graph.edges {
            for &fi in &edge.faces {
                let boundary = &graph.faces[fi as usize].boundary;
                let n = boundary.len();
                let found = (0..n).any(|k| {
                    let a = boundary[k];
                    let b = boundary[(k + 1) % n];
                    (a.min(b), a.max(b)) == edge.vertices
                });
                assert!(found, "edge {:?} missing from face {fi}", edge.vertices);
            }
        }
    }

    #[test]
    fn bbox_planes_join_the_arrangement_when_enabled() {
        let segments = vec![z_plane_segment(0.5, 5), x_plane_segment(0.5, 5)];
        let shapes = shapes_for(&segments, 5.0);
        let params = ReconstructionParams {
            include_bbox_faces: true,
            ..Default::default()
        };
        let graph = generate(&segments, &shapes, 0.1, &params).unwrap();

        assert!(graph.faces.iter().any(|f| f.on_bbox));
        // Box faces never earn data support.
        for face in graph.faces.iter().filter(|f| f.on_bbox) {
            assert_eq!(face.support, 0.0);
            assert_eq!(face.coverage, 0.0);
        }
    }
}
