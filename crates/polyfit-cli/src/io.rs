//! Segmented point cloud input and polygon mesh output.
//!
//! Input is a PLY file whose vertex element carries a `segment` integer
//! property (as written by common plane-detection tools); vertices with a
//! negative segment id are unassigned and skipped. Supporting planes are
//! fit per segment by least squares here at the entry layer.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use nalgebra::Vector3;
use ply_rs::ply::Property;
use polyfit::{PlanarSegment, PointSample, PolygonMesh, VertexColor};

/// Result of loading a segmented cloud.
pub struct LoadedCloud {
    pub segments: Vec<PlanarSegment>,
    pub total_points: usize,
    pub unassigned_points: usize,
    pub skipped_segments: usize,
}

/// Load a segmented point cloud from a PLY file.
pub fn load_segmented_ply(path: &Path) -> Result<LoadedCloud> {
    use ply_rs::parser::Parser;

    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<ply_rs::ply::DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .with_context(|| format!("failed to parse PLY from {}", path.display()))?;

    let Some(vertices) = ply.payload.get("vertex") else {
        bail!("{} has no vertex element", path.display());
    };

    let mut clusters: BTreeMap<i64, Vec<PointSample>> = BTreeMap::new();
    let mut total_points = 0usize;
    let mut unassigned_points = 0usize;

    for vertex in vertices {
        total_points += 1;

        let x = get_float(vertex.get("x"))
            .with_context(|| format!("bad x property in {}", path.display()))?;
        let y = get_float(vertex.get("y"))
            .with_context(|| format!("bad y property in {}", path.display()))?;
        let z = get_float(vertex.get("z"))
            .with_context(|| format!("bad z property in {}", path.display()))?;

        let segment_id = match vertex.get("segment") {
            Some(prop) => get_int(Some(prop))
                .with_context(|| format!("bad segment property in {}", path.display()))?,
            None => bail!(
                "{} has no per-vertex `segment` property; run plane detection first",
                path.display()
            ),
        };
        if segment_id < 0 {
            unassigned_points += 1;
            continue;
        }

        let mut sample = PointSample::from_coords(x, y, z);

        if let (Some(nx), Some(ny), Some(nz)) =
            (vertex.get("nx"), vertex.get("ny"), vertex.get("nz"))
            && let (Ok(nx), Ok(ny), Ok(nz)) = (
                get_float(Some(nx)),
                get_float(Some(ny)),
                get_float(Some(nz)),
            )
        {
            sample.normal = Some(Vector3::new(nx, ny, nz));
        }

        if let (Some(r), Some(g), Some(b)) = (
            vertex.get("red"),
            vertex.get("green"),
            vertex.get("blue"),
        ) && let (Ok(r), Ok(g), Ok(b)) = (get_u8(Some(r)), get_u8(Some(g)), get_u8(Some(b)))
        {
            sample.color = Some(VertexColor::new(r, g, b));
        }

        clusters.entry(segment_id).or_default().push(sample);
    }

    let mut segments = Vec::with_capacity(clusters.len());
    let mut skipped_segments = 0usize;
    for (id, points) in clusters {
        match PlanarSegment::from_points(points) {
            Ok(mut segment) => {
                segment.color = segment.points.iter().find_map(|p| p.color);
                segments.push(segment);
            }
            Err(e) => {
                tracing::warn!(segment = id, error = %e, "skipping degenerate segment");
                skipped_segments += 1;
            }
        }
    }

    Ok(LoadedCloud {
        segments,
        total_points,
        unassigned_points,
        skipped_segments,
    })
}

/// Save a polygon mesh to an OBJ file.
pub fn save_obj(mesh: &PolygonMesh, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "# OBJ file exported by polyfit")?;
    writeln!(writer, "# Vertices: {}", mesh.vertex_count())?;
    writeln!(writer, "# Faces: {}", mesh.face_count())?;

    for v in &mesh.vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for face in &mesh.faces {
        write!(writer, "f")?;
        for &idx in face {
            // OBJ indices are 1-based.
            write!(writer, " {}", idx + 1)?;
        }
        writeln!(writer)?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn get_float(prop: Option<&Property>) -> Result<f64> {
    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        _ => bail!("missing or invalid float property"),
    }
}

fn get_int(prop: Option<&Property>) -> Result<i64> {
    match prop {
        Some(Property::Int(v)) => Ok(*v as i64),
        Some(Property::UInt(v)) => Ok(*v as i64),
        Some(Property::Short(v)) => Ok(*v as i64),
        Some(Property::UShort(v)) => Ok(*v as i64),
        Some(Property::Char(v)) => Ok(*v as i64),
        Some(Property::UChar(v)) => Ok(*v as i64),
        Some(Property::Float(v)) => Ok(*v as i64),
        Some(Property::Double(v)) => Ok(*v as i64),
        _ => bail!("missing or invalid integer property"),
    }
}

fn get_u8(prop: Option<&Property>) -> Result<u8> {
    match prop {
        Some(Property::UChar(v)) => Ok(*v),
        Some(Property::Char(v)) => Ok(*v as u8),
        Some(Property::UShort(v)) => Ok((*v).min(255) as u8),
        Some(Property::Short(v)) => Ok((*v).clamp(0, 255) as u8),
        Some(Property::UInt(v)) => Ok((*v).min(255) as u8),
        Some(Property::Int(v)) => Ok((*v).clamp(0, 255) as u8),
        Some(Property::Float(v)) => Ok((v * 255.0).clamp(0.0, 255.0) as u8),
        Some(Property::Double(v)) => Ok((v * 255.0).clamp(0.0, 255.0) as u8),
        _ => bail!("missing or invalid color property"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::io::Write as _;

    fn segmented_ply(points: &[(f64, f64, f64, i32)]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".ply").tempfile().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex {}", points.len()).unwrap();
        writeln!(file, "property double x").unwrap();
        writeln!(file, "property double y").unwrap();
        writeln!(file, "property double z").unwrap();
        writeln!(file, "property int segment").unwrap();
        writeln!(file, "end_header").unwrap();
        for (x, y, z, s) in points {
            writeln!(file, "{x} {y} {z} {s}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_segments_and_fits_planes() {
        let mut points = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                points.push((i as f64, j as f64, 0.0, 0));
                points.push((i as f64, j as f64, 5.0, 1));
            }
        }
        points.push((9.0, 9.0, 9.0, -1)); // unassigned

        let file = segmented_ply(&points);
        let cloud = load_segmented_ply(file.path()).unwrap();

        assert_eq!(cloud.segments.len(), 2);
        assert_eq!(cloud.total_points, 33);
        assert_eq!(cloud.unassigned_points, 1);
        assert_eq!(cloud.skipped_segments, 0);
        for segment in &cloud.segments {
            assert!(segment.max_plane_distance() < 1e-9);
        }
    }

    #[test]
    fn degenerate_segments_are_skipped() {
        // Segment 1 is a 3-point line: no plane fit.
        let points = vec![
            (0.0, 0.0, 0.0, 0),
            (1.0, 0.0, 0.0, 0),
            (0.0, 1.0, 0.0, 0),
            (1.0, 1.0, 0.0, 0),
            (0.0, 0.0, 1.0, 1),
            (1.0, 0.0, 1.0, 1),
            (2.0, 0.0, 1.0, 1),
        ];
        let file = segmented_ply(&points);
        let cloud = load_segmented_ply(file.path()).unwrap();
        assert_eq!(cloud.segments.len(), 1);
        assert_eq!(cloud.skipped_segments, 1);
    }

    #[test]
    fn missing_segment_property_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".ply").tempfile().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 1").unwrap();
        writeln!(file, "property double x").unwrap();
        writeln!(file, "property double y").unwrap();
        writeln!(file, "property double z").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "0 0 0").unwrap();
        file.flush().unwrap();

        assert!(load_segmented_ply(file.path()).is_err());
    }

    #[test]
    fn obj_round_trip_is_readable() {
        let mesh = PolygonMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2, 3]],
        };
        let file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        save_obj(&mesh, file.path()).unwrap();

        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.lines().filter(|l| l.starts_with("v ")).count(), 4);
        assert!(contents.contains("f 1 2 3 4"));
    }
}
