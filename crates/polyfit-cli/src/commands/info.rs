//! polyfit info command - segment statistics for a segmented cloud.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::{Cli, io, output};

#[derive(Serialize)]
struct SegmentInfo {
    index: usize,
    points: usize,
    normal: [f64; 3],
    offset: f64,
    max_plane_distance: f64,
}

#[derive(Serialize)]
struct InfoResult {
    path: String,
    total_points: usize,
    unassigned_points: usize,
    skipped_segments: usize,
    segments: Vec<SegmentInfo>,
}

pub fn run(input: &Path, cli: &Cli) -> Result<()> {
    let cloud = io::load_segmented_ply(input)?;

    let segments: Vec<SegmentInfo> = cloud
        .segments
        .iter()
        .enumerate()
        .map(|(index, s)| SegmentInfo {
            index,
            points: s.len(),
            normal: [s.plane.normal.x, s.plane.normal.y, s.plane.normal.z],
            offset: s.plane.offset,
            max_plane_distance: s.max_plane_distance(),
        })
        .collect();

    let result = InfoResult {
        path: input.display().to_string(),
        total_points: cloud.total_points,
        unassigned_points: cloud.unassigned_points,
        skipped_segments: cloud.skipped_segments,
        segments,
    };

    output::emit(cli, &result, || {
        println!("{}: {}", "Cloud".bold(), result.path);
        println!(
            "  {} points, {} unassigned, {} segments ({} skipped)",
            result.total_points,
            result.unassigned_points,
            result.segments.len(),
            result.skipped_segments
        );
        for s in &result.segments {
            println!(
                "  segment {:>3}: {:>6} points, normal [{:+.3} {:+.3} {:+.3}], offset {:+.4}, max residual {:.2e}",
                s.index, s.points, s.normal[0], s.normal[1], s.normal[2], s.offset,
                s.max_plane_distance
            );
        }
    })
}
