//! polyfit reconstruct command - run the full pipeline on a segmented
//! cloud and write the resulting mesh.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use polyfit::{Diagnostics, ReconstructionParams, SurfaceReport, validate_surface};
use serde::Serialize;

use crate::{Cli, io, output};

/// Parameter overrides gathered from the command line.
pub struct WeightArgs {
    pub fit_weight: Option<f64>,
    pub coverage_weight: Option<f64>,
    pub complexity_weight: Option<f64>,
    pub alpha_scale: Option<f64>,
    pub residual_tolerance: Option<f64>,
    pub bbox_margin: Option<f64>,
    pub include_bbox_faces: bool,
    pub time_limit: f64,
    pub gap: f64,
    pub for_buildings: bool,
    pub for_noisy_scans: bool,
}

impl WeightArgs {
    fn to_params(&self) -> ReconstructionParams {
        let mut params = if self.for_buildings {
            ReconstructionParams::for_buildings()
        } else if self.for_noisy_scans {
            ReconstructionParams::for_noisy_scans()
        } else {
            ReconstructionParams::default()
        };

        if let Some(w) = self.fit_weight {
            params.fit_weight = w;
        }
        if let Some(w) = self.coverage_weight {
            params.coverage_weight = w;
        }
        if let Some(w) = self.complexity_weight {
            params.complexity_weight = w;
        }
        if let Some(a) = self.alpha_scale {
            params.alpha_scale = a;
        }
        if let Some(eps) = self.residual_tolerance {
            params.residual_tolerance = Some(eps);
        }
        if let Some(m) = self.bbox_margin {
            params.bbox_margin = m;
        }
        params.include_bbox_faces = self.include_bbox_faces;
        params.solver_time_limit_seconds = self.time_limit;
        params.solver_gap = self.gap;
        params
    }
}

#[derive(Serialize)]
struct ReconstructResult {
    input: String,
    output: String,
    segments: usize,
    report: SurfaceReport,
    diagnostics: Diagnostics,
}

pub fn run(input: &Path, output_path: &Path, args: &WeightArgs, cli: &Cli) -> Result<()> {
    let cloud = io::load_segmented_ply(input)?;
    if cloud.unassigned_points > 0 {
        tracing::info!(
            unassigned = cloud.unassigned_points,
            "skipping points without a segment"
        );
    }

    let params = args.to_params();
    let result = polyfit::reconstruct(&cloud.segments, &params)?;

    io::save_obj(&result.mesh, output_path)
        .with_context(|| format!("failed to save mesh to {}", output_path.display()))?;

    let report = validate_surface(&result.mesh);
    let summary = ReconstructResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        segments: cloud.segments.len(),
        report,
        diagnostics: result.diagnostics,
    };

    output::emit(cli, &summary, || {
        println!(
            "{} {} segments -> {} faces",
            "Reconstructed".green().bold(),
            summary.segments,
            summary.report.face_count
        );
        println!("{}", summary.report);
        if let Some(note) = &summary.diagnostics.note {
            println!("{}: {}", "Note".yellow(), note);
        }
        println!(
            "objective {:.4} (fit {:.3}, coverage {:.3}, {} sharp edges), solver {}, {:.1} ms",
            summary.diagnostics.objective,
            summary.diagnostics.fit_fraction,
            summary.diagnostics.coverage_fraction,
            summary.diagnostics.sharp_edge_count,
            summary.diagnostics.solver_status,
            summary.diagnostics.elapsed_ms
        );
        println!("saved to {}", summary.output);
    })
}
