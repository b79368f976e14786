//! Closed-loop convergence study
//!
//! Calibrates the bundled linear wavefront model, injects a known
//! perturbation, and runs the measure-solve-correct loop at one or more
//! gains, printing the per-iteration metric so the geometric contraction
//! is visible.
//!
//! # Usage
//!
//! ```bash
//! # Default study: 1e-6 m on the first M2 bending mode, gain 0.3
//! cargo run --release --bin convergence_study
//!
//! # Sweep gains and write the reports as JSON
//! cargo run --release --bin convergence_study -- -g 0.1,0.3,0.7,1.0 --json study.json
//!
//! # More iterations, different band, bigger perturbation
//! cargo run --release --bin convergence_study -- -n 12 -b g -p 5e-6
//! ```

use active_optics::estimator::{WavefrontEstimator, DEFAULT_N_COEFFS};
use active_optics::prescription::Band;
use active_optics::solver::SensitivitySolver;
use active_optics::state::BendingState;
use active_optics::telescope::BendingTelescope;
use clap::Parser;
use closed_loop::{calibrate_sensitivity, ClosedLoop, IterationReport, LinearOpticalModel};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Photometric band of the prescription (u, g, r, i, z, y)
    #[arg(short, long, default_value = "r")]
    band: String,

    /// Damping gains to study, comma separated, each in (0, 1]
    #[arg(short, long, default_value = "0.3", value_delimiter = ',')]
    gains: Vec<f64>,

    /// Iterations per gain
    #[arg(short = 'n', long, default_value = "8")]
    iterations: usize,

    /// Bending amplitude injected on the first M2 mode, meters RMS
    #[arg(short, long, default_value = "1e-6")]
    perturbation: f64,

    /// Write the collected reports to a JSON file
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct GainRun {
    gain: f64,
    reports: Vec<IterationReport>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let band = Band::from_name(&args.band)
        .ok_or_else(|| format!("unknown band '{}'", args.band))?;

    let simulator = LinearOpticalModel::default();
    let estimator = WavefrontEstimator::default();
    println!("calibrating sensitivity in band {band}...");
    let calibration = Arc::new(calibrate_sensitivity(
        &simulator,
        &estimator,
        band,
        DEFAULT_N_COEFFS,
    )?);

    let runs: Vec<GainRun> = args
        .gains
        .par_iter()
        .map(|&gain| -> Result<GainRun, Box<dyn std::error::Error + Send + Sync>> {
            let mut telescope = BendingTelescope::nominal(band);
            let mut injected = BendingState::zeros();
            injected.set("m2b1", args.perturbation)?;
            telescope.update(&injected)?;

            let solver = SensitivitySolver::new(calibration.clone(), (0.0, 0.0))?;
            let mut study_loop =
                ClosedLoop::new(telescope, LinearOpticalModel::default(), solver, gain);
            let reports = study_loop.run(args.iterations)?;
            Ok(GainRun { gain, reports })
        })
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    for run in &runs {
        println!("\ngain {:.2}:", run.gain);
        println!(
            "  {:>4}  {:>14}  {:>12}  {:>12}  {:>12}",
            "iter", "wavefront rms", "metric", "state rms", "|delta|"
        );
        for report in &run.reports {
            println!(
                "  {:>4}  {:>14.4e}  {:>12.4e}  {:>12.4e}  {:>12.4e}",
                report.iteration,
                report.wavefront_rms,
                report.metric,
                report.state_rms,
                report.delta_norm
            );
        }
    }

    if let Some(path) = &args.json {
        serde_json::to_writer_pretty(File::create(path)?, &runs)?;
        println!("\nwrote {}", path.display());
    }
    Ok(())
}
