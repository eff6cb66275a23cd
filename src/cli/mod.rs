//! Command-line parsing for the quantum-yield pipeline.
//!
//! Parsing is kept apart from dispatch (`app`) and from the numerical code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Interpolation, LutSplit, SeMode, SweepAxis, Window, DEFAULT_EM_SHIFT, DEFAULT_EX_SHIFT};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "qy",
    version,
    about = "Fluorescence quantum yields from PTI spectrofluorometer records"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Correct every blank/fluorophore pair of an experiment and report the QY.
    Run(RunArgs),
    /// Re-run an experiment across configuration variants.
    Sweep(SweepArgs),
    /// Baseline-subtract and instrument-correct a single record.
    Correct(CorrectArgs),
    /// Write a synthetic blank/fluorophore set with a known QY.
    Synth(SynthArgs),
}

/// LUT locations; fall back to the experiment file, then `QY_EXCORR`/`QY_EMCORR`.
#[derive(Debug, Args, Clone)]
pub struct LutArgs {
    /// Excitation correction table (`<Group>` record).
    #[arg(long, value_name = "FILE")]
    pub excorr: Option<PathBuf>,

    /// Emission correction table (`<Group>` record).
    #[arg(long, value_name = "FILE")]
    pub emcorr: Option<PathBuf>,
}

/// Options shared by every command that corrects spectra.
#[derive(Debug, Args, Clone)]
pub struct CorrectionArgs {
    /// Interpolation for the excitation LUT.
    #[arg(long, value_enum, default_value_t = Interpolation::Cubic)]
    pub ex_interpolation: Interpolation,

    /// Interpolation for the emission LUT.
    #[arg(long, value_enum, default_value_t = Interpolation::Cubic)]
    pub em_interpolation: Interpolation,

    /// Subsample the excitation LUT before interpolating.
    #[arg(long, value_enum, default_value_t = LutSplit::None)]
    pub ex_split: LutSplit,

    /// Subsample the emission LUT before interpolating.
    #[arg(long, value_enum, default_value_t = LutSplit::None)]
    pub em_split: LutSplit,

    /// Shift LUT lookups by the monochromator offsets.
    #[arg(long)]
    pub shift: bool,

    /// Estimate offsets from the second-order scatter peak (implies --shift).
    #[arg(long)]
    pub estimate_shift: bool,

    /// Excitation shift (nm) when not estimating.
    #[arg(long, default_value_t = DEFAULT_EX_SHIFT)]
    pub ex_shift: f64,

    /// Emission shift (nm) when not estimating.
    #[arg(long, default_value_t = DEFAULT_EM_SHIFT)]
    pub em_shift: f64,

    /// Normalise by the mean diode signal instead of point-wise.
    #[arg(long)]
    pub const_diode: bool,

    /// Add or subtract one standard error to the baseline intercept.
    #[arg(long, value_enum, default_value_t = SeMode::None)]
    pub intercept_se: SeMode,

    /// Add or subtract one standard error to the baseline slope.
    #[arg(long, value_enum, default_value_t = SeMode::None)]
    pub slope_se: SeMode,

    /// Skip the diode normalisation.
    #[arg(long)]
    pub no_diode: bool,

    /// Skip the excitation LUT.
    #[arg(long)]
    pub no_excorr: bool,

    /// Skip the emission LUT.
    #[arg(long)]
    pub no_emcorr: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Experiment description (JSON).
    #[arg(value_name = "EXPERIMENT")]
    pub experiment: PathBuf,

    #[command(flatten)]
    pub luts: LutArgs,

    #[command(flatten)]
    pub correction: CorrectionArgs,

    /// Override the experiment's tail-window start (nm).
    #[arg(long)]
    pub tail_start: Option<f64>,

    /// Override the experiment's tail-ratio acceptance tolerance.
    #[arg(long)]
    pub ratio_tolerance: Option<f64>,

    /// Write one row per pair to CSV.
    #[arg(long, value_name = "CSV")]
    pub csv: Option<PathBuf>,

    /// Write the full run (settings, offsets, pooling) to JSON.
    #[arg(long, value_name = "JSON")]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SweepArgs {
    /// Experiment description (JSON).
    #[arg(value_name = "EXPERIMENT")]
    pub experiment: PathBuf,

    #[command(flatten)]
    pub luts: LutArgs,

    /// Base configuration the sweep varies.
    #[command(flatten)]
    pub correction: CorrectionArgs,

    /// Which knob to vary.
    #[arg(long, value_enum, default_value_t = SweepAxis::All)]
    pub axis: SweepAxis,

    /// Tail-window starts (nm) for the tail-start axis.
    #[arg(long, value_delimiter = ',', default_values_t = vec![360.0, 362.0, 364.0, 366.0])]
    pub tail_starts: Vec<f64>,

    /// Per-variant results.
    #[arg(long, value_name = "CSV")]
    pub out: Option<PathBuf>,

    /// Per-replicate spread across variants.
    #[arg(long, value_name = "CSV")]
    pub summary: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct CorrectArgs {
    /// Record(s) to correct; several records on one grid are averaged first.
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Baseline ranges as START:END (repeatable).
    #[arg(short = 'b', long = "baseline", value_name = "START:END", required = true)]
    pub baseline: Vec<Window>,

    #[command(flatten)]
    pub luts: LutArgs,

    #[command(flatten)]
    pub correction: CorrectionArgs,

    /// Write the per-sample correction to CSV.
    #[arg(long, value_name = "CSV")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output directory.
    #[arg(value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Quantum yield built into the fluorophore record.
    #[arg(long, default_value_t = 0.6)]
    pub qy: f64,

    /// Nominal excitation wavelength (nm).
    #[arg(long, default_value_t = 320.0)]
    pub excitation: f64,

    /// Fraction of the excitation light the fluorophore absorbs.
    #[arg(long, default_value_t = 0.4)]
    pub absorbed: f64,

    /// Shot-noise scale (0 writes noise-free records).
    #[arg(long, default_value_t = 1.0)]
    pub noise: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::parse_from(["qy", "run", "exp.json"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.correction.ex_interpolation, Interpolation::Cubic);
        assert_eq!(args.correction.em_split, LutSplit::None);
        assert!(!args.correction.shift);
        assert_eq!(args.correction.ex_shift, DEFAULT_EX_SHIFT);
        assert!(args.luts.excorr.is_none());
    }

    #[test]
    fn sweep_tail_starts_and_axis() {
        let cli = Cli::parse_from(["qy", "sweep", "exp.json", "--axis", "baseline-se"]);
        let Command::Sweep(args) = cli.command else {
            panic!("expected sweep");
        };
        assert_eq!(args.axis, SweepAxis::BaselineSe);
        assert_eq!(args.tail_starts, vec![360.0, 362.0, 364.0, 366.0]);

        let cli = Cli::parse_from(["qy", "sweep", "exp.json", "--tail-starts", "350,355"]);
        let Command::Sweep(args) = cli.command else {
            panic!("expected sweep");
        };
        assert_eq!(args.tail_starts, vec![350.0, 355.0]);
    }

    #[test]
    fn correct_parses_baseline_windows() {
        let cli = Cli::parse_from(["qy", "correct", "a.txt", "-b", "300:305", "-b", "600:650"]);
        let Command::Correct(args) = cli.command else {
            panic!("expected correct");
        };
        assert_eq!(args.baseline[1], Window { start: 600.0, end: 650.0 });
        assert!(Cli::try_parse_from(["qy", "correct", "a.txt", "-b", "305:300"]).is_err());
    }
}
