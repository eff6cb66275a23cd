//! Top-level application orchestration.
//!
//! `src/main.rs` only maps errors to exit codes; this module is the real main:
//! - loads `.env` and initialises logging
//! - parses CLI arguments
//! - loads experiments and correction tables
//! - runs the analysis or sweep
//! - prints reports and writes optional exports

use std::path::Path;

use clap::Parser;
use log::info;

use crate::cli::{Command, CorrectArgs, CorrectionArgs, LutArgs, RunArgs, SweepArgs, SynthArgs};
use crate::correct::{correct, CorrectionTables};
use crate::data::{write_synthetic_set, SynthConfig};
use crate::domain::{BaselineSe, CorrectionConfig, ShiftConfig, Spectrum};
use crate::error::QyError;
use crate::io::experiment::{resolve_lut_path, Experiment, EMCORR_ENV, EXCORR_ENV};
use crate::io::ingest::{read_group, read_spectrum};

pub mod pipeline;
pub mod sweep;

use pipeline::{analyse, AnalysisSettings, LoadedData};
use sweep::{run_sweep, summarize, variants, Variant};

/// Entry point for the `qy` binary.
pub fn run() -> Result<(), QyError> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Sweep(args) => handle_sweep(args),
        Command::Correct(args) => handle_correct(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn load_experiment(path: &Path, luts: &LutArgs) -> Result<(Experiment, LoadedData), QyError> {
    let experiment = Experiment::load(path)?;
    let excorr = resolve_lut_path(luts.excorr.as_deref(), experiment.excorr.as_deref(), EXCORR_ENV)?;
    let emcorr = resolve_lut_path(luts.emcorr.as_deref(), experiment.emcorr.as_deref(), EMCORR_ENV)?;
    let data = LoadedData::load(&experiment, &excorr, &emcorr)?;
    Ok((experiment, data))
}

fn handle_run(args: RunArgs) -> Result<(), QyError> {
    let (experiment, data) = load_experiment(&args.experiment, &args.luts)?;
    let mut settings = AnalysisSettings::from_experiment(&experiment);
    if let Some(t) = args.tail_start {
        settings.tail_start = t;
    }
    if let Some(tol) = args.ratio_tolerance {
        settings.ratio_tolerance = tol;
    }
    let config = correction_config_from_args(&args.correction);

    let run = analyse(&data, &settings, &config)?;
    println!(
        "{}",
        crate::report::format_run_summary(experiment.name.as_deref(), &run)
    );

    if let Some(path) = &args.csv {
        crate::io::export::write_run_csv(path, &run)?;
        info!("wrote '{}'", path.display());
    }
    if let Some(path) = &args.json {
        crate::io::export::write_run_json(path, &run)?;
        info!("wrote '{}'", path.display());
    }
    Ok(())
}

fn handle_sweep(args: SweepArgs) -> Result<(), QyError> {
    let (experiment, data) = load_experiment(&args.experiment, &args.luts)?;
    let settings = AnalysisSettings::from_experiment(&experiment);
    let base = Variant {
        config: correction_config_from_args(&args.correction),
        tail_start: settings.tail_start,
    };
    let variants = variants(args.axis, base, &args.tail_starts);
    let rows = run_sweep(&data, &settings, &variants)?;

    let names: Vec<String> = data.fluors.iter().map(|f| f.source.clone()).collect();
    let summary = summarize(&rows, &names);
    println!(
        "{}",
        crate::report::format_sweep_summary(args.axis, &rows, &summary)
    );

    if let Some(path) = &args.out {
        crate::io::export::write_sweep_csv(path, &rows, &names)?;
        info!("wrote '{}'", path.display());
    }
    if let Some(path) = &args.summary {
        crate::io::export::write_summary_csv(path, &summary)?;
        info!("wrote '{}'", path.display());
    }
    Ok(())
}

fn handle_correct(args: CorrectArgs) -> Result<(), QyError> {
    let excorr = resolve_lut_path(args.luts.excorr.as_deref(), None, EXCORR_ENV)?;
    let emcorr = resolve_lut_path(args.luts.emcorr.as_deref(), None, EMCORR_ENV)?;
    let tables = CorrectionTables::new(read_group(&excorr)?, read_group(&emcorr)?);

    let spectrum = load_averaged(&args.files)?;
    let config = correction_config_from_args(&args.correction);
    let corrected = correct(&spectrum, &args.baseline, &config, &tables)?;
    println!("{}", crate::report::format_correction_summary(&corrected));

    if let Some(path) = &args.out {
        crate::io::export::write_corrected_csv(path, &corrected)?;
        info!("wrote '{}'", path.display());
    }
    Ok(())
}

/// Read every record and merge replicates by point-wise averaging.
fn load_averaged(files: &[std::path::PathBuf]) -> Result<Spectrum, QyError> {
    let (first, rest) = files
        .split_first()
        .ok_or_else(|| QyError::config("No input records given."))?;
    let mut spectrum = read_spectrum(first)?;
    for path in rest {
        spectrum = spectrum.average(&read_spectrum(path)?)?;
    }
    Ok(spectrum)
}

fn handle_synth(args: SynthArgs) -> Result<(), QyError> {
    let config = SynthConfig {
        seed: args.seed,
        excitation: args.excitation,
        quantum_yield: args.qy,
        absorbed_fraction: args.absorbed,
        noise: args.noise,
        acquired: chrono::Local::now().naive_local(),
        ..SynthConfig::default()
    };
    let out = write_synthetic_set(&args.out_dir, &config)?;
    println!("Blank:      {}", out.blank.display());
    println!("Fluor:      {}", out.fluor.display());
    println!("Excorr:     {}", out.excorr.display());
    println!("Emcorr:     {}", out.emcorr.display());
    println!("Experiment: {}", out.experiment.display());
    Ok(())
}

pub fn correction_config_from_args(args: &CorrectionArgs) -> CorrectionConfig {
    CorrectionConfig {
        ex_interpolation: args.ex_interpolation,
        em_interpolation: args.em_interpolation,
        ex_split: args.ex_split,
        em_split: args.em_split,
        shift: ShiftConfig {
            enabled: args.shift || args.estimate_shift,
            estimate: args.estimate_shift,
            default_ex: args.ex_shift,
            default_em: args.em_shift,
        },
        const_diode: args.const_diode,
        baseline_se: BaselineSe::new(args.intercept_se, args.slope_se),
        apply_diode: !args.no_diode,
        apply_excitation: !args.no_excorr,
        apply_emission: !args.no_emcorr,
    }
}
