//! Shared analysis pipeline used by `qy run` and `qy sweep`.
//!
//! load records + LUTs -> pair blanks with fluorophores -> correct both ->
//! integrate -> pool tail ratios
//!
//! Loading happens once; [`analyse`] only borrows the loaded data, so the
//! sweep driver can call it for many configurations in parallel.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::correct::{correct, CorrectionTables};
use crate::domain::{CorrectionConfig, IntegrationWindows, MonochromatorOffsets, Spectrum, Window};
use crate::error::QyError;
use crate::io::experiment::{resolve_ranges, Experiment, RangeSpec};
use crate::io::ingest::{read_group, read_spectrum};
use crate::qy::{pool_tail_ratios, quantum_yield, PooledQy, QyMeasurement};

/// Everything read from disk for one experiment.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub blanks: Vec<Spectrum>,
    pub fluors: Vec<Spectrum>,
    pub tables: Arc<CorrectionTables>,
}

impl LoadedData {
    pub fn load(experiment: &Experiment, excorr: &Path, emcorr: &Path) -> Result<Self, QyError> {
        let tables = CorrectionTables::new(read_group(excorr)?, read_group(emcorr)?).shared();
        let blanks = experiment
            .blanks
            .iter()
            .map(|p| read_spectrum(p))
            .collect::<Result<Vec<_>, _>>()?;
        let fluors = experiment
            .fluors
            .iter()
            .map(|p| read_spectrum(p))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "loaded {} blank(s), {} fluorophore record(s), LUTs '{}' and '{}'",
            blanks.len(),
            fluors.len(),
            tables.excitation.name,
            tables.emission.name
        );
        Ok(Self {
            blanks,
            fluors,
            tables,
        })
    }
}

/// Window settings shared by every pair of an experiment.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSettings {
    pub baseline_ranges: Vec<RangeSpec>,
    pub blank_baseline_ranges: Vec<RangeSpec>,
    pub emission_window: Window,
    pub tail_start: f64,
    pub ex_half_width: f64,
    pub ratio_tolerance: f64,
}

impl AnalysisSettings {
    pub fn from_experiment(experiment: &Experiment) -> Self {
        Self {
            baseline_ranges: experiment.baseline_ranges.clone(),
            blank_baseline_ranges: experiment
                .blank_baseline_ranges
                .clone()
                .unwrap_or_else(|| experiment.baseline_ranges.clone()),
            emission_window: experiment.emission_window,
            tail_start: experiment.tail_start,
            ex_half_width: experiment.ex_half_width,
            ratio_tolerance: experiment.ratio_tolerance,
        }
    }
}

/// Pair each fluorophore record with its blank.
///
/// A single blank is reused for every fluorophore; otherwise the lists pair
/// one-to-one in order.
pub fn pair_replicates<'a>(
    blanks: &'a [Spectrum],
    fluors: &'a [Spectrum],
) -> Result<Vec<(&'a Spectrum, &'a Spectrum)>, QyError> {
    if fluors.is_empty() {
        return Err(QyError::config("No fluorophore records to analyse."));
    }
    match blanks {
        [] => Err(QyError::config("No blank records to analyse.")),
        [blank] => Ok(fluors.iter().map(|f| (blank, f)).collect()),
        _ if blanks.len() == fluors.len() => Ok(blanks.iter().zip(fluors).collect()),
        _ => Err(QyError::alignment(format!(
            "{} blanks cannot be paired with {} fluorophore records (use one blank or one per record).",
            blanks.len(),
            fluors.len()
        ))),
    }
}

/// Result for one blank/fluorophore pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairResult {
    pub blank: String,
    pub fluor: String,
    pub excitation: f64,
    pub windows: IntegrationWindows,
    pub blank_offsets: MonochromatorOffsets,
    pub fluor_offsets: MonochromatorOffsets,
    pub measurement: QyMeasurement,
}

/// Output of a full analysis under one configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub config: CorrectionConfig,
    pub tail_start: f64,
    pub pairs: Vec<PairResult>,
    pub pooled: PooledQy,
}

/// Correct, integrate and pool every pair under `config`.
pub fn analyse(
    data: &LoadedData,
    settings: &AnalysisSettings,
    config: &CorrectionConfig,
) -> Result<RunOutput, QyError> {
    let pairs = pair_replicates(&data.blanks, &data.fluors)?;
    let mut results = Vec::with_capacity(pairs.len());

    for (blank, fluor) in pairs {
        let excitation = blank.excitation_nominal()?;
        let fluor_ex = fluor.excitation_nominal()?;
        if (fluor_ex - excitation).abs() > 1e-6 {
            return Err(QyError::alignment(format!(
                "Blank '{}' was excited at {excitation} nm but '{}' at {fluor_ex} nm.",
                blank.source, fluor.source
            )));
        }
        blank.ensure_same_grid(fluor)?;

        let blank_ranges = resolve_ranges(&settings.blank_baseline_ranges, excitation)?;
        let fluor_ranges = resolve_ranges(&settings.baseline_ranges, excitation)?;
        let windows = IntegrationWindows::around(
            excitation,
            settings.ex_half_width,
            settings.emission_window,
            settings.tail_start,
        )?;

        let blank_c = correct(blank, &blank_ranges, config, &data.tables)?;
        let fluor_c = correct(fluor, &fluor_ranges, config, &data.tables)?;
        let measurement = quantum_yield(&blank_c, &fluor_c, &windows)?;
        debug!(
            "{} @ {excitation} nm: QY {:.5}, tail ratio {:.5}",
            fluor.source, measurement.qy, measurement.tail_ratio
        );

        results.push(PairResult {
            blank: blank.source.clone(),
            fluor: fluor.source.clone(),
            excitation,
            windows,
            blank_offsets: blank_c.offsets(),
            fluor_offsets: fluor_c.offsets(),
            measurement,
        });
    }

    let measurements: Vec<QyMeasurement> = results.iter().map(|r| r.measurement).collect();
    let pooled = pool_tail_ratios(&measurements, settings.ratio_tolerance)?;

    Ok(RunOutput {
        config: *config,
        tail_start: settings.tail_start,
        pairs: results,
        pooled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, ex: f64) -> Spectrum {
        let wl: Vec<f64> = (0..5).map(|i| 300.0 + i as f64).collect();
        Spectrum::new(name, vec![ex], vec![300.0, 304.0], wl, vec![1.0; 5], vec![1.0; 5]).unwrap()
    }

    #[test]
    fn single_blank_is_reused() {
        let blanks = vec![record("blank", 310.0)];
        let fluors = vec![record("a", 310.0), record("b", 320.0)];
        let pairs = pair_replicates(&blanks, &fluors).unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(b, _)| b.source == "blank"));
    }

    #[test]
    fn one_to_one_pairing_and_mismatch() {
        let blanks = vec![record("b1", 310.0), record("b2", 320.0)];
        let fluors = vec![record("f1", 310.0), record("f2", 320.0)];
        let pairs = pair_replicates(&blanks, &fluors).unwrap();
        assert_eq!(pairs[1].0.source, "b2");
        assert_eq!(pairs[1].1.source, "f2");

        let three = vec![record("f1", 310.0), record("f2", 320.0), record("f3", 330.0)];
        assert!(matches!(pair_replicates(&blanks, &three), Err(QyError::DataAlignment(_))));
        assert!(matches!(pair_replicates(&[], &three), Err(QyError::Configuration(_))));
    }
}
