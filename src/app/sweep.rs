//! Configuration sweeps.
//!
//! A sweep re-runs the whole analysis for every value of one configuration
//! axis (or all of them at once) and collects the corrected QY of each
//! replicate. The spread across variants is the systematic uncertainty that
//! axis contributes.
//!
//! Variants are independent: they borrow the loaded spectra and the shared
//! LUTs, so they are evaluated in parallel with rayon.

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::app::pipeline::{analyse, AnalysisSettings, LoadedData};
use crate::domain::{BaselineSe, CorrectionConfig, Interpolation, LutSplit, SeMode, SweepAxis};
use crate::error::QyError;

/// One point of a sweep: a configuration plus the tail-window start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Variant {
    pub config: CorrectionConfig,
    pub tail_start: f64,
}

/// Outcome of one variant.
#[derive(Debug, Clone, Serialize)]
pub struct SweepRow {
    pub variant: Variant,
    /// Corrected QY per replicate, or the numerical failure that stopped this variant.
    pub corrected_qy: Result<Vec<f64>, String>,
    pub tail_ratios: Vec<f64>,
}

/// Spread of one replicate's corrected QY across successful variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicateSummary {
    pub replicate: String,
    pub n: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub half_range: f64,
}

fn pairs<T: Copy, U: Copy>(a: &[T], b: &[U]) -> Vec<(T, U)> {
    a.iter().flat_map(|&x| b.iter().map(move |&y| (x, y))).collect()
}

/// Expand `base` along `axis`.
pub fn variants(axis: SweepAxis, base: Variant, tail_starts: &[f64]) -> Vec<Variant> {
    let with = |f: &dyn Fn(&mut CorrectionConfig)| {
        let mut v = base;
        f(&mut v.config);
        v
    };
    match axis {
        SweepAxis::BaselineSe => pairs(&SeMode::ALL, &SeMode::ALL)
            .into_iter()
            .map(|(i, s)| with(&|c| c.baseline_se = BaselineSe::new(i, s)))
            .collect(),
        SweepAxis::ConstDiode => [false, true]
            .into_iter()
            .map(|on| with(&|c| c.const_diode = on))
            .collect(),
        SweepAxis::Interpolation => pairs(&Interpolation::ALL, &Interpolation::ALL)
            .into_iter()
            .map(|(ex, em)| {
                with(&|c| {
                    c.ex_interpolation = ex;
                    c.em_interpolation = em;
                })
            })
            .collect(),
        SweepAxis::Split => pairs(&LutSplit::ALL, &LutSplit::ALL)
            .into_iter()
            .map(|(ex, em)| {
                with(&|c| {
                    c.ex_split = ex;
                    c.em_split = em;
                })
            })
            .collect(),
        SweepAxis::Shift => [false, true]
            .into_iter()
            .map(|on| with(&|c| c.shift.enabled = on))
            .collect(),
        SweepAxis::TailStart => tail_starts
            .iter()
            .map(|&t| Variant {
                tail_start: t,
                ..base
            })
            .collect(),
        SweepAxis::All => {
            let mut out = vec![base];
            for axis in [
                SweepAxis::TailStart,
                SweepAxis::Shift,
                SweepAxis::BaselineSe,
                SweepAxis::Interpolation,
                SweepAxis::Split,
                SweepAxis::ConstDiode,
            ] {
                out = out
                    .into_iter()
                    .flat_map(|v| variants(axis, v, tail_starts))
                    .collect();
            }
            out
        }
    }
}

/// Run every variant in parallel.
///
/// Configuration and alignment errors abort the sweep; fit and
/// divide-by-zero failures are recorded on the affected row.
pub fn run_sweep(
    data: &LoadedData,
    settings: &AnalysisSettings,
    variants: &[Variant],
) -> Result<Vec<SweepRow>, QyError> {
    info!("sweeping {} variant(s)", variants.len());
    variants
        .par_iter()
        .map(|variant| {
            let settings = AnalysisSettings {
                tail_start: variant.tail_start,
                ..settings.clone()
            };
            match analyse(data, &settings, &variant.config) {
                Ok(run) => Ok(SweepRow {
                    variant: *variant,
                    corrected_qy: Ok(run.pooled.corrected()),
                    tail_ratios: run.pooled.replicates.iter().map(|r| r.tail_ratio).collect(),
                }),
                Err(err @ (QyError::Fit(_) | QyError::DivideByZero(_))) => {
                    warn!("variant {:?} failed: {err}", variant.config);
                    Ok(SweepRow {
                        variant: *variant,
                        corrected_qy: Err(err.to_string()),
                        tail_ratios: Vec::new(),
                    })
                }
                Err(err) => Err(err),
            }
        })
        .collect()
}

/// Per-replicate statistics over the rows that succeeded.
pub fn summarize(rows: &[SweepRow], replicate_names: &[String]) -> Vec<ReplicateSummary> {
    replicate_names
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.corrected_qy.as_ref().ok())
                .filter_map(|qys| qys.get(i).copied())
                .collect();
            if values.is_empty() {
                return None;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some(ReplicateSummary {
                replicate: name.clone(),
                n: values.len(),
                min,
                max,
                mean,
                std: var.sqrt(),
                half_range: 0.5 * (max - min),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Variant {
        Variant {
            config: CorrectionConfig::default(),
            tail_start: 360.0,
        }
    }

    #[test]
    fn axis_sizes() {
        let tails = [360.0, 362.0, 364.0];
        assert_eq!(variants(SweepAxis::BaselineSe, base(), &tails).len(), 9);
        assert_eq!(variants(SweepAxis::ConstDiode, base(), &tails).len(), 2);
        assert_eq!(variants(SweepAxis::Interpolation, base(), &tails).len(), 16);
        assert_eq!(variants(SweepAxis::Split, base(), &tails).len(), 9);
        assert_eq!(variants(SweepAxis::Shift, base(), &tails).len(), 2);
        assert_eq!(variants(SweepAxis::TailStart, base(), &tails).len(), 3);
        assert_eq!(variants(SweepAxis::All, base(), &tails).len(), 3 * 2 * 9 * 16 * 9 * 2);
    }

    #[test]
    fn variants_only_touch_their_axis() {
        let v = variants(SweepAxis::Split, base(), &[]);
        assert!(v.iter().all(|x| x.config.ex_interpolation == Interpolation::Cubic && x.tail_start == 360.0));
        assert_eq!(v[5].config.ex_split, LutSplit::Even);
        assert_eq!(v[5].config.em_split, LutSplit::Odd);
    }

    #[test]
    fn summary_statistics() {
        let row = |qys: Vec<f64>| SweepRow {
            variant: base(),
            corrected_qy: Ok(qys),
            tail_ratios: vec![],
        };
        let rows = vec![
            row(vec![0.80, 0.5]),
            row(vec![0.84, 0.5]),
            SweepRow {
                variant: base(),
                corrected_qy: Err("fit error".into()),
                tail_ratios: vec![],
            },
        ];
        let names = vec!["a".to_string(), "b".to_string()];
        let s = summarize(&rows, &names);
        assert_eq!(s[0].n, 2);
        assert!((s[0].mean - 0.82).abs() < 1e-12);
        assert!((s[0].std - 0.02).abs() < 1e-12);
        assert!((s[0].half_range - 0.02).abs() < 1e-12);
        assert_eq!(s[1].std, 0.0);
    }
}
