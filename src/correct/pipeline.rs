//! Staged correction of a single spectrum.
//!
//! ```text
//! Spectrum ──fit baseline──▶ BaselineSubtracted ──resolve offsets──▶ OffsetEstimated
//!                                                                       │
//!                                                              apply response
//!                                                                       ▼
//!                                                              CorrectedSpectrum
//! ```
//!
//! Each stage owns its derived arrays and borrows the loaded spectrum, so a
//! sweep can correct the same record under many configurations at once.

use log::{debug, warn};
use serde::Serialize;

use crate::correct::lut::CorrectionTables;
use crate::correct::response::{response_factors, ResponseFactors};
use crate::domain::{
    BaselineSe, CorrectionConfig, MonochromatorOffsets, OffsetSource, ShiftConfig, Spectrum, Window,
};
use crate::error::QyError;
use crate::fit::{estimate_offsets, fit_baseline, BaselineFit, OffsetEstimate};

/// Raw intensities with the fitted background removed.
#[derive(Debug, Clone)]
pub struct BaselineSubtracted<'a> {
    spectrum: &'a Spectrum,
    fit: BaselineFit,
    se: BaselineSe,
    baseline: Vec<f64>,
    signal: Vec<f64>,
}

impl<'a> BaselineSubtracted<'a> {
    pub fn new(spectrum: &'a Spectrum, ranges: &[Window], se: BaselineSe) -> Result<Self, QyError> {
        let fit = fit_baseline(spectrum, ranges)?;
        let baseline = fit.curve(spectrum.wavelengths(), se);
        let signal = spectrum
            .raw()
            .iter()
            .zip(&baseline)
            .map(|(r, b)| r - b)
            .collect();
        Ok(Self {
            spectrum,
            fit,
            se,
            baseline,
            signal,
        })
    }

    pub fn spectrum(&self) -> &'a Spectrum {
        self.spectrum
    }

    pub fn fit(&self) -> &BaselineFit {
        &self.fit
    }

    pub fn baseline(&self) -> &[f64] {
        &self.baseline
    }

    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    /// Decide which LUT offsets the correction stage will use.
    ///
    /// A failed estimate is not an error: it is logged and the offsets are zero.
    pub fn resolve_offsets(self, shift: &ShiftConfig) -> OffsetEstimated<'a> {
        let defaults = MonochromatorOffsets {
            ex: shift.default_ex,
            em: shift.default_em,
            source: OffsetSource::Default,
        };
        let offsets = if !shift.enabled {
            MonochromatorOffsets::none()
        } else if !shift.estimate {
            defaults
        } else {
            match estimate_offsets(self.spectrum) {
                OffsetEstimate::Estimated { ex, em, .. } => MonochromatorOffsets {
                    ex,
                    em,
                    source: OffsetSource::Estimated,
                },
                OffsetEstimate::NotApplicable => {
                    debug!(
                        "'{}': second-order peak out of range, using default shifts",
                        self.spectrum.source
                    );
                    defaults
                }
                OffsetEstimate::Failed(reason) => {
                    warn!(
                        "'{}': offset estimation failed ({reason}); LUTs are not shifted",
                        self.spectrum.source
                    );
                    MonochromatorOffsets {
                        ex: 0.0,
                        em: 0.0,
                        source: OffsetSource::FitFailed,
                    }
                }
            }
        };
        self.with_offsets(offsets)
    }

    /// Use caller-provided offsets.
    pub fn with_offsets(self, offsets: MonochromatorOffsets) -> OffsetEstimated<'a> {
        OffsetEstimated {
            stage: self,
            offsets,
        }
    }
}

/// Baseline-subtracted data with the LUT offsets decided.
#[derive(Debug, Clone)]
pub struct OffsetEstimated<'a> {
    stage: BaselineSubtracted<'a>,
    offsets: MonochromatorOffsets,
}

impl<'a> OffsetEstimated<'a> {
    pub fn offsets(&self) -> MonochromatorOffsets {
        self.offsets
    }

    /// Apply the instrument response.
    pub fn apply_response(
        self,
        config: &CorrectionConfig,
        tables: &CorrectionTables,
    ) -> Result<CorrectedSpectrum<'a>, QyError> {
        let spectrum = self.stage.spectrum;
        let factors = response_factors(spectrum, config, tables, &self.offsets)?;
        let corrected = self
            .stage
            .signal
            .iter()
            .zip(&factors.total)
            .map(|(s, f)| s * f)
            .collect();

        debug!(
            "corrected '{}' ({} samples, offsets ex {:+.2} em {:+.2} [{:?}])",
            spectrum.source,
            spectrum.len(),
            self.offsets.ex,
            self.offsets.em,
            self.offsets.source
        );

        Ok(CorrectedSpectrum {
            spectrum,
            baseline_fit: self.stage.fit,
            baseline_se: self.stage.se,
            baseline: self.stage.baseline,
            offsets: self.offsets,
            factors,
            corrected,
        })
    }
}

/// A fully corrected spectrum, kept together with everything that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectedSpectrum<'a> {
    spectrum: &'a Spectrum,
    baseline_fit: BaselineFit,
    baseline_se: BaselineSe,
    baseline: Vec<f64>,
    offsets: MonochromatorOffsets,
    factors: ResponseFactors,
    corrected: Vec<f64>,
}

impl<'a> CorrectedSpectrum<'a> {
    pub fn spectrum(&self) -> &'a Spectrum {
        self.spectrum
    }

    pub fn wavelengths(&self) -> &'a [f64] {
        self.spectrum.wavelengths()
    }

    pub fn step(&self) -> f64 {
        self.spectrum.step()
    }

    pub fn corrected(&self) -> &[f64] {
        &self.corrected
    }

    pub fn baseline(&self) -> &[f64] {
        &self.baseline
    }

    pub fn baseline_fit(&self) -> &BaselineFit {
        &self.baseline_fit
    }

    pub fn baseline_se(&self) -> BaselineSe {
        self.baseline_se
    }

    pub fn offsets(&self) -> MonochromatorOffsets {
        self.offsets
    }

    pub fn factors(&self) -> &ResponseFactors {
        &self.factors
    }

    /// Undo the correction: divide out the response and add the baseline back.
    pub fn decorrect(&self) -> Vec<f64> {
        self.corrected
            .iter()
            .zip(&self.factors.total)
            .zip(&self.baseline)
            .map(|((c, f), b)| c / f + b)
            .collect()
    }
}

/// Run every stage on `spectrum`.
pub fn correct<'a>(
    spectrum: &'a Spectrum,
    baseline_ranges: &[Window],
    config: &CorrectionConfig,
    tables: &CorrectionTables,
) -> Result<CorrectedSpectrum<'a>, QyError> {
    BaselineSubtracted::new(spectrum, baseline_ranges, config.baseline_se)?
        .resolve_offsets(&config.shift)
        .apply_response(config, tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::lut::CorrectionTable;
    use crate::domain::{Interpolation, LutSplit, SeMode};

    fn tables() -> CorrectionTables {
        let ex_wl: Vec<f64> = (250..=750).map(f64::from).collect();
        let ex = ex_wl.iter().map(|w| 1.0 + 0.2 * ((w - 250.0) / 90.0).sin()).collect();
        let em_wl: Vec<f64> = (0..=274).map(|i| 300.0 + 2.0 * i as f64).collect();
        let em = em_wl.iter().map(|w| 1.5 + 0.3 * ((w - 300.0) / 120.0).cos()).collect();
        CorrectionTables::new(
            CorrectionTable::new("excorr", ex_wl, ex).unwrap(),
            CorrectionTable::new("emcorr", em_wl, em).unwrap(),
        )
    }

    fn sample() -> Spectrum {
        let wl: Vec<f64> = (0..=300).map(|i| 320.0 + i as f64).collect();
        let raw = wl
            .iter()
            .map(|&w| 50.0 + 0.1 * w + 1.0e4 * (-0.5 * ((w - 400.0) / 15.0).powi(2)).exp())
            .collect();
        let diode = wl.iter().map(|&w| 3.0 + 0.001 * w).collect();
        Spectrum::new("sample", vec![340.0], vec![320.0, 620.0], wl, raw, diode).unwrap()
    }

    fn ranges() -> Vec<Window> {
        vec![Window::new(320.0, 330.0).unwrap(), Window::new(580.0, 620.0).unwrap()]
    }

    #[test]
    fn decorrect_reproduces_raw() {
        let s = sample();
        let config = CorrectionConfig {
            baseline_se: BaselineSe::new(SeMode::Plus, SeMode::Minus),
            shift: ShiftConfig { enabled: true, ..ShiftConfig::default() },
            ..CorrectionConfig::default()
        };
        let c = correct(&s, &ranges(), &config, &tables()).unwrap();
        for (back, raw) in c.decorrect().iter().zip(s.raw()) {
            assert!((back - raw).abs() < 1e-9 * raw.abs().max(1.0));
        }
        assert_eq!(c.corrected().len(), s.len());
    }

    #[test]
    fn split_corrections_approximate_the_full_table() {
        let s = sample();
        let full = correct(&s, &ranges(), &CorrectionConfig::default(), &tables()).unwrap();
        for split in [LutSplit::Even, LutSplit::Odd] {
            let config = CorrectionConfig {
                ex_split: split,
                em_split: split,
                ..CorrectionConfig::default()
            };
            let c = correct(&s, &ranges(), &config, &tables()).unwrap();
            for (a, b) in c.corrected().iter().zip(full.corrected()) {
                assert!((a - b).abs() <= 1e-4 * b.abs().max(1.0), "{split:?}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn shift_resolution_follows_settings() {
        let s = sample();
        let stage = || BaselineSubtracted::new(&s, &ranges(), BaselineSe::default()).unwrap();

        let off = stage().resolve_offsets(&ShiftConfig::default());
        assert_eq!(off.offsets(), MonochromatorOffsets::none());

        let defaults = ShiftConfig { enabled: true, ..ShiftConfig::default() };
        let o = stage().resolve_offsets(&defaults).offsets();
        assert_eq!((o.ex, o.em, o.source), (2.5, 2.0, OffsetSource::Default));

        // 2 × 340 nm is beyond the 620 nm scan end, so estimation falls back to defaults.
        let estimate = ShiftConfig { enabled: true, estimate: true, ..ShiftConfig::default() };
        assert_eq!(stage().resolve_offsets(&estimate).offsets().source, OffsetSource::Default);
    }

    #[test]
    fn failed_estimate_falls_back_to_zero() {
        let wl: Vec<f64> = (0..=400).map(|i| 280.0 + i as f64).collect();
        let raw = wl.iter().map(|&w| 5.0 + 0.01 * w).collect();
        let s = Spectrum::new("flat", vec![300.0], vec![280.0, 680.0], wl, raw, vec![1.0; 401]).unwrap();
        let shift = ShiftConfig { enabled: true, estimate: true, ..ShiftConfig::default() };
        let o = BaselineSubtracted::new(&s, &[Window::new(280.0, 290.0).unwrap()], BaselineSe::default())
            .unwrap()
            .resolve_offsets(&shift)
            .offsets();
        assert_eq!((o.ex, o.em, o.source), (0.0, 0.0, OffsetSource::FitFailed));
    }

    #[test]
    fn interpolation_choice_changes_little_on_smooth_tables() {
        let s = sample();
        let cubic = correct(&s, &ranges(), &CorrectionConfig::default(), &tables()).unwrap();
        let config = CorrectionConfig {
            ex_interpolation: Interpolation::Linear,
            em_interpolation: Interpolation::Quadratic,
            ..CorrectionConfig::default()
        };
        let other = correct(&s, &ranges(), &config, &tables()).unwrap();
        for (a, b) in other.corrected().iter().zip(cubic.corrected()) {
            assert!((a - b).abs() <= 1e-3 * b.abs().max(1.0));
        }
    }
}
