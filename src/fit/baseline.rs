//! Linear baseline fitting over background ranges.
//!
//! The samples of every range are pooled and fitted as one straight line; the
//! fitted line is then evaluated across the whole spectrum and subtracted.

use log::debug;
use serde::Serialize;

use crate::domain::{BaselineSe, Spectrum, Window};
use crate::error::QyError;
use crate::math::{fit_line, LineFit};

/// A fitted background line and the ranges it was fitted over.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineFit {
    pub ranges: Vec<Window>,
    pub intercept: f64,
    pub slope: f64,
    pub intercept_se: f64,
    pub slope_se: f64,
    pub n_points: usize,
}

impl BaselineFit {
    fn from_line(ranges: Vec<Window>, line: LineFit) -> Self {
        Self {
            ranges,
            intercept: line.intercept,
            slope: line.slope,
            intercept_se: line.intercept_se,
            slope_se: line.slope_se,
            n_points: line.n,
        }
    }

    /// `(intercept, slope)` after applying the standard-error modes.
    pub fn params(&self, se: BaselineSe) -> (f64, f64) {
        (
            se.intercept.apply(self.intercept, self.intercept_se),
            se.slope.apply(self.slope, self.slope_se),
        )
    }

    /// The baseline evaluated at every wavelength.
    pub fn curve(&self, wavelengths: &[f64], se: BaselineSe) -> Vec<f64> {
        let (intercept, slope) = self.params(se);
        wavelengths.iter().map(|&w| intercept + slope * w).collect()
    }
}

/// Fit `raw = slope·λ + intercept` over the union of `ranges`.
///
/// Bounds are inclusive. Samples covered by more than one range are used once.
pub fn fit_baseline(spectrum: &Spectrum, ranges: &[Window]) -> Result<BaselineFit, QyError> {
    if ranges.is_empty() {
        return Err(QyError::config(format!(
            "No baseline ranges given for '{}'.",
            spectrum.source
        )));
    }

    let mut selected: Vec<usize> = ranges
        .iter()
        .flat_map(|r| spectrum.indices_in(r))
        .collect();
    selected.sort_unstable();
    selected.dedup();

    if selected.len() < 2 {
        return Err(QyError::fit(format!(
            "Baseline for '{}' needs at least 2 samples in the background ranges, found {}.",
            spectrum.source,
            selected.len()
        )));
    }

    let x: Vec<f64> = selected.iter().map(|&i| spectrum.wavelengths()[i]).collect();
    let y: Vec<f64> = selected.iter().map(|&i| spectrum.raw()[i]).collect();
    let line = fit_line(&x, &y)?;

    debug!(
        "baseline '{}': {} points, intercept {:.6e} ± {:.3e}, slope {:.6e} ± {:.3e}",
        spectrum.source, line.n, line.intercept, line.intercept_se, line.slope, line.slope_se
    );

    Ok(BaselineFit::from_line(ranges.to_vec(), line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SeMode;

    fn linear_spectrum(intercept: f64, slope: f64) -> Spectrum {
        let wl: Vec<f64> = (0..201).map(|i| 300.0 + i as f64).collect();
        let raw = wl.iter().map(|w| intercept + slope * w).collect();
        Spectrum::new("lin", vec![320.0], vec![300.0, 500.0], wl, raw, vec![1.0; 201]).unwrap()
    }

    #[test]
    fn recovers_noise_free_line() {
        let s = linear_spectrum(150.0, -0.25);
        let ranges = [Window::new(300.0, 305.0).unwrap(), Window::new(450.0, 500.0).unwrap()];
        let fit = fit_baseline(&s, &ranges).unwrap();
        assert!((fit.intercept - 150.0).abs() < 1e-8);
        assert!((fit.slope + 0.25).abs() < 1e-10);
        assert_eq!(fit.n_points, 6 + 51);

        let curve = fit.curve(s.wavelengths(), BaselineSe::default());
        for (c, r) in curve.iter().zip(s.raw()) {
            assert!((c - r).abs() < 1e-8);
        }
    }

    #[test]
    fn se_modes_shift_parameters() {
        let wl: Vec<f64> = (0..10).map(|i| 300.0 + i as f64).collect();
        let raw: Vec<f64> = (0..10).map(|i| if i % 2 == 0 { 1.0 } else { 2.0 }).collect();
        let s = Spectrum::new("zig", vec![320.0], vec![300.0, 309.0], wl, raw, vec![1.0; 10]).unwrap();
        let fit = fit_baseline(&s, &[Window::new(300.0, 309.0).unwrap()]).unwrap();
        assert!(fit.intercept_se > 0.0 && fit.slope_se > 0.0);

        let (a, b) = fit.params(BaselineSe::new(SeMode::Plus, SeMode::Minus));
        assert!((a - (fit.intercept + fit.intercept_se)).abs() < 1e-12);
        assert!((b - (fit.slope - fit.slope_se)).abs() < 1e-12);
    }

    #[test]
    fn too_few_background_samples_is_fit_error() {
        let s = linear_spectrum(1.0, 0.0);
        let err = fit_baseline(&s, &[Window::new(300.2, 300.8).unwrap()]).unwrap_err();
        assert!(err.is_fit());
        assert!(matches!(fit_baseline(&s, &[]), Err(QyError::Configuration(_))));
    }

    #[test]
    fn overlapping_ranges_count_samples_once() {
        let s = linear_spectrum(10.0, 0.5);
        let ranges = [Window::new(300.0, 310.0).unwrap(), Window::new(305.0, 315.0).unwrap()];
        assert_eq!(fit_baseline(&s, &ranges).unwrap().n_points, 16);
    }
}
