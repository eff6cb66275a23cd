//! Monochromator offset estimation from second-order diffraction.
//!
//! In an emission scan the excitation line is scattered into the emission
//! monochromator twice: once at its true wavelength and once, from the
//! grating's second order, at twice that wavelength. Fitting both peaks gives
//!
//! ```text
//! ex_offset = μ₂ / 2 - λ_ex(nominal)
//! em_offset = μ₂ / 2 - μ₁
//! ```
//!
//! where μ₁ is the first-order peak centre and μ₂ the second-order one.

use log::debug;

use crate::domain::Spectrum;
use crate::error::QyError;
use crate::math::{fit_gaussian, GaussianFit};

/// Half-width (nm) of the window each Gaussian is fitted over.
pub const PEAK_FIT_HALF_WIDTH: f64 = 10.0;
/// Half-width (nm) of the search window around twice the primary peak.
pub const SECOND_ORDER_SEARCH_HALF_WIDTH: f64 = 15.0;

#[derive(Debug, Clone, PartialEq)]
pub enum OffsetEstimate {
    Estimated {
        ex: f64,
        em: f64,
        primary: GaussianFit,
        second_order: GaussianFit,
    },
    /// The second-order peak falls outside the emission scan.
    NotApplicable,
    /// A Gaussian fit did not converge; the message says which.
    Failed(String),
}

/// Second-order estimation needs `2·λ_ex` inside the scanned emission range.
pub fn is_applicable(spectrum: &Spectrum) -> bool {
    match (spectrum.excitation_nominal(), spectrum.emission_upper()) {
        (Ok(ex), Ok(em_upper)) => 2.0 * ex < em_upper,
        _ => false,
    }
}

/// Estimate excitation and emission offsets from `spectrum`'s raw intensities.
///
/// Never returns an error for fit problems: those become
/// [`OffsetEstimate::Failed`] so the pipeline can fall back.
pub fn estimate_offsets(spectrum: &Spectrum) -> OffsetEstimate {
    if !is_applicable(spectrum) {
        return OffsetEstimate::NotApplicable;
    }
    match try_estimate(spectrum) {
        Ok(estimate) => estimate,
        Err(err) => OffsetEstimate::Failed(err.to_string()),
    }
}

fn try_estimate(spectrum: &Spectrum) -> Result<OffsetEstimate, QyError> {
    let ex_nominal = spectrum.excitation_nominal()?;
    let wl = spectrum.wavelengths();
    let raw = spectrum.raw();

    let peak = argmax_in(raw, 0..raw.len())
        .ok_or_else(|| QyError::fit("spectrum has no finite maximum"))?;
    let primary = fit_around(wl, raw, wl[peak])?;

    let target = 2.0 * wl[peak];
    let search = index_range(wl, target - SECOND_ORDER_SEARCH_HALF_WIDTH, target + SECOND_ORDER_SEARCH_HALF_WIDTH);
    let second_peak = argmax_in(raw, search)
        .ok_or_else(|| QyError::fit(format!("no samples near the second-order position {target:.1} nm")))?;
    let second_order = fit_around(wl, raw, wl[second_peak])?;

    let half = second_order.center / 2.0;
    let ex = half - ex_nominal;
    let em = half - primary.center;
    debug!(
        "offsets '{}': μ₁ = {:.3}, μ₂ = {:.3}, ex {ex:+.3} nm, em {em:+.3} nm",
        spectrum.source, primary.center, second_order.center
    );

    Ok(OffsetEstimate::Estimated {
        ex,
        em,
        primary,
        second_order,
    })
}

fn fit_around(wl: &[f64], y: &[f64], center: f64) -> Result<GaussianFit, QyError> {
    let r = index_range(wl, center - PEAK_FIT_HALF_WIDTH, center + PEAK_FIT_HALF_WIDTH);
    fit_gaussian(&wl[r.clone()], &y[r])
}

/// Index range of wavelengths in `[lo, hi]`; `wl` is sorted.
fn index_range(wl: &[f64], lo: f64, hi: f64) -> std::ops::Range<usize> {
    let start = wl.partition_point(|&w| w < lo);
    let end = wl.partition_point(|&w| w <= hi);
    start..end.max(start)
}

fn argmax_in(y: &[f64], r: std::ops::Range<usize>) -> Option<usize> {
    r.filter(|&i| y[i].is_finite())
        .max_by(|&a, &b| y[a].total_cmp(&y[b]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauss(x: f64, mu: f64, sigma: f64) -> f64 {
        (-0.5 * ((x - mu) / sigma).powi(2)).exp()
    }

    fn scatter_scan(ex_nominal: f64, true_ex: f64, em_offset: f64, em_upper: f64) -> Spectrum {
        let wl: Vec<f64> = (0..)
            .map(|i| 280.0 + 0.5 * i as f64)
            .take_while(|&w| w <= em_upper)
            .collect();
        // The emission monochromator reads λ_true - em_offset for light at λ_true.
        let mu1 = true_ex - em_offset;
        let mu2 = 2.0 * true_ex - em_offset;
        let raw: Vec<f64> = wl
            .iter()
            .map(|&w| 20.0 + 5.0e5 * gauss(w, mu1, 1.5) + 4.0e3 * gauss(w, mu2, 1.8))
            .collect();
        let n = wl.len();
        Spectrum::new("scatter", vec![ex_nominal], vec![280.0, em_upper], wl, raw, vec![1.0; n]).unwrap()
    }

    #[test]
    fn recovers_offsets_from_both_orders() {
        let s = scatter_scan(300.0, 302.0, 0.0, 650.0);
        match estimate_offsets(&s) {
            OffsetEstimate::Estimated { ex, em, primary, second_order } => {
                assert!((primary.center - 302.0).abs() < 1e-3);
                assert!((second_order.center - 604.0).abs() < 1e-3);
                assert!((ex - 2.0).abs() < 1e-3, "ex offset {ex}");
                assert!(em.abs() < 1e-3, "em offset {em}");
            }
            other => panic!("unexpected estimate {other:?}"),
        }
    }

    #[test]
    fn not_applicable_when_second_order_is_out_of_range() {
        let s = scatter_scan(340.0, 340.0, 0.0, 650.0);
        assert_eq!(estimate_offsets(&s), OffsetEstimate::NotApplicable);
    }

    #[test]
    fn missing_second_order_peak_is_reported_as_failed() {
        let wl: Vec<f64> = (0..700).map(|i| 280.0 + 0.5 * i as f64).collect();
        let raw: Vec<f64> = wl.iter().map(|&w| 10.0 + 1.0e4 * gauss(w, 300.0, 1.5)).collect();
        let s = Spectrum::new("flat-tail", vec![300.0], vec![280.0, 629.5], wl, raw, vec![1.0; 700]).unwrap();
        assert!(matches!(estimate_offsets(&s), OffsetEstimate::Failed(_)));
    }
}
