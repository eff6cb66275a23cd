//! Integration of corrected blank/fluorophore differences.
//!
//! ```text
//! absorbed  = ∫_ex  (blank - fluor)
//! emitted   = ∫_em  (fluor - blank)
//! QY        = emitted / absorbed
//! tail      = ∫_tail (fluor - blank) / emitted
//! ```

use log::debug;
use serde::Serialize;

use crate::correct::CorrectedSpectrum;
use crate::domain::{IntegrationWindows, Window};
use crate::error::QyError;
use crate::math::simpson;

/// Integrated photon counts and the resulting quantum yield for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QyMeasurement {
    pub absorbed: f64,
    pub emitted: f64,
    pub tail_area: f64,
    pub qy: f64,
    /// Fraction of the emission that lies in the tail window.
    pub tail_ratio: f64,
}

/// Simpson integral of `a.corrected - b.corrected` over the samples in `range`.
pub fn integrate_between(
    a: &CorrectedSpectrum<'_>,
    b: &CorrectedSpectrum<'_>,
    range: &Window,
) -> Result<f64, QyError> {
    a.spectrum().ensure_same_grid(b.spectrum())?;

    let indices = a.spectrum().indices_in(range);
    if indices.len() < 2 {
        return Err(QyError::config(format!(
            "Integration window {range} covers {} sample(s) of '{}'; at least 2 are needed.",
            indices.len(),
            a.spectrum().source
        )));
    }

    let (ca, cb) = (a.corrected(), b.corrected());
    let diff: Vec<f64> = indices.iter().map(|&i| ca[i] - cb[i]).collect();
    Ok(simpson(&diff, a.step()))
}

/// Quantum yield and tail ratio of `fluor` against `blank`.
pub fn quantum_yield(
    blank: &CorrectedSpectrum<'_>,
    fluor: &CorrectedSpectrum<'_>,
    windows: &IntegrationWindows,
) -> Result<QyMeasurement, QyError> {
    let absorbed = integrate_between(blank, fluor, &windows.excitation)?;
    let emitted = integrate_between(fluor, blank, &windows.emission)?;
    let tail_area = integrate_between(fluor, blank, &windows.tail)?;

    if absorbed == 0.0 {
        return Err(QyError::div_zero(format!(
            "No absorbed photons between '{}' and '{}' in {}.",
            blank.spectrum().source,
            fluor.spectrum().source,
            windows.excitation
        )));
    }
    if emitted == 0.0 {
        return Err(QyError::div_zero(format!(
            "No emitted photons between '{}' and '{}' in {}.",
            fluor.spectrum().source,
            blank.spectrum().source,
            windows.emission
        )));
    }

    let measurement = QyMeasurement {
        absorbed,
        emitted,
        tail_area,
        qy: emitted / absorbed,
        tail_ratio: tail_area / emitted,
    };
    debug!(
        "'{}' vs '{}': absorbed {:.6e}, emitted {:.6e}, QY {:.5}, tail ratio {:.5}",
        fluor.spectrum().source,
        blank.spectrum().source,
        absorbed,
        emitted,
        measurement.qy,
        measurement.tail_ratio
    );
    Ok(measurement)
}
