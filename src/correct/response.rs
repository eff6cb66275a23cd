//! Instrument response factors.
//!
//! For every sample the correction multiplies the baseline-subtracted signal by
//!
//! ```text
//! factor(λ) = em(λ + em_offset) / (diode(λ) · ex(λ_ex + ex_offset))
//! ```
//!
//! for an emission scan. In an excitation scan the roles swap: the excitation
//! table is read per sample and the emission table once at the fixed emission
//! wavelength. A sub-correction that is switched off contributes 1.

use serde::Serialize;

use crate::correct::lut::CorrectionTables;
use crate::domain::{CorrectionConfig, MonochromatorOffsets, RunType, Spectrum};
use crate::error::QyError;

/// The three correction components and their combined per-sample factor.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFactors {
    /// Diode divisor per sample (constant in constant-diode mode).
    pub diode: Vec<f64>,
    /// Excitation LUT divisor per sample.
    pub excitation: Vec<f64>,
    /// Emission LUT multiplier per sample.
    pub emission: Vec<f64>,
    /// `emission / (diode · excitation)`.
    pub total: Vec<f64>,
}

/// Evaluate the response factors for `spectrum` under `config`.
pub fn response_factors(
    spectrum: &Spectrum,
    config: &CorrectionConfig,
    tables: &CorrectionTables,
    offsets: &MonochromatorOffsets,
) -> Result<ResponseFactors, QyError> {
    let n = spectrum.len();
    let diode = diode_divisor(spectrum, config)?;

    let uses_luts = config.apply_excitation || config.apply_emission;
    let run_type = spectrum.run_type;
    if uses_luts && !matches!(run_type, RunType::Emission | RunType::Excitation) {
        return Err(QyError::config(format!(
            "Cannot apply LUT corrections to '{}': {run_type:?} scans are not supported.",
            spectrum.source
        )));
    }

    let excitation = if config.apply_excitation {
        let lut = tables
            .excitation
            .interpolant(config.ex_interpolation, config.ex_split)?;
        match run_type {
            RunType::Excitation => spectrum
                .wavelengths()
                .iter()
                .map(|&w| lut.eval(w + offsets.ex))
                .collect(),
            _ => vec![lut.eval(spectrum.excitation_nominal()? + offsets.ex); n],
        }
    } else {
        vec![1.0; n]
    };

    let emission = if config.apply_emission {
        let lut = tables
            .emission
            .interpolant(config.em_interpolation, config.em_split)?;
        match run_type {
            RunType::Excitation => {
                let fixed = spectrum.em_range.first().copied().ok_or_else(|| {
                    QyError::config(format!("Spectrum '{}' has no emission wavelength.", spectrum.source))
                })?;
                vec![lut.eval(fixed + offsets.em); n]
            }
            _ => spectrum
                .wavelengths()
                .iter()
                .map(|&w| lut.eval(w + offsets.em))
                .collect(),
        }
    } else {
        vec![1.0; n]
    };

    if let Some(i) = excitation.iter().position(|&v| v == 0.0) {
        return Err(QyError::div_zero(format!(
            "Excitation LUT is zero for '{}' at {} nm.",
            spectrum.source,
            spectrum.wavelengths()[i]
        )));
    }

    let total = diode
        .iter()
        .zip(&excitation)
        .zip(&emission)
        .map(|((d, x), m)| m / (d * x))
        .collect();

    Ok(ResponseFactors {
        diode,
        excitation,
        emission,
        total,
    })
}

fn diode_divisor(spectrum: &Spectrum, config: &CorrectionConfig) -> Result<Vec<f64>, QyError> {
    let n = spectrum.len();
    if !config.apply_diode {
        return Ok(vec![1.0; n]);
    }
    let diode = spectrum.diode();
    if config.const_diode {
        let mean = diode.iter().sum::<f64>() / n as f64;
        if mean == 0.0 {
            return Err(QyError::div_zero(format!(
                "Mean diode signal of '{}' is zero.",
                spectrum.source
            )));
        }
        return Ok(vec![mean; n]);
    }
    if let Some(i) = diode.iter().position(|&v| v == 0.0) {
        return Err(QyError::div_zero(format!(
            "Diode signal of '{}' is zero at {} nm.",
            spectrum.source,
            spectrum.wavelengths()[i]
        )));
    }
    Ok(diode.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::lut::CorrectionTable;
    use crate::domain::OffsetSource;

    fn tables() -> CorrectionTables {
        let ex_wl: Vec<f64> = (250..=750).map(f64::from).collect();
        let ex = ex_wl.iter().map(|w| 0.5 + w / 1000.0).collect();
        let em_wl: Vec<f64> = (0..=274).map(|i| 300.0 + 2.0 * i as f64).collect();
        let em = em_wl.iter().map(|w| 2.0 - w / 1000.0).collect();
        CorrectionTables::new(
            CorrectionTable::new("excorr", ex_wl, ex).unwrap(),
            CorrectionTable::new("emcorr", em_wl, em).unwrap(),
        )
    }

    fn emission_scan(diode: Vec<f64>) -> Spectrum {
        let wl: Vec<f64> = (0..diode.len()).map(|i| 330.0 + i as f64).collect();
        let hi = wl[wl.len() - 1];
        Spectrum::new("em", vec![320.0], vec![330.0, hi], wl, vec![1.0; diode.len()], diode).unwrap()
    }

    #[test]
    fn emission_scan_factors() {
        let s = emission_scan(vec![2.0, 4.0, 5.0]);
        let f = response_factors(&s, &CorrectionConfig::default(), &tables(), &MonochromatorOffsets::none()).unwrap();
        // ex(320) = 0.82 everywhere; em(λ) = 2 - λ/1000.
        for (i, w) in [330.0, 331.0, 332.0].iter().enumerate() {
            let expected = (2.0 - w / 1000.0) / ([2.0, 4.0, 5.0][i] * 0.82);
            assert!((f.total[i] - expected).abs() < 1e-9, "sample {i}");
        }
    }

    #[test]
    fn offsets_move_lookups_only() {
        let s = emission_scan(vec![1.0; 3]);
        let offsets = MonochromatorOffsets { ex: 2.5, em: 2.0, source: OffsetSource::Default };
        let f = response_factors(&s, &CorrectionConfig::default(), &tables(), &offsets).unwrap();
        assert!((f.excitation[0] - (0.5 + 322.5 / 1000.0)).abs() < 1e-9);
        assert!((f.emission[1] - (2.0 - 333.0 / 1000.0)).abs() < 1e-9);
    }

    #[test]
    fn constant_diode_and_toggles() {
        let s = emission_scan(vec![1.0, 2.0, 3.0]);
        let config = CorrectionConfig {
            const_diode: true,
            apply_excitation: false,
            apply_emission: false,
            ..CorrectionConfig::default()
        };
        let f = response_factors(&s, &config, &tables(), &MonochromatorOffsets::none()).unwrap();
        assert!(f.total.iter().all(|v| (v - 0.5).abs() < 1e-12));

        let none = CorrectionConfig { apply_diode: false, ..config };
        let f = response_factors(&s, &none, &tables(), &MonochromatorOffsets::none()).unwrap();
        assert!(f.total.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn zero_diode_is_divide_by_zero() {
        let s = emission_scan(vec![1.0, 0.0, 1.0]);
        let r = response_factors(&s, &CorrectionConfig::default(), &tables(), &MonochromatorOffsets::none());
        assert!(matches!(r, Err(QyError::DivideByZero(_))));
    }

    #[test]
    fn excitation_scan_reads_excitation_table_per_sample() {
        let wl: Vec<f64> = (0..3).map(|i| 300.0 + i as f64).collect();
        let s = Spectrum::new("ex", vec![300.0, 302.0], vec![400.0], wl, vec![1.0; 3], vec![1.0; 3]).unwrap();
        let f = response_factors(&s, &CorrectionConfig::default(), &tables(), &MonochromatorOffsets::none()).unwrap();
        assert!((f.excitation[2] - 0.802).abs() < 1e-9);
        assert!(f.emission.iter().all(|v| (v - 1.6).abs() < 1e-9));
    }

    #[test]
    fn synchronous_scan_is_rejected() {
        let wl: Vec<f64> = (0..3).map(|i| 300.0 + i as f64).collect();
        let s = Spectrum::new("sync", vec![300.0, 302.0], vec![310.0, 312.0], wl, vec![1.0; 3], vec![1.0; 3]).unwrap();
        let r = response_factors(&s, &CorrectionConfig::default(), &tables(), &MonochromatorOffsets::none());
        assert!(matches!(r, Err(QyError::Configuration(_))));
    }
}
