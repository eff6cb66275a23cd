//! Synthetic PTI data for smoke tests.
//!
//! Generates a blank/fluorophore emission-scan pair, the two LUT group files
//! and an experiment file that ties them together. The photon spectra are
//! built in corrected space and pushed back through the instrument model:
//!
//! ```text
//! raw(λ) = photons(λ) · diode(λ) · ex(λ_ex) / em(λ) + b₀ + b₁·λ
//! ```
//!
//! so that a correct pipeline recovers `photons(λ)` and therefore the
//! configured quantum yield.

use std::f64::consts::PI;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::info;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde_json::json;

use crate::error::QyError;

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub seed: u64,
    pub excitation: f64,
    pub scan_start: f64,
    pub scan_end: f64,
    pub step: f64,
    pub quantum_yield: f64,
    /// Fraction of the scattered excitation light the fluorophore absorbs.
    pub absorbed_fraction: f64,
    pub scatter_peak: f64,
    pub scatter_sigma: f64,
    pub emission_center: f64,
    pub emission_sigma: f64,
    /// Shot-noise scale: each raw count gets `noise · √count` Gaussian noise.
    pub noise: f64,
    pub acquired: NaiveDateTime,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            excitation: 320.0,
            scan_start: 300.0,
            scan_end: 700.0,
            step: 1.0,
            quantum_yield: 0.6,
            absorbed_fraction: 0.4,
            scatter_peak: 2.0e6,
            scatter_sigma: 1.5,
            emission_center: 400.0,
            emission_sigma: 15.0,
            noise: 0.0,
            acquired: NaiveDateTime::default(),
        }
    }
}

impl SynthConfig {
    fn validate(&self) -> Result<(), QyError> {
        if !(self.step > 0.0 && self.scan_end > self.scan_start + self.step) {
            return Err(QyError::config("Synthetic scan needs start < end and a positive step."));
        }
        if !(0.0..=1.0).contains(&self.absorbed_fraction) {
            return Err(QyError::config(format!(
                "Absorbed fraction must be within [0, 1], got {}.",
                self.absorbed_fraction
            )));
        }
        if !(self.scatter_sigma > 0.0 && self.emission_sigma > 0.0) {
            return Err(QyError::config("Peak widths must be > 0."));
        }
        if !(self.noise >= 0.0) {
            return Err(QyError::config(format!("Noise must be >= 0, got {}.", self.noise)));
        }
        Ok(())
    }
}

/// Paths of everything [`write_synthetic_set`] created.
#[derive(Debug, Clone)]
pub struct SynthOutput {
    pub blank: PathBuf,
    pub fluor: PathBuf,
    pub excorr: PathBuf,
    pub emcorr: PathBuf,
    pub experiment: PathBuf,
}

const BASELINE_INTERCEPT: f64 = 400.0;
const BASELINE_SLOPE: f64 = -0.2;

fn gaussian(x: f64, mu: f64, sigma: f64) -> f64 {
    (-0.5 * ((x - mu) / sigma).powi(2)).exp()
}

pub fn excorr_value(wavelength: f64) -> f64 {
    0.8 + 0.4 * (wavelength - 250.0) / 500.0
}

pub fn emcorr_value(wavelength: f64) -> f64 {
    1.2 - 0.5 * (wavelength - 300.0) / 548.0
}

fn diode_value(wavelength: f64, config: &SynthConfig) -> f64 {
    0.95 * (1.0 + 0.1 * (wavelength - config.scan_start) / (config.scan_end - config.scan_start))
}

/// Write the synthetic set into `dir` (created if missing).
pub fn write_synthetic_set(dir: &Path, config: &SynthConfig) -> Result<SynthOutput, QyError> {
    config.validate()?;
    fs::create_dir_all(dir).map_err(|source| QyError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| QyError::config(format!("Noise distribution error: {e}")))?;

    let n = ((config.scan_end - config.scan_start) / config.step).round() as usize + 1;
    let wavelengths: Vec<f64> = (0..n).map(|i| config.scan_start + config.step * i as f64).collect();

    // Emission area equals QY × absorbed scatter area.
    let scatter_area = config.scatter_peak * config.scatter_sigma * (2.0 * PI).sqrt();
    let absorbed = config.absorbed_fraction * scatter_area;
    let emission_peak = config.quantum_yield * absorbed / (config.emission_sigma * (2.0 * PI).sqrt());

    let blank_photons: Vec<f64> = wavelengths
        .iter()
        .map(|&w| config.scatter_peak * gaussian(w, config.excitation, config.scatter_sigma))
        .collect();
    let fluor_photons: Vec<f64> = wavelengths
        .iter()
        .zip(&blank_photons)
        .map(|(&w, &s)| {
            (1.0 - config.absorbed_fraction) * s
                + emission_peak * gaussian(w, config.emission_center, config.emission_sigma)
        })
        .collect();

    let mut to_raw = |photons: &[f64]| -> (Vec<f64>, Vec<f64>) {
        let ex = excorr_value(config.excitation);
        let diode: Vec<f64> = wavelengths.iter().map(|&w| diode_value(w, config)).collect();
        let raw = wavelengths
            .iter()
            .zip(photons)
            .zip(&diode)
            .map(|((&w, &p), &d)| {
                let clean = p * d * ex / emcorr_value(w) + BASELINE_INTERCEPT + BASELINE_SLOPE * w;
                if config.noise > 0.0 {
                    clean + config.noise * clean.abs().sqrt() * normal.sample(&mut rng)
                } else {
                    clean
                }
            })
            .collect();
        (raw, diode)
    };

    let (blank_raw, blank_diode) = to_raw(&blank_photons);
    let (fluor_raw, fluor_diode) = to_raw(&fluor_photons);

    let out = SynthOutput {
        blank: dir.join("blank.txt"),
        fluor: dir.join("fluor.txt"),
        excorr: dir.join("excorr.txt"),
        emcorr: dir.join("emcorr.txt"),
        experiment: dir.join("experiment.json"),
    };

    write_file(&out.blank, &session_text("blank", config, &wavelengths, &blank_raw, &blank_diode))?;
    write_file(&out.fluor, &session_text("fluor", config, &wavelengths, &fluor_raw, &fluor_diode))?;

    let ex_wl: Vec<f64> = (250..=750).map(f64::from).collect();
    let ex_values: Vec<f64> = ex_wl.iter().map(|&w| excorr_value(w)).collect();
    write_file(&out.excorr, &group_text("excorr", &ex_wl, &ex_values))?;

    let em_wl: Vec<f64> = (0..=274).map(|i| 300.0 + 2.0 * f64::from(i)).collect();
    let em_values: Vec<f64> = em_wl.iter().map(|&w| emcorr_value(w)).collect();
    write_file(&out.emcorr, &group_text("emcorr", &em_wl, &em_values))?;

    let experiment = json!({
        "name": "synthetic",
        "blanks": ["blank.txt"],
        "fluors": ["fluor.txt"],
        "baseline_ranges": [
            { "start": config.scan_start, "end": config.scan_start + 5.0 },
            { "start": config.scan_end - 40.0, "end": config.scan_end }
        ],
        "emission_window": {
            "start": config.excitation + 15.0,
            "end": config.scan_end - 50.0
        },
        "tail_start": config.excitation + 40.0,
        "excorr": "excorr.txt",
        "emcorr": "emcorr.txt"
    });
    let text = serde_json::to_string_pretty(&experiment)?;
    write_file(&out.experiment, &text)?;

    info!(
        "wrote synthetic set to '{}' (QY {}, {} samples)",
        dir.display(),
        config.quantum_yield,
        n
    );
    Ok(out)
}

fn write_file(path: &Path, text: &str) -> Result<(), QyError> {
    fs::write(path, text).map_err(|e| QyError::Output(format!("cannot write '{}': {e}", path.display())))
}

fn session_text(name: &str, config: &SynthConfig, wl: &[f64], raw: &[f64], diode: &[f64]) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "<Session>");
    let _ = writeln!(s, "Acquired {}", config.acquired.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(s, "{name}");
    let _ = writeln!(s, "1");
    let _ = writeln!(s, "Emission Scan");
    let _ = writeln!(s, "{} points", wl.len());
    let _ = writeln!(
        s,
        "D1\t{}:{}-{}\tRAW",
        config.excitation,
        wl[0],
        wl[wl.len() - 1]
    );
    let _ = writeln!(s, "Wavelength\tRaw\tUnused\tCorrected");
    for (w, r) in wl.iter().zip(raw) {
        let _ = writeln!(s, "{w}\t{r:.6}\t0\t{r:.6}");
    }
    let _ = writeln!(s);
    let _ = writeln!(s, "ExCorr");
    let _ = writeln!(s, "{}", wl.len());
    for (w, d) in wl.iter().zip(diode) {
        let _ = writeln!(s, "{w}\t{d:.9e}");
    }
    s
}

fn group_text(name: &str, wl: &[f64], values: &[f64]) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "<Group>");
    let _ = writeln!(s, "{name}");
    let _ = writeln!(s, "1");
    let _ = writeln!(s, "{}", wl.len());
    let _ = writeln!(s, "Correction");
    let _ = writeln!(s, "Wavelength\tValue");
    for (w, v) in wl.iter().zip(values) {
        let _ = writeln!(s, "{w}\t{v:.9}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::{read_group, read_session};

    fn config() -> SynthConfig {
        SynthConfig {
            seed: 7,
            acquired: NaiveDateTime::parse_from_str("2016-08-30 14:02:11", "%Y-%m-%d %H:%M:%S").unwrap(),
            ..SynthConfig::default()
        }
    }

    #[test]
    fn written_files_read_back() {
        let dir = std::env::temp_dir().join(format!("pti-qy-synth-{}", std::process::id()));
        let out = write_synthetic_set(&dir, &config()).unwrap();
        let blank = read_session(&out.blank).unwrap();
        assert_eq!(blank.len(), 401);
        assert_eq!(blank.ex_range, vec![320.0]);
        assert!((blank.diode()[0] - 0.95).abs() < 1e-9);
        let ex = read_group(&out.excorr).unwrap();
        assert_eq!(ex.values().len(), 501);
        let em = read_group(&out.emcorr).unwrap();
        assert!((em.step() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn noise_is_reproducible_for_a_seed() {
        let mut c = config();
        c.noise = 0.5;
        let a = std::env::temp_dir().join(format!("pti-qy-synth-a-{}", std::process::id()));
        let b = std::env::temp_dir().join(format!("pti-qy-synth-b-{}", std::process::id()));
        let out_a = write_synthetic_set(&a, &c).unwrap();
        let out_b = write_synthetic_set(&b, &c).unwrap();
        assert_eq!(
            fs::read_to_string(out_a.fluor).unwrap(),
            fs::read_to_string(out_b.fluor).unwrap()
        );
    }

    #[test]
    fn rejects_bad_fraction() {
        let mut c = config();
        c.absorbed_fraction = 1.5;
        assert!(matches!(
            write_synthetic_set(Path::new("/nonexistent"), &c),
            Err(QyError::Configuration(_))
        ));
    }
}
