//! Experiment description files (JSON).
//!
//! An experiment lists the blank and fluorophore records and the windows used
//! to analyse them. Baseline bounds may be absolute wavelengths or offsets
//! from each pair's excitation wavelength, so one file covers a series of
//! excitation settings:
//!
//! ```json
//! {
//!   "blanks": ["blank_ex310.txt", "blank_ex320.txt"],
//!   "fluors": ["ppo_ex310.txt", "ppo_ex320.txt"],
//!   "baseline_ranges": [
//!     { "start": 300, "end": { "ex_offset": -5 } },
//!     { "start": 450, "end": 600 }
//!   ],
//!   "emission_window": { "start": 320, "end": 650 },
//!   "tail_start": 360
//! }
//! ```
//!
//! Relative paths are resolved against the experiment file's directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Window, DEFAULT_EX_HALF_WIDTH, DEFAULT_RATIO_TOLERANCE};
use crate::error::QyError;

/// Environment variable naming the default excitation LUT file.
pub const EXCORR_ENV: &str = "QY_EXCORR";
/// Environment variable naming the default emission LUT file.
pub const EMCORR_ENV: &str = "QY_EMCORR";

/// A window bound: an absolute wavelength, or an offset from the excitation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Absolute(f64),
    Relative { ex_offset: f64 },
}

impl Bound {
    pub fn resolve(self, excitation: f64) -> f64 {
        match self {
            Bound::Absolute(v) => v,
            Bound::Relative { ex_offset } => excitation + ex_offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub start: Bound,
    pub end: Bound,
}

impl RangeSpec {
    pub fn resolve(&self, excitation: f64) -> Result<Window, QyError> {
        Window::new(self.start.resolve(excitation), self.end.resolve(excitation))
    }
}

fn default_ex_half_width() -> f64 {
    DEFAULT_EX_HALF_WIDTH
}

fn default_ratio_tolerance() -> f64 {
    DEFAULT_RATIO_TOLERANCE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Experiment {
    #[serde(default)]
    pub name: Option<String>,
    pub blanks: Vec<PathBuf>,
    pub fluors: Vec<PathBuf>,
    pub baseline_ranges: Vec<RangeSpec>,
    /// Separate background ranges for the blanks; defaults to `baseline_ranges`.
    #[serde(default)]
    pub blank_baseline_ranges: Option<Vec<RangeSpec>>,
    pub emission_window: Window,
    pub tail_start: f64,
    #[serde(default = "default_ex_half_width")]
    pub ex_half_width: f64,
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: f64,
    #[serde(default)]
    pub excorr: Option<PathBuf>,
    #[serde(default)]
    pub emcorr: Option<PathBuf>,
}

impl Experiment {
    /// Load and validate an experiment file; relative paths become absolute.
    pub fn load(path: &Path) -> Result<Self, QyError> {
        let text = fs::read_to_string(path).map_err(|source| QyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut exp: Experiment = serde_json::from_str(&text).map_err(|e| {
            QyError::parse(path, e.line(), format!("invalid experiment file: {e}"))
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        exp.rebase(base);
        exp.validate()?;
        Ok(exp)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.blanks.iter_mut().for_each(join);
        self.fluors.iter_mut().for_each(join);
        self.excorr.iter_mut().for_each(join);
        self.emcorr.iter_mut().for_each(join);
    }

    pub fn validate(&self) -> Result<(), QyError> {
        if self.fluors.is_empty() {
            return Err(QyError::config("Experiment lists no fluorophore files."));
        }
        if self.blanks.is_empty() {
            return Err(QyError::config("Experiment lists no blank files."));
        }
        if self.baseline_ranges.is_empty() || self.blank_baseline_ranges.as_ref().is_some_and(Vec::is_empty) {
            return Err(QyError::config("Experiment lists no baseline ranges."));
        }
        self.emission_window.validated()?;
        if !(self.tail_start < self.emission_window.end) {
            return Err(QyError::config(format!(
                "Tail start {} must lie below the emission window end {}.",
                self.tail_start, self.emission_window.end
            )));
        }
        if !(self.ex_half_width > 0.0) {
            return Err(QyError::config(format!(
                "Excitation half-width must be > 0, got {}.",
                self.ex_half_width
            )));
        }
        Ok(())
    }

    /// Baseline windows for a fluorophore record excited at `excitation`.
    pub fn baseline_windows(&self, excitation: f64) -> Result<Vec<Window>, QyError> {
        resolve_ranges(&self.baseline_ranges, excitation)
    }

    /// Baseline windows for a blank record excited at `excitation`.
    pub fn blank_baseline_windows(&self, excitation: f64) -> Result<Vec<Window>, QyError> {
        resolve_ranges(
            self.blank_baseline_ranges.as_deref().unwrap_or(&self.baseline_ranges),
            excitation,
        )
    }
}

pub fn resolve_ranges(ranges: &[RangeSpec], excitation: f64) -> Result<Vec<Window>, QyError> {
    ranges.iter().map(|r| r.resolve(excitation)).collect()
}

/// Pick a LUT path: explicit flag first, then the experiment file, then the environment.
pub fn resolve_lut_path(
    flag: Option<&Path>,
    experiment: Option<&Path>,
    env_var: &str,
) -> Result<PathBuf, QyError> {
    if let Some(p) = flag.or(experiment) {
        return Ok(p.to_path_buf());
    }
    match env::var(env_var) {
        Ok(v) if !v.trim().is_empty() => Ok(PathBuf::from(v)),
        _ => Err(QyError::config(format!(
            "No correction table given: pass it on the command line, in the experiment file, or set {env_var}."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "blanks": ["blank.txt"],
        "fluors": ["a.txt", "b.txt"],
        "baseline_ranges": [
            { "start": 300, "end": { "ex_offset": -5 } },
            { "start": 450, "end": 600 }
        ],
        "emission_window": { "start": 320, "end": 650 },
        "tail_start": 360,
        "excorr": "/luts/excorr.txt"
    }"#;

    #[test]
    fn parses_relative_and_absolute_bounds() {
        let exp: Experiment = serde_json::from_str(SAMPLE).unwrap();
        exp.validate().unwrap();
        assert_eq!(exp.ex_half_width, DEFAULT_EX_HALF_WIDTH);
        assert_eq!(exp.ratio_tolerance, DEFAULT_RATIO_TOLERANCE);

        let windows = exp.baseline_windows(320.0).unwrap();
        assert_eq!(windows[0], Window { start: 300.0, end: 315.0 });
        assert_eq!(windows[1], Window { start: 450.0, end: 600.0 });
        // Exciting at 305 nm the relative window collapses to [300, 300].
        assert!(exp.baseline_windows(305.0).is_err());
        assert_eq!(exp.blank_baseline_windows(320.0).unwrap(), windows);
    }

    #[test]
    fn blank_ranges_override() {
        let text = SAMPLE.replace(
            "\"emission_window\"",
            "\"blank_baseline_ranges\": [{ \"start\": 300, \"end\": 305 }], \"emission_window\"",
        );
        let exp: Experiment = serde_json::from_str(&text).unwrap();
        assert_eq!(exp.blank_baseline_windows(320.0).unwrap(), vec![Window { start: 300.0, end: 305.0 }]);
        assert_eq!(exp.baseline_windows(320.0).unwrap().len(), 2);
    }

    #[test]
    fn rebase_keeps_absolute_paths() {
        let mut exp: Experiment = serde_json::from_str(SAMPLE).unwrap();
        exp.rebase(Path::new("/data/run1"));
        assert_eq!(exp.blanks[0], PathBuf::from("/data/run1/blank.txt"));
        assert_eq!(exp.excorr, Some(PathBuf::from("/luts/excorr.txt")));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_tail() {
        let unknown = SAMPLE.replace("\"tail_start\"", "\"tail\": 1, \"tail_start\"");
        assert!(serde_json::from_str::<Experiment>(&unknown).is_err());

        let mut exp: Experiment = serde_json::from_str(SAMPLE).unwrap();
        exp.tail_start = 700.0;
        assert!(matches!(exp.validate(), Err(QyError::Configuration(_))));
    }

    #[test]
    fn flag_wins_over_experiment_path() {
        let p = resolve_lut_path(Some(Path::new("flag.txt")), Some(Path::new("exp.txt")), EXCORR_ENV).unwrap();
        assert_eq!(p, PathBuf::from("flag.txt"));
        let p = resolve_lut_path(None, Some(Path::new("exp.txt")), EXCORR_ENV).unwrap();
        assert_eq!(p, PathBuf::from("exp.txt"));
    }
}
