//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - passed by value into every pipeline invocation (no global state)
//! - varied field-by-field by the sweep driver
//! - written next to results in CSV/JSON exports

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::QyError;

/// Relative tolerance used when checking that a wavelength grid has a fixed step.
const STEP_REL_TOL: f64 = 1e-3;

/// Inclusive wavelength window `[start, end]` in nm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn new(start: f64, end: f64) -> Result<Self, QyError> {
        if !(start.is_finite() && end.is_finite()) {
            return Err(QyError::config(format!(
                "Window bounds must be finite, got [{start}, {end}]."
            )));
        }
        if start >= end {
            return Err(QyError::config(format!(
                "Window start must be below its end, got [{start}, {end}]."
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength >= self.start && wavelength <= self.end
    }

    /// Re-run the constructor checks (for windows built by deserialization).
    pub fn validated(self) -> Result<Self, QyError> {
        Window::new(self.start, self.end)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

impl FromStr for Window {
    type Err = QyError;

    /// Parse `START:END` (e.g. `300:305`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(':')
            .ok_or_else(|| QyError::config(format!("Expected START:END, got '{s}'.")))?;
        let start = a
            .trim()
            .parse::<f64>()
            .map_err(|e| QyError::config(format!("Invalid window start '{a}': {e}")))?;
        let end = b
            .trim()
            .parse::<f64>()
            .map_err(|e| QyError::config(format!("Invalid window end '{b}': {e}")))?;
        Window::new(start, end)
    }
}

/// How a fitted baseline parameter is perturbed by its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SeMode {
    /// Use the point estimate.
    #[default]
    None,
    /// Point estimate plus one standard error.
    Plus,
    /// Point estimate minus one standard error.
    Minus,
}

impl SeMode {
    pub const ALL: [SeMode; 3] = [SeMode::None, SeMode::Plus, SeMode::Minus];

    pub fn apply(self, value: f64, se: f64) -> f64 {
        match self {
            SeMode::None => value,
            SeMode::Plus => value + se,
            SeMode::Minus => value - se,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeMode::None => "none",
            SeMode::Plus => "plus",
            SeMode::Minus => "minus",
        }
    }
}

impl FromStr for SeMode {
    type Err = QyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SeMode::None),
            "plus" => Ok(SeMode::Plus),
            "minus" => Ok(SeMode::Minus),
            other => Err(QyError::config(format!(
                "Unknown standard-error mode '{other}' (expected none, plus or minus)."
            ))),
        }
    }
}

/// Table subsampling applied to a LUT before interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LutSplit {
    /// Use every tabulated point.
    #[default]
    None,
    /// Keep points 0, 2, 4, ...
    Even,
    /// Keep points 1, 3, 5, ...
    Odd,
}

impl LutSplit {
    pub const ALL: [LutSplit; 3] = [LutSplit::None, LutSplit::Even, LutSplit::Odd];

    pub fn as_str(self) -> &'static str {
        match self {
            LutSplit::None => "none",
            LutSplit::Even => "even",
            LutSplit::Odd => "odd",
        }
    }
}

impl FromStr for LutSplit {
    type Err = QyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(LutSplit::None),
            "even" => Ok(LutSplit::Even),
            "odd" => Ok(LutSplit::Odd),
            other => Err(QyError::config(format!(
                "Unknown LUT split mode '{other}' (expected none, even or odd)."
            ))),
        }
    }
}

/// Interpolation method used to evaluate a LUT between tabulated points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Linear,
    /// First-order spline; numerically the same curve as `Linear`.
    Slinear,
    /// Interpolating quadratic B-spline, knots at the data midpoints.
    Quadratic,
    /// Interpolating cubic B-spline with not-a-knot ends.
    #[default]
    Cubic,
}

impl Interpolation {
    pub const ALL: [Interpolation; 4] = [
        Interpolation::Linear,
        Interpolation::Slinear,
        Interpolation::Quadratic,
        Interpolation::Cubic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interpolation::Linear => "linear",
            Interpolation::Slinear => "slinear",
            Interpolation::Quadratic => "quadratic",
            Interpolation::Cubic => "cubic",
        }
    }
}

impl FromStr for Interpolation {
    type Err = QyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Interpolation::Linear),
            "slinear" => Ok(Interpolation::Slinear),
            "quadratic" => Ok(Interpolation::Quadratic),
            "cubic" => Ok(Interpolation::Cubic),
            other => Err(QyError::config(format!(
                "Unknown interpolation method '{other}' (expected linear, slinear, quadratic or cubic)."
            ))),
        }
    }
}

/// Which configuration knob a sweep varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SweepAxis {
    /// Intercept/slope standard-error modes (3 × 3).
    BaselineSe,
    /// Point-wise vs constant diode normalisation.
    ConstDiode,
    /// Excitation/emission interpolation pairs (4 × 4).
    Interpolation,
    /// Excitation/emission split pairs (3 × 3).
    Split,
    /// LUT shifting off/on.
    Shift,
    /// Start of the tail window.
    TailStart,
    /// Cartesian product of every axis.
    All,
}

impl SweepAxis {
    pub fn as_str(self) -> &'static str {
        match self {
            SweepAxis::BaselineSe => "baseline-se",
            SweepAxis::ConstDiode => "const-diode",
            SweepAxis::Interpolation => "interpolation",
            SweepAxis::Split => "split",
            SweepAxis::Shift => "shift",
            SweepAxis::TailStart => "tail-start",
            SweepAxis::All => "all",
        }
    }
}

/// Photomultiplier acquisition mode from the record's range line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PmtMode {
    Digital,
    Analogue,
    Unknown,
}

/// Which monochromator was scanned during acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    /// Fixed excitation, scanned emission.
    Emission,
    /// Scanned excitation, fixed emission.
    Excitation,
    /// Both monochromators scanned together.
    Synchronous,
    Unknown,
}

impl RunType {
    /// Resolve the run type from the number of values in each nominal range.
    pub fn from_ranges(ex_range: &[f64], em_range: &[f64]) -> Self {
        match (ex_range.len() > 1, em_range.len() > 1) {
            (true, true) => RunType::Synchronous,
            (true, false) => RunType::Excitation,
            (false, true) => RunType::Emission,
            (false, false) => RunType::Unknown,
        }
    }
}

/// A measured spectrum as loaded from disk.
///
/// Immutable once constructed: pipeline stages borrow it and keep their
/// derived arrays (baseline, factors, corrected data) alongside.
#[derive(Debug, Clone, Serialize)]
pub struct Spectrum {
    pub source: String,
    pub acquired: Option<NaiveDateTime>,
    pub pmt_mode: PmtMode,
    pub run_type: RunType,
    /// Nominal excitation range: one value for an emission scan, two for a scan.
    pub ex_range: Vec<f64>,
    /// Nominal emission range: one value for an excitation scan, two for a scan.
    pub em_range: Vec<f64>,
    wavelengths: Vec<f64>,
    raw: Vec<f64>,
    diode: Vec<f64>,
    step: f64,
}

impl Spectrum {
    /// Build a spectrum, checking the co-indexing and fixed-step invariants.
    pub fn new(
        source: impl Into<String>,
        ex_range: Vec<f64>,
        em_range: Vec<f64>,
        wavelengths: Vec<f64>,
        raw: Vec<f64>,
        diode: Vec<f64>,
    ) -> Result<Self, QyError> {
        let source = source.into();
        if wavelengths.len() < 2 {
            return Err(QyError::config(format!(
                "Spectrum '{source}' needs at least 2 samples, got {}.",
                wavelengths.len()
            )));
        }
        if raw.len() != wavelengths.len() || diode.len() != wavelengths.len() {
            return Err(QyError::alignment(format!(
                "Spectrum '{source}': {} wavelengths, {} raw values, {} diode values.",
                wavelengths.len(),
                raw.len(),
                diode.len()
            )));
        }
        let step = check_fixed_step(&wavelengths)
            .map_err(|msg| QyError::config(format!("Spectrum '{source}': {msg}")))?;
        let run_type = RunType::from_ranges(&ex_range, &em_range);

        Ok(Self {
            source,
            acquired: None,
            pmt_mode: PmtMode::Unknown,
            run_type,
            ex_range,
            em_range,
            wavelengths,
            raw,
            diode,
            step,
        })
    }

    pub fn with_acquired(mut self, acquired: Option<NaiveDateTime>) -> Self {
        self.acquired = acquired;
        self
    }

    pub fn with_pmt_mode(mut self, mode: PmtMode) -> Self {
        self.pmt_mode = mode;
        self
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn raw(&self) -> &[f64] {
        &self.raw
    }

    pub fn diode(&self) -> &[f64] {
        &self.diode
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    pub fn domain(&self) -> Window {
        Window {
            start: self.wavelengths[0],
            end: self.wavelengths[self.wavelengths.len() - 1],
        }
    }

    /// Nominal excitation wavelength (first value of the excitation range).
    pub fn excitation_nominal(&self) -> Result<f64, QyError> {
        self.ex_range.first().copied().ok_or_else(|| {
            QyError::config(format!("Spectrum '{}' has no excitation wavelength.", self.source))
        })
    }

    /// Upper bound of the nominal emission range.
    pub fn emission_upper(&self) -> Result<f64, QyError> {
        self.em_range.last().copied().ok_or_else(|| {
            QyError::config(format!("Spectrum '{}' has no emission range.", self.source))
        })
    }

    /// Indices of samples whose wavelength falls inside `window` (inclusive).
    pub fn indices_in(&self, window: &Window) -> Vec<usize> {
        self.wavelengths
            .iter()
            .enumerate()
            .filter_map(|(i, &w)| window.contains(w).then_some(i))
            .collect()
    }

    /// Fail unless `other` is sampled on the same wavelength grid.
    pub fn ensure_same_grid(&self, other: &Spectrum) -> Result<(), QyError> {
        ensure_same_grid(
            (&self.source, &self.wavelengths, self.step),
            (&other.source, &other.wavelengths, other.step),
        )
    }

    /// Point-wise average of two replicate scans on the same grid.
    pub fn average(&self, other: &Spectrum) -> Result<Spectrum, QyError> {
        self.ensure_same_grid(other)?;
        let mean = |a: &[f64], b: &[f64]| -> Vec<f64> {
            a.iter().zip(b).map(|(x, y)| (x + y) / 2.0).collect()
        };
        let mut merged = Spectrum::new(
            format!("merged({}, {})", self.source, other.source),
            self.ex_range.clone(),
            self.em_range.clone(),
            mean(&self.wavelengths, &other.wavelengths),
            mean(&self.raw, &other.raw),
            mean(&self.diode, &other.diode),
        )?;
        merged.acquired = self.acquired;
        merged.pmt_mode = self.pmt_mode;
        Ok(merged)
    }
}

/// Check that `wavelengths` is strictly increasing with a fixed step; return the step.
pub fn check_fixed_step(wavelengths: &[f64]) -> Result<f64, String> {
    if wavelengths.len() < 2 {
        return Err("a grid needs at least 2 points".to_string());
    }
    let step = wavelengths[1] - wavelengths[0];
    if !(step.is_finite() && step > 0.0) {
        return Err(format!("wavelengths must be strictly increasing (first step {step})"));
    }
    for (i, pair) in wavelengths.windows(2).enumerate() {
        let d = pair[1] - pair[0];
        if !(d > 0.0) {
            return Err(format!("wavelengths not strictly increasing at index {}", i + 1));
        }
        if ((d - step) / step).abs() > STEP_REL_TOL {
            return Err(format!(
                "step changes from {step} to {d} at index {}",
                i + 1
            ));
        }
    }
    Ok(step)
}

/// Compare two `(label, wavelengths, step)` grids.
pub fn ensure_same_grid(a: (&str, &[f64], f64), b: (&str, &[f64], f64)) -> Result<(), QyError> {
    let (name_a, wl_a, step_a) = a;
    let (name_b, wl_b, step_b) = b;
    if wl_a.len() != wl_b.len() {
        return Err(QyError::alignment(format!(
            "'{name_a}' has {} samples but '{name_b}' has {}.",
            wl_a.len(),
            wl_b.len()
        )));
    }
    if ((step_a - step_b) / step_a).abs() > STEP_REL_TOL {
        return Err(QyError::alignment(format!(
            "'{name_a}' step {step_a} nm differs from '{name_b}' step {step_b} nm."
        )));
    }
    let tol = step_a * STEP_REL_TOL;
    if let Some(i) = wl_a.iter().zip(wl_b).position(|(x, y)| (x - y).abs() > tol) {
        return Err(QyError::alignment(format!(
            "'{name_a}' and '{name_b}' disagree at sample {i}: {} vs {} nm.",
            wl_a[i], wl_b[i]
        )));
    }
    Ok(())
}

/// Standard-error use for the two baseline parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BaselineSe {
    pub intercept: SeMode,
    pub slope: SeMode,
}

impl BaselineSe {
    pub fn new(intercept: SeMode, slope: SeMode) -> Self {
        Self { intercept, slope }
    }
}

/// Default excitation monochromator shift (nm) when shifting without estimation.
pub const DEFAULT_EX_SHIFT: f64 = 2.5;
/// Default emission monochromator shift (nm) when shifting without estimation.
pub const DEFAULT_EM_SHIFT: f64 = 2.0;

/// LUT wavelength shifting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShiftConfig {
    /// Shift LUT lookups at all.
    pub enabled: bool,
    /// Estimate per-spectrum offsets from the second-order peak when applicable.
    pub estimate: bool,
    /// Excitation shift used when estimation is disabled or not applicable.
    pub default_ex: f64,
    /// Emission shift used when estimation is disabled or not applicable.
    pub default_em: f64,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            estimate: false,
            default_ex: DEFAULT_EX_SHIFT,
            default_em: DEFAULT_EM_SHIFT,
        }
    }
}

/// Every knob of a single correction run.
///
/// This is derived from CLI flags or an experiment file; sweeps generate
/// variants by changing fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    pub ex_interpolation: Interpolation,
    pub em_interpolation: Interpolation,
    pub ex_split: LutSplit,
    pub em_split: LutSplit,
    pub shift: ShiftConfig,
    /// Divide by the mean diode signal instead of point-wise.
    pub const_diode: bool,
    pub baseline_se: BaselineSe,
    pub apply_diode: bool,
    pub apply_excitation: bool,
    pub apply_emission: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            ex_interpolation: Interpolation::Cubic,
            em_interpolation: Interpolation::Cubic,
            ex_split: LutSplit::None,
            em_split: LutSplit::None,
            shift: ShiftConfig::default(),
            const_diode: false,
            baseline_se: BaselineSe::default(),
            apply_diode: true,
            apply_excitation: true,
            apply_emission: true,
        }
    }
}

/// Where the LUT offsets for a spectrum came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetSource {
    /// Shifting disabled.
    Disabled,
    /// Caller-supplied default shifts.
    Default,
    /// Fitted from the second-order excitation peak.
    Estimated,
    /// Estimation attempted but a fit failed; offsets are zero.
    FitFailed,
}

/// Wavelength offsets added before each LUT lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonochromatorOffsets {
    pub ex: f64,
    pub em: f64,
    pub source: OffsetSource,
}

impl MonochromatorOffsets {
    pub fn none() -> Self {
        Self {
            ex: 0.0,
            em: 0.0,
            source: OffsetSource::Disabled,
        }
    }
}

/// Default half-width (nm) of the excitation window around the nominal excitation.
pub const DEFAULT_EX_HALF_WIDTH: f64 = 10.0;
/// Default acceptance band for pooling tail ratios.
pub const DEFAULT_RATIO_TOLERANCE: f64 = 0.1;

/// The three integration windows for one blank/fluorophore pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrationWindows {
    pub excitation: Window,
    pub emission: Window,
    pub tail: Window,
}

impl IntegrationWindows {
    /// Build windows around an excitation wavelength.
    ///
    /// The tail window runs from `tail_start` to the end of the emission window.
    pub fn around(
        excitation: f64,
        half_width: f64,
        emission: Window,
        tail_start: f64,
    ) -> Result<Self, QyError> {
        if !(half_width.is_finite() && half_width > 0.0) {
            return Err(QyError::config(format!(
                "Excitation half-width must be > 0, got {half_width}."
            )));
        }
        Ok(Self {
            excitation: Window::new(excitation - half_width, excitation + half_width)?,
            emission: emission.validated()?,
            tail: Window::new(tail_start, emission.end)?,
        })
    }
}
