//! Instrument correction tables (LUTs).
//!
//! A table is a tabulated response curve on a fixed wavelength step. Tables
//! are loaded once and shared read-only; every configuration variant builds
//! its own [`Interpolant`] from the (possibly split) table.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{check_fixed_step, Interpolation, LutSplit, Window};
use crate::error::QyError;
use crate::math::Interpolant;

/// One tabulated correction curve.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionTable {
    pub name: String,
    wavelengths: Vec<f64>,
    values: Vec<f64>,
    step: f64,
}

impl CorrectionTable {
    pub fn new(name: impl Into<String>, wavelengths: Vec<f64>, values: Vec<f64>) -> Result<Self, QyError> {
        let name = name.into();
        if wavelengths.len() != values.len() {
            return Err(QyError::alignment(format!(
                "Correction table '{name}' has {} wavelengths and {} values.",
                wavelengths.len(),
                values.len()
            )));
        }
        let step = check_fixed_step(&wavelengths)
            .map_err(|msg| QyError::config(format!("Correction table '{name}': {msg}")))?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(QyError::config(format!(
                "Correction table '{name}' contains non-finite values."
            )));
        }
        Ok(Self {
            name,
            wavelengths,
            values,
            step,
        })
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn domain(&self) -> Window {
        Window {
            start: self.wavelengths[0],
            end: self.wavelengths[self.wavelengths.len() - 1],
        }
    }

    /// Keep every other point. The result has twice the step and possibly
    /// different domain edges.
    pub fn split(&self, split: LutSplit) -> Result<CorrectionTable, QyError> {
        let offset = match split {
            LutSplit::None => return Ok(self.clone()),
            LutSplit::Even => 0,
            LutSplit::Odd => 1,
        };
        let pick = |v: &[f64]| -> Vec<f64> { v.iter().skip(offset).step_by(2).copied().collect() };
        let wavelengths = pick(&self.wavelengths);
        if wavelengths.len() < 2 {
            return Err(QyError::config(format!(
                "Splitting '{}' ({}) leaves {} point(s); at least 2 are needed.",
                self.name,
                split.as_str(),
                wavelengths.len()
            )));
        }
        CorrectionTable::new(
            format!("{}[{}]", self.name, split.as_str()),
            wavelengths,
            pick(&self.values),
        )
    }

    /// Interpolant over the split table.
    pub fn interpolant(&self, method: Interpolation, split: LutSplit) -> Result<Interpolant, QyError> {
        let table = self.split(split)?;
        Interpolant::new(method, table.wavelengths, table.values)
    }
}

/// The excitation and emission tables used by every correction.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionTables {
    pub excitation: CorrectionTable,
    pub emission: CorrectionTable,
}

impl CorrectionTables {
    pub fn new(excitation: CorrectionTable, emission: CorrectionTable) -> Self {
        Self {
            excitation,
            emission,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
