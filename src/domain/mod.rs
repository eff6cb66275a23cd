//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the measured spectrum record (`Spectrum`) and its grid invariants
//! - closed option enums (`SeMode`, `LutSplit`, `Interpolation`)
//! - the per-run configuration value (`CorrectionConfig`) and integration windows

pub mod types;

pub use types::*;
