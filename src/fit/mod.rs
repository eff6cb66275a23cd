//! Fits that feed the correction pipeline.
//!
//! - linear background under a spectrum
//! - monochromator offsets from first/second-order scatter peaks

pub mod baseline;
pub mod offset;

pub use baseline::*;
pub use offset::*;
