//! Data generation.
//!
//! - seeded synthetic PTI records for smoke-testing the pipeline (`synth`)

pub mod synth;

pub use synth::*;
