//! `pti-qy` library crate.
//!
//! Fluorescence quantum yields from PTI spectrofluorometer records: baseline
//! subtraction, instrument-response correction, window integration and
//! tail-ratio pooling.
//!
//! The binary (`qy`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - sweeps and notebooks can reuse the same pipeline

pub mod app;
pub mod cli;
pub mod correct;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod qy;
pub mod report;
