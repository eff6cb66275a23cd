//! Terminal reports for runs, sweeps and single-record corrections.

pub mod format;

pub use format::*;
