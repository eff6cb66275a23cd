//! Input/output helpers.
//!
//! - PTI text-record ingest (`ingest`)
//! - experiment description files (`experiment`)
//! - result exports (CSV/JSON) (`export`)

pub mod experiment;
pub mod export;
pub mod ingest;

pub use experiment::*;
pub use export::*;
pub use ingest::*;
