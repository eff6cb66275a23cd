//! Instrument-response correction.

pub mod lut;
pub mod pipeline;
pub mod response;

pub use lut::*;
pub use pipeline::*;
pub use response::*;
