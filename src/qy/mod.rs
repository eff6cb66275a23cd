//! Quantum-yield integration and replicate pooling.

pub mod integrate;
pub mod pooling;

pub use integrate::*;
pub use pooling::*;
