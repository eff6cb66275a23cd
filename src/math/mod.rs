//! Numerical kernels: least squares, peak fitting, interpolation, quadrature.

pub mod gauss;
pub mod interp;
pub mod ols;
pub mod simpson;

pub use gauss::*;
pub use interp::*;
pub use ols::*;
pub use simpson::*;
