//! Numerical building blocks shared by the transforms and the cosmology.

pub mod legendre;
pub mod quadrature;

pub use legendre::LegendreTable;
pub use quadrature::{interp, simpson, trapezoid, InterpError};
