//! Stand-in field and galaxy generators for demos and tests.
//!
//! These implement the pipeline's collaborator traits with simple seeded
//! random models; real matter fields and galaxy populations plug in through
//! the same traits.

pub mod gaussian;
pub mod uniform;

pub use gaussian::{gaussian_alm, power_law_cl, GaussianContrast};
pub use uniform::{full_sky_arcmin2, UniformGalaxies};
