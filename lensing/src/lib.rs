//! Shell-by-shell weak gravitational lensing on the sphere.
//!
//! Matter shells stream in front to back. Each one advances a running Born
//! integral for the convergence, the shear is derived from the convergence in
//! harmonic space, and galaxies carrying that shear are reduced into per-pixel
//! sums. When the stream ends the pixelized field can be compared against
//! theory after shot-noise and mixing corrections.
//!
//! # Modules
//!
//! - [`healpix`]: RING-scheme pixelization and spherical harmonic transforms
//! - [`cosmology`], [`shells`]: background distances and shell windows
//! - [`convergence`]: the running Born accumulator
//! - [`shear`]: convergence to shear, and shear applied to galaxies
//! - [`pixelize`]: order-independent reduction of points onto bins
//! - [`spectrum`]: shot noise, mixing matrices and validation against theory
//! - [`pipeline`]: a driver wiring the above together for one run
//! - [`sims`]: seeded stand-in generators for fields and galaxies
//!
//! ```rust
//! use lensing::cosmology::FlatLambdaCdm;
//! use lensing::healpix::Healpix;
//! use lensing::shells::tophat_windows;
//! use lensing::ConvergenceAccumulator;
//! use ndarray::Array1;
//!
//! let hp = Healpix::new(2)?;
//! let mut acc = ConvergenceAccumulator::new(FlatLambdaCdm::default(), hp);
//! for window in tophat_windows(&[0.0, 0.5, 1.0], 0.01)? {
//!     let delta = Array1::from_elem(hp.npix(), 0.1);
//!     acc.add_window(delta.view(), &window)?;
//! }
//! assert!(acc.kappa()[0] > 0.0);
//! # Ok::<(), lensing::LensingError>(())
//! ```

pub mod algo;
pub mod catalogue;
pub mod convergence;
pub mod cosmology;
pub mod healpix;
pub mod pipeline;
pub mod pixelize;
pub mod shared_args;
pub mod shear;
pub mod shells;
pub mod sims;
pub mod spectrum;

use thiserror::Error;

pub use catalogue::{Catalogue, Galaxy};
pub use convergence::{ConvergenceAccumulator, ConvergenceError, ConvergenceMap};
pub use cosmology::{Cosmology, FlatLambdaCdm};
pub use healpix::{Healpix, HealpixError};
pub use pipeline::{ContrastSource, GalaxySource, PipelineOutput, ShellPipeline};
pub use pixelize::{
    Binning, EmptyBinPolicy, GridBinning, PixelAggregate, PixelizeError, SphereBinning,
};
pub use shear::{ShearError, ShearField, ShearTransform};
pub use shells::{ShellWindow, WindowError};
pub use spectrum::{MixingMatrix, SpectrumError, SpectrumSet, SpectrumValidator};

/// Any error raised while running the lensing pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LensingError {
    #[error("window error: {0}")]
    Window(#[from] WindowError),
    #[error("healpix error: {0}")]
    Healpix(#[from] HealpixError),
    #[error("convergence error: {0}")]
    Convergence(#[from] ConvergenceError),
    #[error("shear error: {0}")]
    Shear(#[from] ShearError),
    #[error("pixelization error: {0}")]
    Pixelize(#[from] PixelizeError),
    #[error("spectrum error: {0}")]
    Spectrum(#[from] SpectrumError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LensingError>;
