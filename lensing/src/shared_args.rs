use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::healpix::Healpix;
use crate::shells::{linear_windows, tophat_windows, ShellWindow};
use crate::{LensingError, Result};

/// Strictly increasing redshift edges of the shells
#[derive(Debug, Clone, PartialEq)]
pub struct ShellEdges(pub Vec<f64>);

/// Parse a comma-separated list of shell edges, e.g. "0,0.5,1.0,1.5"
fn parse_edges(s: &str) -> std::result::Result<ShellEdges, String> {
    let edges = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid shell edge '{}'", part.trim()))
        })
        .collect::<std::result::Result<Vec<f64>, String>>()?;

    if edges.len() < 2 {
        return Err("At least two shell edges are required".to_string());
    }
    if edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err("Shell edges must be strictly increasing".to_string());
    }
    Ok(ShellEdges(edges))
}

/// Shape of the shell windows built from the edges.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowShape {
    /// Top-hat shells between consecutive edges
    Tophat,
    /// Triangular windows peaking at each interior edge
    Linear,
}

/// Run configuration shared by the pipeline binaries
#[derive(Parser, Debug, Clone)]
pub struct PipelineArgs {
    /// HEALPix resolution parameter (power of two)
    #[arg(long, default_value_t = 32)]
    pub nside: usize,

    /// Band limit of the harmonic transforms (defaults to 2 * nside)
    #[arg(long)]
    pub lmax: Option<usize>,

    /// Redshift shell edges (format: "z0,z1,...")
    #[arg(long, default_value = "0,0.25,0.5,0.75,1.0,1.25,1.5", value_parser = parse_edges)]
    pub edges: ShellEdges,

    /// Shell window shape
    #[arg(long, value_enum, default_value_t = WindowShape::Tophat)]
    pub window: WindowShape,

    /// Redshift grid spacing for the window functions
    #[arg(long, default_value_t = 0.01)]
    pub dz: f64,

    /// Matter density parameter
    #[arg(long, default_value_t = 0.3)]
    pub omega_m: f64,

    /// Galaxy density per square arcminute per emitting shell
    #[arg(long, default_value_t = 1e-3)]
    pub density: f64,

    /// Intrinsic ellipticity scatter per component
    #[arg(long, default_value_t = 0.26)]
    pub sigma_e: f64,

    /// Only shells ending beyond this redshift host galaxies
    #[arg(long, default_value_t = 1.25)]
    pub source_zmin: f64,

    /// Amplitude of the matter power spectrum at ell = 2
    #[arg(long, default_value_t = 1e-3)]
    pub cl_amplitude: f64,

    /// Power-law slope of the matter power spectrum
    #[arg(long, default_value_t = -1.0)]
    pub cl_slope: f64,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl PipelineArgs {
    /// Validate the arguments into a fixed run configuration.
    pub fn to_config(&self) -> Result<PipelineConfig> {
        PipelineConfig {
            nside: self.nside,
            lmax: self.lmax.unwrap_or(2 * self.nside),
            edges: self.edges.0.clone(),
            window: self.window,
            dz: self.dz,
            omega_m: self.omega_m,
            density: self.density,
            sigma_e: self.sigma_e,
            source_zmin: self.source_zmin,
            cl_amplitude: self.cl_amplitude,
            cl_slope: self.cl_slope,
            seed: self.seed,
        }
        .validated()
    }
}

/// Validated configuration, fixed for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub nside: usize,
    pub lmax: usize,
    pub edges: Vec<f64>,
    pub window: WindowShape,
    pub dz: f64,
    pub omega_m: f64,
    pub density: f64,
    pub sigma_e: f64,
    pub source_zmin: f64,
    pub cl_amplitude: f64,
    pub cl_slope: f64,
    pub seed: u64,
}

impl PipelineConfig {
    pub fn validated(self) -> Result<Self> {
        Healpix::new(self.nside)?;
        if self.lmax < 2 {
            return Err(LensingError::Config(format!(
                "lmax must be at least 2, got {}",
                self.lmax
            )));
        }
        if !(self.omega_m > 0.0 && self.omega_m <= 1.0) {
            return Err(LensingError::Config(format!(
                "omega_m must lie in (0, 1], got {}",
                self.omega_m
            )));
        }
        if !(self.density >= 0.0) || !self.density.is_finite() {
            return Err(LensingError::Config(format!(
                "galaxy density must be non-negative, got {}",
                self.density
            )));
        }
        if !(0.0..=2.0).contains(&self.sigma_e) {
            return Err(LensingError::Config(format!(
                "ellipticity scatter must lie in [0, 2], got {}",
                self.sigma_e
            )));
        }
        self.windows()?;
        Ok(self)
    }

    pub fn healpix(&self) -> Result<Healpix> {
        Ok(Healpix::new(self.nside)?)
    }

    /// Shell windows described by the edges and window shape.
    pub fn windows(&self) -> Result<Vec<ShellWindow>> {
        let windows = match self.window {
            WindowShape::Tophat => tophat_windows(&self.edges, self.dz)?,
            WindowShape::Linear => linear_windows(&self.edges, self.dz)?,
        };
        Ok(windows)
    }
}
