//! Shell-by-shell driver tying convergence, shear and pixelization together.
//!
//! Shells are processed strictly front to back. For each shell the contrast
//! map advances the convergence, the shear of the current source plane is
//! derived from it, and the galaxies of that shell are lensed and reduced into
//! a running complex shear aggregate. Only the aggregate (and optionally the
//! catalogue) survives a shell; contrast and shear maps are dropped.

use log::{debug, info};
use ndarray::Array1;
use rustfft::num_complex::Complex64;
use serde::Serialize;

use crate::catalogue::{Catalogue, Galaxy};
use crate::convergence::ConvergenceAccumulator;
use crate::cosmology::Cosmology;
use crate::healpix::Healpix;
use crate::pixelize::{NormalizedField, PixelAggregate, SphereBinning};
use crate::shear::{galaxy_shear, ShearField, ShearTransform};
use crate::shells::ShellWindow;
use crate::Result;

/// Supplies the matter contrast of each shell.
pub trait ContrastSource {
    /// Contrast map of `window`, one value per pixel.
    fn contrast(&mut self, window: &ShellWindow) -> Array1<f64>;
}

/// Supplies the galaxies living in each shell, with intrinsic ellipticities.
pub trait GalaxySource {
    fn galaxies(&mut self, window: &ShellWindow) -> Vec<Galaxy>;
}

/// Progress record for one processed shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShellSummary {
    pub index: usize,
    pub zeff: f64,
    pub source_redshift: f64,
    pub galaxies: usize,
    pub kappa_rms: f64,
}

/// Everything left once the shell stream is exhausted.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Convergence at the last source plane
    pub kappa: Array1<f64>,
    pub gamma1: Array1<f64>,
    pub gamma2: Array1<f64>,
    /// Galaxy ellipticity sums divided by the expected count per pixel
    pub shear_field: NormalizedField<Complex64>,
    pub total_galaxies: u64,
    pub source_redshift: f64,
    pub shells: Vec<ShellSummary>,
    pub catalogue: Option<Catalogue>,
}

/// Single-pass driver over an ordered stream of shells.
pub struct ShellPipeline<C: Cosmology> {
    accumulator: ConvergenceAccumulator<C>,
    transform: ShearTransform,
    binning: SphereBinning,
    aggregate: PixelAggregate<Complex64>,
    catalogue: Option<Catalogue>,
    shells: Vec<ShellSummary>,
    reduced_shear: bool,
}

impl<C: Cosmology> ShellPipeline<C> {
    pub fn new(cosmo: C, healpix: Healpix, lmax: usize) -> Self {
        let binning = SphereBinning::new(healpix);
        Self {
            accumulator: ConvergenceAccumulator::new(cosmo, healpix),
            transform: ShearTransform::new(healpix, lmax),
            aggregate: PixelAggregate::for_binning(&binning),
            binning,
            catalogue: None,
            shells: Vec::new(),
            reduced_shear: true,
        }
    }

    /// Keep every lensed galaxy in a catalogue as well as in the aggregate.
    pub fn keep_catalogue(mut self, capacity: usize) -> Self {
        self.catalogue = Some(Catalogue::with_capacity(capacity));
        self
    }

    /// Apply the reduced shear `γ/(1−κ)` (default) or the linear `ε + γ`.
    pub fn reduced_shear(mut self, reduced: bool) -> Self {
        self.reduced_shear = reduced;
        self
    }

    pub fn healpix(&self) -> &Healpix {
        self.binning.healpix()
    }

    pub fn accumulator(&self) -> &ConvergenceAccumulator<C> {
        &self.accumulator
    }

    pub fn aggregate(&self) -> &PixelAggregate<Complex64> {
        &self.aggregate
    }

    /// Advance the pipeline by one shell.
    pub fn process_shell<S, G>(
        &mut self,
        window: &ShellWindow,
        contrast: &mut S,
        galaxies: &mut G,
    ) -> Result<ShellSummary>
    where
        S: ContrastSource + ?Sized,
        G: GalaxySource + ?Sized,
    {
        let delta = contrast.contrast(window);
        self.accumulator.add_window(delta.view(), window)?;

        let batch = galaxies.galaxies(window);
        if !batch.is_empty() {
            let shear = self
                .transform
                .shear_from_convergence(self.accumulator.kappa())?;
            self.lens_and_reduce(&batch, &shear)?;
        }

        let kappa = self.accumulator.kappa();
        let kappa_rms = (kappa.mapv(|k| k * k).mean().unwrap_or(0.0)).sqrt();
        let summary = ShellSummary {
            index: self.accumulator.shells_seen() - 1,
            zeff: window.zeff(),
            source_redshift: self.accumulator.source_redshift(),
            galaxies: batch.len(),
            kappa_rms,
        };
        debug!(
            "shell {} done: {} galaxies, kappa rms {:.3e}",
            summary.index, summary.galaxies, summary.kappa_rms
        );
        self.shells.push(summary);
        Ok(summary)
    }

    fn lens_and_reduce(&mut self, batch: &[Galaxy], shear: &ShearField) -> Result<()> {
        let lon: Vec<f64> = batch.iter().map(|g| g.lon).collect();
        let lat: Vec<f64> = batch.iter().map(|g| g.lat).collect();
        let eps: Vec<Complex64> = batch.iter().map(|g| g.eps).collect();

        let healpix = *self.binning.healpix();
        let lensed = galaxy_shear(
            &healpix,
            &lon,
            &lat,
            &eps,
            self.accumulator.kappa(),
            shear,
            self.reduced_shear,
        )?;

        let positions: Vec<(f64, f64)> = lon.into_iter().zip(lat).collect();
        self.aggregate
            .reduce_batch_par(&self.binning, &positions, &lensed)?;

        if let Some(catalogue) = self.catalogue.as_mut() {
            let lensed_galaxies = batch
                .iter()
                .zip(&lensed)
                .map(|(g, &eps)| Galaxy { eps, ..*g });
            catalogue.extend_batch(lensed_galaxies);
        }
        Ok(())
    }

    /// Process every window in order.
    pub fn run<S, G>(
        &mut self,
        windows: &[ShellWindow],
        contrast: &mut S,
        galaxies: &mut G,
    ) -> Result<()>
    where
        S: ContrastSource + ?Sized,
        G: GalaxySource + ?Sized,
    {
        for window in windows {
            self.process_shell(window, contrast, galaxies)?;
        }
        Ok(())
    }

    /// Close the stream.
    ///
    /// # Arguments
    /// * `expected_per_pixel` - Mean galaxy count per pixel used to normalize
    ///   the shear aggregate
    pub fn finish(self, expected_per_pixel: f64) -> Result<PipelineOutput> {
        let total_galaxies = self.aggregate.total_count();
        let map = self.accumulator.finalize();
        let shear = self.transform.shear_from_convergence(map.kappa.view())?;
        let shear_field = self.aggregate.finalize(expected_per_pixel)?;

        info!(
            "pipeline finished: {} shells, {} galaxies, z_src={:.3}",
            map.shells, total_galaxies, map.source_redshift
        );

        Ok(PipelineOutput {
            kappa: map.kappa,
            gamma1: shear.gamma1,
            gamma2: shear.gamma2,
            shear_field,
            total_galaxies,
            source_redshift: map.source_redshift,
            shells: self.shells,
            catalogue: self.catalogue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmology::FlatLambdaCdm;
    use crate::shells::tophat_windows;
    use crate::LensingError;

    struct Uniform(f64, usize);

    impl ContrastSource for Uniform {
        fn contrast(&mut self, _window: &ShellWindow) -> Array1<f64> {
            Array1::from_elem(self.1, self.0)
        }
    }

    /// One round galaxy at the centre of each listed pixel.
    struct AtPixels(Healpix, Vec<usize>);

    impl GalaxySource for AtPixels {
        fn galaxies(&mut self, window: &ShellWindow) -> Vec<Galaxy> {
            self.1
                .iter()
                .filter_map(|&p| self.0.pix_to_lonlat(p).ok())
                .map(|(lon, lat)| Galaxy {
                    lon,
                    lat,
                    z: window.zeff(),
                    eps: Complex64::new(0.0, 0.0),
                })
                .collect()
        }
    }

    #[test]
    fn test_uniform_contrast_gives_no_shear() {
        let hp = Healpix::new(8).unwrap();
        let windows = tophat_windows(&[0.0, 0.5, 1.0], 0.01).unwrap();
        let mut pipeline = ShellPipeline::new(FlatLambdaCdm::default(), hp, 8).keep_catalogue(8);
        let mut contrast = Uniform(0.2, hp.npix());
        let mut galaxies = AtPixels(hp, vec![3, 100, 150]);

        pipeline.run(&windows, &mut contrast, &mut galaxies).unwrap();
        let output = pipeline.finish(1.0).unwrap();

        assert_eq!(output.total_galaxies, 6);
        assert_eq!(output.shells.len(), 2);
        assert_eq!(output.shear_field.counts[3], 2);
        assert!(output.kappa.iter().all(|k| *k > 0.0));
        assert!(output.shear_field.values.iter().all(|g| g.norm() < 5e-3));
        assert_eq!(output.catalogue.map(|c| c.len()), Some(6));
    }

    #[test]
    fn test_wrong_contrast_resolution_stops_pipeline() {
        let hp = Healpix::new(2).unwrap();
        let windows = tophat_windows(&[0.0, 0.5], 0.01).unwrap();
        let mut pipeline = ShellPipeline::new(FlatLambdaCdm::default(), hp, 4);
        let mut contrast = Uniform(0.1, 12);
        let mut galaxies = AtPixels(hp, vec![]);

        let err = pipeline
            .process_shell(&windows[0], &mut contrast, &mut galaxies)
            .unwrap_err();
        assert!(matches!(err, LensingError::Convergence(_)));
    }
}
