//! Run the shell pipeline end to end with stand-in fields and galaxies
//!
//! Gaussian contrast shells are integrated into a convergence map, galaxies
//! are lensed by the shear of their shell and reduced into a per-pixel shear
//! field, and the E-mode spectrum of that field is checked against the
//! spectrum expected from the realised convergence.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use serde::Serialize;

use lensing::cosmology::FlatLambdaCdm;
use lensing::healpix::alm::alm2cl;
use lensing::healpix::sht::{map2alm, map2alm_spin2};
use lensing::pipeline::{ShellPipeline, ShellSummary};
use lensing::shared_args::{PipelineArgs, PipelineConfig};
use lensing::sims::{power_law_cl, GaussianContrast, UniformGalaxies};
use lensing::spectrum::{
    shot_noise, zero_low_ell, MixingMatrix, Spin, SpectrumSet, SpectrumValidator,
    ValidationReport,
};
use lensing::ShearTransform;

/// Command line arguments for the shell pipeline
#[derive(Parser, Debug)]
#[command(
    name = "Shell Pipeline",
    about = "Accumulates lensing shell by shell and validates the galaxy shear spectrum",
    long_about = None
)]
struct Args {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Write the run report as JSON to this path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print every n-th multipole in the validation table
    #[arg(long, default_value_t = 4)]
    ell_step: usize,

    /// Relative tolerance reported as pass/fail for the E-mode spectrum
    #[arg(long, default_value_t = 0.5)]
    tolerance: f64,
}

#[derive(Serialize)]
struct RunReport<'a> {
    config: &'a PipelineConfig,
    shells: &'a [ShellSummary],
    total_galaxies: u64,
    validation: &'a ValidationReport,
    spectra: &'a SpectrumSet,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = args.pipeline.to_config()?;
    let hp = config.healpix()?;
    let windows = config.windows()?;
    let lmax = config.lmax;

    info!(
        "nside={} lmax={} shells={} omega_m={}",
        config.nside,
        lmax,
        windows.len(),
        config.omega_m
    );

    let cl = power_law_cl(lmax, config.cl_amplitude, config.cl_slope);
    let mut contrast = GaussianContrast::new(hp, cl, config.seed);
    let galaxy_seed = config.seed.wrapping_add(1);
    let mut galaxies = UniformGalaxies::new(config.density, config.sigma_e, galaxy_seed)
        .from_redshift(config.source_zmin);

    let expected_total: f64 = windows.iter().map(|w| galaxies.expected_count(w)).sum();
    if expected_total <= 0.0 {
        bail!(
            "no shell ends beyond z = {}, so no galaxies would be drawn",
            config.source_zmin
        );
    }
    let expected_per_pixel = expected_total / hp.npix() as f64;

    let mut pipeline = ShellPipeline::new(FlatLambdaCdm::new(config.omega_m), hp, lmax);
    println!(
        "{:>5} {:>8} {:>8} {:>10} {:>12}",
        "shell", "zeff", "z_src", "galaxies", "kappa_rms"
    );
    for window in &windows {
        let s = pipeline.process_shell(window, &mut contrast, &mut galaxies)?;
        println!(
            "{:>5} {:>8.3} {:>8.3} {:>10} {:>12.4e}",
            s.index, s.zeff, s.source_redshift, s.galaxies, s.kappa_rms
        );
    }
    let output = pipeline.finish(expected_per_pixel)?;
    if output.total_galaxies < 2 {
        bail!(
            "only {} galaxies were drawn; the shear spectrum needs at least two",
            output.total_galaxies
        );
    }

    // measured E/B spectra of the galaxy shear field
    let (e1, e2) = output.shear_field.components();
    let (e_alm, b_alm) = map2alm_spin2(&hp, &e1.to_vec(), &e2.to_vec(), lmax)?;
    let mut observed_ee = alm2cl(&e_alm);
    let mut observed_bb = alm2cl(&b_alm);
    zero_low_ell(&mut observed_ee);
    zero_low_ell(&mut observed_bb);

    // shear E-mode expected from the realised convergence
    let kappa_alm = map2alm(&hp, &output.kappa.to_vec(), lmax)?;
    let mut theory_ee = alm2cl(&ShearTransform::new(hp, lmax).shear_alm(&kappa_alm));
    zero_low_ell(&mut theory_ee);

    let noise = shot_noise(lmax, expected_per_pixel, hp.npix(), config.sigma_e)?;
    let mixing = MixingMatrix::uniform_sampling(lmax, output.total_galaxies as f64, Spin::Two)?;
    let validator = SpectrumValidator::new(noise.clone(), mixing)?;
    let report = validator.validate(&observed_ee, &theory_ee)?;
    let debiased_bb = validator.debias(&observed_bb)?;

    println!();
    println!(
        "{:>5} {:>12} {:>12} {:>12} {:>12}",
        "ell", "EE debiased", "EE expected", "rel. resid", "BB debiased"
    );
    for l in (2..=lmax).step_by(args.ell_step.max(1)) {
        println!(
            "{:>5} {:>12.4e} {:>12.4e} {:>12.3} {:>12.4e}",
            l,
            report.debiased[l],
            report.expected[l],
            report.relative_residual[l],
            debiased_bb[l]
        );
    }
    println!();
    println!(
        "galaxies: {}  shot noise: {:.4e}  max |rel. resid|: {:.3} ({})",
        output.total_galaxies,
        noise[lmax],
        report.max_abs_relative,
        if report.within(args.tolerance) {
            "within tolerance"
        } else {
            "outside tolerance"
        }
    );

    if let Some(path) = args.output {
        let mut spectra = SpectrumSet::new(lmax);
        spectra.insert("EE", observed_ee)?;
        spectra.insert("BB", observed_bb)?;
        spectra.insert("EE_theory", theory_ee)?;
        spectra.insert("noise", noise)?;

        let run = RunReport {
            config: &config,
            shells: &output.shells,
            total_galaxies: output.total_galaxies,
            validation: &report,
            spectra: &spectra,
        };
        let file = File::create(&path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &run)?;
        info!("report written to {}", path.display());
    }

    Ok(())
}
