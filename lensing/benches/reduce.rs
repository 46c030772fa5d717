use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lensing::convergence::ConvergenceAccumulator;
use lensing::cosmology::FlatLambdaCdm;
use lensing::healpix::Healpix;
use lensing::pixelize::{GridBinning, PixelAggregate, SphereBinning};
use lensing::shells::tophat_windows;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex64;

fn make_sky_points(count: usize) -> (Vec<(f64, f64)>, Vec<Complex64>) {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let lon = rng.gen_range(0.0..360.0);
            let lat = rng.gen_range(-1.0_f64..1.0).asin().to_degrees();
            let eps = Complex64::new(rng.gen_range(-0.3..0.3), rng.gen_range(-0.3..0.3));
            ((lon, lat), eps)
        })
        .unzip()
}

fn bench_sphere_reduction(c: &mut Criterion) {
    let binning = SphereBinning::new(Healpix::new(64).unwrap());
    let (positions, values) = make_sky_points(200_000);

    let mut group = c.benchmark_group("sphere_reduction");
    group.bench_function("200k_sequential_nside64", |b| {
        b.iter(|| {
            let mut agg = PixelAggregate::for_binning(&binning);
            agg.reduce_batch(&binning, black_box(&positions), black_box(&values))
                .unwrap();
            agg
        })
    });
    group.bench_function("200k_parallel_nside64", |b| {
        b.iter(|| {
            let mut agg = PixelAggregate::for_binning(&binning);
            agg.reduce_batch_par(&binning, black_box(&positions), black_box(&values))
                .unwrap();
            agg
        })
    });
    group.finish();
}

fn bench_grid_reduction(c: &mut Criterion) {
    let grid = GridBinning::cube(0.0, 100.0, 64).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let positions: Vec<[f64; 3]> = (0..200_000)
        .map(|_| {
            [
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
            ]
        })
        .collect();
    let values = vec![1.0; positions.len()];

    c.bench_function("grid_reduction_200k_64cubed", |b| {
        b.iter(|| {
            let mut agg = PixelAggregate::for_binning(&grid);
            agg.reduce_batch_par(&grid, black_box(&positions), black_box(&values))
                .unwrap();
            agg
        })
    });
}

fn bench_convergence_shell(c: &mut Criterion) {
    let hp = Healpix::new(128).unwrap();
    let windows = tophat_windows(&[0.0, 0.1, 0.2], 0.01).unwrap();
    let delta = Array1::from_shape_fn(hp.npix(), |i| (i as f64 * 1e-3).sin());

    c.bench_function("convergence_two_shells_nside128", |b| {
        b.iter(|| {
            let mut acc = ConvergenceAccumulator::new(FlatLambdaCdm::default(), hp);
            for window in &windows {
                acc.add_window(black_box(delta.view()), window).unwrap();
            }
            acc.finalize()
        })
    });
}

criterion_group!(
    benches,
    bench_sphere_reduction,
    bench_grid_reduction,
    bench_convergence_shell,
);
criterion_main!(benches);
