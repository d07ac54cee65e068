//! Performance benchmarks for operators, CG solves and ADMM
//!
//! Run with: cargo bench --bench operator_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tomo_recon_core::admm::{reconstruct, AdmmConfig};
use tomo_recon_core::data::{random_phantoms, PhantomConfig};
use tomo_recon_core::operators::{uniform_angles, Fourier, FourierMatrix, LinearOperator, Radon, TvAnalysisPeriodic, Wavelet};
use tomo_recon_core::solver::{CgConfig, CgInverterLayer, ImageMatMul};
use tomo_recon_core::tensor::to_complex;
use tomo_recon_core::RadialMask;

/// Forward and adjoint of every operator at increasing image sizes
fn bench_operators(c: &mut Criterion) {
    let mut group = c.benchmark_group("operator_dot_adj");

    for n in [32usize, 64, 128] {
        let x = random_phantoms(4, n, 1, &PhantomConfig::default()).unwrap();
        let xc = to_complex(&x.view()).unwrap();
        let mask = RadialMask::new((n, n), 40, 0).unwrap().into_mask();

        let fourier = Fourier::new(mask.clone()).unwrap();
        let radon = Radon::new((n, n), uniform_angles(n)).unwrap();
        let wavelet = Wavelet::new((n, n), 3).unwrap();
        let tv = TvAnalysisPeriodic::new((n, n));

        let ops: [(&dyn LinearOperator, &ndarray::Array4<f64>); 4] = [
            (&fourier as &dyn LinearOperator, &xc),
            (&radon as &dyn LinearOperator, &x),
            (&wavelet as &dyn LinearOperator, &x),
            (&tv as &dyn LinearOperator, &x),
        ];
        for (op, input) in ops {
            let y = op.dot(input.view()).unwrap();
            group.bench_with_input(BenchmarkId::new(format!("{}_dot", op.name()), n), &n, |b, _| {
                b.iter(|| black_box(op.dot(input.view()).unwrap()));
            });
            group.bench_with_input(BenchmarkId::new(format!("{}_adj", op.name()), n), &n, |b, _| {
                b.iter(|| black_box(op.adj(y.view()).unwrap()));
            });
        }

        if n <= 64 {
            let dense = FourierMatrix::new(mask).unwrap();
            group.bench_with_input(BenchmarkId::new("FourierMatrix_dot", n), &n, |b, _| {
                b.iter(|| black_box(dense.dot(xc.view()).unwrap()));
            });
        }
    }

    group.finish();
}

/// CG on `I + DᵀD` for a batch of images
fn bench_cg(c: &mut Criterion) {
    let n = 64;
    let tv = TvAnalysisPeriodic::new((n, n));
    let system: ImageMatMul<'_> = Box::new(|x| Ok(&x + &tv.adj(tv.dot(x)?.view())?));
    let layer = CgInverterLayer::new((1, n, n), system).with_config(CgConfig {
        rtol: 1e-6,
        ..CgConfig::default()
    });
    let b = random_phantoms(4, n, 2, &PhantomConfig::default()).unwrap();

    c.bench_function("cg_tv_system_64", |bench| {
        bench.iter(|| black_box(layer.solve(b.view(), None).unwrap()));
    });
}

/// Fifty ADMM iterations of the radial Fourier/TV problem
fn bench_admm(c: &mut Criterion) {
    let n = 64;
    let x = random_phantoms(1, n, 3, &PhantomConfig::default()).unwrap();
    let x = to_complex(&x.view()).unwrap();
    let a = Fourier::new(RadialMask::new((n, n), 40, 0).unwrap().into_mask()).unwrap();
    let w = TvAnalysisPeriodic::new((n, n));
    let y = a.dot(x.view()).unwrap();
    let x0 = a.adj(y.view()).unwrap();
    let z0 = w.dot(x0.view()).unwrap();
    let config = AdmmConfig {
        max_iter: 50,
        silent: true,
        ..AdmmConfig::default()
    };

    c.bench_function("admm_fourier_tv_64x50", |b| {
        b.iter(|| black_box(reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-4, 1e-2, &config).unwrap()));
    });
}

criterion_group!(benches, bench_operators, bench_cg, bench_admm);
criterion_main!(benches);
