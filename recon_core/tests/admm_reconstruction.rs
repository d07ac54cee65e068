use ndarray::{Array3, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use tomo_recon_core::admm::{admm_l1_rec, reconstruct, AdmmConfig, AdmmStatus, XUpdate};
use tomo_recon_core::data::{random_phantoms, PhantomConfig};
use tomo_recon_core::metrics::{l2_error, ErrorOptions};
use tomo_recon_core::operators::{uniform_angles, Fourier, LinearOperator, Radon, TvAnalysisPeriodic, Wavelet};
use tomo_recon_core::tensor::to_complex;
use tomo_recon_core::RadialMask;

fn complex_phantom(n: usize, seed: u64) -> Array4<f64> {
    let x = random_phantoms(1, n, seed, &PhantomConfig::default()).unwrap();
    to_complex(&x.view()).unwrap()
}

#[test]
fn radial_fourier_tv_recovers_phantom() {
    let n = 64;
    let x = complex_phantom(n, 2024);
    let a = Fourier::new(RadialMask::new((n, n), 40, 0).unwrap().into_mask()).unwrap();
    let w = TvAnalysisPeriodic::new((n, n));
    let y = a.dot(x.view()).unwrap();

    let x0 = a.adj(y.view()).unwrap();
    let z0 = w.dot(x0.view()).unwrap();
    let config = AdmmConfig {
        max_iter: 1000,
        silent: true,
        ..AdmmConfig::default()
    };
    let out = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-4, 1e-2, &config).unwrap();

    assert_eq!(out.x_update, XUpdate::Diagonal);
    assert_eq!(out.status, AdmmStatus::IterationBudgetExhausted);
    let zero_filled = l2_error(x0.view(), x.view(), ErrorOptions::relative()).unwrap();
    let err = l2_error(out.x.view(), x.view(), ErrorOptions::relative()).unwrap();
    assert!(err.mean < 1e-2, "relative error {}", err.mean);
    assert!(err.mean < zero_filled.mean);
}

#[test]
fn augmented_lagrangian_decreases_on_average() {
    let n = 24;
    let x = complex_phantom(n, 5);
    let a = Fourier::new(RadialMask::new((n, n), 10, 0).unwrap().into_mask()).unwrap();
    let w = TvAnalysisPeriodic::new((n, n));
    let y = a.dot(x.view()).unwrap();

    // start far away from the constraint set W x = z
    let mut rng = StdRng::seed_from_u64(17);
    let x0 = Array4::zeros(x.raw_dim());
    let z0 = Array3::from_shape_simple_fn((1, 2, w.codomain_len()), || {
        let v: f64 = StandardNormal.sample(&mut rng);
        10.0 * v
    });
    let config = AdmmConfig {
        max_iter: 200,
        silent: true,
        record_history: true,
        ..AdmmConfig::default()
    };
    let out = reconstruct(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 1.0, &config).unwrap();

    let values: Vec<f64> = out.history.iter().map(|r| r.lagrangian).collect();
    assert_eq!(values.len(), 200);
    assert!(values.iter().all(|v| v.is_finite()));
    let half = values.len() / 2;
    let early = values[..half].iter().sum::<f64>() / half as f64;
    let late = values[half..].iter().sum::<f64>() / (values.len() - half) as f64;
    assert!(late < early, "early mean {early}, late mean {late}");
    assert!(values[values.len() - 1] < values[0]);
}

#[test]
fn radon_tv_reconstruction_uses_cg() {
    let n = 16;
    let x = random_phantoms(1, n, 8, &PhantomConfig::default()).unwrap();
    let a = Radon::new((n, n), uniform_angles(30)).unwrap();
    let w = TvAnalysisPeriodic::new((n, n));
    let y = a.dot(x.view()).unwrap();

    let x0 = a.inv(y.view()).unwrap();
    let z0 = w.dot(x0.view()).unwrap();
    let config = AdmmConfig {
        max_iter: 40,
        silent: true,
        record_history: true,
        ..AdmmConfig::default()
    };
    let out = admm_l1_rec(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 1.0, &config).unwrap();

    assert_eq!(out.x_update, XUpdate::ConjugateGradient);
    assert!(out.history.iter().all(|r| r.cg.is_some()));
    let fbp = l2_error(x0.view(), x.view(), ErrorOptions::relative()).unwrap();
    let err = l2_error(out.x.view(), x.view(), ErrorOptions::relative()).unwrap();
    assert!(err.mean < fbp.mean, "admm {} vs fbp {}", err.mean, fbp.mean);
}

#[test]
fn radial_fourier_wavelet_reconstruction_uses_cg() {
    let n = 32;
    let x = complex_phantom(n, 48);
    let a = Fourier::new(RadialMask::new((n, n), 16, 0).unwrap().into_mask()).unwrap();
    let w = Wavelet::new((n, n), 3).unwrap();
    let y = a.dot(x.view()).unwrap();
    assert_eq!(y.dim().1, 2);

    let x0 = a.adj(y.view()).unwrap();
    let z0 = w.dot(x0.view()).unwrap();
    let config = AdmmConfig {
        max_iter: 50,
        silent: true,
        record_history: true,
        ..AdmmConfig::default()
    };
    let out = admm_l1_rec(y.view(), &a, &w, x0.view(), z0.view(), 1e-3, 1.0, &config).unwrap();

    assert_eq!(out.x_update, XUpdate::ConjugateGradient);
    assert_eq!(out.x.dim(), (1, 2, n, n));
    assert!(out.history.iter().all(|r| r.cg.is_some() && r.lagrangian.is_finite()));
    let zero_filled = l2_error(x0.view(), x.view(), ErrorOptions::relative()).unwrap();
    let err = l2_error(out.x.view(), x.view(), ErrorOptions::relative()).unwrap();
    assert!(err.mean < zero_filled.mean, "admm {} vs zero-filled {}", err.mean, zero_filled.mean);
}
