//! Measurement noise models with explicit random generator state.

use ndarray::{ArrayView1, ArrayView3, Axis, Zip};
use rand::Rng;
use rand_distr::{Distribution, Poisson, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};
use crate::tensor::MeasBatch;

/// Which noise model corrupts the clean measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    #[default]
    Gaussian,
    Poisson,
}

impl NoiseKind {
    pub fn apply<R: Rng + ?Sized>(self, y: ArrayView3<'_, f64>, eta: ArrayView1<'_, f64>, rng: &mut R) -> ReconResult<MeasBatch> {
        match self {
            NoiseKind::Gaussian => noise_gaussian(y, eta, rng),
            NoiseKind::Poisson => noise_poisson(y, eta, rng),
        }
    }
}

fn check_levels(y: &ArrayView3<f64>, eta: &ArrayView1<f64>) -> ReconResult<()> {
    if eta.len() != y.dim().0 {
        return Err(ReconError::shape("noise level", format!("[{}]", y.dim().0), eta.shape()));
    }
    if let Some(&bad) = eta.iter().find(|e| !(e.is_finite() && **e >= 0.0)) {
        return Err(ReconError::parameter("eta", bad, "noise levels must be finite and non-negative"));
    }
    Ok(())
}

/// Additive Gaussian noise `y + η / √(C·m) · ξ` with one absolute level `η`
/// per batch item, so the expected noise norm of item `i` is about `η[i]`.
pub fn noise_gaussian<R: Rng + ?Sized>(y: ArrayView3<'_, f64>, eta: ArrayView1<'_, f64>, rng: &mut R) -> ReconResult<MeasBatch> {
    check_levels(&y, &eta)?;
    let (_, channels, len) = y.dim();
    let norm = ((channels * len) as f64).sqrt();
    let mut noisy = y.to_owned();
    for (mut item, &level) in noisy.axis_iter_mut(Axis(0)).zip(eta.iter()) {
        let scale = level / norm;
        item.iter_mut().for_each(|v| {
            let xi: f64 = StandardNormal.sample(rng);
            *v += scale * xi;
        });
    }
    Ok(noisy)
}

/// Rescaled Poisson noise: each row `y[i, c, :]` is scaled by
/// `s = Σ y / η²`, drawn from `Poisson(s·y)` and scaled back by `1/s`.
/// Not additive; requires non-negative measurements. Items with `η = 0` are
/// returned unchanged.
pub fn noise_poisson<R: Rng + ?Sized>(y: ArrayView3<'_, f64>, eta: ArrayView1<'_, f64>, rng: &mut R) -> ReconResult<MeasBatch> {
    check_levels(&y, &eta)?;
    let mut noisy = y.to_owned();
    for (mut item, &level) in noisy.axis_iter_mut(Axis(0)).zip(eta.iter()) {
        if level == 0.0 {
            continue;
        }
        for mut row in item.outer_iter_mut() {
            let total: f64 = row.sum();
            let scale = total / (level * level);
            if !(scale.is_finite() && scale > 0.0) {
                return Err(ReconError::Noise(format!(
                    "rescaled Poisson noise needs a positive scale, got {scale} (row sum {total}, eta {level})"
                )));
            }
            let mut failure = None;
            Zip::from(&mut row).for_each(|v| {
                if failure.is_some() {
                    return;
                }
                let rate = scale * *v;
                if rate == 0.0 {
                    *v = 0.0;
                    return;
                }
                match Poisson::new(rate) {
                    Ok(dist) => {
                        let count: f64 = dist.sample(rng);
                        *v = count / scale;
                    }
                    Err(err) => failure = Some(format!("invalid Poisson rate {rate}: {err}")),
                }
            });
            if let Some(message) = failure {
                return Err(ReconError::Noise(message));
            }
        }
    }
    Ok(noisy)
}
