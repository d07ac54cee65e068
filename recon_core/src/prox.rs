//! Proximal operators and projections used by the ADMM z-update.

use ndarray::{Array, ArrayBase, Axis, Data, Dimension, RemoveAxis, Zip};

use crate::error::{ReconError, ReconResult};
use crate::operators::Subbands;
use crate::tensor::norm;

fn check_threshold(threshold: f64) -> ReconResult<()> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(())
    } else {
        Err(ReconError::parameter("threshold", threshold, "must be finite and non-negative"))
    }
}

#[inline]
fn soft(v: f64, threshold: f64) -> f64 {
    if v > threshold {
        v - threshold
    } else if v < -threshold {
        v + threshold
    } else {
        0.0
    }
}

/// Soft-thresholding `sign(v)·max(|v| - t, 0)`, elementwise.
///
/// A zero threshold returns the input unchanged.
pub fn shrink<S, D>(x: &ArrayBase<S, D>, threshold: f64) -> ReconResult<Array<f64, D>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    check_threshold(threshold)?;
    if threshold == 0.0 {
        return Ok(x.to_owned());
    }
    Ok(x.mapv(|v| soft(v, threshold)))
}

/// [`shrink`] applied to every named subband.
pub fn shrink_bands(bands: &Subbands, threshold: f64) -> ReconResult<Subbands> {
    check_threshold(threshold)?;
    Ok(bands.map(|band| band.mapv(|v| soft(v, threshold))))
}

/// Euclidean projection of every batch item of `x` onto the closed ball of
/// `radius` around the matching item of `centre`.
pub fn proj_l2_ball<S1, S2, D>(
    x: &ArrayBase<S1, D>,
    centre: &ArrayBase<S2, D>,
    radius: f64,
) -> ReconResult<Array<f64, D>>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
{
    if !(radius >= 0.0) {
        return Err(ReconError::parameter("radius", radius, "must be non-negative"));
    }
    if x.shape() != centre.shape() {
        return Err(ReconError::shape("proj_l2_ball", format!("{:?}", centre.shape()), x.shape()));
    }
    let mut out = x.to_owned();
    Zip::from(out.axis_iter_mut(Axis(0)))
        .and(centre.axis_iter(Axis(0)))
        .for_each(|mut item, c| {
            let distance = norm(&(&item - &c));
            if distance > radius {
                let fac = radius / distance;
                Zip::from(&mut item).and(&c).for_each(|v, &c| *v = fac * *v + (1.0 - fac) * c);
            }
        });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array2, Array3};

    #[test]
    fn zero_threshold_is_identity() {
        let v = arr1(&[-2.5, -0.0, 0.0, 1e-12, 3.0]);
        assert_eq!(shrink(&v, 0.0).unwrap(), v);
    }

    #[test]
    fn shrink_keeps_sign_and_reduces_magnitude() {
        let v = arr1(&[-3.0, -0.5, 0.2, 0.7, 4.0]);
        let out = shrink(&v, 0.6).unwrap();
        for (&a, &b) in v.iter().zip(out.iter()) {
            assert!((b.abs() - (a.abs() - 0.6).max(0.0)).abs() < 1e-15);
            if b != 0.0 {
                assert_eq!(a.signum(), b.signum());
            }
        }
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn shrink_rejects_negative_threshold() {
        let v = arr1(&[1.0]);
        assert!(shrink(&v, -0.1).is_err());
        assert!(shrink(&v, f64::NAN).is_err());
    }

    #[test]
    fn shrink_bands_applies_per_band() {
        let mut bands = Subbands::default();
        bands.insert("a1", arr2(&[[2.0, -2.0]]));
        bands.insert("h1", arr2(&[[0.5, -1.5]]));
        let out = shrink_bands(&bands, 1.0).unwrap();
        assert_eq!(out.get("a1").unwrap(), &arr2(&[[1.0, -1.0]]));
        assert_eq!(out.get("h1").unwrap(), &arr2(&[[0.0, -0.5]]));
    }

    #[test]
    fn projection_leaves_interior_points() {
        let x = arr2(&[[0.3, 0.4], [3.0, 4.0]]);
        let centre = Array2::zeros((2, 2));
        let out = proj_l2_ball(&x, &centre, 1.0).unwrap();
        assert_eq!(out.row(0), x.row(0));
        assert!((out[[1, 0]] - 0.6).abs() < 1e-12);
        assert!((out[[1, 1]] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn projection_onto_zero_radius_returns_centre() {
        let x = Array3::from_elem((1, 2, 3), 5.0);
        let centre = Array3::from_elem((1, 2, 3), -1.0);
        assert_eq!(proj_l2_ball(&x, &centre, 0.0).unwrap(), centre);
        assert!(proj_l2_ball(&x, &centre, -1.0).is_err());
    }
}
