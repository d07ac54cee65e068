//! Exhaustive hyper-parameter search over a Cartesian grid.
//!
//! Every grid point is handed to a caller-supplied reconstruction closure;
//! the resulting images are scored by their mean relative l2 error against
//! the ground truth. The full error surface is kept so that it can be
//! inspected or logged next to the minimizer.

use anyhow::{bail, Context};
use ndarray::{ArrayD, ArrayView3, ArrayView4, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::metrics::{l2_error, ErrorOptions};
use crate::noise::NoiseKind;
use crate::operators::LinearOperator;
use crate::tensor::{batch_norms, ImageBatch};

/// Named parameter axes, in the order they index the error surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an axis; a repeated name replaces the earlier values in place.
    pub fn axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        let name = name.into();
        match self.axes.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = values,
            None => self.axes.push((name, values)),
        }
        self
    }

    pub fn axes(&self) -> &[(String, Vec<f64>)] {
        &self.axes
    }

    pub fn values(&self, name: &str) -> Option<&[f64]> {
        self.axes
            .iter()
            .find(|(axis, _)| axis == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Lengths of the axes; the shape of the error surface.
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|(_, values)| values.len()).collect()
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.shape().iter().product()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All grid points in row-major order (last axis varies fastest).
    pub fn points(&self) -> Vec<GridPoint> {
        let shape = self.shape();
        let mut points = Vec::with_capacity(self.len());
        let mut index = vec![0usize; shape.len()];
        for _ in 0..self.len() {
            points.push(GridPoint {
                values: self
                    .axes
                    .iter()
                    .zip(&index)
                    .map(|((name, values), &i)| (name.clone(), values[i]))
                    .collect(),
            });
            for axis in (0..shape.len()).rev() {
                index[axis] += 1;
                if index[axis] < shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        points
    }
}

/// `num` values spaced evenly on a log scale from `10^start` to `10^stop`.
pub fn logspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![10f64.powf(start)],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| 10f64.powf(start + step * i as f64)).collect()
        }
    }
}

/// One assignment of values to the grid's named parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    values: Vec<(String, f64)>,
}

impl GridPoint {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|&(_, value)| value)
    }

    /// Like [`GridPoint::get`] but fails with the missing name.
    pub fn require(&self, name: &str) -> anyhow::Result<f64> {
        self.get(name)
            .with_context(|| format!("grid point has no parameter '{name}'"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(key, value)| (key.as_str(), *value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSearchResult {
    pub best_params: GridPoint,
    pub best_error: f64,
    /// Mean relative error per grid point, shaped like [`ParamGrid::shape`].
    pub error_surface: ArrayD<f64>,
}

/// Outcome of [`grid_search`] at one relative noise level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSearchRecord {
    pub noise_rel: f64,
    pub result: GridSearchResult,
}

/// Evaluates `reconstruct` at every grid point and returns the minimizer of
/// the mean relative l2 error. Ties keep the first point in row-major order.
///
/// # Arguments
/// * `x_ref` - ground truth images `(B, C, H, W)`
/// * `y` - measurements handed unchanged to `reconstruct`
/// * `reconstruct` - maps measurements and a grid point to images shaped like `x_ref`
/// * `grid` - parameter axes
pub fn grid_search<F>(
    x_ref: ArrayView4<'_, f64>,
    y: ArrayView3<'_, f64>,
    mut reconstruct: F,
    grid: &ParamGrid,
) -> anyhow::Result<GridSearchResult>
where
    F: FnMut(ArrayView3<'_, f64>, &GridPoint) -> anyhow::Result<ImageBatch>,
{
    if grid.is_empty() {
        bail!("parameter grid is empty");
    }

    let points = grid.points();
    let mut errors = Vec::with_capacity(points.len());
    let mut best: Option<(usize, f64)> = None;

    for (idx, point) in points.iter().enumerate() {
        let x = reconstruct(y, point).with_context(|| format!("reconstruction failed at {point:?}"))?;
        let error = l2_error(x.view(), x_ref, ErrorOptions::relative())
            .with_context(|| format!("scoring failed at {point:?}"))?
            .mean;
        tracing::debug!("grid point {}/{} {:?}: error {:.4e}", idx + 1, points.len(), point, error);

        if best.map_or(error.is_finite(), |(_, current)| error < current) {
            best = Some((idx, error));
        }
        errors.push(error);
    }

    let Some((best_idx, best_error)) = best else {
        bail!("no grid point produced a finite reconstruction error");
    };
    let error_surface = ArrayD::from_shape_vec(IxDyn(&grid.shape()), errors)?;
    Ok(GridSearchResult {
        best_params: points[best_idx].clone(),
        best_error,
        error_surface,
    })
}

/// Runs [`grid_search`] once per relative noise level.
///
/// The measurements of level `r` are `A x_ref` corrupted by `noise` with
/// absolute level `r · ‖A x_ref‖` per batch item.
#[allow(clippy::too_many_arguments)]
pub fn sweep_noise_levels<F, R>(
    x_ref: ArrayView4<'_, f64>,
    a: &dyn LinearOperator,
    noise_rel: &[f64],
    noise: NoiseKind,
    rng: &mut R,
    mut reconstruct: F,
    grid: &ParamGrid,
) -> anyhow::Result<Vec<GridSearchRecord>>
where
    F: FnMut(ArrayView3<'_, f64>, &GridPoint) -> anyhow::Result<ImageBatch>,
    R: Rng + ?Sized,
{
    let clean = a.dot(x_ref)?;
    let reference_norms = batch_norms(&clean);

    let mut records = Vec::with_capacity(noise_rel.len());
    for &level in noise_rel {
        let eta = reference_norms.mapv(|norm| level * norm);
        let y = noise.apply(clean.view(), eta.view(), rng)?;
        let result = grid_search(x_ref, y.view(), &mut reconstruct, grid)
            .with_context(|| format!("grid search failed at noise level {level}"))?;
        tracing::info!(
            "noise level {:.3e}: best error {:.4e} at {:?}",
            level,
            result.best_error,
            result.best_params
        );
        records.push(GridSearchRecord { noise_rel: level, result });
    }
    Ok(records)
}
