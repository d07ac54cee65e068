//! Image/measurement layouts and the shape checks every operator runs at its
//! `dot`/`adj` boundary.
//!
//! Images are `(B, C, H, W)` and measurements `(B, C, m)`, with `C = 1` for
//! real data and `C = 2` for complex data stored as real/imaginary channels.

use ndarray::{Array, Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis, Dimension, Slice};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};

/// Batched image tensor `(B, C, H, W)`.
pub type ImageBatch = Array4<f64>;

/// Batched measurement tensor `(B, C, m)`.
pub type MeasBatch = Array3<f64>;

/// Real or complex channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    Real,
    Complex,
}

impl Layout {
    pub fn channels(self) -> usize {
        match self {
            Layout::Real => 1,
            Layout::Complex => 2,
        }
    }

    pub fn from_channels(channels: usize, context: &str) -> ReconResult<Self> {
        match channels {
            1 => Ok(Layout::Real),
            2 => Ok(Layout::Complex),
            got => Err(ReconError::InvalidChannels {
                context: context.to_string(),
                got,
            }),
        }
    }
}

/// Validates an image batch against a domain `(H, W)` and returns its layout.
pub fn check_image(x: &ArrayView4<f64>, domain: (usize, usize), context: &str) -> ReconResult<Layout> {
    let (_, channels, rows, cols) = x.dim();
    let layout = Layout::from_channels(channels, context)?;
    if (rows, cols) != domain {
        return Err(ReconError::shape(
            context,
            format!("(B, C, {}, {})", domain.0, domain.1),
            x.shape(),
        ));
    }
    Ok(layout)
}

/// Validates a measurement batch against a co-domain length `m`.
pub fn check_measurement(y: &ArrayView3<f64>, m: usize, context: &str) -> ReconResult<Layout> {
    let (_, channels, len) = y.dim();
    let layout = Layout::from_channels(channels, context)?;
    if len != m {
        return Err(ReconError::shape(context, format!("(B, C, {m})"), y.shape()));
    }
    Ok(layout)
}

/// Lifts a single `(C, H, W)` image to a batch of one.
pub fn batched(x: Array3<f64>) -> ImageBatch {
    x.insert_axis(Axis(0))
}

/// Copies an array into a new shape, walking it in logical (row-major) order.
pub(crate) fn reshape_owned<D, E>(x: &ndarray::ArrayBase<impl ndarray::Data<Elem = f64>, D>, shape: E) -> ReconResult<Array<f64, E::Dim>>
where
    D: Dimension,
    E: ndarray::IntoDimension,
{
    let got = x.shape().to_vec();
    let dim = shape.into_dimension();
    if dim.size() != x.len() {
        return Err(ReconError::shape("reshape", format!("{} elements", dim.size()), &got));
    }
    Array::from_shape_vec(dim, x.iter().copied().collect())
        .map_err(|err| ReconError::shape("reshape", err.to_string(), &got))
}

/// Flattens the two trailing image axes: `(B, C, H, W) -> (B, C, H*W)`.
pub fn im2vec(x: &ArrayView4<f64>) -> ReconResult<MeasBatch> {
    let (batch, channels, rows, cols) = x.dim();
    reshape_owned(x, (batch, channels, rows * cols))
}

/// Unflattens the trailing axis into an image: `(B, C, H*W) -> (B, C, H, W)`.
pub fn vec2im(y: &ArrayView3<f64>, n: (usize, usize)) -> ReconResult<ImageBatch> {
    let (batch, channels, len) = y.dim();
    if len != n.0 * n.1 {
        return Err(ReconError::shape("vec2im", format!("(B, C, {})", n.0 * n.1), y.shape()));
    }
    reshape_owned(y, (batch, channels, n.0, n.1))
}

/// Circular shift along `axis`: `out[i] = x[(i + num) mod n]`.
pub fn circshift(x: &ArrayView2<f64>, axis: Axis, num: usize) -> Array2<f64> {
    let n = x.len_of(axis);
    if n == 0 {
        return x.to_owned();
    }
    let k = num % n;
    let mut out = Array2::zeros(x.raw_dim());
    out.slice_axis_mut(axis, Slice::from(..n - k))
        .assign(&x.slice_axis(axis, Slice::from(k..)));
    out.slice_axis_mut(axis, Slice::from(n - k..))
        .assign(&x.slice_axis(axis, Slice::from(..k)));
    out
}
