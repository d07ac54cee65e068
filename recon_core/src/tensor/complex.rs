//! Conversions between the two-channel complex image layout and `Complex64`
//! grids used by the FFT code.

use ndarray::{concatenate, s, Array3, Array4, ArrayView3, ArrayView4, Axis, Zip};
use rustfft::num_complex::Complex64;

use super::layout::{ImageBatch, Layout};
use crate::error::{ReconError, ReconResult};

/// Promotes a real image batch to the complex layout with a zero imaginary part.
/// Complex inputs are returned unchanged.
pub fn to_complex(x: &ArrayView4<f64>) -> ReconResult<ImageBatch> {
    match Layout::from_channels(x.dim().1, "to_complex")? {
        Layout::Complex => Ok(x.to_owned()),
        Layout::Real => {
            let imag = Array4::<f64>::zeros(x.raw_dim());
            concatenate(Axis(1), &[x.view(), imag.view()])
                .map_err(|err| ReconError::shape("to_complex", err.to_string(), x.shape()))
        }
    }
}

/// Moves the complex magnitude into the real channel and zeroes the imaginary one.
pub fn rotate_real(x: &ArrayView4<f64>) -> ReconResult<ImageBatch> {
    if x.dim().1 != 2 {
        return Err(ReconError::InvalidChannels {
            context: "rotate_real".into(),
            got: x.dim().1,
        });
    }
    let mut out = Array4::<f64>::zeros(x.raw_dim());
    Zip::from(out.slice_mut(s![.., 0, .., ..]))
        .and(x.slice(s![.., 0, .., ..]))
        .and(x.slice(s![.., 1, .., ..]))
        .for_each(|o, &re, &im| *o = re.hypot(im));
    Ok(out)
}

/// Channel layout `(B, 2, H, W)` to a complex grid `(B, H, W)`.
pub fn prep_fft_channel(x: &ArrayView4<f64>) -> ReconResult<Array3<Complex64>> {
    let (batch, channels, rows, cols) = x.dim();
    if channels != 2 {
        return Err(ReconError::InvalidChannels {
            context: "prep_fft_channel".into(),
            got: channels,
        });
    }
    let mut out = Array3::<Complex64>::zeros((batch, rows, cols));
    Zip::from(&mut out)
        .and(x.slice(s![.., 0, .., ..]))
        .and(x.slice(s![.., 1, .., ..]))
        .for_each(|o, &re, &im| *o = Complex64::new(re, im));
    Ok(out)
}

/// Complex grid `(B, H, W)` back to the channel layout `(B, 2, H, W)`.
pub fn unprep_fft_channel(z: &ArrayView3<Complex64>) -> ImageBatch {
    let (batch, rows, cols) = z.dim();
    let mut out = Array4::<f64>::zeros((batch, 2, rows, cols));
    let (mut re, mut im) = out.multi_slice_mut((s![.., 0, .., ..], s![.., 1, .., ..]));
    Zip::from(&mut re).and(&mut im).and(z).for_each(|r, i, c| {
        *r = c.re;
        *i = c.im;
    });
    out
}
