//! Orthogonal Haar wavelet analysis operator with zero-extension boundaries.
//!
//! Each level splits the current approximation along columns, then rows, into
//! four subbands. Odd lengths are extended by one zero sample, so the analysis
//! is an isometric embedding and the synthesis (`adj`) recovers the input
//! exactly: `adj(dot(x)) = x`.
//!
//! Coefficients are flattened band by band in the order
//! `[a_L, h_L, v_L, d_L, ..., h_1, v_1, d_1]`, each band row-major.

use std::collections::BTreeMap;
use std::f64::consts::FRAC_1_SQRT_2;

use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis, Zip};
use serde::{Deserialize, Serialize};

use super::LinearOperator;
use crate::error::{ReconError, ReconResult};
use crate::tensor::{check_image, check_measurement, ImageBatch, MeasBatch};

/// Kind of a 2D Haar subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BandKind {
    /// Low-pass along both axes.
    Approximation,
    /// High-pass along rows, low-pass along columns.
    Horizontal,
    /// Low-pass along rows, high-pass along columns.
    Vertical,
    /// High-pass along both axes.
    Diagonal,
}

impl BandKind {
    pub fn prefix(self) -> &'static str {
        match self {
            BandKind::Approximation => "a",
            BandKind::Horizontal => "h",
            BandKind::Vertical => "v",
            BandKind::Diagonal => "d",
        }
    }
}

/// Placement of one subband inside the flattened coefficient vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSpec {
    pub kind: BandKind,
    pub level: usize,
    pub shape: (usize, usize),
    pub offset: usize,
}

impl BandSpec {
    /// Band name such as `a3` or `h1`.
    pub fn name(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.level)
    }

    pub fn len(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Band shapes and offsets for a fixed domain and level, computed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveletLayout {
    domain: (usize, usize),
    level: usize,
    /// Input shape of each level, finest first.
    level_inputs: Vec<(usize, usize)>,
    bands: Vec<BandSpec>,
    len: usize,
}

impl WaveletLayout {
    pub fn new(domain: (usize, usize), level: usize) -> ReconResult<Self> {
        let max_level = max_level(domain);
        if level == 0 || level > max_level {
            return Err(ReconError::parameter(
                "level",
                level as f64,
                &format!("must lie in 1..={max_level} for domain {domain:?}"),
            ));
        }

        let mut level_inputs = Vec::with_capacity(level);
        let mut shape = domain;
        for _ in 0..level {
            level_inputs.push(shape);
            shape = half_shape(shape);
        }

        let mut bands = Vec::with_capacity(1 + 3 * level);
        let mut offset = 0;
        let mut push = |kind, level, shape: (usize, usize)| {
            bands.push(BandSpec {
                kind,
                level,
                shape,
                offset,
            });
            offset += shape.0 * shape.1;
        };
        push(BandKind::Approximation, level, shape);
        for l in (1..=level).rev() {
            let band_shape = half_shape(level_inputs[l - 1]);
            push(BandKind::Horizontal, l, band_shape);
            push(BandKind::Vertical, l, band_shape);
            push(BandKind::Diagonal, l, band_shape);
        }

        Ok(Self {
            domain,
            level,
            level_inputs,
            bands,
            len: offset,
        })
    }

    pub fn domain(&self) -> (usize, usize) {
        self.domain
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn bands(&self) -> &[BandSpec] {
        &self.bands
    }

    /// Total number of coefficients per channel.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn band(&self, name: &str) -> Option<&BandSpec> {
        self.bands.iter().find(|band| band.name() == name)
    }
}

/// Named subbands of one decomposed image plane.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subbands {
    bands: BTreeMap<String, Array2<f64>>,
}

impl Subbands {
    pub fn get(&self, name: &str) -> Option<&Array2<f64>> {
        self.bands.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, band: Array2<f64>) -> Option<Array2<f64>> {
        self.bands.insert(name.into(), band)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Array2<f64>)> {
        self.bands.iter()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Applies `f` to every band, keeping the names.
    pub fn map<F>(&self, mut f: F) -> Subbands
    where
        F: FnMut(&Array2<f64>) -> Array2<f64>,
    {
        Subbands {
            bands: self.bands.iter().map(|(name, band)| (name.clone(), f(band))).collect(),
        }
    }
}

fn max_level(domain: (usize, usize)) -> usize {
    let shortest = domain.0.min(domain.1);
    if shortest == 0 {
        0
    } else {
        shortest.ilog2() as usize
    }
}

fn half_shape(shape: (usize, usize)) -> (usize, usize) {
    ((shape.0 + 1) / 2, (shape.1 + 1) / 2)
}

/// One Haar analysis step along `axis`, zero-extending odd lengths.
fn analyze(x: &ArrayView2<f64>, axis: Axis) -> (Array2<f64>, Array2<f64>) {
    let n = x.len_of(axis);
    let mut shape = x.raw_dim();
    shape[axis.index()] = (n + 1) / 2;
    let mut lo = Array2::zeros(shape.clone());
    let mut hi = Array2::zeros(shape);
    Zip::from(lo.lanes_mut(axis))
        .and(hi.lanes_mut(axis))
        .and(x.lanes(axis))
        .for_each(|mut lo, mut hi, src| {
            for k in 0..lo.len() {
                let a = src[2 * k];
                let b = if 2 * k + 1 < n { src[2 * k + 1] } else { 0.0 };
                lo[k] = (a + b) * FRAC_1_SQRT_2;
                hi[k] = (a - b) * FRAC_1_SQRT_2;
            }
        });
    (lo, hi)
}

/// Transpose of [`analyze`]: inverse step truncated to `n` samples.
fn synthesize(lo: &ArrayView2<f64>, hi: &ArrayView2<f64>, axis: Axis, n: usize) -> Array2<f64> {
    let mut shape = lo.raw_dim();
    shape[axis.index()] = n;
    let mut out = Array2::zeros(shape);
    Zip::from(out.lanes_mut(axis))
        .and(lo.lanes(axis))
        .and(hi.lanes(axis))
        .for_each(|mut dst, lo, hi| {
            for k in 0..lo.len() {
                dst[2 * k] = (lo[k] + hi[k]) * FRAC_1_SQRT_2;
                if 2 * k + 1 < n {
                    dst[2 * k + 1] = (lo[k] - hi[k]) * FRAC_1_SQRT_2;
                }
            }
        });
    out
}

/// Haar wavelet operator `R^(H×W) → R^m` at a fixed decomposition level.
#[derive(Debug, Clone)]
pub struct Wavelet {
    layout: WaveletLayout,
}

impl Wavelet {
    pub fn new(domain: (usize, usize), level: usize) -> ReconResult<Self> {
        Ok(Self {
            layout: WaveletLayout::new(domain, level)?,
        })
    }

    pub fn layout(&self) -> &WaveletLayout {
        &self.layout
    }

    /// Bands of one plane in layout order.
    fn analyze_plane(&self, plane: &ArrayView2<f64>) -> Vec<Array2<f64>> {
        let level = self.layout.level;
        let mut details = Vec::with_capacity(level);
        let mut approx = plane.to_owned();
        for _ in 0..level {
            let (lo1, hi1) = analyze(&approx.view(), Axis(1));
            let (a, h) = analyze(&lo1.view(), Axis(0));
            let (v, d) = analyze(&hi1.view(), Axis(0));
            details.push([h, v, d]);
            approx = a;
        }
        let mut bands = Vec::with_capacity(1 + 3 * level);
        bands.push(approx);
        for triple in details.into_iter().rev() {
            bands.extend(triple);
        }
        bands
    }

    /// Inverse of [`Wavelet::analyze_plane`] on bands given in layout order.
    fn synthesize_plane(&self, bands: &[ArrayView2<f64>]) -> Array2<f64> {
        let level = self.layout.level;
        let mut approx = bands[0].to_owned();
        for l in (1..=level).rev() {
            let base = 1 + 3 * (level - l);
            let (rows, cols) = self.layout.level_inputs[l - 1];
            let lo1 = synthesize(&approx.view(), &bands[base], Axis(0), rows);
            let hi1 = synthesize(&bands[base + 1], &bands[base + 2], Axis(0), rows);
            approx = synthesize(&lo1.view(), &hi1.view(), Axis(1), cols);
        }
        approx
    }

    /// Named subbands of a single `(H, W)` plane.
    pub fn decompose(&self, plane: ArrayView2<'_, f64>) -> ReconResult<Subbands> {
        if plane.dim() != self.layout.domain {
            return Err(ReconError::shape(
                "Wavelet::decompose",
                format!("{:?}", self.layout.domain),
                plane.shape(),
            ));
        }
        let mut subbands = Subbands::default();
        for (spec, band) in self.layout.bands.iter().zip(self.analyze_plane(&plane)) {
            subbands.insert(spec.name(), band);
        }
        Ok(subbands)
    }

    /// Rebuilds the plane from named subbands; every band of the layout must
    /// be present with its layout shape.
    pub fn recompose(&self, subbands: &Subbands) -> ReconResult<Array2<f64>> {
        let mut views = Vec::with_capacity(self.layout.bands.len());
        for spec in &self.layout.bands {
            let name = spec.name();
            let band = subbands.get(&name).ok_or_else(|| {
                ReconError::shape("Wavelet::recompose", format!("band '{name}'"), &[])
            })?;
            if band.dim() != spec.shape {
                return Err(ReconError::shape(
                    "Wavelet::recompose",
                    format!("band '{name}' of shape {:?}", spec.shape),
                    band.shape(),
                ));
            }
            views.push(band.view());
        }
        Ok(self.synthesize_plane(&views))
    }
}

impl LinearOperator for Wavelet {
    fn name(&self) -> &'static str {
        "Wavelet"
    }

    fn domain(&self) -> (usize, usize) {
        self.layout.domain
    }

    fn codomain_len(&self) -> usize {
        self.layout.len
    }

    fn dot(&self, x: ArrayView4<'_, f64>) -> ReconResult<MeasBatch> {
        check_image(&x, self.domain(), "Wavelet::dot")?;
        let (batch, channels, _, _) = x.dim();
        let mut out = Array3::zeros((batch, channels, self.layout.len));
        Zip::from(out.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut coeffs, item| {
                for (mut dst, plane) in coeffs.outer_iter_mut().zip(item.outer_iter()) {
                    for (spec, band) in self.layout.bands.iter().zip(self.analyze_plane(&plane)) {
                        dst.slice_mut(s![spec.offset..spec.offset + spec.len()])
                            .iter_mut()
                            .zip(band.iter())
                            .for_each(|(d, &v)| *d = v);
                    }
                }
            });
        Ok(out)
    }

    fn adj(&self, y: ArrayView3<'_, f64>) -> ReconResult<ImageBatch> {
        check_measurement(&y, self.layout.len, "Wavelet::adj")?;
        let (batch, channels, _) = y.dim();
        let (rows, cols) = self.domain();
        let mut out = Array4::zeros((batch, channels, rows, cols));
        Zip::from(out.outer_iter_mut())
            .and(y.outer_iter())
            .par_for_each(|mut item, meas| {
                for (mut plane, coeffs) in item.outer_iter_mut().zip(meas.outer_iter()) {
                    let bands: Vec<Array2<f64>> = self
                        .layout
                        .bands
                        .iter()
                        .map(|spec| {
                            let flat = coeffs.slice(s![spec.offset..spec.offset + spec.len()]);
                            Array2::from_shape_fn(spec.shape, |(i, j)| flat[i * spec.shape.1 + j])
                        })
                        .collect();
                    let views: Vec<ArrayView2<f64>> = bands.iter().map(|b| b.view()).collect();
                    plane.assign(&self.synthesize_plane(&views));
                }
            });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::testing::{adjoint_mismatch, random_image};
    use crate::tensor::norm;
    use ndarray::arr2;

    #[test]
    fn layout_orders_bands_coarse_to_fine() {
        let layout = WaveletLayout::new((8, 6), 2).unwrap();
        let names: Vec<String> = layout.bands().iter().map(BandSpec::name).collect();
        assert_eq!(names, vec!["a2", "h2", "v2", "d2", "h1", "v1", "d1"]);
        assert_eq!(layout.band("a2").unwrap().shape, (2, 2));
        assert_eq!(layout.band("d1").unwrap().shape, (4, 3));
        assert_eq!(layout.len(), 4 * 4 + 3 * 12);
    }

    #[test]
    fn odd_domains_are_zero_extended() {
        let layout = WaveletLayout::new((5, 7), 2).unwrap();
        assert_eq!(layout.band("h1").unwrap().shape, (3, 4));
        assert_eq!(layout.band("a2").unwrap().shape, (2, 2));
        assert!(layout.len() >= 35);
    }

    #[test]
    fn rejects_out_of_range_level() {
        assert!(Wavelet::new((8, 8), 0).is_err());
        assert!(Wavelet::new((8, 8), 4).is_err());
        assert!(Wavelet::new((8, 8), 3).is_ok());
    }

    #[test]
    fn single_level_haar_on_two_by_two() {
        let op = Wavelet::new((2, 2), 1).unwrap();
        let x = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_shape((1, 1, 2, 2)).unwrap();
        let y = op.dot(x.view()).unwrap();
        let expected = [5.0, -2.0, -1.0, 0.0];
        for (got, want) in y.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn adjoint_is_exact_inverse_on_range() {
        for &(domain, level) in &[((8, 8), 3), ((7, 10), 2), ((9, 5), 1)] {
            let op = Wavelet::new(domain, level).unwrap();
            let x = random_image(31, (2, 2, domain.0, domain.1));
            let back = op.adj(op.dot(x.view()).unwrap().view()).unwrap();
            assert!(norm(&(&back - &x)) < 1e-10 * norm(&x));
            let coeffs = op.dot(x.view()).unwrap();
            assert!((norm(&coeffs) - norm(&x)).abs() < 1e-10 * norm(&x));
        }
    }

    #[test]
    fn adjoint_matches_inner_products() {
        let op = Wavelet::new((10, 7), 2).unwrap();
        assert!(adjoint_mismatch(&op, 1, 2, 3) < 1e-12);
        assert!(adjoint_mismatch(&op, 2, 1, 4) < 1e-12);
    }

    #[test]
    fn subbands_round_trip() {
        let op = Wavelet::new((6, 6), 2).unwrap();
        let x = random_image(7, (1, 1, 6, 6));
        let plane = x.slice(s![0, 0, .., ..]);
        let subbands = op.decompose(plane).unwrap();
        assert_eq!(subbands.len(), 7);
        let rebuilt = op.recompose(&subbands).unwrap();
        assert!(norm(&(&rebuilt - &plane)) < 1e-12 * norm(&plane));

        let mut missing = subbands.clone();
        missing.insert("h1", Array2::zeros((1, 1)));
        assert!(op.recompose(&missing).is_err());
    }

    #[test]
    fn inv_is_unsupported() {
        let op = Wavelet::new((4, 4), 1).unwrap();
        let y = Array3::zeros((1, 1, op.codomain_len()));
        assert!(matches!(op.inv(y.view()), Err(ReconError::Unsupported { .. })));
    }
}
