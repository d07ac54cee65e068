//! Experiment configuration via TOML files.
//!
//! Every section is optional and falls back to the defaults used by the
//! Fourier/TV grid-search experiment:
//!
//! ```toml
//! [geometry]
//! n = 64
//! spokes = 40
//!
//! [admm]
//! max_iter = 1000
//! silent = true
//!
//! [grid]
//! lam = { log_start = -6.0, log_stop = -1.0, num = 6 }
//! rho = [1e-3, 1e-2, 1e-1]
//!
//! [noise]
//! kind = "gaussian"
//! levels = [0.0, 0.01]
//! seed = 7
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admm::AdmmConfig;
use crate::grid::{logspace, ParamGrid};
use crate::noise::NoiseKind;
use crate::solver::CgConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Experiment configuration loaded from a TOML file.
///
/// # Examples
///
/// ```
/// use tomo_recon_core::config::ReconConfig;
///
/// let config = ReconConfig::from_str("[geometry]\nn = 32").unwrap();
/// assert_eq!(config.geometry.n, 32);
/// assert_eq!(config.geometry.spokes, 40);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconConfig {
    pub geometry: GeometryConfig,
    pub cg: CgConfig,
    pub admm: AdmmConfig,
    pub grid: GridConfig,
    pub noise: NoiseConfig,
    pub output: OutputConfig,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            geometry: GeometryConfig {
                n: default_n(),
                spokes: default_spokes(),
                mask_offset: 0,
                wavelet_level: default_wavelet_level(),
                angles: default_angles(),
            },
            cg: CgConfig::default(),
            admm: AdmmConfig::default(),
            grid: GridConfig {
                lam: default_lam(),
                rho: default_rho(),
            },
            noise: NoiseConfig {
                kind: NoiseKind::default(),
                levels: default_levels(),
                seed: default_seed(),
            },
            output: OutputConfig {
                journal: default_journal(),
            },
        }
    }
}

impl ReconConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawReconConfig = toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;

        let geometry = GeometryConfig::try_from(&raw.geometry)?;
        let cg = raw.cg.validate("cg")?;
        let admm = raw.admm.validate(cg)?;
        let grid = GridConfig::try_from(&raw.grid)?;
        let noise = NoiseConfig::try_from(&raw.noise)?;

        Ok(Self {
            geometry,
            cg,
            admm,
            grid,
            noise,
            output: OutputConfig {
                journal: raw.output.journal,
            },
        })
    }

    /// The `[grid]` section as a search grid with axes `lam`, `rho`.
    pub fn param_grid(&self) -> ParamGrid {
        ParamGrid::new()
            .axis("lam", self.grid.lam.clone())
            .axis("rho", self.grid.rho.clone())
    }
}

/// Image and sampling geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometryConfig {
    /// Side length of the square images
    pub n: usize,
    /// Radial spokes of the Fourier sampling mask
    pub spokes: usize,
    /// Golden-angle offset of the mask
    pub mask_offset: usize,
    /// Wavelet decomposition depth
    pub wavelet_level: usize,
    /// Number of projection angles on `[0, π)`
    pub angles: usize,
}

impl GeometryConfig {
    fn try_from(raw: &RawGeometry) -> Result<Self, ConfigError> {
        if raw.n < 2 {
            return Err(ConfigError::Invalid("geometry.n must be ≥ 2".into()));
        }
        if raw.spokes == 0 {
            return Err(ConfigError::Invalid("geometry.spokes must be ≥ 1".into()));
        }
        if raw.angles == 0 {
            return Err(ConfigError::Invalid("geometry.angles must be ≥ 1".into()));
        }
        let max_level = raw.n.ilog2() as usize;
        if raw.wavelet_level == 0 || raw.wavelet_level > max_level {
            return Err(ConfigError::Invalid(format!(
                "geometry.wavelet_level must be in 1..={max_level} for n = {}",
                raw.n
            )));
        }
        Ok(Self {
            n: raw.n,
            spokes: raw.spokes,
            mask_offset: raw.mask_offset,
            wavelet_level: raw.wavelet_level,
            angles: raw.angles,
        })
    }
}

/// Search ranges of the ADMM parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridConfig {
    pub lam: Vec<f64>,
    pub rho: Vec<f64>,
}

impl GridConfig {
    fn try_from(raw: &RawGrid) -> Result<Self, ConfigError> {
        let lam = raw.lam.resolve("grid.lam")?;
        let rho = raw.rho.resolve("grid.rho")?;
        if let Some(bad) = lam.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(ConfigError::Invalid(format!("grid.lam values must be ≥ 0, got {bad}")));
        }
        if let Some(bad) = rho.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(ConfigError::Invalid(format!("grid.rho values must be positive, got {bad}")));
        }
        Ok(Self { lam, rho })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseConfig {
    pub kind: NoiseKind,
    /// Noise levels relative to the norm of the clean measurements
    pub levels: Vec<f64>,
    pub seed: u64,
}

impl NoiseConfig {
    fn try_from(raw: &RawNoise) -> Result<Self, ConfigError> {
        if raw.levels.is_empty() {
            return Err(ConfigError::Invalid("noise.levels must not be empty".into()));
        }
        if let Some(bad) = raw.levels.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(ConfigError::Invalid(format!("noise.levels must be ≥ 0, got {bad}")));
        }
        Ok(Self {
            kind: raw.kind,
            levels: raw.levels.clone(),
            seed: raw.seed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputConfig {
    /// JSON-lines file receiving one record per noise level
    pub journal: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawReconConfig {
    #[serde(default)]
    geometry: RawGeometry,
    #[serde(default)]
    cg: RawCg,
    #[serde(default)]
    admm: RawAdmm,
    #[serde(default)]
    grid: RawGrid,
    #[serde(default)]
    noise: RawNoise,
    #[serde(default)]
    output: RawOutput,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(default = "default_n")]
    n: usize,
    #[serde(default = "default_spokes")]
    spokes: usize,
    #[serde(default)]
    mask_offset: usize,
    #[serde(default = "default_wavelet_level")]
    wavelet_level: usize,
    #[serde(default = "default_angles")]
    angles: usize,
}

impl Default for RawGeometry {
    fn default() -> Self {
        Self {
            n: default_n(),
            spokes: default_spokes(),
            mask_offset: 0,
            wavelet_level: default_wavelet_level(),
            angles: default_angles(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCg {
    #[serde(default = "default_rtol")]
    rtol: f64,
    #[serde(default)]
    atol: f64,
    #[serde(default)]
    max_iter: Option<usize>,
}

impl Default for RawCg {
    fn default() -> Self {
        Self {
            rtol: default_rtol(),
            atol: 0.0,
            max_iter: None,
        }
    }
}

impl RawCg {
    fn validate(&self, section: &str) -> Result<CgConfig, ConfigError> {
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return Err(ConfigError::Invalid(format!("{section}.rtol must be ≥ 0")));
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(ConfigError::Invalid(format!("{section}.atol must be ≥ 0")));
        }
        Ok(CgConfig {
            rtol: self.rtol,
            atol: self.atol,
            max_iter: self.max_iter,
            verbose: false,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawAdmm {
    #[serde(default = "default_admm_iter")]
    max_iter: usize,
    #[serde(default)]
    tol: Option<f64>,
    #[serde(default)]
    silent: bool,
    #[serde(default = "default_log_every")]
    log_every: usize,
    #[serde(default)]
    record_history: bool,
}

impl Default for RawAdmm {
    fn default() -> Self {
        Self {
            max_iter: default_admm_iter(),
            tol: None,
            silent: false,
            log_every: default_log_every(),
            record_history: false,
        }
    }
}

impl RawAdmm {
    fn validate(&self, cg: CgConfig) -> Result<AdmmConfig, ConfigError> {
        if let Some(tol) = self.tol {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(ConfigError::Invalid(format!("admm.tol must be positive, got {tol}")));
            }
        }
        if self.log_every == 0 {
            return Err(ConfigError::Invalid("admm.log_every must be ≥ 1".into()));
        }
        Ok(AdmmConfig {
            max_iter: self.max_iter,
            tol: self.tol,
            silent: self.silent,
            log_every: self.log_every,
            record_history: self.record_history,
            cg,
        })
    }
}

/// Either an explicit list or a log-spaced range `10^log_start ..= 10^log_stop`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawAxis {
    Values(Vec<f64>),
    LogRange { log_start: f64, log_stop: f64, num: usize },
}

impl RawAxis {
    fn resolve(&self, name: &str) -> Result<Vec<f64>, ConfigError> {
        let values = match self {
            RawAxis::Values(values) => values.clone(),
            RawAxis::LogRange { log_start, log_stop, num } => logspace(*log_start, *log_stop, *num),
        };
        if values.is_empty() {
            return Err(ConfigError::Invalid(format!("{name} must not be empty")));
        }
        Ok(values)
    }
}

#[derive(Debug, Deserialize)]
struct RawGrid {
    #[serde(default = "default_lam_axis")]
    lam: RawAxis,
    #[serde(default = "default_rho_axis")]
    rho: RawAxis,
}

impl Default for RawGrid {
    fn default() -> Self {
        Self {
            lam: default_lam_axis(),
            rho: default_rho_axis(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawNoise {
    #[serde(default)]
    kind: NoiseKind,
    #[serde(default = "default_levels")]
    levels: Vec<f64>,
    #[serde(default = "default_seed")]
    seed: u64,
}

impl Default for RawNoise {
    fn default() -> Self {
        Self {
            kind: NoiseKind::default(),
            levels: default_levels(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(default = "default_journal")]
    journal: PathBuf,
}

impl Default for RawOutput {
    fn default() -> Self {
        Self {
            journal: default_journal(),
        }
    }
}

fn default_n() -> usize {
    64
}

fn default_spokes() -> usize {
    40
}

fn default_wavelet_level() -> usize {
    3
}

fn default_angles() -> usize {
    60
}

fn default_rtol() -> f64 {
    1e-5
}

fn default_admm_iter() -> usize {
    1000
}

fn default_log_every() -> usize {
    100
}

fn default_lam_axis() -> RawAxis {
    RawAxis::LogRange {
        log_start: -6.0,
        log_stop: -1.0,
        num: 6,
    }
}

fn default_rho_axis() -> RawAxis {
    RawAxis::LogRange {
        log_start: -5.0,
        log_stop: 1.0,
        num: 7,
    }
}

fn default_lam() -> Vec<f64> {
    logspace(-6.0, -1.0, 6)
}

fn default_rho() -> Vec<f64> {
    logspace(-5.0, 1.0, 7)
}

fn default_levels() -> Vec<f64> {
    vec![0.0, 1e-3, 1e-2, 8e-2, 0.16]
}

fn default_seed() -> u64 {
    1
}

fn default_journal() -> PathBuf {
    PathBuf::from("logs/grid_search_l1.jsonl")
}
