//! Error types for operator construction, input validation and solves.
//!
//! Numerical non-convergence is not an error: CG and ADMM return their last
//! iterate together with diagnostics. Everything here either fails the current
//! call or rejects a construction.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ReconResult<T> = Result<T, ReconError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconError {
    /// An array did not have the shape an operator or solver expects.
    #[error("invalid shape in {context}: expected {expected}, got {got:?}")]
    InvalidShape {
        context: String,
        expected: String,
        got: Vec<usize>,
    },

    /// Channel axis must hold 1 (real) or 2 (complex) entries.
    #[error("invalid channel count in {context}: expected 1 or 2, got {got}")]
    InvalidChannels { context: String, got: usize },

    /// The projection operator only supports square images.
    #[error("projection operator requires a square domain, got {rows}x{cols}")]
    NonSquareDomain { rows: usize, cols: usize },

    /// A sampling mask does not match the domain it is used with.
    #[error("mask of shape {mask:?} does not match domain {domain:?}")]
    MaskMismatch {
        mask: (usize, usize),
        domain: (usize, usize),
    },

    /// A scalar parameter is outside its admissible range.
    #[error("invalid parameter '{name}' = {value}: {reason}")]
    InvalidParameter {
        name: String,
        value: f64,
        reason: String,
    },

    /// The operator has no closed-form implementation of this operation.
    #[error("{operator} does not implement '{operation}'")]
    Unsupported { operator: String, operation: String },

    /// A closed-form solve hit a zero pivot.
    #[error("singular system in {context}: {details}")]
    SingularSystem { context: String, details: String },

    /// Noise generation failed for the given measurement.
    #[error("noise model failure: {0}")]
    Noise(String),
}

impl ReconError {
    pub(crate) fn shape(context: &str, expected: impl Into<String>, got: &[usize]) -> Self {
        ReconError::InvalidShape {
            context: context.to_string(),
            expected: expected.into(),
            got: got.to_vec(),
        }
    }

    pub(crate) fn parameter(name: &str, value: f64, reason: &str) -> Self {
        ReconError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(operator: &str, operation: &str) -> Self {
        ReconError::Unsupported {
            operator: operator.to_string(),
            operation: operation.to_string(),
        }
    }
}
