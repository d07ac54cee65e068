//! Synthetic ground-truth images for experiments and tests.

pub mod phantom;

pub use phantom::{random_phantoms, rasterize, Ellipse, PhantomConfig};
