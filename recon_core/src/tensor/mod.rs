pub mod complex;
pub mod layout;
pub mod reduce;

pub use complex::{prep_fft_channel, rotate_real, to_complex, unprep_fft_channel};
pub use layout::{
    batched, check_image, check_measurement, circshift, im2vec, vec2im, ImageBatch, Layout,
    MeasBatch,
};
pub use reduce::{batch_inner, batch_norms, inner, norm};
