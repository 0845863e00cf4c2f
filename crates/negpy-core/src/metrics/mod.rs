//! Measurement kernels: autocrop detection and the output histogram.

mod autocrop;
mod histogram;

pub use autocrop::{autocrop, detect, luminance_profiles};
pub use histogram::{compute_histogram, HistogramResult, HISTOGRAM_BINS};
