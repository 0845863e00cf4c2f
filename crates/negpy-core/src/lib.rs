//! NegPy Core Library
//!
//! Non-destructive processing for scanned photographic film negatives: the
//! deterministic stage pipeline (normalization through layout), the GPU
//! compute scheduler with its texture pool and uniform block, hybrid
//! CPU/GPU auto-calibration, and the renderer facade used by the desktop
//! shell and the CLI.

pub mod calibration;
pub mod color;
pub mod decoders;
pub mod engine;
pub mod error;
pub mod exporters;
pub mod fingerprint;
pub mod metrics;
pub mod models;
pub mod numerics;
pub mod presets;
pub mod session;
pub mod stages;
pub mod store;

#[cfg(feature = "gpu")]
pub mod gpu;

// Re-export commonly used types
pub use calibration::{CalibrationBounds, SuggestedExposure};
pub use decoders::{FileLoader, ImageBuffer, ImageLoader, LoadedImage};
pub use error::RenderError;
pub use fingerprint::FileFingerprint;
pub use metrics::HistogramResult;
pub use models::{ProcessMode, WorkspaceConfig};
pub use session::{PreviewFrame, Session, SessionEvent, SessionOptions};

/// Check if GPU acceleration is available on this system.
#[cfg(feature = "gpu")]
pub fn is_gpu_available() -> bool {
    gpu::is_gpu_available()
}

#[cfg(not(feature = "gpu"))]
pub fn is_gpu_available() -> bool {
    false
}
