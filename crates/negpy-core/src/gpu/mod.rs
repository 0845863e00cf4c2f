//! GPU backend for the stage pipeline, built on wgpu compute.
//!
//! Enabled via the `gpu` cargo feature and at runtime through the session
//! options. Every kernel mirrors its CPU counterpart in `stages/`; the two
//! backends must agree within 1/255 on 8-bit output (1e-4 on float),
//! excluding the stochastic grain in Retouch which is specified by
//! distribution.

mod context;
mod dispatch;
mod pool;
mod readback;
mod shaders;
mod uniforms;


pub use context::GpuContext;
pub use dispatch::GpuRenderer;
pub use pool::{PooledTexture, TextureKey, TexturePool};
pub use uniforms::UniformBlock;

/// Check if GPU acceleration is available on this system.
pub fn is_gpu_available() -> bool {
    GpuContext::is_available()
}

/// Get information about the available GPU device.
pub fn gpu_info() -> Option<String> {
    GpuContext::device_info()
}
