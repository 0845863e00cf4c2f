//! GPU context: device, queue, and pre-compiled stage pipelines.

mod init;
mod pipelines;

use std::sync::Arc;

use crate::error::RenderError;

pub use pipelines::GpuPipelines;

/// GPU context holding the wgpu device, queue, and compiled pipelines.
pub struct GpuContext {
    pub(crate) device: Arc<wgpu::Device>,
    pub(crate) queue: Arc<wgpu::Queue>,
    pub(crate) pipelines: GpuPipelines,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Check availability without fully initializing a device.
    pub fn is_available() -> bool {
        init::is_available()
    }

    /// Describe the adapter that would be used.
    pub fn device_info() -> Option<String> {
        init::device_info()
    }

    /// Create a context, initializing the device and compiling all shaders.
    pub fn new() -> Result<Self, RenderError> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, RenderError> {
        let (device, queue, adapter_info) = init::initialize_device().await?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let pipelines = pipelines::create_pipelines(&device)?;
        Ok(Self {
            device,
            queue,
            pipelines,
            adapter_info,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Submit a command encoder and block until the GPU signals completion.
    ///
    /// Pool texture destruction relies on this: the pool only sweeps after a
    /// blocking submit, so no freed texture can still be referenced by an
    /// in-flight command buffer.
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Submit without waiting; used by the async readback path.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) -> wgpu::SubmissionIndex {
        self.queue.submit(std::iter::once(encoder.finish()))
    }
}
