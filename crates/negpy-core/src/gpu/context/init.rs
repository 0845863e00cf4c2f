//! Device and adapter initialization.

use crate::error::RenderError;

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Check if GPU acceleration is available without fully initializing.
pub fn is_available() -> bool {
    pollster::block_on(async {
        instance()
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .is_some()
    })
}

/// Describe the adapter that would be picked.
pub fn device_info() -> Option<String> {
    pollster::block_on(async {
        instance()
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map(|adapter| {
                let info = adapter.get_info();
                format!("{} ({:?}, {:?})", info.name, info.device_type, info.backend)
            })
    })
}

/// Initialize the wgpu device and queue.
pub async fn initialize_device(
) -> Result<(wgpu::Device, wgpu::Queue, wgpu::AdapterInfo), RenderError> {
    let instance = instance();

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| RenderError::GpuDeviceLost("no suitable adapter".into()))?;

    let adapter_info = adapter.get_info();
    let adapter_limits = adapter.limits();

    // Film scans are large; request the adapter's real buffer and texture
    // ceilings instead of the conservative defaults.
    let limits = wgpu::Limits {
        max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
        max_uniform_buffer_binding_size: adapter_limits.max_uniform_buffer_binding_size,
        max_buffer_size: adapter_limits.max_buffer_size,
        max_texture_dimension_2d: adapter_limits.max_texture_dimension_2d,
        ..Default::default()
    };

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("negpy-gpu"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        )
        .await
        .map_err(|e| RenderError::GpuDeviceLost(e.to_string()))?;

    Ok((device, queue, adapter_info))
}
