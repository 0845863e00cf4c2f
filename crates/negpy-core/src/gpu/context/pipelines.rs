//! Bind group layouts and compute pipelines for the stage kernels.

use crate::error::RenderError;
use crate::gpu::shaders::Shaders;

/// Pre-compiled pipelines plus the shared bind group layouts.
pub struct GpuPipelines {
    pub normalization: wgpu::ComputePipeline,
    pub transform: wgpu::ComputePipeline,
    pub retouch: wgpu::ComputePipeline,
    pub exposure: wgpu::ComputePipeline,
    pub lab: wgpu::ComputePipeline,
    pub clahe_hist: wgpu::ComputePipeline,
    pub clahe_cdf: wgpu::ComputePipeline,
    pub clahe_apply: wgpu::ComputePipeline,
    pub toning: wgpu::ComputePipeline,
    pub layout: wgpu::ComputePipeline,
    pub metrics: wgpu::ComputePipeline,
    pub autocrop_rows: wgpu::ComputePipeline,
    pub autocrop_cols: wgpu::ComputePipeline,

    /// texture in + storage texture out + uniform slice.
    pub stage_layout: wgpu::BindGroupLayout,
    /// stage_layout plus the read-only spot buffer.
    pub retouch_layout: wgpu::BindGroupLayout,
    /// texture in + atomic histogram buffer + uniform slice.
    pub hist_layout: wgpu::BindGroupLayout,
    /// histogram buffer + cdf buffer + uniform slice.
    pub cdf_layout: wgpu::BindGroupLayout,
    /// texture in + storage texture out + cdf buffer + uniform slice.
    pub apply_layout: wgpu::BindGroupLayout,
    /// texture in + row sums + column sums.
    pub autocrop_layout: wgpu::BindGroupLayout,
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba32Float,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn create_pipelines(device: &wgpu::Device) -> Result<GpuPipelines, RenderError> {
    // Any WGSL or layout error inside this scope surfaces as a
    // KernelCompileError instead of a device panic.
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let stage_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("stage_layout"),
        entries: &[texture_entry(0), storage_texture_entry(1), uniform_entry(2)],
    });
    let retouch_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("retouch_layout"),
        entries: &[
            texture_entry(0),
            storage_texture_entry(1),
            uniform_entry(2),
            storage_entry(3, true),
        ],
    });
    let hist_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("hist_layout"),
        entries: &[texture_entry(0), storage_entry(1, false), uniform_entry(2)],
    });
    let cdf_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("cdf_layout"),
        entries: &[
            storage_entry(0, false),
            storage_entry(1, false),
            uniform_entry(2),
        ],
    });
    let apply_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("apply_layout"),
        entries: &[
            texture_entry(0),
            storage_texture_entry(1),
            storage_entry(2, true),
            uniform_entry(3),
        ],
    });
    let autocrop_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("autocrop_layout"),
        entries: &[
            texture_entry(0),
            storage_entry(1, false),
            storage_entry(2, false),
        ],
    });

    let module = |label: &str, source: &'static str| {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    };

    let normalization_module = module("normalization", Shaders::NORMALIZATION);
    let transform_module = module("transform", Shaders::TRANSFORM);
    let retouch_module = module("retouch", Shaders::RETOUCH);
    let exposure_module = module("exposure", Shaders::EXPOSURE);
    let lab_module = module("lab", Shaders::LAB);
    let clahe_hist_module = module("clahe_hist", Shaders::CLAHE_HIST);
    let clahe_cdf_module = module("clahe_cdf", Shaders::CLAHE_CDF);
    let clahe_apply_module = module("clahe_apply", Shaders::CLAHE_APPLY);
    let toning_module = module("toning", Shaders::TONING);
    let layout_module = module("layout", Shaders::LAYOUT);
    let metrics_module = module("metrics", Shaders::METRICS);
    let autocrop_module = module("autocrop", Shaders::AUTOCROP);

    let pipeline = |label: &str,
                    layout: &wgpu::BindGroupLayout,
                    module: &wgpu::ShaderModule,
                    entry_point: &str| {
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module,
            entry_point,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    };

    let pipelines = GpuPipelines {
        normalization: pipeline("normalization", &stage_layout, &normalization_module, "main"),
        transform: pipeline("transform", &stage_layout, &transform_module, "main"),
        retouch: pipeline("retouch", &retouch_layout, &retouch_module, "main"),
        exposure: pipeline("exposure", &stage_layout, &exposure_module, "main"),
        lab: pipeline("lab", &stage_layout, &lab_module, "main"),
        clahe_hist: pipeline("clahe_hist", &hist_layout, &clahe_hist_module, "main"),
        clahe_cdf: pipeline("clahe_cdf", &cdf_layout, &clahe_cdf_module, "main"),
        clahe_apply: pipeline("clahe_apply", &apply_layout, &clahe_apply_module, "main"),
        toning: pipeline("toning", &stage_layout, &toning_module, "main"),
        layout: pipeline("layout", &stage_layout, &layout_module, "main"),
        metrics: pipeline("metrics", &hist_layout, &metrics_module, "main"),
        autocrop_rows: pipeline("autocrop_rows", &autocrop_layout, &autocrop_module, "reduce_rows"),
        autocrop_cols: pipeline("autocrop_cols", &autocrop_layout, &autocrop_module, "reduce_cols"),
        stage_layout,
        retouch_layout,
        hist_layout,
        cdf_layout,
        apply_layout,
        autocrop_layout,
    };

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(RenderError::KernelCompileError(error.to_string()));
    }
    Ok(pipelines)
}
