//! The shared per-session uniform block.
//!
//! One persistent buffer holds every stage's parameters; each stage owns a
//! 256-byte-aligned slice addressed by its index, so slices can never
//! overlap and the buffer is written once per stage per render.

use bytemuck::Pod;
use std::num::NonZeroU64;
use std::sync::Arc;

use crate::stages::params::UNIFORM_SLICE_BYTES;
use crate::stages::{StageKind, STAGE_ORDER};

pub struct UniformBlock {
    buffer: wgpu::Buffer,
    queue: Arc<wgpu::Queue>,
}

impl UniformBlock {
    pub fn new(device: &wgpu::Device, queue: Arc<wgpu::Queue>) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stage_uniforms"),
            size: STAGE_ORDER.len() as u64 * UNIFORM_SLICE_BYTES,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, queue }
    }

    /// Write a stage's parameter struct into its slice.
    pub fn write<T: Pod>(&self, stage: StageKind, params: &T) {
        let size = std::mem::size_of::<T>() as u64;
        assert!(
            size <= UNIFORM_SLICE_BYTES,
            "{} params ({} bytes) exceed the uniform slice",
            stage.label(),
            size
        );
        self.queue
            .write_buffer(&self.buffer, stage.uniform_offset(), bytemuck::bytes_of(params));
    }

    /// Binding resource for a stage's slice.
    pub fn binding(&self, stage: StageKind) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: stage.uniform_offset(),
            size: NonZeroU64::new(UNIFORM_SLICE_BYTES),
        })
    }
}
