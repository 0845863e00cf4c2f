//! Keyed pool of intermediate textures.
//!
//! Stage outputs for a given resolution are reused across renders instead
//! of being reallocated every frame. The pool is the sole strong owner of
//! its textures; stages and the engine hold `Arc` handles for the duration
//! of a dispatch chain, and an entry is only destroyed when no handle is
//! outstanding, it has aged out of the last two renders, and no submitted
//! command buffer can still reference it (sweeps run only after blocking
//! submits).

use std::sync::Arc;

use crate::error::RenderError;

/// Pool lookup key: stage label plus dimensions and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub stage: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// A pooled texture and its view.
pub struct PooledTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub key: TextureKey,
}

struct PoolEntry {
    texture: Arc<PooledTexture>,
    last_used: u64,
}

/// How many renders an idle texture survives before the sweep frees it.
const IDLE_RENDERS: u64 = 2;

pub struct TexturePool {
    device: Arc<wgpu::Device>,
    entries: Vec<PoolEntry>,
    render_index: u64,
}

impl TexturePool {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            entries: Vec::new(),
            render_index: 0,
        }
    }

    /// Start a new render generation; idle-age accounting keys off this.
    pub fn begin_render(&mut self) {
        self.render_index += 1;
    }

    /// Borrow a texture for a stage, reusing an idle entry with the same
    /// key when one exists. Allocation failures surface as GpuOutOfMemory.
    pub fn acquire(&mut self, key: TextureKey) -> Result<Arc<PooledTexture>, RenderError> {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.texture.key == key && Arc::strong_count(&e.texture) == 1)
        {
            entry.last_used = self.render_index;
            return Ok(Arc::clone(&entry.texture));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(key.stage),
            size: wgpu::Extent3d {
                width: key.width,
                height: key.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: key.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::GpuOutOfMemory(format!(
                "{} ({}x{}): {}",
                key.stage, key.width, key.height, error
            )));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let pooled = Arc::new(PooledTexture { texture, view, key });
        self.entries.push(PoolEntry {
            texture: Arc::clone(&pooled),
            last_used: self.render_index,
        });
        Ok(pooled)
    }

    /// Free entries with no outstanding handles that have not been used for
    /// the last two renders. Callers must only sweep after the queue has
    /// drained (submit_and_wait), so destruction cannot race an in-flight
    /// command buffer.
    pub fn sweep(&mut self) {
        let render_index = self.render_index;
        self.entries.retain(|e| {
            Arc::strong_count(&e.texture) > 1
                || render_index.saturating_sub(e.last_used) < IDLE_RENDERS
        });
    }

    /// Release everything; called when a new file is loaded.
    pub fn cleanup(&mut self) {
        self.entries.clear();
    }

    /// Number of live entries, for tests and debug logging.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
