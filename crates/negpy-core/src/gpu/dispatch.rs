//! GPU render orchestration.
//!
//! Mirrors the CPU executor stage-for-stage: Normalization on the source,
//! then per-tile Transform through Toning with per-tile uniform slices, the
//! shared CLAHE histogram context across tiles, GPU layout and histogram on
//! the single-tile path, and CPU assembly for tiled exports. Submits are
//! blocking per tile; the one asynchronous point is the histogram readback.

use bytemuck::{Pod, Zeroable};
use std::sync::mpsc::channel;
use std::sync::Arc;

use crate::calibration::CalibrationBounds;
use crate::decoders::ImageBuffer;
use crate::engine::tiling::TilePlan;
use crate::error::RenderError;
use crate::metrics::{compute_histogram, HistogramResult};
use crate::models::WorkspaceConfig;
use crate::stages::params::{
    build_clahe, build_exposure, build_lab, build_layout, build_normalization, build_retouch,
    build_spots, build_toning, build_transform, FrameGeometry, SpotRecord, CLAHE_BINS, CLAHE_GRID,
};
use crate::stages::{layout as layout_stage, StageKind};

use super::context::GpuContext;
use super::pool::{PooledTexture, TextureKey, TexturePool};
use super::readback::ReadbackQueue;
use super::uniforms::UniformBlock;

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const WORKGROUP_EDGE: u32 = 8;

/// Uniforms for the metrics histogram kernel (not a pipeline stage, so it
/// carries its own small buffer instead of a block slice).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MetricsParams {
    origin: [i32; 2],
    width: u32,
    height: u32,
}

pub struct GpuRenderer {
    ctx: GpuContext,
    pool: TexturePool,
    uniforms: UniformBlock,
    clahe_hist: wgpu::Buffer,
    clahe_cdf: wgpu::Buffer,
    metrics: wgpu::Buffer,
    readbacks: ReadbackQueue,
}

impl GpuRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let ctx = GpuContext::new()?;
        let device = Arc::clone(&ctx.device);
        let queue = Arc::clone(&ctx.queue);

        let cells = (CLAHE_GRID * CLAHE_GRID * CLAHE_BINS) as u64;
        let clahe_hist = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("clahe_hist"),
            size: cells * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let clahe_cdf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("clahe_cdf"),
            size: cells * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let metrics = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("metrics_hist"),
            size: 4 * 256 * 4,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            pool: TexturePool::new(device),
            uniforms: UniformBlock::new(&ctx.device, queue),
            ctx,
            clahe_hist,
            clahe_cdf,
            metrics,
            readbacks: ReadbackQueue::default(),
        })
    }

    pub fn device_info(&self) -> String {
        let info = self.ctx.adapter_info();
        format!("{} ({:?})", info.name, info.backend)
    }

    /// Release pool entries and drop in-flight readbacks (file change).
    pub fn cleanup(&mut self) {
        self.readbacks.clear();
        self.pool.cleanup();
    }

    /// Drain completed histogram readbacks.
    pub fn poll_readbacks(&mut self) -> Vec<(u64, HistogramResult)> {
        self.readbacks.poll(&self.ctx.device)
    }

    fn workgroups(edge: u32) -> u32 {
        edge.div_ceil(WORKGROUP_EDGE)
    }

    fn upload_source(&mut self, buffer: &ImageBuffer) -> Result<Arc<PooledTexture>, RenderError> {
        let texture = self.pool.acquire(TextureKey {
            stage: "source",
            width: buffer.width,
            height: buffer.height,
            format: FORMAT,
        })?;

        // Expand RGB to the RGBA texel layout.
        let mut rgba = vec![0.0f32; (buffer.width * buffer.height * 4) as usize];
        for (dst, src) in rgba.chunks_exact_mut(4).zip(buffer.data.chunks_exact(3)) {
            dst[..3].copy_from_slice(src);
            dst[3] = 1.0;
        }
        self.ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&rgba),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(buffer.width * 16),
                rows_per_image: Some(buffer.height),
            },
            wgpu::Extent3d {
                width: buffer.width,
                height: buffer.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(texture)
    }

    /// Synchronous read of a texture region into an interleaved RGB buffer.
    fn read_region(
        &self,
        texture: &PooledTexture,
        origin: [u32; 2],
        width: u32,
        height: u32,
    ) -> Result<ImageBuffer, RenderError> {
        let padded_row = (width * 16 + 255) & !255;
        self.ctx
            .device
            .push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let staging = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("region_staging"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(e) = pollster::block_on(self.ctx.device.pop_error_scope()) {
            return Err(RenderError::GpuOutOfMemory(e.to_string()));
        }

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("region_readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: origin[0],
                    y: origin[1],
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?
            .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?;

        let mut out = ImageBuffer::new(width, height);
        {
            let view = slice.get_mapped_range();
            for y in 0..height {
                let row_start = (y * padded_row) as usize;
                let row: &[f32] =
                    bytemuck::cast_slice(&view[row_start..row_start + (width * 16) as usize]);
                for x in 0..width {
                    let i = (x * 4) as usize;
                    out.set_pixel(x, y, [row[i], row[i + 1], row[i + 2]]);
                }
            }
        }
        staging.unmap();
        Ok(out)
    }

    fn stage_bind_group(
        &self,
        stage: StageKind,
        input: &PooledTexture,
        output: &PooledTexture,
    ) -> wgpu::BindGroup {
        self.ctx
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(stage.label()),
                layout: &self.ctx.pipelines.stage_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&input.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&output.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.uniforms.binding(stage),
                    },
                ],
            })
    }

    fn acquire(
        &mut self,
        stage: &'static str,
        width: u32,
        height: u32,
    ) -> Result<Arc<PooledTexture>, RenderError> {
        self.pool.acquire(TextureKey {
            stage,
            width,
            height,
            format: FORMAT,
        })
    }

    /// Row/column Rec.709 luminance means for autocrop, computed with the
    /// reduction kernels.
    pub fn luminance_profiles(
        &self,
        buffer: &ImageBuffer,
    ) -> Result<(Vec<f32>, Vec<f32>), RenderError> {
        let device = &self.ctx.device;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("autocrop_src"),
            size: wgpu::Extent3d {
                width: buffer.width,
                height: buffer.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let mut rgba = vec![0.0f32; (buffer.width * buffer.height * 4) as usize];
        for (dst, src) in rgba.chunks_exact_mut(4).zip(buffer.data.chunks_exact(3)) {
            dst[..3].copy_from_slice(src);
            dst[3] = 1.0;
        }
        self.ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&rgba),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(buffer.width * 16),
                rows_per_image: Some(buffer.height),
            },
            wgpu::Extent3d {
                width: buffer.width,
                height: buffer.height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let make_buffer = |label: &str, len: u32| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: len as u64 * 4,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let rows_buf = make_buffer("autocrop_rows", buffer.height);
        let cols_buf = make_buffer("autocrop_cols", buffer.width);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("autocrop"),
            layout: &self.ctx.pipelines.autocrop_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: rows_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: cols_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("autocrop_reduce"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("autocrop_reduce"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.ctx.pipelines.autocrop_rows);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(buffer.height.div_ceil(64), 1, 1);
            pass.set_pipeline(&self.ctx.pipelines.autocrop_cols);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(buffer.width.div_ceil(64), 1, 1);
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let rows = read_f32_buffer(&self.ctx, &rows_buf, buffer.height as usize)?;
        let cols = read_f32_buffer(&self.ctx, &cols_buf, buffer.width as usize)?;
        let rows = rows.iter().map(|s| s / buffer.width as f32).collect();
        let cols = cols.iter().map(|s| s / buffer.height as f32).collect();
        Ok((rows, cols))
    }

    /// Execute a full render. Returns Ok(None) when superseded.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        working: &ImageBuffer,
        config: &WorkspaceConfig,
        bounds: &CalibrationBounds,
        frame: &FrameGeometry,
        plan: &TilePlan,
        skip_normalization: bool,
        render_id: u64,
        cancel: &dyn Fn() -> bool,
    ) -> Result<Option<ImageBuffer>, RenderError> {
        self.pool.begin_render();

        let source = self.upload_source(working)?;
        let normalized = self.acquire("normalization", working.width, working.height)?;

        self.uniforms.write(
            StageKind::Normalization,
            &build_normalization(config, bounds, skip_normalization),
        );
        let bind = self.stage_bind_group(StageKind::Normalization, &source, &normalized);
        let mut encoder =
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("normalization"),
                });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("normalization"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.ctx.pipelines.normalization);
            pass.set_bind_group(0, &bind, &[]);
            pass.dispatch_workgroups(
                Self::workgroups(working.width),
                Self::workgroups(working.height),
                1,
            );
        }
        self.ctx.submit_and_wait(encoder);
        drop(source);

        if cancel() {
            self.pool.sweep();
            return Ok(None);
        }

        let spots = build_spots(&config.retouch.spots, frame);
        let spot_buffer = self.spot_buffer(&spots);
        let clahe_on = config.lab.clahe_strength > 0.0;

        if clahe_on {
            let zeros = vec![0u32; (CLAHE_GRID * CLAHE_GRID * CLAHE_BINS) as usize];
            self.ctx
                .queue
                .write_buffer(&self.clahe_hist, 0, bytemuck::cast_slice(&zeros));

            // Analyze pass: accumulate the full-image histogram, then build
            // per-cell CDFs once for the whole render.
            for tile in &plan.tiles {
                if cancel() {
                    self.pool.sweep();
                    return Ok(None);
                }
                self.run_tile(
                    config,
                    frame,
                    &normalized,
                    &spot_buffer,
                    spots.len(),
                    tile,
                    TilePass::Analyze,
                )?;
            }
            self.build_cdf(config, frame)?;
        }

        let single_tile = plan.tiles.len() == 1;
        let mut toned_full: Option<ImageBuffer> = if single_tile {
            None
        } else {
            Some(ImageBuffer::new(frame.full_width, frame.full_height))
        };
        let mut toned_texture: Option<Arc<PooledTexture>> = None;

        for tile in &plan.tiles {
            if cancel() {
                self.pool.sweep();
                return Ok(None);
            }
            let toned = self.run_tile(
                config,
                frame,
                &normalized,
                &spot_buffer,
                spots.len(),
                tile,
                TilePass::Produce { clahe: clahe_on },
            )?;
            let toned = toned.expect("produce pass returns the toned texture");

            if let Some(full) = &mut toned_full {
                let interior = tile.interior_origin();
                let piece = self.read_region(
                    &toned,
                    [interior[0] as u32, interior[1] as u32],
                    tile.width,
                    tile.height,
                )?;
                for y in 0..tile.height {
                    for x in 0..tile.width {
                        full.set_pixel(tile.x + x, tile.y + y, piece.pixel(x, y));
                    }
                }
            } else {
                toned_texture = Some(toned);
            }
        }

        let canvas = if let Some(toned) = toned_texture {
            // Single-tile path: layout and metrics stay on the GPU and the
            // histogram is read back asynchronously.
            let canvas_tex = self.acquire("layout", frame.canvas_width, frame.canvas_height)?;
            self.uniforms
                .write(StageKind::Layout, &build_layout(config, frame));
            let bind = self.stage_bind_group(StageKind::Layout, &toned, &canvas_tex);

            let zeros = [0u32; 4 * 256];
            self.ctx
                .queue
                .write_buffer(&self.metrics, 0, bytemuck::cast_slice(&zeros));
            let metrics_params = MetricsParams {
                origin: [frame.crop.x as i32, frame.crop.y as i32],
                width: frame.crop.width,
                height: frame.crop.height,
            };
            let metrics_uniform = create_uniform(&self.ctx.device, &metrics_params);
            let metrics_bind = self
                .ctx
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("metrics"),
                    layout: &self.ctx.pipelines.hist_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&toned.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: self.metrics.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: metrics_uniform.as_entire_binding(),
                        },
                    ],
                });

            let staging = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("metrics_staging"),
                size: 4 * 256 * 4,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let mut encoder =
                self.ctx
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("layout_metrics"),
                    });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("layout"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.ctx.pipelines.layout);
                pass.set_bind_group(0, &bind, &[]);
                pass.dispatch_workgroups(
                    Self::workgroups(frame.canvas_width),
                    Self::workgroups(frame.canvas_height),
                    1,
                );
                pass.set_pipeline(&self.ctx.pipelines.metrics);
                pass.set_bind_group(0, &metrics_bind, &[]);
                pass.dispatch_workgroups(
                    Self::workgroups(frame.crop.width),
                    Self::workgroups(frame.crop.height),
                    1,
                );
            }
            encoder.copy_buffer_to_buffer(&self.metrics, 0, &staging, 0, 4 * 256 * 4);
            // The canvas readback below waits on this submission; the
            // histogram mapping is left pending and drained later.
            self.ctx.submit(encoder);
            self.readbacks.push_mapped(staging, render_id);

            self.read_region(
                &canvas_tex,
                [0, 0],
                frame.canvas_width,
                frame.canvas_height,
            )?
        } else {
            let toned_full = toned_full.expect("tiled path assembles on the CPU");
            let print = crate::engine::cpu::crop_of(&toned_full, &frame.crop);
            self.readbacks.push_ready(render_id, compute_histogram(&print));
            layout_stage::run(&toned_full, &build_layout(config, frame))
        };

        self.pool.sweep();
        Ok(Some(canvas))
    }

    fn spot_buffer(&self, spots: &[SpotRecord]) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        // Runtime-sized WGSL arrays reject empty bindings; keep one zeroed
        // record when there are no spots.
        let records: Vec<SpotRecord> = if spots.is_empty() {
            vec![SpotRecord {
                center: [0.0, 0.0],
                radius: 0.0,
                _pad: 0.0,
            }]
        } else {
            spots.to_vec()
        };
        self.ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("manual_spots"),
                contents: bytemuck::cast_slice(&records),
                usage: wgpu::BufferUsages::STORAGE,
            })
    }

    fn build_cdf(
        &mut self,
        config: &WorkspaceConfig,
        frame: &FrameGeometry,
    ) -> Result<(), RenderError> {
        self.uniforms.write(
            StageKind::ClaheCdf,
            &build_clahe(config, frame, [0, 0], [0, 0], 0, 0),
        );
        let bind = self
            .ctx
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("clahe_cdf"),
                layout: &self.ctx.pipelines.cdf_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.clahe_hist.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.clahe_cdf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.uniforms.binding(StageKind::ClaheCdf),
                    },
                ],
            });
        let mut encoder =
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("clahe_cdf"),
                });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("clahe_cdf"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.ctx.pipelines.clahe_cdf);
            pass.set_bind_group(0, &bind, &[]);
            pass.dispatch_workgroups(CLAHE_GRID, CLAHE_GRID, 1);
        }
        self.ctx.submit_and_wait(encoder);
        Ok(())
    }

    /// Run Transform..Lab for a tile; Analyze accumulates the CLAHE
    /// histogram, Produce continues through Toning and returns the toned
    /// texture.
    fn run_tile(
        &mut self,
        config: &WorkspaceConfig,
        frame: &FrameGeometry,
        normalized: &Arc<PooledTexture>,
        spot_buffer: &wgpu::Buffer,
        spot_count: usize,
        tile: &crate::engine::tiling::Tile,
        pass_kind: TilePass,
    ) -> Result<Option<Arc<PooledTexture>>, RenderError> {
        let (pw, ph) = (tile.padded_width, tile.padded_height);
        let offset = [tile.padded_x, tile.padded_y];

        let max_dim = self.ctx.device.limits().max_texture_dimension_2d;
        if pw > max_dim || ph > max_dim {
            return Err(RenderError::TileDispatchFailed(format!(
                "tile {}x{} exceeds device limit {}",
                pw, ph, max_dim
            )));
        }

        let transform_tex = self.acquire("transform", pw, ph)?;
        let retouch_tex = self.acquire("retouch", pw, ph)?;
        let exposure_tex = self.acquire("exposure", pw, ph)?;
        let lab_tex = self.acquire("lab", pw, ph)?;

        self.uniforms.write(
            StageKind::Transform,
            &build_transform(&config.geometry, frame, offset),
        );
        self.uniforms.write(
            StageKind::Retouch,
            &build_retouch(config, frame, offset, spot_count),
        );
        self.uniforms.write(StageKind::Exposure, &build_exposure(config));
        self.uniforms.write(StageKind::LabTools, &build_lab(config));

        let transform_bind = self.stage_bind_group(StageKind::Transform, normalized, &transform_tex);
        let retouch_bind = self
            .ctx
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("retouch"),
                layout: &self.ctx.pipelines.retouch_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&transform_tex.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&retouch_tex.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.uniforms.binding(StageKind::Retouch),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: spot_buffer.as_entire_binding(),
                    },
                ],
            });
        let exposure_bind = self.stage_bind_group(StageKind::Exposure, &retouch_tex, &exposure_tex);
        let lab_bind = self.stage_bind_group(StageKind::LabTools, &exposure_tex, &lab_tex);

        let mut encoder =
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("tile_chain"),
                });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("tile_chain"),
                timestamp_writes: None,
            });
            let wx = Self::workgroups(pw);
            let wy = Self::workgroups(ph);
            pass.set_pipeline(&self.ctx.pipelines.transform);
            pass.set_bind_group(0, &transform_bind, &[]);
            pass.dispatch_workgroups(wx, wy, 1);
            pass.set_pipeline(&self.ctx.pipelines.retouch);
            pass.set_bind_group(0, &retouch_bind, &[]);
            pass.dispatch_workgroups(wx, wy, 1);
            pass.set_pipeline(&self.ctx.pipelines.exposure);
            pass.set_bind_group(0, &exposure_bind, &[]);
            pass.dispatch_workgroups(wx, wy, 1);
            pass.set_pipeline(&self.ctx.pipelines.lab);
            pass.set_bind_group(0, &lab_bind, &[]);
            pass.dispatch_workgroups(wx, wy, 1);
        }

        match pass_kind {
            TilePass::Analyze => {
                let interior = tile.interior_origin();
                self.uniforms.write(
                    StageKind::ClaheHist,
                    &build_clahe(config, frame, offset, interior, tile.width, tile.height),
                );
                let hist_bind = self
                    .ctx
                    .device
                    .create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("clahe_hist"),
                        layout: &self.ctx.pipelines.hist_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(&lab_tex.view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: self.clahe_hist.as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 2,
                                resource: self.uniforms.binding(StageKind::ClaheHist),
                            },
                        ],
                    });
                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("clahe_hist"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&self.ctx.pipelines.clahe_hist);
                    pass.set_bind_group(0, &hist_bind, &[]);
                    pass.dispatch_workgroups(
                        Self::workgroups(tile.width),
                        Self::workgroups(tile.height),
                        1,
                    );
                }
                self.ctx.submit_and_wait(encoder);
                Ok(None)
            }
            TilePass::Produce { clahe } => {
                let toned_input = if clahe {
                    let clahe_tex = self.acquire("clahe", pw, ph)?;
                    self.uniforms.write(
                        StageKind::ClaheApply,
                        &build_clahe(config, frame, offset, [0, 0], pw, ph),
                    );
                    let apply_bind = self
                        .ctx
                        .device
                        .create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some("clahe_apply"),
                            layout: &self.ctx.pipelines.apply_layout,
                            entries: &[
                                wgpu::BindGroupEntry {
                                    binding: 0,
                                    resource: wgpu::BindingResource::TextureView(&lab_tex.view),
                                },
                                wgpu::BindGroupEntry {
                                    binding: 1,
                                    resource: wgpu::BindingResource::TextureView(&clahe_tex.view),
                                },
                                wgpu::BindGroupEntry {
                                    binding: 2,
                                    resource: self.clahe_cdf.as_entire_binding(),
                                },
                                wgpu::BindGroupEntry {
                                    binding: 3,
                                    resource: self.uniforms.binding(StageKind::ClaheApply),
                                },
                            ],
                        });
                    {
                        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                            label: Some("clahe_apply"),
                            timestamp_writes: None,
                        });
                        pass.set_pipeline(&self.ctx.pipelines.clahe_apply);
                        pass.set_bind_group(0, &apply_bind, &[]);
                        pass.dispatch_workgroups(Self::workgroups(pw), Self::workgroups(ph), 1);
                    }
                    clahe_tex
                } else {
                    lab_tex
                };

                let toned_tex = self.acquire("toning", pw, ph)?;
                self.uniforms.write(StageKind::Toning, &build_toning(config));
                let toning_bind =
                    self.stage_bind_group(StageKind::Toning, &toned_input, &toned_tex);
                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("toning"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&self.ctx.pipelines.toning);
                    pass.set_bind_group(0, &toning_bind, &[]);
                    pass.dispatch_workgroups(Self::workgroups(pw), Self::workgroups(ph), 1);
                }
                self.ctx.submit_and_wait(encoder);
                Ok(Some(toned_tex))
            }
        }
    }
}

#[derive(Clone, Copy)]
enum TilePass {
    Analyze,
    Produce { clahe: bool },
}

fn create_uniform<T: Pod>(device: &wgpu::Device, data: &T) -> wgpu::Buffer {
    use wgpu::util::DeviceExt;
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("small_uniform"),
        contents: bytemuck::bytes_of(data),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

fn read_f32_buffer(
    ctx: &GpuContext,
    buffer: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<f32>, RenderError> {
    let size = (count * 4) as u64;
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("f32_staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("f32_readback"),
        });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?
        .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?;

    let data = slice.get_mapped_range();
    let out: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();
    Ok(out)
}
