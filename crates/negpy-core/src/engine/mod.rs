//! The render engine: stage ordering, backend selection, tiled export, and
//! metrics delivery.
//!
//! The engine is driven from a single render worker. It owns the GPU context
//! (when available), the texture pool, and the uniform block; requests
//! arrive already coalesced. A newer request supersedes an older one at
//! stage and tile boundaries via the cancel probe.

pub mod cpu;
pub mod tiling;
pub mod worker;

#[cfg(test)]
mod tests;

use crate::calibration::{calibrate, CalibrationBounds};
use crate::decoders::ImageBuffer;
use crate::error::RenderError;
use crate::metrics::{compute_histogram, HistogramResult};
use crate::models::{ProcessMode, SizePolicy, WorkspaceConfig};
use crate::stages::layout::canvas_for;
use crate::stages::params::{
    build_normalization, build_spots, build_transform, FrameGeometry, PixelRect,
};
use crate::stages::{normalization, transform};
use tiling::{halo_for_spots, TilePlan, DEFAULT_HALO, DEFAULT_TILE_SIZE};

#[cfg(feature = "gpu")]
use crate::gpu::GpuRenderer;

/// Long edge used for the autocrop detection pass.
const AUTOCROP_DETECT_EDGE: u32 = 1200;
/// Margin pulled inside the detected frame edge, in detection pixels.
const AUTOCROP_MARGIN: u32 = 2;

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Never touch the GPU, even when one is present.
    pub disable_gpu: bool,
    /// Preview long-edge target.
    pub preview_max_edge: u32,
    /// Largest single-dispatch edge before an export is tiled.
    pub export_tile_size: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            disable_gpu: false,
            preview_max_edge: 1440,
            export_tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

/// What a request is for; selects sizing and the tiling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    Preview,
    Export,
}

/// Which backend produced a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Gpu,
}

/// A finished render. The histogram is delivered separately through
/// `take_metrics` so the preview path never waits on readback.
pub struct RenderOutput {
    pub render_id: u64,
    pub canvas: ImageBuffer,
    pub backend: BackendKind,
    pub warnings: Vec<String>,
}

/// Integer-stride box downsample to a long-edge target.
pub fn downsample_to(buffer: &ImageBuffer, max_edge: u32) -> ImageBuffer {
    let long_edge = buffer.width.max(buffer.height);
    if long_edge <= max_edge {
        return buffer.clone();
    }
    let step = long_edge.div_ceil(max_edge);
    let out_w = (buffer.width / step).max(1);
    let out_h = (buffer.height / step).max(1);
    let mut out = ImageBuffer::new(out_w, out_h);
    for y in 0..out_h {
        for x in 0..out_w {
            let mut acc = [0.0f32; 3];
            for sy in 0..step {
                for sx in 0..step {
                    let px = buffer.pixel(
                        (x * step + sx).min(buffer.width - 1),
                        (y * step + sy).min(buffer.height - 1),
                    );
                    for c in 0..3 {
                        acc[c] += px[c];
                    }
                }
            }
            let n = (step * step) as f32;
            out.set_pixel(x, y, [acc[0] / n, acc[1] / n, acc[2] / n]);
        }
    }
    out
}

pub struct RenderEngine {
    options: EngineOptions,
    source: Option<ImageBuffer>,
    bounds: Option<(ProcessMode, CalibrationBounds)>,
    next_render_id: u64,
    pending_metrics: Vec<(u64, HistogramResult)>,
    #[cfg(feature = "gpu")]
    gpu: Option<GpuRenderer>,
    #[cfg(feature = "gpu")]
    device_recreated: bool,
}

impl RenderEngine {
    pub fn new(options: EngineOptions) -> Self {
        #[cfg(feature = "gpu")]
        let gpu = if options.disable_gpu {
            None
        } else {
            match GpuRenderer::new() {
                Ok(renderer) => {
                    log::info!("GPU backend ready: {}", renderer.device_info());
                    Some(renderer)
                }
                Err(e) => {
                    log::warn!("GPU unavailable, using CPU: {}", e);
                    None
                }
            }
        };

        Self {
            options,
            source: None,
            bounds: None,
            next_render_id: 0,
            pending_metrics: Vec::new(),
            #[cfg(feature = "gpu")]
            gpu,
            #[cfg(feature = "gpu")]
            device_recreated: false,
        }
    }

    pub fn backend(&self) -> BackendKind {
        #[cfg(feature = "gpu")]
        if self.gpu.is_some() {
            return BackendKind::Gpu;
        }
        BackendKind::Cpu
    }

    /// Install a newly loaded file. Drops cached calibration and releases
    /// every pool texture before returning.
    pub fn load_source(&mut self, buffer: ImageBuffer) {
        self.source = Some(buffer);
        self.bounds = None;
        #[cfg(feature = "gpu")]
        if let Some(gpu) = &mut self.gpu {
            gpu.cleanup();
        }
    }

    pub fn source_dims(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(|s| (s.width, s.height))
    }

    /// Borrow the current source buffer.
    pub fn source(&self) -> Option<&ImageBuffer> {
        self.source.as_ref()
    }

    /// Lazily calibrate the current file for a process mode. User overrides
    /// are applied at normalization-params build time, not here.
    pub fn calibration(&mut self, mode: ProcessMode) -> Result<CalibrationBounds, RenderError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| RenderError::ConfigInvalid("no image loaded".into()))?;
        match self.bounds {
            Some((cached_mode, bounds)) if cached_mode == mode => Ok(bounds),
            _ => {
                let bounds = calibrate(source, mode, 0);
                self.bounds = Some((mode, bounds));
                Ok(bounds)
            }
        }
    }

    /// Histogram-only metric computation on an arbitrary buffer.
    pub fn compute_metrics(&self, buffer: &ImageBuffer) -> HistogramResult {
        compute_histogram(buffer)
    }

    /// Drain delivered metrics, pumping any in-flight GPU readbacks first.
    pub fn take_metrics(&mut self) -> Vec<(u64, HistogramResult)> {
        #[cfg(feature = "gpu")]
        if let Some(gpu) = &mut self.gpu {
            self.pending_metrics.extend(gpu.poll_readbacks());
        }
        std::mem::take(&mut self.pending_metrics)
    }

    /// Normalization is skipped for reversal film unless the user pinned
    /// explicit density bounds.
    fn skip_normalization(config: &WorkspaceConfig) -> bool {
        config.process_mode.is_positive()
            && config.normalization.floor.is_none()
            && config.normalization.ceiling.is_none()
    }

    /// Resolve the crop and canvas for a working buffer.
    fn resolve_frame(
        &self,
        config: &WorkspaceConfig,
        bounds: &CalibrationBounds,
        working: &ImageBuffer,
    ) -> FrameGeometry {
        let (full_w, full_h) =
            FrameGeometry::transformed_dims(&config.geometry, working.width, working.height);

        let crop = if let Some(rect) = &config.geometry.crop {
            PixelRect {
                x: (rect.x * full_w as f32).round() as u32,
                y: (rect.y * full_h as f32).round() as u32,
                width: ((rect.width * full_w as f32).round() as u32).clamp(1, full_w),
                height: ((rect.height * full_h as f32).round() as u32).clamp(1, full_h),
            }
        } else if config.geometry.keep_full_frame {
            PixelRect::full(full_w, full_h)
        } else {
            self.autocrop_rect(config, bounds, working, full_w, full_h)
        };

        let crop = PixelRect {
            x: crop.x.min(full_w - 1),
            y: crop.y.min(full_h - 1),
            width: crop.width.min(full_w - crop.x.min(full_w - 1)),
            height: crop.height.min(full_h - crop.y.min(full_h - 1)),
        };

        let (canvas_w, canvas_h, origin) =
            canvas_for(crop.width, crop.height, config.export.border.as_ref());

        FrameGeometry {
            src_width: working.width,
            src_height: working.height,
            full_width: full_w,
            full_height: full_h,
            crop,
            canvas_width: canvas_w,
            canvas_height: canvas_h,
            image_origin: origin,
        }
    }

    /// Detect the frame boundary on a small normalized render, then scale
    /// the rectangle up to the working resolution.
    fn autocrop_rect(
        &self,
        config: &WorkspaceConfig,
        bounds: &CalibrationBounds,
        working: &ImageBuffer,
        full_w: u32,
        full_h: u32,
    ) -> PixelRect {
        let small = downsample_to(working, AUTOCROP_DETECT_EDGE);
        let mut normalized = small.clone();
        normalization::run(
            &mut normalized,
            &build_normalization(config, bounds, Self::skip_normalization(config)),
        );

        let (small_w, small_h) =
            FrameGeometry::transformed_dims(&config.geometry, small.width, small.height);
        let small_frame = FrameGeometry {
            src_width: small.width,
            src_height: small.height,
            full_width: small_w,
            full_height: small_h,
            crop: PixelRect::full(small_w, small_h),
            canvas_width: small_w,
            canvas_height: small_h,
            image_origin: [0, 0],
        };
        let transformed = transform::run(
            &normalized,
            &build_transform(&config.geometry, &small_frame, [0, 0]),
            small_w,
            small_h,
        );

        // The reduction runs as a metrics kernel on the GPU when one is up;
        // the threshold walk itself is always CPU.
        #[cfg(feature = "gpu")]
        let rect = if let Some(profiles) = self
            .gpu
            .as_ref()
            .and_then(|gpu| gpu.luminance_profiles(&transformed).ok())
        {
            crate::metrics::detect(
                &profiles.0,
                &profiles.1,
                transformed.width,
                transformed.height,
                &config.geometry.aspect_ratio,
                AUTOCROP_MARGIN,
            )
        } else {
            crate::metrics::autocrop(&transformed, &config.geometry.aspect_ratio, AUTOCROP_MARGIN)
        };
        #[cfg(not(feature = "gpu"))]
        let rect = crate::metrics::autocrop(
            &transformed,
            &config.geometry.aspect_ratio,
            AUTOCROP_MARGIN,
        );

        let sx = full_w as f32 / small_w as f32;
        let sy = full_h as f32 / small_h as f32;
        PixelRect {
            x: ((rect.x as f32 * sx) as u32).min(full_w - 1),
            y: ((rect.y as f32 * sy) as u32).min(full_h - 1),
            width: ((rect.width as f32 * sx) as u32).clamp(1, full_w),
            height: ((rect.height as f32 * sy) as u32).clamp(1, full_h),
        }
    }

    /// Render a request. Returns Ok(None) when superseded by the cancel
    /// probe at a stage or tile boundary.
    pub fn render(
        &mut self,
        config: &WorkspaceConfig,
        kind: RenderKind,
        cancel: &dyn Fn() -> bool,
    ) -> Result<Option<RenderOutput>, RenderError> {
        config.validate()?;
        let bounds = self.calibration(config.process_mode)?;
        let render_id = self.next_render_id;
        self.next_render_id += 1;

        let mut warnings = Vec::new();
        if bounds.degenerate {
            warnings.push("calibration degenerate; using synthetic density bounds".to_string());
        }

        let source = self.source.as_ref().unwrap();
        let working = match kind {
            RenderKind::Preview => downsample_to(source, self.options.preview_max_edge),
            RenderKind::Export => self.export_sized(source, config),
        };

        let frame = self.resolve_frame(config, &bounds, &working);
        let skip_norm = Self::skip_normalization(config);

        let spots = build_spots(&config.retouch.spots, &frame);
        let halo = halo_for_spots(&spots, DEFAULT_HALO);
        let plan = match kind {
            RenderKind::Preview => TilePlan::single(frame.full_width, frame.full_height),
            RenderKind::Export => TilePlan::for_dims(
                frame.full_width,
                frame.full_height,
                self.options.export_tile_size,
                halo,
            ),
        };

        #[cfg(feature = "gpu")]
        if self.gpu.is_some() {
            match self.render_gpu(&working, config, &bounds, &frame, plan.clone(), kind, skip_norm, render_id, cancel)
            {
                Ok(result) => {
                    return Ok(result.map(|canvas| RenderOutput {
                        render_id,
                        canvas,
                        backend: BackendKind::Gpu,
                        warnings,
                    }))
                }
                Err(e) => {
                    log::warn!("GPU render failed ({}), falling back to CPU", e);
                    warnings.push(format!("gpu fallback: {}", e.kind()));
                }
            }
        }

        match cpu::render(&working, config, &bounds, &frame, &plan, skip_norm, cancel)? {
            Some(result) => {
                self.pending_metrics.push((render_id, result.histogram));
                Ok(Some(RenderOutput {
                    render_id,
                    canvas: result.canvas,
                    backend: BackendKind::Cpu,
                    warnings,
                }))
            }
            None => Ok(None),
        }
    }

    /// Pick the export working resolution from the size policy.
    fn export_sized(&self, source: &ImageBuffer, config: &WorkspaceConfig) -> ImageBuffer {
        match config.export.size {
            SizePolicy::Original => source.clone(),
            SizePolicy::PrintCm(cm) => {
                let target_px =
                    (cm / 2.54 * config.export.dpi as f32).round().max(64.0) as u32;
                downsample_to(source, target_px)
            }
        }
    }

    /// GPU attempt with the recovery ladder: out-of-memory retries (smaller
    /// preview, halved export tiles, three attempts), one device
    /// recreation, then the caller falls back to CPU.
    #[cfg(feature = "gpu")]
    #[allow(clippy::too_many_arguments)]
    fn render_gpu(
        &mut self,
        working: &ImageBuffer,
        config: &WorkspaceConfig,
        bounds: &CalibrationBounds,
        frame: &FrameGeometry,
        mut plan: TilePlan,
        kind: RenderKind,
        skip_norm: bool,
        render_id: u64,
        cancel: &dyn Fn() -> bool,
    ) -> Result<Option<ImageBuffer>, RenderError> {
        let mut working = working.clone();
        let mut frame = *frame;
        let mut attempts = 0;

        loop {
            let gpu = self
                .gpu
                .as_mut()
                .ok_or_else(|| RenderError::GpuDeviceLost("no device".into()))?;
            let outcome = gpu.render(
                &working, config, bounds, &frame, &plan, skip_norm, render_id, cancel,
            );
            match outcome {
                Ok(result) => return Ok(result),
                Err(RenderError::GpuOutOfMemory(detail)) => {
                    attempts += 1;
                    if attempts > 3 {
                        return Err(RenderError::GpuOutOfMemory(detail));
                    }
                    match kind {
                        RenderKind::Preview => {
                            // Retry the preview at half size.
                            let next_edge =
                                (working.width.max(working.height) / 2).max(256);
                            working = downsample_to(&working, next_edge);
                            frame = self.resolve_frame(config, bounds, &working);
                            plan = TilePlan::single(frame.full_width, frame.full_height);
                            log::warn!("GPU out of memory; preview retried at {}px", next_edge);
                        }
                        RenderKind::Export => {
                            plan = plan
                                .halved(frame.full_width, frame.full_height)
                                .ok_or(RenderError::GpuOutOfMemory(detail.clone()))?;
                            log::warn!(
                                "GPU out of memory; export retried with {}px tiles",
                                plan.tile_size
                            );
                        }
                    }
                }
                Err(RenderError::GpuDeviceLost(detail)) => {
                    if self.device_recreated {
                        return Err(RenderError::GpuDeviceLost(detail));
                    }
                    self.device_recreated = true;
                    log::warn!("GPU device lost; recreating once");
                    self.gpu = GpuRenderer::new().ok();
                    if self.gpu.is_none() {
                        return Err(RenderError::GpuDeviceLost(detail));
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}
