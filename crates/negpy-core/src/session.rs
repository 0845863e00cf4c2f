//! The renderer facade.
//!
//! A `Session` owns the engine state for one open file and is the only
//! entry point the UI shell and the CLI use: `render_preview`,
//! `render_export`, `compute_metrics`. There is no process-wide mutable
//! state; everything lives in the session value.

use std::path::Path;

use crate::calibration::SuggestedExposure;
use crate::decoders::{FileLoader, ImageBuffer, ImageLoader};
use crate::engine::{EngineOptions, RenderEngine, RenderKind, RenderOutput};
use crate::error::RenderError;
use crate::exporters;
use crate::fingerprint::FileFingerprint;
use crate::metrics::HistogramResult;
use crate::models::WorkspaceConfig;
use crate::store::{IccProvider, NoopIccProvider};

/// Session construction options.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub disable_gpu: bool,
    pub preview_max_edge: Option<u32>,
}

/// An 8-bit preview frame, quantized from the print-intensity canvas and
/// tagged sRGB for display.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub render_id: u64,
}

/// Events surfaced to the caller between renders.
#[derive(Debug)]
pub enum SessionEvent {
    MetricsUpdated {
        render_id: u64,
        histogram: HistogramResult,
    },
    RenderFailed {
        kind: &'static str,
        message: String,
    },
    Warning(String),
}

pub struct Session {
    engine: RenderEngine,
    icc: Box<dyn IccProvider>,
    events: Vec<SessionEvent>,
    fingerprint: Option<FileFingerprint>,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let mut engine_options = EngineOptions {
            disable_gpu: options.disable_gpu,
            ..EngineOptions::default()
        };
        if let Some(edge) = options.preview_max_edge {
            engine_options.preview_max_edge = edge;
        }
        Self {
            engine: RenderEngine::new(engine_options),
            icc: Box::new(NoopIccProvider),
            events: Vec::new(),
            fingerprint: None,
        }
    }

    /// Install an ICC provider (the desktop shell passes its profile set).
    pub fn with_icc_provider(mut self, icc: Box<dyn IccProvider>) -> Self {
        self.icc = icc;
        self
    }

    /// Load a file with the built-in loader, fingerprinting it for the edit
    /// store.
    pub fn open_path(&mut self, path: &Path) -> Result<FileFingerprint, RenderError> {
        let loader = FileLoader;
        let loaded = loader.load(path)?;
        let fingerprint = FileFingerprint::from_path(path)
            .map_err(RenderError::PersistenceFailed)?;
        self.engine.load_source(loaded.buffer);
        self.fingerprint = Some(fingerprint);
        Ok(fingerprint)
    }

    /// Install an already-decoded buffer (RAW loaders live outside the
    /// core).
    pub fn open_buffer(&mut self, buffer: ImageBuffer, fingerprint: Option<FileFingerprint>) {
        self.engine.load_source(buffer);
        self.fingerprint = fingerprint;
    }

    pub fn fingerprint(&self) -> Option<&FileFingerprint> {
        self.fingerprint.as_ref()
    }

    /// Suggested exposure settings for the current file.
    pub fn solve_exposure(
        &mut self,
        config: &WorkspaceConfig,
    ) -> Result<SuggestedExposure, RenderError> {
        let bounds = self.engine.calibration(config.process_mode)?;
        let source = self
            .engine
            .source()
            .ok_or_else(|| RenderError::ConfigInvalid("no image loaded".into()))?;
        Ok(crate::calibration::solve_exposure(source, &bounds))
    }

    /// Render a display preview. On failure a 1x1 placeholder is returned
    /// and a `RenderFailed` event is queued; the histogram follows through
    /// `poll_events`.
    pub fn render_preview(&mut self, config: &WorkspaceConfig) -> PreviewFrame {
        match self.engine.render(config, RenderKind::Preview, &|| false) {
            Ok(Some(output)) => self.preview_from(output),
            Ok(None) => PreviewFrame {
                width: 1,
                height: 1,
                pixels: vec![0, 0, 0],
                render_id: 0,
            },
            Err(e) => {
                self.events.push(SessionEvent::RenderFailed {
                    kind: e.kind(),
                    message: e.to_string(),
                });
                PreviewFrame {
                    width: 1,
                    height: 1,
                    pixels: vec![0, 0, 0],
                    render_id: 0,
                }
            }
        }
    }

    fn preview_from(&mut self, output: RenderOutput) -> PreviewFrame {
        for warning in &output.warnings {
            self.events.push(SessionEvent::Warning(warning.clone()));
        }
        PreviewFrame {
            width: output.canvas.width,
            height: output.canvas.height,
            pixels: exporters::to_rgb8(&output.canvas),
            render_id: output.render_id,
        }
    }

    /// Render and encode the final print. Typed error on failure.
    pub fn render_export(&mut self, config: &WorkspaceConfig) -> Result<Vec<u8>, RenderError> {
        let output = self
            .engine
            .render(config, RenderKind::Export, &|| false)?
            .expect("uncancellable export returned None");
        for warning in &output.warnings {
            self.events.push(SessionEvent::Warning(warning.clone()));
        }
        exporters::encode(
            &output.canvas,
            config.export.format,
            config.export.color_space,
            self.icc.as_ref(),
        )
        .map_err(RenderError::PersistenceFailed)
    }

    /// Standalone histogram computation.
    pub fn compute_metrics(&self, buffer: &ImageBuffer) -> HistogramResult {
        self.engine.compute_metrics(buffer)
    }

    /// Drain queued events, including asynchronously delivered histograms.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        for (render_id, histogram) in self.engine.take_metrics() {
            self.events.push(SessionEvent::MetricsUpdated {
                render_id,
                histogram,
            });
        }
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessMode;

    fn gray(width: u32, height: u32, v: f32) -> ImageBuffer {
        let mut b = ImageBuffer::new(width, height);
        b.data.fill(v);
        b
    }

    fn cpu_session() -> Session {
        Session::new(SessionOptions {
            disable_gpu: true,
            preview_max_edge: Some(512),
        })
    }

    #[test]
    fn test_preview_and_metrics_flow() {
        let mut session = cpu_session();
        session.open_buffer(gray(64, 64, 0.5), None);

        let mut config = WorkspaceConfig::default();
        config.process_mode = ProcessMode::E6Positive;

        let frame = session.render_preview(&config);
        assert_eq!((frame.width, frame.height), (64, 64));
        assert!(frame.pixels.iter().all(|&p| p == 128));

        let events = session.poll_events();
        let metrics = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::MetricsUpdated {
                    render_id,
                    histogram,
                } => Some((render_id, histogram)),
                _ => None,
            })
            .expect("metrics event");
        assert_eq!(*metrics.0, frame.render_id);
        assert_eq!(metrics.1.luma[128] as usize, 64 * 64);
    }

    #[test]
    fn test_failed_preview_returns_placeholder() {
        let mut session = cpu_session();
        let config = WorkspaceConfig::default();
        let frame = session.render_preview(&config);
        assert_eq!((frame.width, frame.height), (1, 1));

        let events = session.poll_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::RenderFailed { kind, .. } if *kind == "ConfigInvalid")));
    }

    #[test]
    fn test_export_produces_tiff_bytes() {
        let mut session = cpu_session();
        session.open_buffer(gray(32, 32, 0.5), None);
        let mut config = WorkspaceConfig::default();
        config.process_mode = ProcessMode::E6Positive;
        let bytes = session.render_export(&config).unwrap();
        // Little-endian TIFF magic.
        assert_eq!(&bytes[..2], b"II");
    }

    #[test]
    fn test_export_error_is_typed() {
        let mut session = cpu_session();
        let config = WorkspaceConfig::default();
        match session.render_export(&config) {
            Err(RenderError::ConfigInvalid(_)) => {}
            other => panic!("expected ConfigInvalid, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_open_path_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.tif");
        let file = std::fs::File::create(&path).unwrap();
        let mut encoder =
            tiff::encoder::TiffEncoder::new(std::io::BufWriter::new(file)).unwrap();
        let data = vec![20000u16; 4 * 4 * 3];
        encoder
            .write_image::<tiff::encoder::colortype::RGB16>(4, 4, &data)
            .unwrap();
        drop(encoder);

        let mut session = cpu_session();
        let fp = session.open_path(&path).unwrap();
        assert_eq!(fp, FileFingerprint::from_path(&path).unwrap());
        assert_eq!(session.fingerprint(), Some(&fp));
    }
}
