//! The render worker thread.
//!
//! The UI talks to the engine through a bounded command slot: only the most
//! recent pending render request is kept, so parameter scrubbing never
//! builds a backlog. A newer request supersedes an older in-flight one at
//! the next stage or tile boundary; loads are never dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::decoders::ImageBuffer;
use crate::metrics::HistogramResult;
use crate::models::WorkspaceConfig;

use super::{EngineOptions, RenderEngine, RenderKind};

/// Events emitted by the worker. Metrics arrive after the frame they belong
/// to and are tagged with its render id; consumers drop stale ones.
#[derive(Debug)]
pub enum WorkerEvent {
    FrameReady {
        seq: u64,
        render_id: u64,
        canvas: ImageBuffer,
        warnings: Vec<String>,
    },
    MetricsUpdated {
        render_id: u64,
        histogram: HistogramResult,
    },
    RenderFailed {
        seq: u64,
        kind: &'static str,
        message: String,
    },
}

enum Command {
    Load(ImageBuffer),
    Render {
        config: Box<WorkspaceConfig>,
        kind: RenderKind,
        seq: u64,
    },
}

struct Shared {
    queue: Mutex<VecDeque<Command>>,
    wake: Condvar,
    latest_seq: AtomicU64,
    shutdown: AtomicBool,
}

pub struct RenderWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    events: Option<Receiver<WorkerEvent>>,
    next_seq: AtomicU64,
}

impl RenderWorker {
    pub fn spawn(options: EngineOptions) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            wake: Condvar::new(),
            latest_seq: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        });
        let (tx, rx) = channel();

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("negpy-render".into())
            .spawn(move || worker_loop(worker_shared, options, tx))
            .expect("failed to spawn render worker");

        Self {
            shared,
            handle: Some(handle),
            events: Some(rx),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Take the event stream. Call once, at startup.
    pub fn take_events(&mut self) -> Receiver<WorkerEvent> {
        self.events.take().expect("event receiver already taken")
    }

    /// Queue a new source image. Never coalesced away.
    pub fn load(&self, buffer: ImageBuffer) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Command::Load(buffer));
        self.shared.wake.notify_one();
    }

    /// Queue a render; any not-yet-started render request is replaced.
    pub fn submit(&self, config: WorkspaceConfig, kind: RenderKind) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.shared.latest_seq.store(seq, Ordering::SeqCst);

        let mut queue = self.shared.queue.lock().unwrap();
        queue.retain(|c| !matches!(c, Command::Render { .. }));
        queue.push_back(Command::Render {
            config: Box::new(config),
            kind,
            seq,
        });
        self.shared.wake.notify_one();
        seq
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, options: EngineOptions, events: Sender<WorkerEvent>) {
    let mut engine = RenderEngine::new(options);

    loop {
        let command = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(cmd) = queue.pop_front() {
                    break cmd;
                }
                queue = shared.wake.wait(queue).unwrap();
            }
        };

        match command {
            Command::Load(buffer) => {
                engine.load_source(buffer);
            }
            Command::Render { config, kind, seq } => {
                let cancel = || shared.latest_seq.load(Ordering::SeqCst) != seq
                    || shared.shutdown.load(Ordering::SeqCst);

                match engine.render(&config, kind, &cancel) {
                    Ok(Some(output)) => {
                        let _ = events.send(WorkerEvent::FrameReady {
                            seq,
                            render_id: output.render_id,
                            canvas: output.canvas,
                            warnings: output.warnings,
                        });
                    }
                    Ok(None) => {
                        log::debug!("render {} superseded", seq);
                    }
                    Err(e) => {
                        let _ = events.send(WorkerEvent::RenderFailed {
                            seq,
                            kind: e.kind(),
                            message: e.to_string(),
                        });
                    }
                }

                for (render_id, histogram) in engine.take_metrics() {
                    let _ = events.send(WorkerEvent::MetricsUpdated {
                        render_id,
                        histogram,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessMode;
    use std::time::Duration;

    fn gray(width: u32, height: u32, v: f32) -> ImageBuffer {
        let mut b = ImageBuffer::new(width, height);
        b.data.fill(v);
        b
    }

    fn worker() -> (RenderWorker, Receiver<WorkerEvent>) {
        let mut w = RenderWorker::spawn(EngineOptions {
            disable_gpu: true,
            ..EngineOptions::default()
        });
        let rx = w.take_events();
        (w, rx)
    }

    #[test]
    fn test_render_round_trip() {
        let (w, rx) = worker();
        w.load(gray(32, 32, 0.5));
        let mut config = WorkspaceConfig::default();
        config.process_mode = ProcessMode::E6Positive;
        let seq = w.submit(config, RenderKind::Preview);

        let event = rx.recv_timeout(Duration::from_secs(30)).unwrap();
        match event {
            WorkerEvent::FrameReady { seq: s, canvas, .. } => {
                assert_eq!(s, seq);
                assert_eq!(canvas.width, 32);
            }
            other => panic!("expected FrameReady, got {:?}", other),
        }

        // Metrics follow the frame.
        let event = rx.recv_timeout(Duration::from_secs(30)).unwrap();
        assert!(matches!(event, WorkerEvent::MetricsUpdated { .. }));
    }

    #[test]
    fn test_failure_event() {
        let (w, rx) = worker();
        // No source loaded.
        let config = WorkspaceConfig::default();
        w.submit(config, RenderKind::Preview);
        let event = rx.recv_timeout(Duration::from_secs(30)).unwrap();
        match event {
            WorkerEvent::RenderFailed { kind, .. } => assert_eq!(kind, "ConfigInvalid"),
            other => panic!("expected RenderFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_coalescing_keeps_latest() {
        let (w, rx) = worker();
        w.load(gray(64, 64, 0.5));

        // Flood with requests; only a suffix (at minimum the last) may
        // complete, and the last must always complete.
        let mut config = WorkspaceConfig::default();
        config.process_mode = ProcessMode::E6Positive;
        let mut last = 0;
        for i in 0..20 {
            let mut c = config.clone();
            c.exposure.density = 0.3 + 0.01 * i as f32;
            last = w.submit(c, RenderKind::Preview);
        }

        let mut frames = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(60);
        while std::time::Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(WorkerEvent::FrameReady { seq, .. }) => {
                    frames.push(seq);
                    if seq == last {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) if !frames.is_empty() => break,
                Err(_) => {}
            }
        }
        assert!(frames.contains(&last), "latest request never completed: {:?}", frames);
        // Monotonically increasing: an older frame never lands after a
        // newer one.
        for pair in frames.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
