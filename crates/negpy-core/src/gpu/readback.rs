//! Asynchronous metrics readback.
//!
//! The preview path never blocks on the histogram: the engine copies the
//! metrics buffer into a staging buffer, posts the map request, and returns
//! the frame. The mapped data is drained later from the worker, tagged with
//! the render id it belongs to so stale results can be dropped upstream.

use std::sync::mpsc::{channel, Receiver};

use crate::metrics::{HistogramResult, HISTOGRAM_BINS};

struct Pending {
    staging: wgpu::Buffer,
    render_id: u64,
    rx: Receiver<Result<(), wgpu::BufferAsyncError>>,
}

#[derive(Default)]
pub struct ReadbackQueue {
    pending: Vec<Pending>,
    /// Results computed synchronously (tiled exports) waiting to be drained.
    ready: Vec<(u64, HistogramResult)>,
}

impl ReadbackQueue {
    /// Register a staging buffer that already holds a copy of the metrics
    /// buffer (copy recorded and submitted by the caller).
    pub fn push_mapped(&mut self, staging: wgpu::Buffer, render_id: u64) {
        let (tx, rx) = channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        self.pending.push(Pending {
            staging,
            render_id,
            rx,
        });
    }

    /// Queue an already-computed result.
    pub fn push_ready(&mut self, render_id: u64, histogram: HistogramResult) {
        self.ready.push((render_id, histogram));
    }

    /// Drive mapping forward and collect every completed readback.
    pub fn poll(&mut self, device: &wgpu::Device) -> Vec<(u64, HistogramResult)> {
        if !self.pending.is_empty() {
            device.poll(wgpu::Maintain::Poll);
        }

        let mut done = std::mem::take(&mut self.ready);
        let mut still_pending = Vec::new();
        for entry in self.pending.drain(..) {
            match entry.rx.try_recv() {
                Ok(Ok(())) => {
                    let histogram = {
                        let view = entry.staging.slice(..).get_mapped_range();
                        let flat: &[u32] = bytemuck::cast_slice(&view);
                        HistogramResult::from_flat(&flat[..4 * HISTOGRAM_BINS])
                    };
                    entry.staging.unmap();
                    done.push((entry.render_id, histogram));
                }
                Ok(Err(e)) => {
                    log::warn!("histogram readback failed for render {}: {}", entry.render_id, e);
                }
                Err(_) => still_pending.push(entry),
            }
        }
        self.pending = still_pending;
        done
    }

    /// Drop everything (file change).
    pub fn clear(&mut self) {
        self.pending.clear();
        self.ready.clear();
    }
}
