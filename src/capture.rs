//! This module contains the driver-facing half of the capture.

// The driver calls us once per filled buffer on its own thread, and that thread has
// to get back to the USB transfers as fast as possible. So we do one thing: copy the
// bytes into a chunk, hand it to the capture buffer, and return. Everything slow
// happens on the writer thread.

use tracing::{debug, trace};

use crate::{
    buffer::{CaptureBuffer, SampleChunk},
    control::StopSignal,
    device::{CancelHandle, ChunkSink},
    monitoring::CaptureStats,
};

/// Bridges driver callbacks into the [`CaptureBuffer`]
pub struct Producer<'a> {
    buffer: &'a CaptureBuffer,
    stats: &'a CaptureStats,
    stop: &'a StopSignal,
    cancel: CancelHandle,
    chunks: u64,
}

impl<'a> Producer<'a> {
    pub fn new(
        buffer: &'a CaptureBuffer,
        stats: &'a CaptureStats,
        stop: &'a StopSignal,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            buffer,
            stats,
            stop,
            cancel,
            chunks: 0,
        }
    }

    /// Chunks accepted into the buffer so far
    pub fn chunks(&self) -> u64 {
        self.chunks
    }
}

impl ChunkSink for Producer<'_> {
    fn deliver(&mut self, bytes: &[u8]) {
        if self.stop.is_set() {
            if !self.cancel.is_cancelled() {
                debug!(reason = ?self.stop.reason(), "Stop requested, cancelling device stream");
                self.cancel.request_cancel();
            }
            return;
        }
        let chunk = SampleChunk::from(bytes);
        self.stats.add_samples(chunk.samples() as u64);
        let depth = self.buffer.push(chunk);
        self.chunks += 1;
        trace!(len = bytes.len(), depth, "Queued chunk");
    }
}
