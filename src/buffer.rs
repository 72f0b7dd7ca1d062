//! The hand-off queue between the driver thread and the writer thread.
//!
//! This is deliberately *not* a bounded ring buffer. The producer side runs on a
//! driver-owned thread, and making it wait for the disk would just move the loss down
//! into the driver where we can't see it. Instead the queue grows without bound and we
//! count every push that leaves it deeper than a soft threshold.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::monitoring::CaptureStats;

/// Interleaved I/Q, one byte each
pub const BYTES_PER_SAMPLE: usize = 2;

/// One delivery from the driver: consecutive interleaved I/Q bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleChunk {
    bytes: Box<[u8]>,
}

impl SampleChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of complex samples in this chunk
    pub fn samples(&self) -> usize {
        self.bytes.len() / BYTES_PER_SAMPLE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<&[u8]> for SampleChunk {
    fn from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl From<Vec<u8>> for SampleChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Unbounded FIFO of [`SampleChunk`]s with a soft overflow threshold
pub struct CaptureBuffer {
    tx: Sender<SampleChunk>,
    rx: Receiver<SampleChunk>,
    threshold: usize,
    stats: Arc<CaptureStats>,
    // Only used to log the start and end of an excursion past the threshold
    overflowing: AtomicBool,
}

impl CaptureBuffer {
    pub fn new(threshold: usize, stats: Arc<CaptureStats>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            threshold,
            stats,
            overflowing: AtomicBool::new(false),
        }
    }

    /// Append to the tail and wake a waiting consumer. Never blocks.
    ///
    /// Every push that leaves more than `threshold` chunks queued counts as exactly one
    /// overflow. Returns the queue depth observed right after the push.
    pub fn push(&self, chunk: SampleChunk) -> usize {
        // We hold the receiver ourselves, so the channel can't be disconnected
        let _ = self.tx.send(chunk);
        let depth = self.tx.len();
        if depth > self.threshold {
            let total = self.stats.record_overflow();
            if !self.overflowing.swap(true, Ordering::Relaxed) {
                warn!(
                    depth,
                    threshold = self.threshold,
                    total,
                    "Capture buffer above threshold, writer is falling behind"
                );
            }
        } else if self.overflowing.swap(false, Ordering::Relaxed) {
            debug!(depth, "Capture buffer back under threshold");
        }
        depth
    }

    /// Remove the oldest chunk, waiting up to `timeout` for one to arrive.
    /// `None` just means nothing showed up in time.
    pub fn pop(&self, timeout: Duration) -> Option<SampleChunk> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Racy snapshot of the queue depth. For display and accounting only.
    pub fn size(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
