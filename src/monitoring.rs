//! In this module, we implement all the monitoring logic for the capture.
//! This includes the shared counters, the live status line, and the end-of-session summary.

use std::{
    fmt,
    io::{self, Write},
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};

use crate::{
    buffer::CaptureBuffer,
    control::{StopReason, StopSignal},
};

/// Counters shared between the producer, the writer, and the reporter.
/// They only ever go up.
#[derive(Debug, Default)]
pub struct CaptureStats {
    samples_captured: AtomicU64,
    bytes_written: AtomicU64,
    overflow_count: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_samples(&self, n: u64) {
        self.samples_captured.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    /// Count one overflow event, returning the new total
    pub fn record_overflow(&self) -> u64 {
        self.overflow_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_captured: self.samples_captured(),
            bytes_written: self.bytes_written(),
            overflow_count: self.overflow_count(),
        }
    }
}

/// A point-in-time copy of [`CaptureStats`]. Fields are read independently, so the
/// three values are not a consistent cut.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub samples_captured: u64,
    pub bytes_written: u64,
    pub overflow_count: u64,
}

/// One rendering of the live status line
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
    pub queue_depth: usize,
    pub expected_samples: u64,
}

impl Progress {
    /// Percent of the expected sample count (sample rate * duration) captured so far
    pub fn percent(&self) -> f64 {
        if self.expected_samples == 0 {
            return 0.0;
        }
        self.stats.samples_captured as f64 / self.expected_samples as f64 * 100.0
    }

    /// Bytes per second reaching the sink, over the whole session so far
    pub fn throughput(&self) -> f64 {
        // Avoid the divide by zero in the first second
        let secs = self.elapsed.as_secs_f64().max(1.0);
        self.stats.bytes_written as f64 / secs
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}s] {}M samples ({:.1}%), {:.1} MB written ({:.1} MB/s), Queue: {}, Overflows: {}",
            self.elapsed.as_secs(),
            self.stats.samples_captured / 1_000_000,
            self.percent(),
            self.stats.bytes_written as f64 / 1e6,
            self.throughput() / 1e6,
            self.queue_depth,
            self.stats.overflow_count,
        )
    }
}

/// Periodically redraws a single status line. Never touches shared state.
pub struct ProgressReporter<'a> {
    pub stats: &'a CaptureStats,
    pub buffer: &'a CaptureBuffer,
    pub stop: &'a StopSignal,
    pub expected_samples: u64,
    pub interval: Duration,
}

impl ProgressReporter<'_> {
    pub fn progress(&self, started: Instant) -> Progress {
        Progress {
            elapsed: started.elapsed(),
            stats: self.stats.snapshot(),
            queue_depth: self.buffer.size(),
            expected_samples: self.expected_samples,
        }
    }

    /// Redraw the line every `interval` until the stop flag is seen
    pub fn run<W: Write>(&self, started: Instant, out: &mut W) -> io::Result<()> {
        while !self.stop.wait_timeout(self.interval) {
            // Trailing spaces wipe leftovers from a longer previous line
            write!(out, "\r{}     ", self.progress(started))?;
            out.flush()?;
        }
        writeln!(out)?;
        out.flush()
    }
}

/// What a finished session reports
#[derive(Clone, Debug)]
pub struct CaptureSummary {
    pub started: DateTime<Utc>,
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
    pub reason: Option<StopReason>,
    pub output: PathBuf,
}

impl fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "========================================";
        writeln!(f, "{}", rule)?;
        writeln!(f, "Capture complete!")?;
        writeln!(f, "  Started:   {}", self.started.format("%Y-%m-%dT%H:%M:%SZ"))?;
        writeln!(f, "  Elapsed:   {:.1} s", self.elapsed.as_secs_f64())?;
        if let Some(reason) = self.reason {
            writeln!(f, "  Stopped:   {}", reason)?;
        }
        writeln!(f, "  Samples:   {}", self.stats.samples_captured)?;
        writeln!(f, "  Written:   {:.3} MB", self.stats.bytes_written as f64 / 1e6)?;
        writeln!(f, "  Overflows: {}", self.stats.overflow_count)?;
        writeln!(f, "  Output:    {}", self.output.display())?;
        write!(f, "{}", rule)
    }
}
