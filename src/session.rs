//! Ties the pieces together into one capture run:
//!
//! ```text
//! INIT -> CONFIGURED -> RUNNING -> STOPPING -> STOPPED
//!    \          \
//!     `----------`--> FAILED
//! ```
//!
//! While RUNNING there are four threads. The driver thread (our caller, blocked in
//! `read_async`) feeds the [`Producer`], the writer drains into the sink, the timer waits
//! out the duration, and the reporter redraws the status line. They only talk through
//! the capture buffer and the stop flag.

use std::{
    io,
    panic,
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    buffer::{CaptureBuffer, BYTES_PER_SAMPLE},
    capture::Producer,
    control::{duration_timer, StopReason, StopSignal},
    device::{DeviceList, SdrDevice},
    error::{CaptureError, DeviceError, Result},
    exfil::{drain_to_sink, open_sink, Sink, POP_TIMEOUT},
    monitoring::{CaptureStats, CaptureSummary, ProgressReporter},
};

/// Everything fixed at session start
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub device_index: u32,
    /// Hz
    pub frequency: u32,
    /// Complex samples per second
    pub sample_rate: u32,
    /// Tenths of a dB
    pub gain: i32,
    pub duration: Duration,
    pub output: PathBuf,
    /// Bytes per driver buffer
    pub buffer_size: u32,
    /// Driver buffers in flight
    pub buffer_count: u32,
    /// Queue depth above which pushes count as overflows
    pub overflow_threshold: usize,
    /// `None` disables the live status line
    pub status_interval: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            frequency: crate::DEFAULT_FREQUENCY,
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            gain: crate::DEFAULT_GAIN,
            duration: Duration::from_secs(crate::DEFAULT_DURATION_SECS),
            output: PathBuf::new(),
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
            buffer_count: crate::DEFAULT_BUFFER_COUNT,
            overflow_threshold: crate::DEFAULT_OVERFLOW_THRESHOLD,
            status_interval: Some(Duration::from_secs(1)),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        let missing = |what: &str| Err(CaptureError::Configuration(what.to_owned()));
        if self.output.as_os_str().is_empty() {
            return missing("output file required (-o)");
        }
        if self.sample_rate == 0 {
            return missing("sample rate must be nonzero");
        }
        if self.duration.is_zero() {
            return missing("duration must be nonzero");
        }
        if self.buffer_size == 0 || self.buffer_count == 0 {
            return missing("buffer size and count must be nonzero");
        }
        if self.buffer_size as usize % BYTES_PER_SAMPLE != 0 {
            return missing("buffer size must hold whole I/Q samples (even byte count)");
        }
        Ok(())
    }

    /// Samples we'd see if the whole duration ran at the configured rate
    pub fn expected_samples(&self) -> u64 {
        (self.sample_rate as f64 * self.duration.as_secs_f64()) as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    /// Device and sink are open
    Configured,
    Running,
    /// Stop observed, writer draining what's left
    Stopping,
    /// Sink and device closed
    Stopped,
    /// Never made it to RUNNING
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

pub struct CaptureSession {
    config: SessionConfig,
    stop: StopSignal,
    state: SessionState,
}

impl CaptureSession {
    /// `stop` is shared with whoever else may end the session (the interrupt handler)
    pub fn new(config: SessionConfig, stop: StopSignal) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stop,
            state: SessionState::Init,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        info!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: CaptureError) -> CaptureError {
        self.transition(SessionState::Failed);
        err
    }

    /// Open the device and the output file, then capture until stopped
    pub fn start(&mut self, devices: &DeviceList) -> Result<CaptureSummary> {
        let mut device = self
            .open_device(devices)
            .map_err(|e| self.fail(CaptureError::DeviceUnavailable(e)))?;
        let sink = match open_sink(&self.config.output) {
            Ok(sink) => sink,
            Err(e) => {
                self.stop.trigger(StopReason::Fatal);
                // Dropping the device closes it
                return Err(self.fail(e));
            }
        };
        self.run(device.as_mut(), sink)
    }

    fn open_device(
        &self,
        devices: &DeviceList,
    ) -> std::result::Result<Box<dyn SdrDevice>, DeviceError> {
        let count = devices.len();
        if count == 0 {
            return Err(DeviceError::NoDevices);
        }
        info!("Found {} SDR device(s)", count);
        let mut device = devices.open(self.config.device_index)?;
        info!(
            "Using device {}: {}",
            self.config.device_index,
            device.info().name
        );
        self.configure(device.as_mut())?;
        Ok(device)
    }

    fn configure(&self, device: &mut dyn SdrDevice) -> std::result::Result<(), DeviceError> {
        let c = &self.config;
        info!(
            "Configuration: {} MHz, {} MS/s, {} dB gain, {} s, output {}",
            c.frequency as f64 / 1e6,
            c.sample_rate as f64 / 1e6,
            c.gain as f64 / 10.0,
            c.duration.as_secs_f64(),
            c.output.display()
        );
        device.set_sample_rate(c.sample_rate)?;
        device.set_center_frequency(c.frequency)?;
        device.set_gain_mode(true)?;
        device.set_gain(c.gain)?;
        device.reset_buffer()?;
        info!(
            "Actual settings: {} MHz, {} MS/s, {} dB gain",
            device.center_frequency() as f64 / 1e6,
            device.sample_rate() as f64 / 1e6,
            device.gain() as f64 / 10.0
        );
        Ok(())
    }

    /// Run the pipeline on an already opened and tuned device, then close both ends.
    /// Blocks the calling thread inside the device's `read_async`.
    pub fn run<S: Sink>(
        &mut self,
        device: &mut dyn SdrDevice,
        mut sink: S,
    ) -> Result<CaptureSummary> {
        self.transition(SessionState::Configured);

        let config = self.config.clone();
        let stop = self.stop.clone();
        let stats = Arc::new(CaptureStats::new());
        let buffer = CaptureBuffer::new(config.overflow_threshold, stats.clone());
        // The writer may only quit once the driver has returned, otherwise a chunk pushed
        // between its last look at the buffer and the stop could be left behind
        let producer_done = StopSignal::new();
        let mut producer = Producer::new(&buffer, &stats, &stop, device.cancel_handle());

        let started_utc = Utc::now();
        let started = Instant::now();
        info!(
            "Starting capture at {}",
            started_utc.format("%Y-%m-%d-%H:%M:%S")
        );
        self.transition(SessionState::Running);

        let (write_result, stream_result) = thread::scope(|s| {
            let writer = s.spawn(|| {
                let result =
                    drain_to_sink(&buffer, &stats, &producer_done, &mut sink, POP_TIMEOUT);
                if let Err(e) = &result {
                    debug!("Writer failed: {}", e);
                    stop.trigger(StopReason::Fatal);
                }
                result
            });
            let timer = s.spawn(|| duration_timer(&stop, config.duration));
            let reporter = config.status_interval.map(|interval| {
                let reporter = ProgressReporter {
                    stats: &stats,
                    buffer: &buffer,
                    stop: &stop,
                    expected_samples: config.expected_samples(),
                    interval,
                };
                s.spawn(move || {
                    if let Err(e) = reporter.run(started, &mut io::stdout().lock()) {
                        warn!("Status output failed: {}", e);
                    }
                })
            });

            let stream_result =
                device.read_async(&mut producer, config.buffer_count, config.buffer_size);
            if let Err(e) = &stream_result {
                debug!("Device stream failed: {}", e);
                stop.trigger(StopReason::Fatal);
            }
            if stop.trigger(StopReason::DeviceFinished) {
                info!("Device stopped delivering samples");
            }
            debug!(chunks = producer.chunks(), "Producer finished");
            producer_done.trigger(StopReason::DeviceFinished);

            self.transition(SessionState::Stopping);
            info!(queued = buffer.size(), "Draining capture buffer");

            let write_result = writer.join().unwrap_or_else(|e| panic::resume_unwind(e));
            timer.join().unwrap_or_else(|e| panic::resume_unwind(e));
            if let Some(reporter) = reporter {
                reporter.join().unwrap_or_else(|e| panic::resume_unwind(e));
            }
            (write_result, stream_result)
        });

        let close_result = sink.close();
        if let Err(e) = device.close() {
            warn!("Failed to close device: {}", e);
        }
        self.transition(SessionState::Stopped);

        let summary = CaptureSummary {
            started: started_utc,
            elapsed: started.elapsed(),
            stats: stats.snapshot(),
            reason: stop.reason(),
            output: config.output,
        };
        write_result.map_err(CaptureError::SinkWrite)?;
        close_result.map_err(CaptureError::SinkWrite)?;
        stream_result.map_err(CaptureError::Device)?;
        info!(
            samples = summary.stats.samples_captured,
            bytes = summary.stats.bytes_written,
            overflows = summary.stats.overflow_count,
            "Capture complete"
        );
        Ok(summary)
    }
}
