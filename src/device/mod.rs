//! The driver side of the capture: what a device has to offer for us to stream from it.
//!
//! The shape follows the usual async SDR driver API: tune, then make a blocking
//! `read_async` call that hands over one buffer at a time on the driver's thread until
//! someone asks it to cancel.

use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{buffer::BYTES_PER_SAMPLE, error::DeviceError};

pub mod replay;
pub mod tone;

pub use replay::ReplayDevice;
pub use tone::ToneDevice;

/// Receives chunks from a device, synchronously, on the driver's thread.
/// Implementations must return quickly.
pub trait ChunkSink {
    fn deliver(&mut self, bytes: &[u8]);
}

impl<F: FnMut(&[u8])> ChunkSink for F {
    fn deliver(&mut self, bytes: &[u8]) {
        self(bytes)
    }
}

/// Asks a running `read_async` to stop. Once requested, the device makes no further
/// `deliver` calls.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Identification strings, as reported over USB for real hardware
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Name: {}", self.name)?;
        writeln!(f, "  Manufacturer: {}", self.manufacturer)?;
        writeln!(f, "  Product: {}", self.product)?;
        write!(f, "  Serial: {}", self.serial)
    }
}

pub trait SdrDevice: Send {
    fn info(&self) -> &DeviceInfo;

    fn set_sample_rate(&mut self, rate: u32) -> Result<(), DeviceError>;
    fn sample_rate(&self) -> u32;

    fn set_center_frequency(&mut self, freq: u32) -> Result<(), DeviceError>;
    fn center_frequency(&self) -> u32;

    /// `true` for manual gain, `false` for AGC
    fn set_gain_mode(&mut self, manual: bool) -> Result<(), DeviceError>;
    /// Gain in tenths of a dB
    fn set_gain(&mut self, tenths_db: i32) -> Result<(), DeviceError>;
    fn gain(&self) -> i32;

    /// Throw away anything the device buffered before streaming starts
    fn reset_buffer(&mut self) -> Result<(), DeviceError>;

    fn cancel_handle(&self) -> CancelHandle;

    /// Stream `buffer_size`-byte chunks into `sink` until cancelled or the source ends.
    /// Blocks the calling thread for the whole stream.
    fn read_async(
        &mut self,
        sink: &mut dyn ChunkSink,
        buffer_count: u32,
        buffer_size: u32,
    ) -> Result<(), DeviceError>;

    /// Release the device. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), DeviceError>;
}

/// Tuner settings a backend keeps around so the getters can report them back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Tuning {
    pub sample_rate: u32,
    pub center_frequency: u32,
    pub manual_gain: bool,
    pub gain: i32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            center_frequency: crate::DEFAULT_FREQUENCY,
            manual_gain: false,
            gain: 0,
        }
    }
}

impl Tuning {
    pub fn set_sample_rate(&mut self, rate: u32) -> Result<(), DeviceError> {
        if rate == 0 {
            return Err(DeviceError::Tuning("sample rate must be nonzero".to_owned()));
        }
        self.sample_rate = rate;
        Ok(())
    }
}

/// Sleeps so that bytes are handed out no faster than the sample rate would produce them
pub(crate) struct Pacer {
    start: Instant,
    bytes: u64,
    bytes_per_sec: f64,
}

impl Pacer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            start: Instant::now(),
            bytes: 0,
            bytes_per_sec: sample_rate as f64 * BYTES_PER_SAMPLE as f64,
        }
    }

    /// Account for `n` more bytes, then wait until real time has caught up with them
    pub fn wait(&mut self, n: usize) {
        self.bytes += n as u64;
        let due = Duration::from_secs_f64(self.bytes as f64 / self.bytes_per_sec);
        let elapsed = self.start.elapsed();
        if due > elapsed {
            thread::sleep(due - elapsed);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Backend {
    Replay(PathBuf),
    Tone { offset_hz: f64 },
}

/// The devices this process can open, indexed the way the `--device` flag counts them
#[derive(Clone, Debug, Default)]
pub struct DeviceList {
    backends: Vec<Backend>,
}

impl DeviceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a raw 8-bit I/Q file as a device
    pub fn with_replay(mut self, path: impl Into<PathBuf>) -> Self {
        self.backends.push(Backend::Replay(path.into()));
        self
    }

    /// Expose a synthetic tone `offset_hz` away from the tuned frequency
    pub fn with_tone(mut self, offset_hz: f64) -> Self {
        self.backends.push(Backend::Tone { offset_hz });
        self
    }

    pub fn len(&self) -> u32 {
        self.backends.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn info(&self, index: u32) -> Option<DeviceInfo> {
        self.backends.get(index as usize).map(|b| match b {
            Backend::Replay(path) => replay::info(path),
            Backend::Tone { offset_hz } => tone::info(*offset_hz),
        })
    }

    pub fn open(&self, index: u32) -> Result<Box<dyn SdrDevice>, DeviceError> {
        if self.backends.is_empty() {
            return Err(DeviceError::NoDevices);
        }
        let backend = self
            .backends
            .get(index as usize)
            .ok_or(DeviceError::NotFound {
                index,
                count: self.len(),
            })?;
        Ok(match backend {
            Backend::Replay(path) => Box::new(ReplayDevice::open(path)?),
            Backend::Tone { offset_hz } => Box::new(ToneDevice::new(*offset_hz)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list() {
        let devices = DeviceList::new();
        assert!(devices.is_empty());
        assert!(devices.info(0).is_none());
        assert!(matches!(devices.open(0), Err(DeviceError::NoDevices)));
    }

    #[test]
    fn test_index_out_of_range() {
        let devices = DeviceList::new().with_tone(1000.0);
        assert_eq!(devices.len(), 1);
        assert!(matches!(
            devices.open(3),
            Err(DeviceError::NotFound { index: 3, count: 1 })
        ));
    }

    #[test]
    fn test_open_tone() {
        let devices = DeviceList::new().with_tone(1000.0);
        let dev = devices.open(0).unwrap();
        assert_eq!(dev.info(), &devices.info(0).unwrap());
    }

    #[test]
    fn test_missing_replay_file() {
        let devices = DeviceList::new().with_replay("/nonexistent/iq_slurper/capture.bin");
        assert!(devices.info(0).is_some());
        assert!(matches!(devices.open(0), Err(DeviceError::Open(_))));
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let other = handle.clone();
        assert!(!other.is_cancelled());
        handle.request_cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_tuning_rejects_zero_rate() {
        let mut t = Tuning::default();
        assert!(t.set_sample_rate(0).is_err());
        t.set_sample_rate(1_024_000).unwrap();
        assert_eq!(t.sample_rate, 1_024_000);
    }

    #[test]
    fn test_pacer_holds_back() {
        // 1000 samples/s is 2000 bytes/s, so 200 bytes should take ~100 ms
        let mut pacer = Pacer::new(1000);
        let start = Instant::now();
        pacer.wait(200);
        assert!(start.elapsed() >= Duration::from_millis(95));
    }
}
