//! Streams raw I/Q samples from an SDR to disk without dropping what the driver hands us.

pub mod args;
pub mod buffer;
pub mod capture;
pub mod control;
pub mod device;
pub mod error;
pub mod exfil;
pub mod monitoring;
pub mod session;

pub use buffer::{CaptureBuffer, SampleChunk};
pub use control::{StopReason, StopSignal};
pub use error::{CaptureError, DeviceError};
pub use session::{CaptureSession, SessionConfig, SessionState};

/// NOAA-19 APT downlink
pub const DEFAULT_FREQUENCY: u32 = 137_100_000;
pub const DEFAULT_SAMPLE_RATE: u32 = 2_400_000;
/// Tenths of a dB (40.0 dB)
pub const DEFAULT_GAIN: i32 = 400;
pub const DEFAULT_DURATION_SECS: u64 = 900;
/// Bytes per driver buffer, 256 KiB
pub const DEFAULT_BUFFER_SIZE: u32 = 16 * 16384;
pub const DEFAULT_BUFFER_COUNT: u32 = 16;
/// Queue depth where we start counting overflows, one driver ring's worth
pub const DEFAULT_OVERFLOW_THRESHOLD: usize = DEFAULT_BUFFER_COUNT as usize;
