//! Error types for the capture pipeline and the device layer

use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures raised by a device backend
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no SDR devices found")]
    NoDevices,

    #[error("device index {index} out of range ({count} device(s) available)")]
    NotFound { index: u32, count: u32 },

    #[error("failed to open device: {0}")]
    Open(String),

    #[error("failed to tune device: {0}")]
    Tuning(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Every way a capture session can fail
#[derive(Error, Debug)]
pub enum CaptureError {
    /// A required parameter is missing or unusable. Raised before anything is opened.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),

    #[error("cannot open output file {}: {source}", path.display())]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed writing to output: {0}")]
    SinkWrite(#[source] io::Error),

    /// The driver failed while streaming
    #[error("device failed during capture: {0}")]
    Device(#[source] DeviceError),

    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
