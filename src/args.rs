//! Argument parsing for running from the command line

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{device::DeviceList, session::SessionConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Center frequency in Hz
    #[clap(short, long, default_value_t = crate::DEFAULT_FREQUENCY)]
    pub frequency: u32,
    /// Sample rate in Hz
    #[clap(short, long, default_value_t = crate::DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,
    /// Tuner gain in dB
    #[clap(short, long, default_value_t = 40.0)]
    pub gain: f32,
    /// Capture duration in seconds
    #[clap(short, long, default_value_t = crate::DEFAULT_DURATION_SECS)]
    pub duration: u64,
    /// Output file for raw 8-bit interleaved I/Q
    #[clap(short, long)]
    pub output: Option<PathBuf>,
    /// Device index
    #[clap(short = 'D', long, default_value_t = 0)]
    pub device: u32,
    /// Bytes per driver buffer
    #[clap(long, default_value_t = crate::DEFAULT_BUFFER_SIZE)]
    #[clap(value_parser = clap::value_parser!(u32).range(512..))]
    pub buffer_size: u32,
    /// Number of driver buffers
    #[clap(long, default_value_t = crate::DEFAULT_BUFFER_COUNT)]
    #[clap(value_parser = clap::value_parser!(u32).range(1..))]
    pub buffer_count: u32,
    /// Queue depth (in buffers) above which an overflow is counted
    #[clap(long, default_value_t = crate::DEFAULT_OVERFLOW_THRESHOLD)]
    pub threshold: usize,
    /// Raw I/Q file to expose as a replay device (repeatable)
    #[clap(long)]
    pub replay: Vec<PathBuf>,
    /// Expose a synthetic tone generator as a device
    #[clap(long)]
    pub synthetic: bool,
    /// Offset of the synthetic tone from the center frequency, in Hz
    #[clap(long, default_value_t = 10_000.0)]
    pub tone_offset: f64,
    /// List available devices and exit
    #[clap(long)]
    pub list_devices: bool,
    /// Don't draw the live status line
    #[clap(long)]
    pub no_progress: bool,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

impl Args {
    /// Devices in `--device` index order: replay files first, then the tone generator
    pub fn device_list(&self) -> DeviceList {
        let mut devices = self
            .replay
            .iter()
            .fold(DeviceList::new(), |list, path| list.with_replay(path));
        if self.synthetic {
            devices = devices.with_tone(self.tone_offset);
        }
        devices
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            device_index: self.device,
            frequency: self.frequency,
            sample_rate: self.sample_rate,
            gain: gain_tenths(self.gain),
            duration: Duration::from_secs(self.duration),
            output: self.output.clone().unwrap_or_default(),
            buffer_size: self.buffer_size,
            buffer_count: self.buffer_count,
            overflow_threshold: self.threshold,
            status_interval: (!self.no_progress).then(|| Duration::from_secs(1)),
        }
    }
}

/// dB to the tenths of a dB the driver works in
pub fn gain_tenths(db: f32) -> i32 {
    (db * 10.0).round() as i32
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
