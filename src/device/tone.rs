//! A synthetic device producing a single complex tone in the same unsigned 8-bit
//! offset-binary I/Q format RTL2832U dongles use. Streams until cancelled.

use std::f64::consts::TAU;

use tracing::debug;

use super::{CancelHandle, ChunkSink, DeviceInfo, Pacer, SdrDevice, Tuning};
use crate::{buffer::BYTES_PER_SAMPLE, error::DeviceError};

const AMPLITUDE: f64 = 100.0;
const MIDSCALE: f64 = 127.5;

pub(super) fn info(offset_hz: f64) -> DeviceInfo {
    DeviceInfo {
        name: "Synthetic tone".to_owned(),
        manufacturer: "iq_slurper".to_owned(),
        product: format!("{:+} Hz tone", offset_hz),
        serial: "00000000".to_owned(),
    }
}

pub struct ToneDevice {
    info: DeviceInfo,
    offset_hz: f64,
    phase: f64,
    tuning: Tuning,
    cancel: CancelHandle,
    paced: bool,
    open: bool,
}

impl ToneDevice {
    pub fn new(offset_hz: f64) -> Self {
        Self {
            info: info(offset_hz),
            offset_hz,
            phase: 0.0,
            tuning: Tuning::default(),
            cancel: CancelHandle::new(),
            paced: true,
            open: true,
        }
    }

    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Fill `buf` with interleaved I/Q, continuing the phase from the previous call
    pub fn synthesize(&mut self, buf: &mut [u8]) {
        let step = TAU * self.offset_hz / self.tuning.sample_rate as f64;
        for iq in buf.chunks_exact_mut(2) {
            iq[0] = (MIDSCALE + AMPLITUDE * self.phase.cos()) as u8;
            iq[1] = (MIDSCALE + AMPLITUDE * self.phase.sin()) as u8;
            self.phase = (self.phase + step) % TAU;
        }
    }
}

impl SdrDevice for ToneDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<(), DeviceError> {
        self.tuning.set_sample_rate(rate)
    }

    fn sample_rate(&self) -> u32 {
        self.tuning.sample_rate
    }

    fn set_center_frequency(&mut self, freq: u32) -> Result<(), DeviceError> {
        self.tuning.center_frequency = freq;
        Ok(())
    }

    fn center_frequency(&self) -> u32 {
        self.tuning.center_frequency
    }

    fn set_gain_mode(&mut self, manual: bool) -> Result<(), DeviceError> {
        self.tuning.manual_gain = manual;
        Ok(())
    }

    fn set_gain(&mut self, tenths_db: i32) -> Result<(), DeviceError> {
        self.tuning.gain = tenths_db;
        Ok(())
    }

    fn gain(&self) -> i32 {
        self.tuning.gain
    }

    fn reset_buffer(&mut self) -> Result<(), DeviceError> {
        self.phase = 0.0;
        Ok(())
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn read_async(
        &mut self,
        sink: &mut dyn ChunkSink,
        buffer_count: u32,
        buffer_size: u32,
    ) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::Stream("device is closed".to_owned()));
        }
        if buffer_size == 0 || buffer_size as usize % BYTES_PER_SAMPLE != 0 {
            return Err(DeviceError::Stream(format!(
                "buffer size {} is not a whole number of I/Q samples",
                buffer_size
            )));
        }
        debug!(buffer_count, buffer_size, "Starting tone stream");

        let mut buf = vec![0u8; buffer_size as usize];
        let mut pacer = Pacer::new(self.tuning.sample_rate);
        while !self.cancel.is_cancelled() {
            self.synthesize(&mut buf);
            if self.paced {
                pacer.wait(buf.len());
            }
            if self.cancel.is_cancelled() {
                break;
            }
            sink.deliver(&buf);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.open {
            self.open = false;
            debug!("Closed tone device");
        }
        Ok(())
    }
}

impl Drop for ToneDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_rate_tone() {
        // fs/4 walks the unit circle in four steps
        let mut dev = ToneDevice::new(600_000.0);
        dev.set_sample_rate(2_400_000).unwrap();
        let mut buf = [0u8; 8];
        dev.synthesize(&mut buf);
        assert_eq!(&buf[0..2], &[227, 127]);
        assert_eq!(buf[3], 227);
        assert_eq!(buf[4], 27);
        assert_eq!(buf[7], 27);
    }

    #[test]
    fn test_streams_until_cancelled() {
        let mut dev = ToneDevice::new(1000.0).unpaced();
        let cancel = dev.cancel_handle();
        let mut seen = 0;
        let mut sink = |b: &[u8]| {
            assert_eq!(b.len(), 256);
            seen += 1;
            if seen == 5 {
                cancel.request_cancel();
            }
        };
        dev.read_async(&mut sink, 4, 256).unwrap();
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_closed_device_refuses_to_stream() {
        let mut dev = ToneDevice::new(1000.0);
        dev.close().unwrap();
        assert!(dev.read_async(&mut |_: &[u8]| {}, 4, 256).is_err());
    }

    #[test]
    fn test_odd_buffer_size_is_rejected() {
        let mut dev = ToneDevice::new(1000.0).unpaced();
        let mut calls = 0;
        let err = dev.read_async(&mut |_: &[u8]| calls += 1, 4, 513).unwrap_err();
        assert!(matches!(err, DeviceError::Stream(_)));
        assert_eq!(calls, 0);
    }
}
