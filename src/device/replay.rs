//! Plays a previously captured raw I/Q file back as if it were a live device.
//! Handy for exercising the pipeline without hardware attached.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::{CancelHandle, ChunkSink, DeviceInfo, Pacer, SdrDevice, Tuning};
use crate::error::DeviceError;

pub(super) fn info(path: &Path) -> DeviceInfo {
    DeviceInfo {
        name: "File replay".to_owned(),
        manufacturer: "iq_slurper".to_owned(),
        product: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        serial: path.display().to_string(),
    }
}

pub struct ReplayDevice {
    path: PathBuf,
    info: DeviceInfo,
    file: Option<File>,
    tuning: Tuning,
    cancel: CancelHandle,
    paced: bool,
}

impl ReplayDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| DeviceError::Open(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Opened replay device");
        Ok(Self {
            path: path.to_owned(),
            info: info(path),
            file: Some(file),
            tuning: Tuning::default(),
            cancel: CancelHandle::new(),
            paced: true,
        })
    }

    /// Deliver as fast as the sink takes it instead of at the sample rate
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

// Fill as much of `buf` as the file has left
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl SdrDevice for ReplayDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn set_sample_rate(&mut self, rate: u32) -> Result<(), DeviceError> {
        self.tuning.set_sample_rate(rate)
    }

    fn sample_rate(&self) -> u32 {
        self.tuning.sample_rate
    }

    // The recording's frequency is whatever it was; we just remember what was asked for
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
        if !self.tuning.manual_gain {
            return Err(DeviceError::Tuning(
                "gain can only be set in manual gain mode".to_owned(),
            ));
        }
        self.tuning.gain = tenths_db;
        Ok(())
    }

    fn gain(&self) -> i32 {
        self.tuning.gain
    }

    /// Rewind to the start of the recording
    fn reset_buffer(&mut self) -> Result<(), DeviceError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| DeviceError::Stream("device is closed".to_owned()))?;
        file.seek(SeekFrom::Start(0))?;
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
        if buffer_size == 0 {
            return Err(DeviceError::Stream("buffer size must be nonzero".to_owned()));
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| DeviceError::Stream("device is closed".to_owned()))?;
        debug!(buffer_count, buffer_size, "Starting replay stream");

        let mut buf = vec![0u8; buffer_size as usize];
        let mut pacer = Pacer::new(self.tuning.sample_rate);
        let mut delivered = 0u64;
        while !self.cancel.is_cancelled() {
            let n = read_full(file, &mut buf)?;
            if n == 0 {
                info!(bytes = delivered, "Reached end of replay file");
                break;
            }
            if self.paced {
                pacer.wait(n);
            }
            // Cancellation may have landed while we slept
            if self.cancel.is_cancelled() {
                break;
            }
            sink.deliver(&buf[..n]);
            delivered += n as u64;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "Closed replay device");
        }
        Ok(())
    }
}

impl Drop for ReplayDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;

    fn iq_file(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_replays_whole_file_in_chunks() {
        let data: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let file = iq_file(&data);
        let mut dev = ReplayDevice::open(file.path()).unwrap().unpaced();

        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut sink = |b: &[u8]| chunks.push(b.to_vec());
        dev.read_async(&mut sink, 4, 1024).unwrap();

        assert_eq!(
            chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![1024, 1024, 452]
        );
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn test_cancel_from_inside_callback() {
        let file = iq_file(&[0u8; 4096]);
        let mut dev = ReplayDevice::open(file.path()).unwrap().unpaced();
        let cancel = dev.cancel_handle();

        let mut calls = 0;
        let mut sink = |_: &[u8]| {
            calls += 1;
            cancel.request_cancel();
        };
        dev.read_async(&mut sink, 4, 512).unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_reset_rewinds_and_close_is_idempotent() {
        let file = iq_file(&[1, 2, 3, 4]);
        let mut dev = ReplayDevice::open(file.path()).unwrap().unpaced();

        let mut total = 0;
        dev.read_async(&mut |b: &[u8]| total += b.len(), 1, 16).unwrap();
        dev.reset_buffer().unwrap();
        dev.read_async(&mut |b: &[u8]| total += b.len(), 1, 16).unwrap();
        assert_eq!(total, 8);

        dev.close().unwrap();
        dev.close().unwrap();
        assert!(dev.read_async(&mut |_: &[u8]| {}, 1, 16).is_err());
    }

    #[test]
    fn test_gain_needs_manual_mode() {
        let file = iq_file(&[0; 2]);
        let mut dev = ReplayDevice::open(file.path()).unwrap();
        assert!(dev.set_gain(400).is_err());
        dev.set_gain_mode(true).unwrap();
        dev.set_gain(400).unwrap();
        assert_eq!(dev.gain(), 400);
    }
}
