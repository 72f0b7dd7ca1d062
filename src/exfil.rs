//! This module is responsible for getting captured bytes out to disk

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    time::Duration,
};

use tracing::{debug, info};

use crate::{
    buffer::CaptureBuffer,
    control::StopSignal,
    error::{CaptureError, Result},
    monitoring::CaptureStats,
};

/// How long the writer waits on an empty buffer before looking at the stop flag again
pub const POP_TIMEOUT: Duration = Duration::from_millis(100);

// Big enough that one driver buffer (256 KiB by default) never splits a write syscall
const SINK_CAPACITY: usize = 1 << 20;

/// Create (or truncate) the output file
pub fn open_sink(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|source| CaptureError::SinkOpen {
        path: path.to_owned(),
        source,
    })?;
    info!(path = %path.display(), "Opened output file");
    Ok(BufWriter::with_capacity(SINK_CAPACITY, file))
}

/// Where the byte stream ends up. Opened once before capture, closed once after.
pub trait Sink: Write + Send {
    /// Flush and release the destination
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

impl Sink for BufWriter<File> {
    fn close(self) -> io::Result<()> {
        let file = self.into_inner().map_err(|e| e.into_error())?;
        // Don't report success until the capture is actually on the disk
        file.sync_all()?;
        debug!("Closed output file");
        Ok(())
    }
}

impl Sink for Vec<u8> {
    fn close(self) -> io::Result<()> {
        Ok(())
    }
}

/// Drain `buffer` into `sink`, in order, until `stop` is set *and* the buffer is empty.
///
/// Chunks still queued when the stop arrives are written before returning, so a
/// graceful stop never loses anything already handed to the buffer. Chunk boundaries
/// are not kept, only the byte stream. Returns the number of chunks written.
pub fn drain_to_sink<W: Write>(
    buffer: &CaptureBuffer,
    stats: &CaptureStats,
    stop: &StopSignal,
    sink: &mut W,
    poll: Duration,
) -> io::Result<u64> {
    let mut chunks = 0u64;
    loop {
        if let Some(chunk) = buffer.pop(poll) {
            sink.write_all(chunk.as_bytes())?;
            stats.add_bytes_written(chunk.len() as u64);
            chunks += 1;
            continue;
        }
        // Timed out with nothing to do
        if stop.is_set() && buffer.is_empty() {
            break;
        }
    }
    sink.flush()?;
    debug!(chunks, "Writer drained capture buffer");
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, sync::Arc, thread, time::Instant};

    use tempfile::tempdir;

    use crate::{
        buffer::SampleChunk,
        control::{duration_timer, StopReason},
    };

    fn setup(threshold: usize) -> (CaptureBuffer, Arc<CaptureStats>, StopSignal) {
        let stats = Arc::new(CaptureStats::new());
        (
            CaptureBuffer::new(threshold, stats.clone()),
            stats,
            StopSignal::new(),
        )
    }

    #[test]
    fn test_drains_queue_after_stop() {
        let (buffer, stats, stop) = setup(16);
        for i in 0..5u8 {
            buffer.push(SampleChunk::new(vec![i; 3]));
        }
        stop.trigger(StopReason::Interrupt);

        let mut sink = Vec::new();
        let chunks = drain_to_sink(&buffer, &stats, &stop, &mut sink, POP_TIMEOUT).unwrap();

        assert_eq!(chunks, 5);
        assert_eq!(sink, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
        assert_eq!(stats.bytes_written(), 15);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concurrent_capture_writes_every_byte() {
        let (buffer, stats, stop) = setup(16);
        let expected: Vec<u8> = (0..20u8).flat_map(|i| vec![i; 1000]).collect();

        let sink = thread::scope(|s| {
            let writer = s.spawn(|| {
                let mut sink = Vec::new();
                drain_to_sink(&buffer, &stats, &stop, &mut sink, POP_TIMEOUT).unwrap();
                sink
            });
            for i in 0..20u8 {
                buffer.push(SampleChunk::new(vec![i; 1000]));
            }
            // Producer is done, now it is safe to stop
            stop.trigger(StopReason::DeviceFinished);
            writer.join().unwrap()
        });

        assert_eq!(stats.bytes_written(), 20_000);
        assert_eq!(sink, expected);
        assert_eq!(buffer.size(), 0);
    }

    #[test]
    fn test_exits_promptly_when_timer_fires_with_nothing_captured() {
        let (buffer, stats, stop) = setup(16);
        let duration = Duration::from_millis(200);
        let start = Instant::now();

        let stopped_after = thread::scope(|s| {
            let timer = s.spawn(|| duration_timer(&stop, duration));
            let mut sink = Vec::new();
            drain_to_sink(&buffer, &stats, &stop, &mut sink, POP_TIMEOUT).unwrap();
            let stopped_after = start.elapsed();
            assert!(timer.join().unwrap());
            assert!(sink.is_empty());
            stopped_after
        });

        assert!(stop.is_set());
        assert!(stopped_after >= duration);
        // At most one more poll interval after the stop, plus scheduling slack
        assert!(stopped_after < duration + POP_TIMEOUT + Duration::from_millis(500));
        assert_eq!(stats.bytes_written(), 0);
    }

    #[test]
    fn test_write_error_is_reported() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (buffer, stats, stop) = setup(16);
        buffer.push(SampleChunk::new(vec![1; 10]));
        stop.trigger(StopReason::Duration);
        let err = drain_to_sink(&buffer, &stats, &stop, &mut Broken, POP_TIMEOUT).unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
        assert_eq!(stats.bytes_written(), 0);
    }

    #[test]
    fn test_sink_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        let mut sink = open_sink(&path).unwrap();
        sink.write_all(&[9; 300]).unwrap();
        sink.close().unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![9; 300]);
    }

    #[test]
    fn test_open_sink_in_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("capture.bin");
        assert!(matches!(open_sink(&path), Err(CaptureError::SinkOpen { .. })));
    }
}
