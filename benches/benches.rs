use std::{sync::Arc, time::Duration};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use iq_slurper::{
    buffer::{CaptureBuffer, SampleChunk},
    capture::Producer,
    device::{CancelHandle, ChunkSink, ToneDevice},
    monitoring::CaptureStats,
    StopSignal, DEFAULT_BUFFER_SIZE,
};
use rand::prelude::*;

fn benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    // One default-sized driver buffer of noise
    let mut dummy_chunk = vec![0u8; DEFAULT_BUFFER_SIZE as usize];
    rng.fill(&mut dummy_chunk[..]);

    let stats = Arc::new(CaptureStats::new());
    let buffer = CaptureBuffer::new(16, stats.clone());
    let stop = StopSignal::new();

    let mut group = c.benchmark_group("capture");
    group.throughput(Throughput::Bytes(dummy_chunk.len() as u64));

    group.bench_function("push then pop", |b| {
        b.iter(|| {
            buffer.push(SampleChunk::from(black_box(&dummy_chunk[..])));
            black_box(buffer.pop(Duration::ZERO))
        })
    });

    group.bench_function("producer deliver", |b| {
        let mut producer = Producer::new(&buffer, &stats, &stop, CancelHandle::new());
        b.iter(|| {
            producer.deliver(black_box(&dummy_chunk));
            black_box(buffer.pop(Duration::ZERO))
        })
    });

    group.bench_function("tone synthesis", |b| {
        let mut tone = ToneDevice::new(10_000.0);
        let mut out = vec![0u8; DEFAULT_BUFFER_SIZE as usize];
        b.iter(|| tone.synthesize(black_box(&mut out)))
    });

    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
