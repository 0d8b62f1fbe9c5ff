//! Ingest Commit Path Performance Benchmark
//!
//! Measures the store-and-meter throughput of the block store: every byte
//! an importer produces goes through `commit`, so this path bounds how
//! fast a track can load.
//!
//! **Goal:** ingest must be dramatically faster than realtime so a full
//! track loads in seconds, not minutes.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use waxwheel_engine::track::{BlockStore, WriteCursor};

/// One second of patterned stereo s16le audio at 44.1kHz.
fn one_second_pcm() -> Vec<u8> {
    let mut pcm = Vec::with_capacity(44_100 * 4);
    for i in 0..44_100i32 {
        let left = ((i * 13) % 20_001 - 10_000) as i16;
        let right = -left;
        pcm.extend_from_slice(&left.to_le_bytes());
        pcm.extend_from_slice(&right.to_le_bytes());
    }
    pcm
}

fn bench_commit_one_second(c: &mut Criterion) {
    let pcm = one_second_pcm();

    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Bytes(pcm.len() as u64));

    group.bench_function("commit_one_second", |b| {
        let store = BlockStore::new();
        let mut cursor = WriteCursor::new();
        b.iter(|| {
            store.rewind(&mut cursor);
            let mut data = pcm.as_slice();
            while !data.is_empty() {
                let window = store.writable_len().unwrap();
                let take = window.min(data.len());
                store.commit(&mut cursor, &data[..take]);
                data = &data[take..];
            }
            black_box(store.length());
        });
    });

    // Pipe-sized commits, the shape the ingest pump actually produces.
    group.bench_function("commit_pipe_sized_chunks", |b| {
        let store = BlockStore::new();
        let mut cursor = WriteCursor::new();
        b.iter(|| {
            store.rewind(&mut cursor);
            for chunk in pcm.chunks(32 * 1024) {
                let window = store.writable_len().unwrap();
                store.commit(&mut cursor, &chunk[..chunk.len().min(window)]);
            }
            black_box(store.length());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_commit_one_second);
criterion_main!(benches);
