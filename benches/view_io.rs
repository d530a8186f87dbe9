// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// View read/write benchmarks.
//
// Run with:
//   cargo bench --bench view_io
//
// Groups:
//   view_write     : raw byte write (copy + zero-fill tail)
//   view_read      : raw byte read (copy out)
//   view_text_utf16: write_text + read_text with the wide-string encoding
//
// Each group runs at three view sizes; payloads fill half the view so the
// zero-fill path is always exercised.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use shmchan::{Channel, Encoding, NullSink, Scope};
use std::sync::Arc;

const SIZES: &[(&str, usize)] = &[
    ("small_64", 64),
    ("view_1024", 1024),
    ("large_16384", 16384),
];

fn channel(tag: &str) -> Channel {
    let name = format!("bench_{tag}_{}", std::process::id());
    Channel::clear_storage(&name, Scope::Local);
    // NullSink: measure the copy, not the event plumbing.
    Channel::builder(&name)
        .sink(Arc::new(NullSink))
        .create(65536)
        .expect("create bench channel")
}

fn bench_write(c: &mut Criterion) {
    let ch = channel("write");
    let mut group = c.benchmark_group("view_write");

    for &(label, size) in SIZES {
        let view = ch.map_view(0, size).unwrap();
        let payload = vec![0xABu8; size / 2];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, p| {
            b.iter(|| view.write(black_box(p)).unwrap());
        });
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let ch = channel("read");
    let mut group = c.benchmark_group("view_read");

    for &(label, size) in SIZES {
        let view = ch.map_view(0, size).unwrap();
        view.write(&vec![0xCDu8; size]).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| black_box(view.read().unwrap()));
        });
    }

    group.finish();
}

fn bench_text(c: &mut Criterion) {
    let ch = channel("text");
    let mut group = c.benchmark_group("view_text_utf16");

    for &(label, size) in SIZES {
        let view = ch.map_view(0, size).unwrap();
        // Half the view in UTF-16 units, leaving room for the terminator.
        let text = "m".repeat(size / 4);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &text, |b, t| {
            b.iter(|| {
                view.write_text(black_box(t), Encoding::Utf16Nul).unwrap();
                black_box(view.read_text(Encoding::Utf16Nul).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_read, bench_text);
criterion_main!(benches);
