//! Criterion benchmarks for the per-frame pixel conversions.
//!
//! Both run once per captured frame on the hardware worker: YUYV→RGB for the
//! preview, YUYV→I420 in front of the H.264 encoder.
//!
//! Run with:
//! ```bash
//! cargo bench --package ipkvm-agent --bench convert_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ipkvm_agent::infrastructure::capture::convert::yuyv_to_rgb;
use ipkvm_agent::infrastructure::encoder::convert::{i420_len, yuyv_to_i420};

const SIZES: &[(u32, u32)] = &[(640, 480), (1280, 720), (1920, 1080)];

/// A frame with varying luma and chroma so no branch is trivially predicted.
fn test_frame(width: u32, height: u32) -> Vec<u8> {
    (0..width as usize * height as usize * 2)
        .map(|i| (i * 7 % 251) as u8)
        .collect()
}

fn bench_yuyv_to_rgb(c: &mut Criterion) {
    let mut group = c.benchmark_group("yuyv_to_rgb");
    for &(w, h) in SIZES {
        let frame = test_frame(w, h);
        let mut out = vec![0u8; w as usize * h as usize * 3];
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &frame, |b, f| {
            b.iter(|| yuyv_to_rgb(black_box(f), w, h, &mut out))
        });
    }
    group.finish();
}

fn bench_yuyv_to_i420(c: &mut Criterion) {
    let mut group = c.benchmark_group("yuyv_to_i420");
    for &(w, h) in SIZES {
        let frame = test_frame(w, h);
        let mut out = vec![0u8; i420_len(w, h)];
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &frame, |b, f| {
            b.iter(|| yuyv_to_i420(black_box(f), w, h, &mut out))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_yuyv_to_rgb, bench_yuyv_to_i420);
criterion_main!(benches);
