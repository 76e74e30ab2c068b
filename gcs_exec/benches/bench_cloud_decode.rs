//! # Point Cloud Decode Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use comms_if::msg::sensor::CloudFrameMsg;
use gcs_lib::{cloud::PointCloudAccumulator, params::CloudParams};

fn cloud_decode_benchmark(c: &mut Criterion) {
    // ---- Build a dense dummy frame ----

    // A 20 x 20 x 50 block of points
    let points: Vec<[f32; 3]> = (0..20_000)
        .map(|i| {
            [
                (i % 20) as f32 * 0.1,
                ((i / 20) % 20) as f32 * 0.1,
                (i / 400) as f32 * 0.05,
            ]
        })
        .collect();
    let frame = CloudFrameMsg::from_points(&points);

    // Bench the decode alone, with and without decimation
    c.bench_function("CloudFrameMsg::decode_points::1", |b| {
        b.iter(|| frame.decode_points(1).unwrap())
    });
    c.bench_function("CloudFrameMsg::decode_points::4", |b| {
        b.iter(|| frame.decode_points(4).unwrap())
    });

    // Bench accumulating into a full buffer, so every frame evicts
    let mut acc = PointCloudAccumulator::new(&CloudParams {
        capacity_points: 20_000,
        decimation: 2,
        ..Default::default()
    });
    c.bench_function("PointCloudAccumulator::ingest_cloud", |b| {
        b.iter(|| acc.ingest_cloud(&frame))
    });
}

criterion_group!(benches, cloud_decode_benchmark);
criterion_main!(benches);
