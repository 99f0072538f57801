//! Codec benchmarks for ridecast-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ridecast_protocol::{codec, Frame};
use serde_json::json;

fn position_frame() -> Frame {
    Frame::event(
        "ride.ride-0f3c",
        "PositionUpdated",
        json!({
            "rideId": "ride-0f3c",
            "lat": 52.5200,
            "lng": 13.4050,
            "bearing": 90.0,
            "speed": 11.2,
            "driverId": 7,
            "ts": "2026-01-01T12:00:00+00:00"
        }),
    )
}

fn bench_encode(c: &mut Criterion) {
    let frame = position_frame();
    let size = codec::encode_text(&frame).unwrap().len() as u64;

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(size));
    group.bench_function("text_position", |b| b.iter(|| codec::encode_text(black_box(&frame))));
    group.bench_function("binary_position", |b| b.iter(|| codec::encode_binary(black_box(&frame))));
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let frame = position_frame();
    let text = codec::encode_text(&frame).unwrap();
    let binary = codec::encode_binary(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.bench_function("text_position", |b| b.iter(|| codec::decode_text(black_box(&text))));
    group.bench_function("binary_position", |b| {
        b.iter(|| codec::decode_binary(black_box(&binary)))
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
