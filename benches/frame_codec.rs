use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wsnet::ws::{apply_mask, Frame, FrameCodec};

/// Encoding and decoding cost across the three length encodings.
fn benchmark_frame_codec(c: &mut Criterion) {
    let sizes = [64usize, 1024, 64 * 1024, 1024 * 1024];

    let mut group = c.benchmark_group("frame_encode_masked");
    for size in sizes {
        let frame = Frame::binary(vec![0x5Au8; size]).with_mask([0x12, 0x34, 0x56, 0x78]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            let mut buf = BytesMut::with_capacity(frame.encoded_len());
            b.iter(|| {
                buf.clear();
                frame.encode(&mut buf);
                black_box(buf.len())
            })
        });
    }
    group.finish();

    let mut group = c.benchmark_group("frame_decode_unmasked");
    let codec = FrameCodec::client();
    for size in sizes {
        let mut wire = BytesMut::new();
        Frame::binary(vec![0xA5u8; size]).encode(&mut wire);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &wire, |b, wire| {
            b.iter(|| {
                let mut buf = wire.clone();
                black_box(codec.decode(&mut buf).unwrap())
            })
        });
    }
    group.finish();

    c.bench_function("apply_mask_64k", |b| {
        let mut data = vec![0u8; 64 * 1024];
        b.iter(|| apply_mask(black_box(&mut data), [1, 2, 3, 4]))
    });
}

criterion_group!(benches, benchmark_frame_codec);
criterion_main!(benches);
