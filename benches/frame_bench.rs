use bytes::BytesMut;
use craft_protocol::core::frame::FrameCodec;
use craft_protocol::core::packet::RawPacket;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for threshold in [-1, 256] {
        let mode = if threshold < 0 { "plain" } else { "zlib" };

        for &size in &payload_sizes {
            // chunk-like payloads: long runs with some variation
            let payload: Vec<u8> = (0..size).map(|i| (i / 64 % 7) as u8).collect();
            group.throughput(Throughput::Bytes(size as u64));

            group.bench_function(format!("encode_{mode}_{size}b"), |b| {
                let mut codec = FrameCodec::default();
                codec.set_compression_threshold(threshold);
                b.iter_batched(
                    || RawPacket::new(0x27, payload.clone()),
                    |packet| {
                        let mut buf = BytesMut::with_capacity(size + 16);
                        codec.encode(packet, &mut buf).unwrap();
                        buf
                    },
                    BatchSize::SmallInput,
                )
            });

            group.bench_function(format!("decode_{mode}_{size}b"), |b| {
                let mut codec = FrameCodec::default();
                codec.set_compression_threshold(threshold);
                let mut wire = BytesMut::new();
                codec.encode(RawPacket::new(0x27, payload.clone()), &mut wire).unwrap();

                b.iter_batched(
                    || wire.clone(),
                    |mut buf| codec.decode(&mut buf).unwrap().unwrap(),
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode);
criterion_main!(benches);
