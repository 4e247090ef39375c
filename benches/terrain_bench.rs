use bytes::{BufMut, BytesMut};
use craft_protocol::core::codec::{PacketReader, WriteExt};
use craft_protocol::protocol::registry::Dimension;
use craft_protocol::protocol::version::{wire_profile, MC_1_21};
use craft_protocol::terrain::container::{pack_entries, read_block_states, BLOCKS_PER_SECTION};
use craft_protocol::terrain::{read_chunk_column, Packing};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

const PALETTE_SIZE: u32 = 200;

fn section_indices(seed: u32) -> Vec<u32> {
    (0..BLOCKS_PER_SECTION as u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) ^ seed) % PALETTE_SIZE)
        .collect()
}

fn put_block_states(buf: &mut BytesMut, indices: &[u32], packing: Packing) {
    buf.put_u8(8);
    buf.put_varint(PALETTE_SIZE as i32);
    for id in 0..PALETTE_SIZE as i32 {
        buf.put_varint(id * 3);
    }
    buf.put_long_array(&pack_entries(indices, 8, packing));
}

fn overworld_column() -> BytesMut {
    let mut sections = BytesMut::new();
    for y in 0..24u32 {
        sections.put_i16(4096);
        put_block_states(&mut sections, &section_indices(y), Packing::Padded);
        sections.put_u8(0);
        sections.put_varint(1);
        sections.put_varint(0);
    }

    let mut buf = BytesMut::new();
    buf.put_i32(0);
    buf.put_i32(0);
    buf.put_u8(10);
    buf.put_u8(0);
    buf.put_byte_array(&sections);
    buf.put_varint(0);
    for _ in 0..6 {
        buf.put_varint(0);
    }
    buf
}

#[allow(clippy::unwrap_used)]
fn bench_terrain(c: &mut Criterion) {
    let mut group = c.benchmark_group("terrain_decode");

    for packing in [Packing::Padded, Packing::Straddled] {
        let mut buf = BytesMut::new();
        put_block_states(&mut buf, &section_indices(7), packing);
        group.throughput(Throughput::Elements(BLOCKS_PER_SECTION as u64));
        group.bench_function(format!("section_{packing:?}"), |b| {
            b.iter(|| {
                let mut reader = PacketReader::new(&buf);
                read_block_states(&mut reader, packing, false).unwrap()
            })
        });
    }

    let profile = wire_profile(MC_1_21).unwrap();
    let overworld = Dimension {
        name: "minecraft:overworld".into(),
        min_y: -64,
        height: 384,
    };
    let column = overworld_column();
    group.throughput(Throughput::Bytes(column.len() as u64));
    group.bench_function("column_1_21", |b| {
        b.iter(|| {
            let mut reader = PacketReader::new(&column);
            read_chunk_column(&mut reader, profile.as_ref(), &overworld).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_terrain);
criterion_main!(benches);
