use crate::core::codec::{BlockPos, PacketReader};
use crate::core::nbt::{self, NbtCompound, NbtTag};
use crate::error::Result;
use crate::protocol::registry::Dimension;
use crate::protocol::version::{TerrainGeneration, WireProfile, MC_1_16, MC_1_16_2, MC_1_17};
use crate::terrain::container::{
    read_biomes, read_block_states, ChunkSection, Packing, BIOME_CELLS_PER_SECTION, SECTION_WIDTH,
};
use crate::terrain::light::LightData;
use tracing::{debug, warn};

/// Sections in a column before 1.17
pub const LEGACY_SECTION_COUNT: usize = 16;

/// Biome entries per column in 1.15 - 1.16.1
const LEGACY_BIOME_COUNT: usize = 1024;

/// A block entity shipped with its column
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntity {
    pub position: BlockPos,
    /// Numeric type; older versions only name it inside the NBT
    pub type_id: Option<i32>,
    pub nbt: NbtCompound,
}

impl BlockEntity {
    /// Resource name of the entity type, when carried in the NBT
    pub fn type_name(&self) -> Option<&str> {
        self.nbt.get("id").and_then(NbtTag::as_str)
    }
}

/// A decoded chunk column
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkColumn {
    pub x: i32,
    pub z: i32,
    /// World Y of the bottom section
    pub min_y: i32,
    /// Bottom to top; `None` for sections the server left out
    pub sections: Vec<Option<ChunkSection>>,
    /// 1.18+: 64 cells per section. Older versions: the column's biome array as sent.
    pub biomes: Vec<u32>,
    pub heightmaps: NbtCompound,
    pub block_entities: Vec<BlockEntity>,
    pub light: Option<LightData>,
}

impl ChunkColumn {
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, index: usize) -> Option<&ChunkSection> {
        self.sections.get(index).and_then(Option::as_ref)
    }

    /// Block state at column-relative x/z and world y; air outside stored sections
    pub fn block(&self, x: usize, y: i32, z: usize) -> u32 {
        let Some(index) = self.section_index(y) else {
            return 0;
        };
        self.section(index)
            .map_or(0, |section| section.block(x, (y - self.min_y) as usize, z))
    }

    /// Section index holding world height `y`
    pub fn section_index(&self, y: i32) -> Option<usize> {
        let offset = y - self.min_y;
        if offset < 0 {
            return None;
        }
        let index = (offset as usize) / SECTION_WIDTH;
        (index < self.sections.len()).then_some(index)
    }

    /// Biome of the 4x4x4 cell containing a block (1.18+ layout)
    pub fn biome(&self, x: usize, y: i32, z: usize) -> Option<u32> {
        let index = self.section_index(y)?;
        let local_y = ((y - self.min_y) as usize) % SECTION_WIDTH;
        let cell = ((local_y >> 2) << 4) | (((z & 15) >> 2) << 2) | ((x & 15) >> 2);
        self.biomes.get(index * BIOME_CELLS_PER_SECTION + cell).copied()
    }

    /// No section holds a non-air block
    pub fn is_empty(&self) -> bool {
        self.sections.iter().flatten().all(ChunkSection::is_empty)
    }
}

/// Decode a chunk data packet body
pub fn read_chunk_column(
    reader: &mut PacketReader<'_>,
    profile: &dyn WireProfile,
    dimension: &Dimension,
) -> Result<ChunkColumn> {
    let x = reader.read_i32()?;
    let z = reader.read_i32()?;

    match profile.terrain_generation() {
        TerrainGeneration::Paletted => read_paletted(reader, profile, dimension, x, z),
        TerrainGeneration::Padded if profile.at_least(MC_1_17) => read_strip_masked(reader, profile, dimension, x, z),
        TerrainGeneration::Padded => read_bitmasked(reader, profile, x, z, Packing::Padded),
        TerrainGeneration::Straddled => read_bitmasked(reader, profile, x, z, Packing::Straddled),
    }
}

/// 1.15 - 1.16.5: full-chunk flag, 16-bit section mask
fn read_bitmasked(
    reader: &mut PacketReader<'_>,
    profile: &dyn WireProfile,
    x: i32,
    z: i32,
    packing: Packing,
) -> Result<ChunkColumn> {
    let full = reader.read_bool()?;
    if profile.at_least(MC_1_16) && !profile.at_least(MC_1_16_2) {
        // ignore old data
        reader.read_bool()?;
    }
    let mask = reader.read_varint()? as u32;
    let heightmaps = nbt::read_nbt(reader, profile.anonymous_nbt())?;

    let mut biomes = Vec::new();
    if full {
        if profile.at_least(MC_1_16_2) {
            biomes = read_varint_biomes(reader)?;
        } else {
            biomes.reserve(LEGACY_BIOME_COUNT);
            for _ in 0..LEGACY_BIOME_COUNT {
                biomes.push(reader.read_i32()? as u32);
            }
        }
    }

    let size = reader.read_len()?;
    let mut data = PacketReader::new(reader.read_bytes(size)?);
    let mut sections = Vec::with_capacity(LEGACY_SECTION_COUNT);
    for index in 0..LEGACY_SECTION_COUNT {
        if mask & (1 << index) == 0 {
            sections.push(None);
            continue;
        }
        let non_air = data.read_i16()?;
        let mut section = read_block_states(&mut data, packing, false)?;
        section.non_air = non_air;
        sections.push(Some(section));
    }
    warn_trailing(&data, x, z);

    let block_entities = read_nbt_block_entities(reader, profile)?;

    Ok(ChunkColumn {
        x,
        z,
        min_y: 0,
        sections,
        biomes,
        heightmaps,
        block_entities,
        light: None,
    })
}

/// 1.17 - 1.17.1: long-array section mask, dimension-sized columns
fn read_strip_masked(
    reader: &mut PacketReader<'_>,
    profile: &dyn WireProfile,
    dimension: &Dimension,
    x: i32,
    z: i32,
) -> Result<ChunkColumn> {
    let mask = reader.read_long_array()?;
    let heightmaps = nbt::read_nbt(reader, profile.anonymous_nbt())?;
    let biomes = read_varint_biomes(reader)?;

    let size = reader.read_len()?;
    let mut data = PacketReader::new(reader.read_bytes(size)?);
    let count = dimension.section_count();
    let mut sections = Vec::with_capacity(count.min(mask.len() * 64));
    for index in 0..count {
        let present = mask
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0);
        if !present {
            sections.push(None);
            continue;
        }
        let non_air = data.read_i16()?;
        let mut section = read_block_states(&mut data, Packing::Padded, false)?;
        section.non_air = non_air;
        sections.push(Some(section));
    }
    warn_trailing(&data, x, z);

    let block_entities = read_nbt_block_entities(reader, profile)?;

    Ok(ChunkColumn {
        x,
        z,
        min_y: dimension.min_y,
        sections,
        biomes,
        heightmaps,
        block_entities,
        light: None,
    })
}

/// 1.18+: every section present with its own biome container, light inline
fn read_paletted(
    reader: &mut PacketReader<'_>,
    profile: &dyn WireProfile,
    dimension: &Dimension,
    x: i32,
    z: i32,
) -> Result<ChunkColumn> {
    let heightmaps = nbt::read_nbt(reader, profile.anonymous_nbt())?;

    let size = reader.read_len()?;
    let mut data = PacketReader::new(reader.read_bytes(size)?);
    let count = dimension.section_count();
    // a single-value section is eight bytes
    let hint = count.min(data.remaining() / 8);
    let mut sections = Vec::with_capacity(hint);
    let mut biomes = Vec::with_capacity(hint * BIOME_CELLS_PER_SECTION);
    for _ in 0..count {
        let non_air = data.read_i16()?;
        let mut section = read_block_states(&mut data, Packing::Padded, true)?;
        section.non_air = non_air;
        sections.push(Some(section));
        biomes.extend(read_biomes(&mut data)?);
    }
    warn_trailing(&data, x, z);

    let entity_count = reader.read_len()?;
    let mut block_entities = Vec::with_capacity(entity_count.min(reader.remaining()));
    for _ in 0..entity_count {
        let packed_xz = reader.read_u8()?;
        let y = reader.read_i16()?;
        let type_id = reader.read_varint()?;
        let nbt = nbt::read_nbt(reader, profile.anonymous_nbt())?;
        block_entities.push(BlockEntity {
            position: BlockPos {
                x: (x << 4) + i32::from(packed_xz >> 4),
                y: i32::from(y),
                z: (z << 4) + i32::from(packed_xz & 15),
            },
            type_id: Some(type_id),
            nbt,
        });
    }

    let light = if profile.inline_chunk_light() {
        Some(LightData::read(reader, profile)?)
    } else {
        None
    };

    Ok(ChunkColumn {
        x,
        z,
        min_y: dimension.min_y,
        sections,
        biomes,
        heightmaps,
        block_entities,
        light,
    })
}

fn read_varint_biomes(reader: &mut PacketReader<'_>) -> Result<Vec<u32>> {
    let len = reader.read_len()?;
    let mut biomes = Vec::with_capacity(len.min(reader.remaining()));
    for _ in 0..len {
        biomes.push(reader.read_varint()? as u32);
    }
    Ok(biomes)
}

/// Pre-1.18 block entities: bare NBT with x/y/z and id keys
fn read_nbt_block_entities(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Vec<BlockEntity>> {
    let count = reader.read_len()?;
    let mut entities = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        let nbt = nbt::read_nbt(reader, profile.anonymous_nbt())?;
        let coord = |key: &str| nbt.get(key).and_then(NbtTag::as_i64).unwrap_or_default() as i32;
        entities.push(BlockEntity {
            position: BlockPos {
                x: coord("x"),
                y: coord("y"),
                z: coord("z"),
            },
            type_id: None,
            nbt,
        });
    }
    Ok(entities)
}

fn warn_trailing(data: &PacketReader<'_>, x: i32, z: i32) {
    if !data.is_empty() {
        debug!(x, z, trailing = data.remaining(), "Chunk section data longer than its sections");
    }
}

/// Biome length check used when a column is handed over
pub fn check_biome_length(column: &ChunkColumn, profile: &dyn WireProfile) {
    let expected = match profile.terrain_generation() {
        TerrainGeneration::Paletted => column.section_count() * BIOME_CELLS_PER_SECTION,
        _ if profile.at_least(MC_1_16_2) => return,
        _ => LEGACY_BIOME_COUNT,
    };
    if !column.biomes.is_empty() && column.biomes.len() != expected {
        warn!(
            x = column.x,
            z = column.z,
            len = column.biomes.len(),
            expected,
            "Unexpected biome length"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use crate::core::codec::WriteExt;
    use crate::core::nbt::write_nbt;
    use crate::error::ProtocolError;
    use crate::protocol::version::{wire_profile, MC_1_15_2, MC_1_21};
    use crate::terrain::container::{pack_entries, BLOCKS_PER_SECTION};

    fn paletted_body(sections: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..sections {
            data.put_i16(if i == 0 { 4096 } else { 0 });
            // single-value block states
            data.put_u8(0);
            data.put_varint(if i == 0 { 1 } else { 0 });
            data.put_varint(0);
            // single-value biomes
            data.put_u8(0);
            data.put_varint(7);
            data.put_varint(0);
        }
        data
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_paletted_column() {
        let profile = wire_profile(MC_1_21).unwrap();
        let dimension = Dimension::overworld(profile.as_ref());
        let mut buf = Vec::new();
        buf.put_i32(3);
        buf.put_i32(-4);
        write_nbt(&mut buf, &NbtCompound::new(), true).unwrap();
        let data = paletted_body(dimension.section_count());
        buf.put_byte_array(&data);
        // one block entity at local (1, 70, 2)
        buf.put_varint(1);
        buf.put_u8(0x12);
        buf.put_i16(70);
        buf.put_varint(8);
        buf.put_u8(0);
        // empty light
        for _ in 0..4 {
            buf.put_varint(0);
        }
        buf.put_varint(0);
        buf.put_varint(0);

        let mut reader = PacketReader::new(&buf);
        let column = read_chunk_column(&mut reader, profile.as_ref(), &dimension).unwrap();
        assert!(reader.is_empty());
        assert_eq!((column.x, column.z), (3, -4));
        assert_eq!(column.section_count(), 24);
        assert_eq!(column.block(0, -64, 0), 1);
        assert_eq!(column.block(15, -49, 15), 1);
        assert_eq!(column.block(0, -48, 0), 0);
        assert_eq!(column.biome(5, 100, 5), Some(7));
        assert_eq!(column.biomes.len(), 24 * 64);
        assert_eq!(column.block_entities[0].position, BlockPos { x: 49, y: 70, z: -62 });
        assert_eq!(column.block_entities[0].type_id, Some(8));
        assert!(column.light.is_some());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_oversized_dimension_without_section_data() {
        let profile = wire_profile(MC_1_21).unwrap();
        let dimension = Dimension {
            name: "minecraft:huge".into(),
            min_y: 0,
            height: i32::MAX,
        };
        let mut buf = Vec::new();
        buf.put_i32(0);
        buf.put_i32(0);
        write_nbt(&mut buf, &NbtCompound::new(), true).unwrap();
        buf.put_byte_array(&paletted_body(2));

        let mut reader = PacketReader::new(&buf);
        assert!(matches!(
            read_chunk_column(&mut reader, profile.as_ref(), &dimension),
            Err(ProtocolError::UnexpectedEof { .. })
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_straddled_column() {
        let profile = wire_profile(MC_1_15_2).unwrap();
        let dimension = Dimension::overworld(profile.as_ref());
        let mut buf = Vec::new();
        buf.put_i32(0);
        buf.put_i32(0);
        buf.put_bool(true);
        buf.put_varint(0b100); // only section 2
        write_nbt(&mut buf, &NbtCompound::new(), false).unwrap();
        for _ in 0..LEGACY_BIOME_COUNT {
            buf.put_i32(1);
        }

        let values: Vec<u32> = (0..BLOCKS_PER_SECTION as u32).map(|i| i % 5).collect();
        let mut data = Vec::new();
        data.put_i16(100);
        data.put_u8(5);
        data.put_varint(5);
        for id in [0, 10, 20, 30, 40] {
            data.put_varint(id);
        }
        data.put_long_array(&pack_entries(&values, 5, Packing::Straddled));
        buf.put_byte_array(&data);
        buf.put_varint(0);

        let mut reader = PacketReader::new(&buf);
        let column = read_chunk_column(&mut reader, profile.as_ref(), &dimension).unwrap();
        assert!(reader.is_empty());
        assert!(column.section(0).is_none());
        let section = column.section(2).unwrap();
        assert_eq!(section.non_air, 100);
        assert_eq!(section.blocks()[13], 30);
        assert_eq!(column.block(13, 32, 0), 30);
        assert_eq!(column.biomes.len(), LEGACY_BIOME_COUNT);
        assert!(column.light.is_none());
    }
}
