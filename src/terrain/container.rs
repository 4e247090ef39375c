//! Paletted containers and bit-packed entry arrays.
//!
//! Entries are packed little-end-first into big-endian 64-bit words. From 1.16
//! on, a word holds `64 / bits` entries and the leftover high bits are padding;
//! before 1.16 entries run continuously and may straddle two words.

use crate::core::codec::PacketReader;
use crate::error::{ProtocolError, Result};
use tracing::warn;

/// Blocks along each edge of a section
pub const SECTION_WIDTH: usize = 16;

/// Block states in one section
pub const BLOCKS_PER_SECTION: usize = SECTION_WIDTH * SECTION_WIDTH * SECTION_WIDTH;

/// 4x4x4 biome cells in one section
pub const BIOME_CELLS_PER_SECTION: usize = 64;

const MIN_INDIRECT_BLOCK_BITS: u8 = 4;
const MAX_INDIRECT_BLOCK_BITS: u8 = 8;
const MAX_INDIRECT_BIOME_BITS: u8 = 3;
const MAX_BITS_PER_ENTRY: u8 = 32;

/// Word layout of a packed entry array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    /// No entry crosses a word boundary
    Padded,
    /// Entries are contiguous across words
    Straddled,
}

impl Packing {
    /// Words needed to hold `count` entries of `bits` each
    pub fn words_for(self, bits: u8, count: usize) -> usize {
        let bits = usize::from(bits);
        match self {
            Packing::Padded => {
                let per_word = 64 / bits;
                count.div_ceil(per_word)
            }
            Packing::Straddled => (count * bits).div_ceil(64),
        }
    }
}

/// Unpack `count` entries of `bits` width each
pub fn unpack_entries(data: &[u64], bits: u8, count: usize, packing: Packing) -> Result<Vec<u32>> {
    if bits == 0 || bits > MAX_BITS_PER_ENTRY {
        return Err(ProtocolError::InvalidBitsPerEntry(bits));
    }
    let needed = packing.words_for(bits, count);
    if data.len() < needed {
        return Err(ProtocolError::UnexpectedEof {
            needed: needed * 8,
            remaining: data.len() * 8,
        });
    }

    let width = usize::from(bits);
    let mask = (1u64 << width) - 1;
    let mut out = Vec::with_capacity(count);

    match packing {
        Packing::Padded => {
            let per_word = 64 / width;
            for i in 0..count {
                let word = data[i / per_word];
                let shift = (i % per_word) * width;
                out.push(((word >> shift) & mask) as u32);
            }
        }
        Packing::Straddled => {
            for i in 0..count {
                let bit = i * width;
                let index = bit / 64;
                let offset = bit % 64;
                let mut value = data[index] >> offset;
                if offset + width > 64 {
                    value |= data[index + 1] << (64 - offset);
                }
                out.push((value & mask) as u32);
            }
        }
    }

    Ok(out)
}

/// Pack entries; the inverse of [`unpack_entries`]
pub fn pack_entries(values: &[u32], bits: u8, packing: Packing) -> Vec<u64> {
    let width = usize::from(bits.clamp(1, MAX_BITS_PER_ENTRY));
    let mask = (1u64 << width) - 1;
    let mut words = vec![0u64; packing.words_for(width as u8, values.len())];

    for (i, value) in values.iter().enumerate() {
        let value = u64::from(*value) & mask;
        match packing {
            Packing::Padded => {
                let per_word = 64 / width;
                words[i / per_word] |= value << ((i % per_word) * width);
            }
            Packing::Straddled => {
                let bit = i * width;
                let index = bit / 64;
                let offset = bit % 64;
                words[index] |= value << offset;
                if offset + width > 64 {
                    words[index + 1] |= value >> (64 - offset);
                }
            }
        }
    }
    words
}

/// One 16x16x16 cube of block states, Y-outer, Z-middle, X-inner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSection {
    blocks: Vec<u32>,
    /// Non-air block count reported by the server
    pub non_air: i16,
}

impl ChunkSection {
    /// A section filled with a single block state
    pub fn uniform(state: u32) -> Self {
        Self {
            blocks: vec![state; BLOCKS_PER_SECTION],
            non_air: 0,
        }
    }

    pub fn from_blocks(blocks: Vec<u32>) -> Result<Self> {
        if blocks.len() != BLOCKS_PER_SECTION {
            return Err(ProtocolError::UnexpectedEof {
                needed: BLOCKS_PER_SECTION,
                remaining: blocks.len(),
            });
        }
        Ok(Self { blocks, non_air: 0 })
    }

    pub fn index(x: usize, y: usize, z: usize) -> usize {
        (y * SECTION_WIDTH + z) * SECTION_WIDTH + x
    }

    pub fn block(&self, x: usize, y: usize, z: usize) -> u32 {
        self.blocks[Self::index(x & 15, y & 15, z & 15)]
    }

    pub fn set_block(&mut self, x: usize, y: usize, z: usize, state: u32) {
        self.blocks[Self::index(x & 15, y & 15, z & 15)] = state;
    }

    pub fn blocks(&self) -> &[u32] {
        &self.blocks
    }

    /// Every block is air (state 0)
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| *b == 0)
    }
}

/// Read a block-state container.
///
/// `single_value` enables the zero-bit palette introduced with 1.18.
pub fn read_block_states(reader: &mut PacketReader<'_>, packing: Packing, single_value: bool) -> Result<ChunkSection> {
    let declared = reader.read_u8()?;

    if declared == 0 && single_value {
        let state = reader.read_varint()? as u32;
        skip_data_array(reader)?;
        return Ok(ChunkSection::uniform(state));
    }

    let indirect = declared <= MAX_INDIRECT_BLOCK_BITS;
    let bits = declared.max(MIN_INDIRECT_BLOCK_BITS);
    let palette = if indirect { read_palette(reader)? } else { Vec::new() };
    let data = reader.read_long_array()?;
    let mut entries = unpack_entries(&data, bits, BLOCKS_PER_SECTION, packing)?;

    if indirect {
        for (block, entry) in entries.iter_mut().enumerate() {
            *entry = *palette
                .get(*entry as usize)
                .ok_or(ProtocolError::PaletteIndexOutOfRange {
                    id: *entry,
                    max: palette.len() as i64 - 1,
                    bits,
                    block,
                })?;
        }
    }

    ChunkSection::from_blocks(entries)
}

/// Read a 1.18+ biome container covering the 64 cells of one section
pub fn read_biomes(reader: &mut PacketReader<'_>) -> Result<Vec<u32>> {
    let bits = reader.read_u8()?;

    if bits == 0 {
        let biome = reader.read_varint()? as u32;
        skip_data_array(reader)?;
        return Ok(vec![biome; BIOME_CELLS_PER_SECTION]);
    }

    let indirect = bits <= MAX_INDIRECT_BIOME_BITS;
    let palette = if indirect { read_palette(reader)? } else { Vec::new() };
    let data = reader.read_long_array()?;
    let mut cells = unpack_entries(&data, bits, BIOME_CELLS_PER_SECTION, Packing::Padded)?;

    if indirect {
        for (cell, entry) in cells.iter_mut().enumerate() {
            *entry = *palette
                .get(*entry as usize)
                .ok_or(ProtocolError::BiomeIndexOutOfRange {
                    id: *entry,
                    max: palette.len() as i64 - 1,
                    bits,
                    cell,
                })?;
        }
    }

    Ok(cells)
}

fn read_palette(reader: &mut PacketReader<'_>) -> Result<Vec<u32>> {
    let len = reader.read_len()?;
    let mut palette = Vec::with_capacity(len.min(256));
    for _ in 0..len {
        palette.push(reader.read_varint()? as u32);
    }
    Ok(palette)
}

fn skip_data_array(reader: &mut PacketReader<'_>) -> Result<()> {
    let len = reader.read_len()?;
    if len != 0 {
        warn!(len, "Single-valued container carries a data array");
    }
    reader.skip(len * 8)
}
