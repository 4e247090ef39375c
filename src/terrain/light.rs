//! Sky and block light channels.
//!
//! A column carries light for its sections plus one section below the bottom
//! and one above the top. Each lit section is a 2048-byte nibble array that is
//! expanded to one byte per block.

use crate::core::codec::PacketReader;
use crate::error::Result;
use crate::protocol::version::WireProfile;
use crate::terrain::container::BLOCKS_PER_SECTION;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// Packed bytes per lit section
pub const LIGHT_ARRAY_LEN: usize = BLOCKS_PER_SECTION / 2;

/// Light sections in a column before 1.17, including the two padding sections
pub const LEGACY_LIGHT_SECTIONS: usize = 18;

/// Expand a nibble array, low nibble first, into one light level per block
pub fn expand_nibbles(packed: &[u8]) -> Vec<u8> {
    let mut levels = Vec::with_capacity(packed.len() * 2);
    for byte in packed {
        levels.push(byte & 0x0F);
        levels.push(byte >> 4);
    }
    levels
}

/// Light levels for one column, keyed by light-section index.
///
/// Index 0 is the padding section below the column's lowest chunk section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightData {
    /// Present from 1.16 until 1.20
    pub trust_edges: Option<bool>,
    pub sky: BTreeMap<usize, Vec<u8>>,
    pub block: BTreeMap<usize, Vec<u8>>,
    /// Sections explicitly reported as fully dark
    pub empty_sky: BTreeSet<usize>,
    pub empty_block: BTreeSet<usize>,
}

impl LightData {
    /// Read a light payload (update-light body, or the tail of a 1.18+ chunk packet)
    pub fn read(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Self> {
        let trust_edges = if profile.light_trust_edges() {
            Some(reader.read_bool()?)
        } else {
            None
        };

        let masks = if profile.bitset_light_masks() {
            [
                reader.read_long_array()?,
                reader.read_long_array()?,
                reader.read_long_array()?,
                reader.read_long_array()?,
            ]
        } else {
            [
                vec![reader.read_varint()? as u32 as u64],
                vec![reader.read_varint()? as u32 as u64],
                vec![reader.read_varint()? as u32 as u64],
                vec![reader.read_varint()? as u32 as u64],
            ]
        };
        let [sky_mask, block_mask, empty_sky_mask, empty_block_mask] = masks;

        let bitset = profile.bitset_light_masks();
        let sky = read_light_arrays(reader, &sky_mask, bitset, "sky")?;
        let block = read_light_arrays(reader, &block_mask, bitset, "block")?;

        Ok(Self {
            trust_edges,
            sky,
            block,
            empty_sky: mask_indices(&empty_sky_mask).collect(),
            empty_block: mask_indices(&empty_block_mask).collect(),
        })
    }

    /// Light-section indices touched by this payload
    pub fn updated_sections(&self) -> BTreeSet<usize> {
        self.sky
            .keys()
            .chain(self.block.keys())
            .chain(self.empty_sky.iter())
            .chain(self.empty_block.iter())
            .copied()
            .collect()
    }

    /// Apply a newer payload on top of this one
    pub fn merge(&mut self, newer: LightData) {
        for index in &newer.empty_sky {
            self.sky.remove(index);
        }
        for index in &newer.empty_block {
            self.block.remove(index);
        }
        self.sky.extend(newer.sky);
        self.block.extend(newer.block);
        self.empty_sky.extend(newer.empty_sky);
        self.empty_block.extend(newer.empty_block);
        if newer.trust_edges.is_some() {
            self.trust_edges = newer.trust_edges;
        }
    }

    /// Sky light at a block within light section `index`
    pub fn sky_light(&self, index: usize, x: usize, y: usize, z: usize) -> Option<u8> {
        level(&self.sky, index, x, y, z)
    }

    pub fn block_light(&self, index: usize, x: usize, y: usize, z: usize) -> Option<u8> {
        level(&self.block, index, x, y, z)
    }
}

fn level(channel: &BTreeMap<usize, Vec<u8>>, index: usize, x: usize, y: usize, z: usize) -> Option<u8> {
    channel
        .get(&index)
        .and_then(|levels| levels.get(((y & 15) << 8) | ((z & 15) << 4) | (x & 15)))
        .copied()
}

fn mask_indices(mask: &[u64]) -> impl Iterator<Item = usize> + '_ {
    mask.iter().enumerate().flat_map(|(word_index, word)| {
        (0..64usize).filter(move |bit| word & (1u64 << bit) != 0).map(move |bit| word_index * 64 + bit)
    })
}

fn read_light_arrays(
    reader: &mut PacketReader<'_>,
    mask: &[u64],
    counted: bool,
    channel: &'static str,
) -> Result<BTreeMap<usize, Vec<u8>>> {
    let indices: Vec<usize> = if counted {
        mask_indices(mask).collect()
    } else {
        mask_indices(mask).filter(|i| *i < LEGACY_LIGHT_SECTIONS).collect()
    };

    let count = if counted {
        let count = reader.read_len()?;
        if count != indices.len() {
            warn!(channel, count, mask_bits = indices.len(), "Light array count does not match mask");
        }
        count
    } else {
        indices.len()
    };

    let mut arrays = BTreeMap::new();
    for i in 0..count {
        let packed = reader.read_byte_array()?;
        let Some(index) = indices.get(i).copied() else {
            continue;
        };
        if packed.len() != LIGHT_ARRAY_LEN {
            warn!(channel, index, len = packed.len(), "Skipping light array of unexpected length");
            continue;
        }
        arrays.insert(index, expand_nibbles(&packed));
    }
    Ok(arrays)
}

/// Light that arrived before its chunk column, keyed by column coordinate
#[derive(Debug, Default)]
pub struct PendingLight {
    entries: HashMap<(i32, i32), LightData>,
}

impl PendingLight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache light for a column that is not loaded yet; later payloads merge on top
    pub fn insert(&mut self, x: i32, z: i32, light: LightData) {
        match self.entries.get_mut(&(x, z)) {
            Some(existing) => existing.merge(light),
            None => {
                self.entries.insert((x, z), light);
            }
        }
    }

    pub fn take(&mut self, x: i32, z: i32) -> Option<LightData> {
        self.entries.remove(&(x, z))
    }

    pub fn remove(&mut self, x: i32, z: i32) {
        self.entries.remove(&(x, z));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::WriteExt;
    use crate::protocol::version::{wire_profile, MC_1_16_5, MC_1_20_6};

    fn packed_array(low: u8, high: u8) -> Vec<u8> {
        vec![(high << 4) | low; LIGHT_ARRAY_LEN]
    }

    #[test]
    fn test_expand_nibbles_order() {
        let levels = expand_nibbles(&[0x21, 0xF0]);
        assert_eq!(levels, vec![1, 2, 0, 15]);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_legacy_masks() {
        let profile = wire_profile(MC_1_16_5).unwrap();
        let mut buf = Vec::new();
        buf.put_bool(true);
        buf.put_varint(0b101); // sky sections 0 and 2
        buf.put_varint(0b10); // block section 1
        buf.put_varint(0b1000);
        buf.put_varint(0);
        buf.put_byte_array(&packed_array(3, 4));
        buf.put_byte_array(&packed_array(5, 6));
        buf.put_byte_array(&packed_array(7, 8));

        let mut reader = PacketReader::new(&buf);
        let light = LightData::read(&mut reader, profile.as_ref()).unwrap();
        assert!(reader.is_empty());
        assert_eq!(light.trust_edges, Some(true));
        assert_eq!(light.sky.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(light.sky_light(0, 0, 0, 0), Some(3));
        assert_eq!(light.sky_light(2, 1, 0, 0), Some(6));
        assert_eq!(light.block_light(1, 0, 5, 5), Some(7));
        assert_eq!(light.empty_sky.iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(light.updated_sections().len(), 4);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_bitset_masks_read_both_channels() {
        let profile = wire_profile(MC_1_20_6).unwrap();
        let mut buf = Vec::new();
        buf.put_long_array(&[1 << 20]);
        buf.put_long_array(&[1 << 4]);
        buf.put_long_array(&[]);
        buf.put_long_array(&[]);
        buf.put_varint(1);
        buf.put_byte_array(&packed_array(15, 15));
        buf.put_varint(1);
        buf.put_byte_array(&packed_array(2, 9));

        let mut reader = PacketReader::new(&buf);
        let light = LightData::read(&mut reader, profile.as_ref()).unwrap();
        assert!(reader.is_empty());
        assert_eq!(light.trust_edges, None);
        assert_eq!(light.sky_light(20, 3, 3, 3), Some(15));
        assert_eq!(light.block_light(4, 1, 0, 0), Some(9));
    }

    #[test]
    fn test_pending_light_merges() {
        let mut first = LightData::default();
        first.sky.insert(1, vec![1; BLOCKS_PER_SECTION]);
        first.sky.insert(2, vec![2; BLOCKS_PER_SECTION]);
        let mut second = LightData::default();
        second.sky.insert(1, vec![9; BLOCKS_PER_SECTION]);
        second.empty_sky.insert(2);

        let mut pending = PendingLight::new();
        pending.insert(4, -2, first);
        pending.insert(4, -2, second);
        assert_eq!(pending.len(), 1);

        let merged = pending.take(4, -2);
        assert!(pending.is_empty());
        let merged = merged.unwrap_or_default();
        assert_eq!(merged.sky_light(1, 0, 0, 0), Some(9));
        assert_eq!(merged.sky_light(2, 0, 0, 0), None);
    }
}
