//! # Terrain Decoder
//!
//! Chunk columns, paletted sections and light channels.
//!
//! ## Wire Generations
//! - **1.15**: section mask, entries straddle word boundaries, 1024 int biomes
//! - **1.16 - 1.17.1**: padded words, biomes outside the sections, light in its own packet
//! - **1.18+**: every section carries a block and a biome container, light inline
//!
//! Light may arrive before its column. [`ColumnTracker`] holds it until the
//! column is decoded and then merges it in.

pub mod column;
pub mod container;
pub mod light;

pub use column::{read_chunk_column, BlockEntity, ChunkColumn};
pub use container::{ChunkSection, Packing};
pub use light::{LightData, PendingLight};

use std::collections::HashSet;

/// Loaded column coordinates plus light waiting for its column
#[derive(Debug, Default)]
pub struct ColumnTracker {
    loaded: HashSet<(i32, i32)>,
    pending_light: PendingLight,
}

impl ColumnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a freshly decoded column as loaded, folding in any light cached for it
    pub fn column_loaded(&mut self, column: &mut ChunkColumn) {
        if let Some(mut pending) = self.pending_light.take(column.x, column.z) {
            if let Some(inline) = column.light.take() {
                pending.merge(inline);
            }
            column.light = Some(pending);
        }
        self.loaded.insert((column.x, column.z));
    }

    /// Route a light update: returned when the column is loaded, cached otherwise
    pub fn light_update(&mut self, x: i32, z: i32, light: LightData) -> Option<LightData> {
        if self.loaded.contains(&(x, z)) {
            return Some(light);
        }
        self.pending_light.insert(x, z, light);
        None
    }

    /// Forget a column and its cached light; reports whether it was loaded
    pub fn unload(&mut self, x: i32, z: i32) -> bool {
        self.pending_light.remove(x, z);
        self.loaded.remove(&(x, z))
    }

    pub fn is_loaded(&self, x: i32, z: i32) -> bool {
        self.loaded.contains(&(x, z))
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn pending_light(&self) -> &PendingLight {
        &self.pending_light
    }

    /// Drop everything, e.g. on a dimension change
    pub fn clear(&mut self) {
        self.loaded.clear();
        self.pending_light.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::nbt::NbtCompound;
    use crate::terrain::container::BLOCKS_PER_SECTION;

    fn column(x: i32, z: i32) -> ChunkColumn {
        ChunkColumn {
            x,
            z,
            min_y: 0,
            sections: Vec::new(),
            biomes: Vec::new(),
            heightmaps: NbtCompound::new(),
            block_entities: Vec::new(),
            light: None,
        }
    }

    #[test]
    fn test_light_before_column_is_applied_later() {
        let mut tracker = ColumnTracker::new();
        let mut light = LightData::default();
        light.sky.insert(3, vec![12; BLOCKS_PER_SECTION]);

        assert!(tracker.light_update(1, 2, light).is_none());
        assert_eq!(tracker.pending_light().len(), 1);

        let mut col = column(1, 2);
        tracker.column_loaded(&mut col);
        assert!(tracker.is_loaded(1, 2));
        assert!(tracker.pending_light().is_empty());
        assert_eq!(col.light.and_then(|l| l.sky_light(3, 0, 0, 0)), Some(12));

        // loaded columns get updates passed straight through
        assert!(tracker.light_update(1, 2, LightData::default()).is_some());
    }

    #[test]
    fn test_unload_drops_cached_light() {
        let mut tracker = ColumnTracker::new();
        tracker.light_update(5, 5, LightData::default());
        assert!(!tracker.unload(5, 5));
        assert!(tracker.pending_light().is_empty());

        let mut col = column(5, 5);
        tracker.column_loaded(&mut col);
        assert!(col.light.is_none());
        assert!(tracker.unload(5, 5));
        assert_eq!(tracker.loaded_count(), 0);
    }
}
