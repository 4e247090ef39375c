//! # Registries
//!
//! Connection-scoped registries synchronised by the server.
//!
//! Before 1.20.5 every registry arrives in one NBT "registry codec" (inside
//! Registry Data during Configuration, or inside Join Game before 1.20.2).
//! From 1.20.5 each registry comes in its own packet as a list of
//! `(name, optional NBT)` entries whose wire position is the numeric id.
//!
//! The active [`Dimension`] decides how many chunk sections a column holds.

use crate::core::codec::PacketReader;
use crate::core::nbt::{self, NbtCompound, NbtTag};
use crate::error::{ProtocolError, Result};
use crate::protocol::chat::ChatKind;
use crate::protocol::version::{WireProfile, MC_1_18_1, MC_1_20_6};
use std::collections::HashMap;
use tracing::{debug, warn};

pub const CHAT_TYPE_REGISTRY: &str = "minecraft:chat_type";
pub const DIMENSION_TYPE_REGISTRY: &str = "minecraft:dimension_type";
pub const BIOME_REGISTRY: &str = "minecraft:worldgen/biome";

/// Recipe serializers in registry order for 1.20.5 and 1.21
static RECIPE_SERIALIZERS_1_20_6: &[&str] = &[
    "minecraft:crafting_shaped",
    "minecraft:crafting_shapeless",
    "minecraft:crafting_special_armordye",
    "minecraft:crafting_special_bookcloning",
    "minecraft:crafting_special_mapcloning",
    "minecraft:crafting_special_mapextending",
    "minecraft:crafting_special_firework_rocket",
    "minecraft:crafting_special_firework_star",
    "minecraft:crafting_special_firework_star_fade",
    "minecraft:crafting_special_tippedarrow",
    "minecraft:crafting_special_bannerduplicate",
    "minecraft:crafting_special_shielddecoration",
    "minecraft:crafting_special_shulkerboxcoloring",
    "minecraft:crafting_special_suspiciousstew",
    "minecraft:crafting_special_repairitem",
    "minecraft:smelting",
    "minecraft:blasting",
    "minecraft:smoking",
    "minecraft:campfire_cooking",
    "minecraft:stonecutting",
    "minecraft:smithing_transform",
    "minecraft:smithing_trim",
    "minecraft:crafting_decorated_pot",
];

/// Prefix a bare path with the default namespace
pub fn qualify(name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("minecraft:{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub name: String,
    pub id: i32,
    pub element: Option<NbtCompound>,
}

/// One synchronised registry, addressable by numeric id and by name
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    by_id: HashMap<i32, usize>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn from_entries(entries: Vec<RegistryEntry>) -> Self {
        let mut registry = Self::default();
        registry.replace(entries);
        registry
    }

    /// Replace all entries
    pub fn replace(&mut self, entries: Vec<RegistryEntry>) {
        self.by_id = entries.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        self.by_name = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        self.entries = entries;
    }

    pub fn by_id(&self, id: i32) -> Option<&RegistryEntry> {
        self.by_id.get(&id).map(|&i| &self.entries[i])
    }

    pub fn by_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.by_name.get(&qualify(name)).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }
}

/// Tallest world a dimension type may declare
pub const MAX_DIMENSION_HEIGHT: i32 = 4064;

/// Vertical extent of the world the player is in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub min_y: i32,
    pub height: i32,
}

impl Dimension {
    /// Overworld bounds for a protocol version
    pub fn overworld(profile: &dyn WireProfile) -> Self {
        let (min_y, height) = if profile.at_least(MC_1_18_1) {
            (-64, 384)
        } else {
            (0, 256)
        };
        Self {
            name: "minecraft:overworld".into(),
            min_y,
            height,
        }
    }

    /// Read `min_y` and `height` from a dimension type element.
    ///
    /// The height is clamped to `0..=MAX_DIMENSION_HEIGHT` and rounded down
    /// to whole sections.
    pub fn from_element(name: &str, element: &NbtCompound, fallback: &Dimension) -> Self {
        let int = |key: &str| element.get(key).and_then(NbtTag::as_i64);
        let height = int("height").map_or(fallback.height, |h| {
            let clamped = h.clamp(0, i64::from(MAX_DIMENSION_HEIGHT)) as i32;
            if i64::from(clamped) != h {
                warn!(dimension = name, height = h, "Dimension height out of range, clamped");
            }
            clamped - clamped % 16
        });
        Self {
            name: qualify(name),
            min_y: int("min_y").map_or(fallback.min_y, |v| v as i32),
            height,
        }
    }

    /// Number of 16-block sections in a column
    pub fn section_count(&self) -> usize {
        (self.height.max(0) / 16) as usize
    }
}

/// Everything the server told this connection about its registries
#[derive(Debug, Clone)]
pub struct Registries {
    pub chat_types: Registry,
    pub dimension_types: Registry,
    pub biomes: Registry,
    recipe_serializers: Vec<String>,
    dimension: Dimension,
    default_dimension: Dimension,
}

impl Registries {
    pub fn new(profile: &dyn WireProfile) -> Self {
        let dimension = Dimension::overworld(profile);
        let recipe_serializers = if profile.at_least(MC_1_20_6) {
            RECIPE_SERIALIZERS_1_20_6.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        };
        Self {
            chat_types: Registry::default(),
            dimension_types: Registry::default(),
            biomes: Registry::default(),
            recipe_serializers,
            default_dimension: dimension.clone(),
            dimension,
        }
    }

    /// Apply a combined registry codec
    pub fn apply_registry_codec(&mut self, codec: &NbtCompound) -> Result<()> {
        debug!(registries = ?codec.keys().collect::<Vec<_>>(), "Registry codec received");
        for (key, value) in codec {
            let Some(list) = value
                .as_compound()
                .and_then(|c| c.get("value"))
                .and_then(NbtTag::as_list)
            else {
                continue;
            };
            let entries = list
                .iter()
                .map(codec_entry)
                .collect::<Result<Vec<_>>>()?;
            self.apply_registry_entries(key, entries);
        }
        Ok(())
    }

    /// Replace one registry's entries. Unknown registries are ignored.
    pub fn apply_registry_entries(&mut self, registry: &str, entries: Vec<RegistryEntry>) {
        let registry = qualify(registry);
        debug!(registry = %registry, count = entries.len(), "Registry entries received");
        match registry.as_str() {
            CHAT_TYPE_REGISTRY => self.chat_types.replace(entries),
            DIMENSION_TYPE_REGISTRY => self.dimension_types.replace(entries),
            BIOME_REGISTRY => self.biomes.replace(entries),
            _ => {}
        }
    }

    /// Display kind for a chat type id
    pub fn chat_kind(&self, id: i32) -> Option<ChatKind> {
        let entry = self.chat_types.by_id(id)?;
        let kind = ChatKind::from_name(&entry.name);
        if kind.is_none() {
            warn!(chat_type = %entry.name, "Unknown chat type, treating as chat");
        }
        kind
    }

    pub fn biome_name(&self, id: i32) -> Option<&str> {
        self.biomes.by_id(id).map(|e| e.name.as_str())
    }

    /// Recipe serializer name for a numeric recipe type (1.20.5+)
    pub fn recipe_serializer(&self, id: i32) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.recipe_serializers.get(i))
            .map(String::as_str)
    }

    pub fn dimension(&self) -> &Dimension {
        &self.dimension
    }

    /// Enter a dimension by registry name
    pub fn set_dimension_by_name(&mut self, name: &str) {
        self.dimension = match self.dimension_types.by_name(name) {
            Some(RegistryEntry {
                element: Some(element),
                ..
            }) => Dimension::from_element(name, element, &self.default_dimension),
            _ => Dimension {
                name: qualify(name),
                ..self.default_dimension.clone()
            },
        };
    }

    /// Enter a dimension by numeric dimension type id (1.20.5+)
    pub fn set_dimension_by_id(&mut self, id: i32) {
        match self.dimension_types.by_id(id).map(|e| e.name.clone()) {
            Some(name) => self.set_dimension_by_name(&name),
            None => {
                warn!(dimension_type = id, "Unknown dimension type id");
                self.dimension = self.default_dimension.clone();
            }
        }
    }

    /// Enter a dimension whose type was sent inline (1.16.2 - 1.18.2)
    pub fn set_dimension_from_nbt(&mut self, name: &str, element: &NbtCompound) {
        self.dimension = Dimension::from_element(name, element, &self.default_dimension);
    }
}

fn codec_entry(tag: &NbtTag) -> Result<RegistryEntry> {
    let entry = tag
        .as_compound()
        .ok_or_else(|| ProtocolError::Custom("registry codec entry is not a compound".into()))?;
    let name = entry
        .get("name")
        .and_then(NbtTag::as_str)
        .ok_or_else(|| ProtocolError::Custom("registry codec entry without name".into()))?;
    let id = entry
        .get("id")
        .and_then(NbtTag::as_i64)
        .ok_or_else(|| ProtocolError::Custom(format!("registry entry {name} without id")))?;
    Ok(RegistryEntry {
        name: qualify(name),
        id: id as i32,
        element: entry.get("element").and_then(NbtTag::as_compound).cloned(),
    })
}

/// Read a single-registry Registry Data body (1.20.5+), after the registry id
pub fn read_registry_entries(
    reader: &mut PacketReader<'_>,
    profile: &dyn WireProfile,
) -> Result<Vec<RegistryEntry>> {
    let count = reader.read_len()?;
    let mut entries = Vec::with_capacity(count.min(1024));
    for id in 0..count {
        let name = qualify(&reader.read_string()?);
        let element = if reader.read_bool()? {
            Some(nbt::read_nbt(reader, profile.anonymous_nbt())?)
        } else {
            None
        };
        entries.push(RegistryEntry {
            name,
            id: id as i32,
            element,
        });
    }
    Ok(entries)
}
