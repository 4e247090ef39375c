//! # Protocol Versions
//!
//! Named protocol version numbers and the per-connection [`WireProfile`].
//!
//! Every version-dependent decision in the crate goes through a profile that
//! is built once from the negotiated version. Packet interpreters ask the
//! profile a named question (`anonymous_nbt()`, `signing_generation()`, ...)
//! instead of comparing version numbers inline. Field gates that only ever
//! matter to a single packet layout use [`WireProfile::at_least`].

use crate::error::{ProtocolError, Result};
use std::fmt;
use std::sync::Arc;

pub const MC_1_15: i32 = 573;
pub const MC_1_15_2: i32 = 578;
pub const MC_1_16: i32 = 735;
pub const MC_1_16_1: i32 = 736;
pub const MC_1_16_2: i32 = 751;
pub const MC_1_16_3: i32 = 753;
pub const MC_1_16_5: i32 = 754;
pub const MC_1_17: i32 = 755;
pub const MC_1_17_1: i32 = 756;
pub const MC_1_18_1: i32 = 757;
pub const MC_1_18_2: i32 = 758;
pub const MC_1_19: i32 = 759;
pub const MC_1_19_2: i32 = 760;
pub const MC_1_19_3: i32 = 761;
pub const MC_1_19_4: i32 = 762;
pub const MC_1_20: i32 = 763;
pub const MC_1_20_2: i32 = 764;
pub const MC_1_20_4: i32 = 765;
pub const MC_1_20_6: i32 = 766;
pub const MC_1_21: i32 = 767;

/// Oldest protocol version this crate speaks
pub const MIN_SUPPORTED_VERSION: i32 = MC_1_15;
/// Newest protocol version this crate speaks
pub const MAX_SUPPORTED_VERSION: i32 = MC_1_21;

/// Human readable game version for a protocol number
pub fn version_name(version: i32) -> Option<&'static str> {
    let name = match version {
        MC_1_15 => "1.15",
        MC_1_15_2 => "1.15.2",
        MC_1_16 => "1.16",
        MC_1_16_1 => "1.16.1",
        MC_1_16_2 => "1.16.2",
        MC_1_16_3 => "1.16.3",
        MC_1_16_5 => "1.16.5",
        MC_1_17 => "1.17",
        MC_1_17_1 => "1.17.1",
        MC_1_18_1 => "1.18.1",
        MC_1_18_2 => "1.18.2",
        MC_1_19 => "1.19",
        MC_1_19_2 => "1.19.2",
        MC_1_19_3 => "1.19.3",
        MC_1_19_4 => "1.19.4",
        MC_1_20 => "1.20",
        MC_1_20_2 => "1.20.2",
        MC_1_20_4 => "1.20.4",
        MC_1_20_6 => "1.20.6",
        MC_1_21 => "1.21",
        _ => return None,
    };
    Some(name)
}

/// Chunk section wire layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainGeneration {
    /// Before 1.16: entries straddle 64-bit word boundaries, biomes as an int array
    Straddled,
    /// 1.16 - 1.17.1: padded words, section bitmask, biomes outside the sections
    Padded,
    /// 1.18+: every section carries a block and a biome paletted container
    Paletted,
}

/// Signed chat protocol generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SigningGeneration {
    /// No chat signatures
    None,
    /// 1.19: standalone signatures over salt, sender, timestamp and content
    V1_19,
    /// 1.19.1 - 1.19.2: header/body chain with preceding signatures
    V1_19_2,
    /// 1.19.3+: chat sessions, message indices and a 20 entry last-seen window
    V1_19_3,
}

/// Item slot wire layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFormat {
    /// Presence flag, item id, count and NBT
    Legacy,
    /// Item count first, then id and structured component patches (1.20.5+)
    Components,
}

/// Entity metadata value types, resolved per version from a numeric id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataType {
    Byte,
    VarInt,
    VarLong,
    Float,
    String,
    Chat,
    OptionalChat,
    Slot,
    Boolean,
    Rotation,
    Position,
    OptionalPosition,
    Direction,
    OptionalUuid,
    BlockId,
    OptionalBlockId,
    Nbt,
    Particle,
    Particles,
    VillagerData,
    OptionalVarInt,
    Pose,
    CatVariant,
    WolfVariant,
    FrogVariant,
    OptionalGlobalPos,
    PaintingVariant,
    SnifferState,
    ArmadilloState,
    Vector3,
    Quaternion,
}

use MetadataType as M;

static METADATA_1_19_2: &[MetadataType] = &[
    M::Byte,
    M::VarInt,
    M::Float,
    M::String,
    M::Chat,
    M::OptionalChat,
    M::Slot,
    M::Boolean,
    M::Rotation,
    M::Position,
    M::OptionalPosition,
    M::Direction,
    M::OptionalUuid,
    M::OptionalBlockId,
    M::Nbt,
    M::Particle,
    M::VillagerData,
    M::OptionalVarInt,
    M::Pose,
    M::CatVariant,
    M::FrogVariant,
    M::OptionalGlobalPos,
    M::PaintingVariant,
];

static METADATA_1_19_3: &[MetadataType] = &[
    M::Byte,
    M::VarInt,
    M::VarLong,
    M::Float,
    M::String,
    M::Chat,
    M::OptionalChat,
    M::Slot,
    M::Boolean,
    M::Rotation,
    M::Position,
    M::OptionalPosition,
    M::Direction,
    M::OptionalUuid,
    M::OptionalBlockId,
    M::Nbt,
    M::Particle,
    M::VillagerData,
    M::OptionalVarInt,
    M::Pose,
    M::CatVariant,
    M::FrogVariant,
    M::OptionalGlobalPos,
    M::PaintingVariant,
];

static METADATA_1_19_4: &[MetadataType] = &[
    M::Byte,
    M::VarInt,
    M::VarLong,
    M::Float,
    M::String,
    M::Chat,
    M::OptionalChat,
    M::Slot,
    M::Boolean,
    M::Rotation,
    M::Position,
    M::OptionalPosition,
    M::Direction,
    M::OptionalUuid,
    M::BlockId,
    M::OptionalBlockId,
    M::Nbt,
    M::Particle,
    M::VillagerData,
    M::OptionalVarInt,
    M::Pose,
    M::CatVariant,
    M::FrogVariant,
    M::OptionalGlobalPos,
    M::PaintingVariant,
    M::SnifferState,
    M::Vector3,
    M::Quaternion,
];

static METADATA_1_20_6: &[MetadataType] = &[
    M::Byte,
    M::VarInt,
    M::VarLong,
    M::Float,
    M::String,
    M::Chat,
    M::OptionalChat,
    M::Slot,
    M::Boolean,
    M::Rotation,
    M::Position,
    M::OptionalPosition,
    M::Direction,
    M::OptionalUuid,
    M::BlockId,
    M::OptionalBlockId,
    M::Nbt,
    M::Particle,
    M::Particles,
    M::VillagerData,
    M::OptionalVarInt,
    M::Pose,
    M::CatVariant,
    M::WolfVariant,
    M::FrogVariant,
    M::OptionalGlobalPos,
    M::PaintingVariant,
    M::SnifferState,
    M::ArmadilloState,
    M::Vector3,
    M::Quaternion,
];

/// Version strategy consulted by every codec and interpreter.
///
/// Obtain one with [`wire_profile`]; it never changes for the lifetime of a
/// connection.
pub trait WireProfile: Send + Sync + fmt::Debug {
    /// Negotiated protocol number
    fn protocol_version(&self) -> i32;

    /// Packet-specific field gate
    fn at_least(&self, version: i32) -> bool {
        self.protocol_version() >= version
    }

    /// NBT roots carry no name
    fn anonymous_nbt(&self) -> bool;

    /// Text components arrive as NBT instead of JSON strings
    fn chat_as_nbt(&self) -> bool;

    /// Login success leads into a Configuration phase
    fn has_configuration_phase(&self) -> bool;

    fn terrain_generation(&self) -> TerrainGeneration;

    /// Light masks are long-array bitsets instead of 18-bit VarInts
    fn bitset_light_masks(&self) -> bool;

    /// Chunk data packets embed the light payload
    fn inline_chunk_light(&self) -> bool;

    /// Light payloads start with a "trust edges" flag (1.16 - 1.19.4)
    fn light_trust_edges(&self) -> bool;

    fn signing_generation(&self) -> SigningGeneration;

    /// Capacity of the last-seen acknowledgment window
    fn last_seen_window(&self) -> usize;

    fn slot_format(&self) -> SlotFormat;

    /// Metadata type table indexed by wire type id
    fn metadata_types(&self) -> &'static [MetadataType];

    fn metadata_type(&self, id: i32) -> Option<MetadataType> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.metadata_types().get(idx).copied())
    }
}

/// Precomputed answers for one protocol version
#[derive(Debug, Clone)]
pub struct ProfileTable {
    version: i32,
    anonymous_nbt: bool,
    chat_as_nbt: bool,
    configuration_phase: bool,
    terrain: TerrainGeneration,
    bitset_light_masks: bool,
    inline_chunk_light: bool,
    light_trust_edges: bool,
    signing: SigningGeneration,
    last_seen_window: usize,
    slot_format: SlotFormat,
    metadata: &'static [MetadataType],
}

impl ProfileTable {
    pub fn new(version: i32) -> Result<Self> {
        if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let terrain = if version < MC_1_16 {
            TerrainGeneration::Straddled
        } else if version < MC_1_18_1 {
            TerrainGeneration::Padded
        } else {
            TerrainGeneration::Paletted
        };

        let signing = match version {
            v if v < MC_1_19 => SigningGeneration::None,
            MC_1_19 => SigningGeneration::V1_19,
            MC_1_19_2 => SigningGeneration::V1_19_2,
            _ => SigningGeneration::V1_19_3,
        };

        let metadata = if version >= MC_1_20_6 {
            METADATA_1_20_6
        } else if version >= MC_1_19_4 {
            METADATA_1_19_4
        } else if version >= MC_1_19_3 {
            METADATA_1_19_3
        } else {
            METADATA_1_19_2
        };

        Ok(Self {
            version,
            anonymous_nbt: version >= MC_1_20_2,
            chat_as_nbt: version >= MC_1_20_4,
            configuration_phase: version >= MC_1_20_2,
            terrain,
            bitset_light_masks: version >= MC_1_17,
            inline_chunk_light: version >= MC_1_18_1,
            light_trust_edges: (MC_1_16..MC_1_20).contains(&version),
            signing,
            last_seen_window: if version >= MC_1_19_3 { 20 } else { 5 },
            slot_format: if version >= MC_1_20_6 {
                SlotFormat::Components
            } else {
                SlotFormat::Legacy
            },
            metadata,
        })
    }
}

impl WireProfile for ProfileTable {
    fn protocol_version(&self) -> i32 {
        self.version
    }

    fn anonymous_nbt(&self) -> bool {
        self.anonymous_nbt
    }

    fn chat_as_nbt(&self) -> bool {
        self.chat_as_nbt
    }

    fn has_configuration_phase(&self) -> bool {
        self.configuration_phase
    }

    fn terrain_generation(&self) -> TerrainGeneration {
        self.terrain
    }

    fn bitset_light_masks(&self) -> bool {
        self.bitset_light_masks
    }

    fn inline_chunk_light(&self) -> bool {
        self.inline_chunk_light
    }

    fn light_trust_edges(&self) -> bool {
        self.light_trust_edges
    }

    fn signing_generation(&self) -> SigningGeneration {
        self.signing
    }

    fn last_seen_window(&self) -> usize {
        self.last_seen_window
    }

    fn slot_format(&self) -> SlotFormat {
        self.slot_format
    }

    fn metadata_types(&self) -> &'static [MetadataType] {
        self.metadata
    }
}

/// Select the wire profile for a negotiated protocol version
pub fn wire_profile(version: i32) -> Result<Arc<dyn WireProfile>> {
    Ok(Arc::new(ProfileTable::new(version)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_enforced() {
        assert!(matches!(wire_profile(572), Err(ProtocolError::UnsupportedVersion(572))));
        assert!(matches!(wire_profile(768), Err(ProtocolError::UnsupportedVersion(768))));
        assert!(wire_profile(MC_1_15).is_ok());
        assert!(wire_profile(MC_1_21).is_ok());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_generation_boundaries() {
        let cases = [
            (MC_1_15_2, TerrainGeneration::Straddled, SigningGeneration::None),
            (MC_1_16, TerrainGeneration::Padded, SigningGeneration::None),
            (MC_1_17_1, TerrainGeneration::Padded, SigningGeneration::None),
            (MC_1_18_1, TerrainGeneration::Paletted, SigningGeneration::None),
            (MC_1_19, TerrainGeneration::Paletted, SigningGeneration::V1_19),
            (MC_1_19_2, TerrainGeneration::Paletted, SigningGeneration::V1_19_2),
            (MC_1_19_3, TerrainGeneration::Paletted, SigningGeneration::V1_19_3),
            (MC_1_21, TerrainGeneration::Paletted, SigningGeneration::V1_19_3),
        ];
        for (version, terrain, signing) in cases {
            let profile = wire_profile(version).unwrap();
            assert_eq!(profile.terrain_generation(), terrain, "terrain for {version}");
            assert_eq!(profile.signing_generation(), signing, "signing for {version}");
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_feature_flags() {
        let old = wire_profile(MC_1_20).unwrap();
        assert!(!old.anonymous_nbt());
        assert!(!old.has_configuration_phase());
        assert!(!old.light_trust_edges());
        assert_eq!(old.last_seen_window(), 20);

        let v1192 = wire_profile(MC_1_19_2).unwrap();
        assert_eq!(v1192.last_seen_window(), 5);
        assert!(v1192.light_trust_edges());
        assert!(!wire_profile(MC_1_15_2).unwrap().light_trust_edges());

        let new = wire_profile(MC_1_20_2).unwrap();
        assert!(new.anonymous_nbt());
        assert!(new.has_configuration_phase());
        assert!(!new.chat_as_nbt());
        assert!(wire_profile(MC_1_20_4).unwrap().chat_as_nbt());
        assert_eq!(new.slot_format(), SlotFormat::Legacy);
        assert_eq!(wire_profile(MC_1_20_6).unwrap().slot_format(), SlotFormat::Components);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_metadata_tables_shift() {
        let v1192 = wire_profile(MC_1_19_2).unwrap();
        assert_eq!(v1192.metadata_type(2), Some(MetadataType::Float));
        assert_eq!(v1192.metadata_type(22), Some(MetadataType::PaintingVariant));
        assert_eq!(v1192.metadata_type(23), None);

        let v1193 = wire_profile(MC_1_19_3).unwrap();
        assert_eq!(v1193.metadata_type(2), Some(MetadataType::VarLong));
        assert_eq!(v1193.metadata_type(23), Some(MetadataType::PaintingVariant));

        let v1194 = wire_profile(MC_1_19_4).unwrap();
        assert_eq!(v1194.metadata_type(14), Some(MetadataType::BlockId));
        assert_eq!(v1194.metadata_type(27), Some(MetadataType::Quaternion));

        let v121 = wire_profile(MC_1_21).unwrap();
        assert_eq!(v121.metadata_type(18), Some(MetadataType::Particles));
        assert_eq!(v121.metadata_type(-1), None);
    }

    #[test]
    fn test_version_names() {
        assert_eq!(version_name(MC_1_20_6), Some("1.20.6"));
        assert_eq!(version_name(600), None);
    }
}
