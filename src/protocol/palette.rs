//! # Packet Type Palettes
//!
//! Packet ids are version-relative. A palette maps raw ids to stable logical
//! packet types for the Configuration and Play states; Login ids never move
//! and are constants in [`crate::protocol::login`].
//!
//! Built-in tables cover 1.20.6 and 1.21. Other versions load a table from
//! TOML, keyed by packet type name:
//!
//! ```toml
//! [play_in]
//! KeepAlive = 0x26
//! ChunkData = 0x27
//!
//! [play_out]
//! KeepAlive = 0x18
//! ```

use crate::error::{ProtocolError, Result};
use crate::protocol::version::{MC_1_20_6, MC_1_21};
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::path::Path;

/// Clientbound Play packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayPacketIn {
    Bundle,
    SpawnEntity,
    SpawnExperienceOrb,
    EntityAnimation,
    Statistics,
    BlockChangedAck,
    BlockBreakAnimation,
    BlockEntityData,
    BlockAction,
    BlockChange,
    BossBar,
    ServerDifficulty,
    ChunkBatchFinished,
    ChunkBatchStarted,
    ChunksBiomes,
    ClearTitles,
    TabComplete,
    DeclareCommands,
    CloseWindow,
    WindowItems,
    WindowProperty,
    SetSlot,
    CookieRequest,
    SetCooldown,
    ChatSuggestions,
    PluginMessage,
    DamageEvent,
    DebugSample,
    HideMessage,
    Disconnect,
    ProfilelessChatMessage,
    EntityStatus,
    Explosion,
    UnloadChunk,
    ChangeGameState,
    OpenHorseWindow,
    HurtAnimation,
    InitializeWorldBorder,
    KeepAlive,
    ChunkData,
    Effect,
    Particle,
    UpdateLight,
    JoinGame,
    MapData,
    TradeList,
    EntityPosition,
    EntityPositionAndRotation,
    EntityRotation,
    VehicleMove,
    OpenBook,
    OpenWindow,
    OpenSignEditor,
    Ping,
    PingResponse,
    CraftRecipeResponse,
    PlayerAbilities,
    ChatMessage,
    MessageHeader,
    EndCombatEvent,
    EnterCombatEvent,
    DeathCombatEvent,
    PlayerRemove,
    PlayerInfo,
    FacePlayer,
    PlayerPositionAndLook,
    UnlockRecipes,
    DestroyEntities,
    RemoveEntityEffect,
    ResetScore,
    RemoveResourcePack,
    ResourcePackSend,
    Respawn,
    EntityHeadLook,
    MultiBlockChange,
    SelectAdvancementTab,
    ServerData,
    ActionBar,
    WorldBorderCenter,
    WorldBorderLerpSize,
    WorldBorderSize,
    WorldBorderWarningDelay,
    WorldBorderWarningReach,
    Camera,
    HeldItemChange,
    UpdateViewPosition,
    UpdateViewDistance,
    SpawnPosition,
    DisplayScoreboard,
    EntityMetadata,
    AttachEntity,
    EntityVelocity,
    EntityEquipment,
    SetExperience,
    UpdateHealth,
    ScoreboardObjective,
    SetPassengers,
    Teams,
    UpdateScore,
    UpdateSimulationDistance,
    SetTitleSubTitle,
    TimeUpdate,
    SetTitleText,
    SetTitleTime,
    EntitySoundEffect,
    SoundEffect,
    StartConfiguration,
    StopSound,
    StoreCookie,
    SystemChat,
    PlayerListHeaderAndFooter,
    NbtQueryResponse,
    CollectItem,
    EntityTeleport,
    SetTickingState,
    StepTick,
    Transfer,
    Advancements,
    EntityProperties,
    EntityEffect,
    DeclareRecipes,
    Tags,
    ProjectilePower,
    CustomReportDetails,
    ServerLinks,
    Unknown,
}

/// Serverbound Play packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayPacketOut {
    TeleportConfirm,
    QueryBlockNbt,
    SetDifficulty,
    MessageAcknowledgment,
    ChatCommand,
    SignedChatCommand,
    ChatMessage,
    PlayerSession,
    ChunkBatchReceived,
    ClientStatus,
    ClientSettings,
    TabComplete,
    AcknowledgeConfiguration,
    ClickWindowButton,
    ClickWindow,
    CloseWindow,
    ChangeContainerSlotState,
    CookieResponse,
    PluginMessage,
    DebugSampleSubscription,
    EditBook,
    EntityNbtRequest,
    InteractEntity,
    GenerateStructure,
    KeepAlive,
    LockDifficulty,
    PlayerPosition,
    PlayerPositionAndRotation,
    PlayerRotation,
    PlayerMovement,
    VehicleMove,
    SteerBoat,
    PickItem,
    PingRequest,
    CraftRecipeRequest,
    PlayerAbilities,
    PlayerDigging,
    EntityAction,
    SteerVehicle,
    Pong,
    SetDisplayedRecipe,
    SetRecipeBookState,
    NameItem,
    ResourcePackStatus,
    AdvancementTab,
    SelectTrade,
    SetBeaconEffect,
    HeldItemChange,
    UpdateCommandBlock,
    UpdateCommandBlockMinecart,
    CreativeInventoryAction,
    UpdateJigsawBlock,
    UpdateStructureBlock,
    UpdateSign,
    Animation,
    Spectate,
    PlayerBlockPlacement,
    UseItem,
    Unknown,
}

/// Clientbound Configuration packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigPacketIn {
    CookieRequest,
    PluginMessage,
    Disconnect,
    FinishConfiguration,
    KeepAlive,
    Ping,
    ResetChat,
    RegistryData,
    RemoveResourcePack,
    ResourcePack,
    StoreCookie,
    Transfer,
    FeatureFlags,
    UpdateTags,
    KnownDataPacks,
    CustomReportDetails,
    ServerLinks,
    Unknown,
}

/// Serverbound Configuration packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigPacketOut {
    ClientInformation,
    CookieResponse,
    PluginMessage,
    FinishConfiguration,
    KeepAlive,
    Pong,
    ResourcePackResponse,
    KnownDataPacks,
    Unknown,
}

/// Immutable id <-> packet type mapping for one protocol version
pub trait PacketTypePalette: Send + Sync + fmt::Debug {
    /// Logical type of an inbound Play id, `Unknown` when unmapped
    fn play_in(&self, id: i32) -> PlayPacketIn;

    /// Wire id of an outbound Play packet
    fn play_out(&self, packet: PlayPacketOut) -> Option<i32>;

    fn configuration_in(&self, id: i32) -> ConfigPacketIn;

    fn configuration_out(&self, packet: ConfigPacketOut) -> Option<i32>;
}

use ConfigPacketIn as CI;
use ConfigPacketOut as CO;
use PlayPacketIn as PI;
use PlayPacketOut as PO;

static PLAY_IN_1_20_6: &[PlayPacketIn] = &[
    PI::Bundle,                      // 0x00
    PI::SpawnEntity,                 // 0x01
    PI::SpawnExperienceOrb,          // 0x02
    PI::EntityAnimation,             // 0x03
    PI::Statistics,                  // 0x04
    PI::BlockChangedAck,             // 0x05
    PI::BlockBreakAnimation,         // 0x06
    PI::BlockEntityData,             // 0x07
    PI::BlockAction,                 // 0x08
    PI::BlockChange,                 // 0x09
    PI::BossBar,                     // 0x0A
    PI::ServerDifficulty,            // 0x0B
    PI::ChunkBatchFinished,          // 0x0C
    PI::ChunkBatchStarted,           // 0x0D
    PI::ChunksBiomes,                // 0x0E
    PI::ClearTitles,                 // 0x0F
    PI::TabComplete,                 // 0x10
    PI::DeclareCommands,             // 0x11
    PI::CloseWindow,                 // 0x12
    PI::WindowItems,                 // 0x13
    PI::WindowProperty,              // 0x14
    PI::SetSlot,                     // 0x15
    PI::CookieRequest,               // 0x16
    PI::SetCooldown,                 // 0x17
    PI::ChatSuggestions,             // 0x18
    PI::PluginMessage,               // 0x19
    PI::DamageEvent,                 // 0x1A
    PI::DebugSample,                 // 0x1B
    PI::HideMessage,                 // 0x1C
    PI::Disconnect,                  // 0x1D
    PI::ProfilelessChatMessage,      // 0x1E
    PI::EntityStatus,                // 0x1F
    PI::Explosion,                   // 0x20
    PI::UnloadChunk,                 // 0x21
    PI::ChangeGameState,             // 0x22
    PI::OpenHorseWindow,             // 0x23
    PI::HurtAnimation,               // 0x24
    PI::InitializeWorldBorder,       // 0x25
    PI::KeepAlive,                   // 0x26
    PI::ChunkData,                   // 0x27
    PI::Effect,                      // 0x28
    PI::Particle,                    // 0x29
    PI::UpdateLight,                 // 0x2A
    PI::JoinGame,                    // 0x2B
    PI::MapData,                     // 0x2C
    PI::TradeList,                   // 0x2D
    PI::EntityPosition,              // 0x2E
    PI::EntityPositionAndRotation,   // 0x2F
    PI::EntityRotation,              // 0x30
    PI::VehicleMove,                 // 0x31
    PI::OpenBook,                    // 0x32
    PI::OpenWindow,                  // 0x33
    PI::OpenSignEditor,              // 0x34
    PI::Ping,                        // 0x35
    PI::PingResponse,                // 0x36
    PI::CraftRecipeResponse,         // 0x37
    PI::PlayerAbilities,             // 0x38
    PI::ChatMessage,                 // 0x39
    PI::EndCombatEvent,              // 0x3A
    PI::EnterCombatEvent,            // 0x3B
    PI::DeathCombatEvent,            // 0x3C
    PI::PlayerRemove,                // 0x3D
    PI::PlayerInfo,                  // 0x3E
    PI::FacePlayer,                  // 0x3F
    PI::PlayerPositionAndLook,       // 0x40
    PI::UnlockRecipes,               // 0x41
    PI::DestroyEntities,             // 0x42
    PI::RemoveEntityEffect,          // 0x43
    PI::ResetScore,                  // 0x44
    PI::RemoveResourcePack,          // 0x45
    PI::ResourcePackSend,            // 0x46
    PI::Respawn,                     // 0x47
    PI::EntityHeadLook,              // 0x48
    PI::MultiBlockChange,            // 0x49
    PI::SelectAdvancementTab,        // 0x4A
    PI::ServerData,                  // 0x4B
    PI::ActionBar,                   // 0x4C
    PI::WorldBorderCenter,           // 0x4D
    PI::WorldBorderLerpSize,         // 0x4E
    PI::WorldBorderSize,             // 0x4F
    PI::WorldBorderWarningDelay,     // 0x50
    PI::WorldBorderWarningReach,     // 0x51
    PI::Camera,                      // 0x52
    PI::HeldItemChange,              // 0x53
    PI::UpdateViewPosition,          // 0x54
    PI::UpdateViewDistance,          // 0x55
    PI::SpawnPosition,               // 0x56
    PI::DisplayScoreboard,           // 0x57
    PI::EntityMetadata,              // 0x58
    PI::AttachEntity,                // 0x59
    PI::EntityVelocity,              // 0x5A
    PI::EntityEquipment,             // 0x5B
    PI::SetExperience,               // 0x5C
    PI::UpdateHealth,                // 0x5D
    PI::ScoreboardObjective,         // 0x5E
    PI::SetPassengers,               // 0x5F
    PI::Teams,                       // 0x60
    PI::UpdateScore,                 // 0x61
    PI::UpdateSimulationDistance,    // 0x62
    PI::SetTitleSubTitle,            // 0x63
    PI::TimeUpdate,                  // 0x64
    PI::SetTitleText,                // 0x65
    PI::SetTitleTime,                // 0x66
    PI::EntitySoundEffect,           // 0x67
    PI::SoundEffect,                 // 0x68
    PI::StartConfiguration,          // 0x69
    PI::StopSound,                   // 0x6A
    PI::StoreCookie,                 // 0x6B
    PI::SystemChat,                  // 0x6C
    PI::PlayerListHeaderAndFooter,   // 0x6D
    PI::NbtQueryResponse,            // 0x6E
    PI::CollectItem,                 // 0x6F
    PI::EntityTeleport,              // 0x70
    PI::SetTickingState,             // 0x71
    PI::StepTick,                    // 0x72
    PI::Transfer,                    // 0x73
    PI::Advancements,                // 0x74
    PI::EntityProperties,            // 0x75
    PI::EntityEffect,                // 0x76
    PI::DeclareRecipes,              // 0x77
    PI::Tags,                        // 0x78
    PI::ProjectilePower,             // 0x79
];

/// Packets appended in 1.21
static PLAY_IN_1_21_TAIL: &[PlayPacketIn] = &[
    PI::CustomReportDetails, // 0x7A
    PI::ServerLinks,         // 0x7B
];

static PLAY_OUT_1_20_6: &[PlayPacketOut] = &[
    PO::TeleportConfirm,            // 0x00
    PO::QueryBlockNbt,              // 0x01
    PO::SetDifficulty,              // 0x02
    PO::MessageAcknowledgment,      // 0x03
    PO::ChatCommand,                // 0x04
    PO::SignedChatCommand,          // 0x05
    PO::ChatMessage,                // 0x06
    PO::PlayerSession,              // 0x07
    PO::ChunkBatchReceived,         // 0x08
    PO::ClientStatus,               // 0x09
    PO::ClientSettings,             // 0x0A
    PO::TabComplete,                // 0x0B
    PO::AcknowledgeConfiguration,   // 0x0C
    PO::ClickWindowButton,          // 0x0D
    PO::ClickWindow,                // 0x0E
    PO::CloseWindow,                // 0x0F
    PO::ChangeContainerSlotState,   // 0x10
    PO::CookieResponse,             // 0x11
    PO::PluginMessage,              // 0x12
    PO::DebugSampleSubscription,    // 0x13
    PO::EditBook,                   // 0x14
    PO::EntityNbtRequest,           // 0x15
    PO::InteractEntity,             // 0x16
    PO::GenerateStructure,          // 0x17
    PO::KeepAlive,                  // 0x18
    PO::LockDifficulty,             // 0x19
    PO::PlayerPosition,             // 0x1A
    PO::PlayerPositionAndRotation,  // 0x1B
    PO::PlayerRotation,             // 0x1C
    PO::PlayerMovement,             // 0x1D
    PO::VehicleMove,                // 0x1E
    PO::SteerBoat,                  // 0x1F
    PO::PickItem,                   // 0x20
    PO::PingRequest,                // 0x21
    PO::CraftRecipeRequest,         // 0x22
    PO::PlayerAbilities,            // 0x23
    PO::PlayerDigging,              // 0x24
    PO::EntityAction,               // 0x25
    PO::SteerVehicle,               // 0x26
    PO::Pong,                       // 0x27
    PO::SetDisplayedRecipe,         // 0x28
    PO::SetRecipeBookState,         // 0x29
    PO::NameItem,                   // 0x2A
    PO::ResourcePackStatus,         // 0x2B
    PO::AdvancementTab,             // 0x2C
    PO::SelectTrade,                // 0x2D
    PO::SetBeaconEffect,            // 0x2E
    PO::HeldItemChange,             // 0x2F
    PO::UpdateCommandBlock,         // 0x30
    PO::UpdateCommandBlockMinecart, // 0x31
    PO::CreativeInventoryAction,    // 0x32
    PO::UpdateJigsawBlock,          // 0x33
    PO::UpdateStructureBlock,       // 0x34
    PO::UpdateSign,                 // 0x35
    PO::Animation,                  // 0x36
    PO::Spectate,                   // 0x37
    PO::PlayerBlockPlacement,       // 0x38
    PO::UseItem,                    // 0x39
];

static CONFIG_IN_1_20_6: &[ConfigPacketIn] = &[
    CI::CookieRequest,       // 0x00
    CI::PluginMessage,       // 0x01
    CI::Disconnect,          // 0x02
    CI::FinishConfiguration, // 0x03
    CI::KeepAlive,           // 0x04
    CI::Ping,                // 0x05
    CI::ResetChat,           // 0x06
    CI::RegistryData,        // 0x07
    CI::RemoveResourcePack,  // 0x08
    CI::ResourcePack,        // 0x09
    CI::StoreCookie,         // 0x0A
    CI::Transfer,            // 0x0B
    CI::FeatureFlags,        // 0x0C
    CI::UpdateTags,          // 0x0D
    CI::KnownDataPacks,      // 0x0E
];

static CONFIG_IN_1_21_TAIL: &[ConfigPacketIn] = &[
    CI::CustomReportDetails, // 0x0F
    CI::ServerLinks,         // 0x10
];

static CONFIG_OUT_1_20_6: &[ConfigPacketOut] = &[
    CO::ClientInformation,    // 0x00
    CO::CookieResponse,       // 0x01
    CO::PluginMessage,        // 0x02
    CO::FinishConfiguration,  // 0x03
    CO::KeepAlive,            // 0x04
    CO::Pong,                 // 0x05
    CO::ResourcePackResponse, // 0x06
    CO::KnownDataPacks,       // 0x07
];

/// One direction of a palette: both lookups precomputed
#[derive(Debug, Clone)]
struct Table<T> {
    by_id: HashMap<i32, T>,
    by_type: HashMap<T, i32>,
}

impl<T: Copy + Eq + Hash> Table<T> {
    fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_type: HashMap::new(),
        }
    }

    fn from_sequence(types: impl IntoIterator<Item = T>) -> Self {
        let mut table = Self::new();
        for (id, packet) in types.into_iter().enumerate() {
            table.insert(id as i32, packet);
        }
        table
    }

    fn insert(&mut self, id: i32, packet: T) {
        self.by_id.insert(id, packet);
        self.by_type.insert(packet, id);
    }
}

/// Table-backed palette, either built in or loaded from TOML
#[derive(Debug, Clone)]
pub struct PaletteTable {
    play_in: Table<PlayPacketIn>,
    play_out: Table<PlayPacketOut>,
    configuration_in: Table<ConfigPacketIn>,
    configuration_out: Table<ConfigPacketOut>,
}

#[derive(Debug, Default, Deserialize)]
struct PaletteFile {
    #[serde(default)]
    play_in: BTreeMap<String, i32>,
    #[serde(default)]
    play_out: BTreeMap<String, i32>,
    #[serde(default)]
    configuration_in: BTreeMap<String, i32>,
    #[serde(default)]
    configuration_out: BTreeMap<String, i32>,
}

fn parse_section<T>(section: &str, entries: &BTreeMap<String, i32>) -> Result<Table<T>>
where
    T: DeserializeOwned + Copy + Eq + Hash,
{
    let mut table = Table::new();
    for (name, id) in entries {
        let de: StrDeserializer<'_, ValueError> = name.as_str().into_deserializer();
        let packet = T::deserialize(de).map_err(|e| {
            ProtocolError::ConfigError(format!("[{section}] unknown packet type {name}: {e}"))
        })?;
        table.insert(*id, packet);
    }
    Ok(table)
}

impl PaletteTable {
    /// Built-in table for a protocol version, if one ships with the crate
    pub fn builtin(version: i32) -> Option<Self> {
        match version {
            MC_1_20_6 => Some(Self {
                play_in: Table::from_sequence(PLAY_IN_1_20_6.iter().copied()),
                play_out: Table::from_sequence(PLAY_OUT_1_20_6.iter().copied()),
                configuration_in: Table::from_sequence(CONFIG_IN_1_20_6.iter().copied()),
                configuration_out: Table::from_sequence(CONFIG_OUT_1_20_6.iter().copied()),
            }),
            MC_1_21 => Some(Self {
                play_in: Table::from_sequence(PLAY_IN_1_20_6.iter().chain(PLAY_IN_1_21_TAIL).copied()),
                play_out: Table::from_sequence(PLAY_OUT_1_20_6.iter().copied()),
                configuration_in: Table::from_sequence(
                    CONFIG_IN_1_20_6.iter().chain(CONFIG_IN_1_21_TAIL).copied(),
                ),
                configuration_out: Table::from_sequence(CONFIG_OUT_1_20_6.iter().copied()),
            }),
            _ => None,
        }
    }

    /// Parse a palette from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: PaletteFile = toml::from_str(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse palette TOML: {e}")))?;

        Ok(Self {
            play_in: parse_section("play_in", &file.play_in)?,
            play_out: parse_section("play_out", &file.play_out)?,
            configuration_in: parse_section("configuration_in", &file.configuration_in)?,
            configuration_out: parse_section("configuration_out", &file.configuration_out)?,
        })
    }

    /// Load a palette from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read palette file: {e}")))?;
        Self::from_toml(&content)
    }
}

impl PacketTypePalette for PaletteTable {
    fn play_in(&self, id: i32) -> PlayPacketIn {
        self.play_in.by_id.get(&id).copied().unwrap_or(PlayPacketIn::Unknown)
    }

    fn play_out(&self, packet: PlayPacketOut) -> Option<i32> {
        self.play_out.by_type.get(&packet).copied()
    }

    fn configuration_in(&self, id: i32) -> ConfigPacketIn {
        self.configuration_in
            .by_id
            .get(&id)
            .copied()
            .unwrap_or(ConfigPacketIn::Unknown)
    }

    fn configuration_out(&self, packet: ConfigPacketOut) -> Option<i32> {
        self.configuration_out.by_type.get(&packet).copied()
    }
}

/// Pick the palette for a connection: an explicit table wins over the built-in one
pub fn palette_for_version(version: i32, custom: Option<PaletteTable>) -> Result<Box<dyn PacketTypePalette>> {
    custom
        .or_else(|| PaletteTable::builtin(version))
        .map(|table| Box::new(table) as Box<dyn PacketTypePalette>)
        .ok_or(ProtocolError::UnsupportedVersion(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::version::MC_1_20_4;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_builtin_1_21_ids() {
        let palette = palette_for_version(MC_1_21, None).unwrap();
        assert_eq!(palette.play_in(0x26), PlayPacketIn::KeepAlive);
        assert_eq!(palette.play_in(0x27), PlayPacketIn::ChunkData);
        assert_eq!(palette.play_in(0x69), PlayPacketIn::StartConfiguration);
        assert_eq!(palette.play_in(0x7B), PlayPacketIn::ServerLinks);
        assert_eq!(palette.play_in(0x7C), PlayPacketIn::Unknown);
        assert_eq!(palette.play_out(PlayPacketOut::KeepAlive), Some(0x18));
        assert_eq!(palette.play_out(PlayPacketOut::UseItem), Some(0x39));
        assert_eq!(palette.configuration_in(0x03), ConfigPacketIn::FinishConfiguration);
        assert_eq!(palette.configuration_in(0x10), ConfigPacketIn::ServerLinks);
        assert_eq!(palette.configuration_out(ConfigPacketOut::KnownDataPacks), Some(0x07));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_1_20_6_lacks_1_21_tail() {
        let palette = palette_for_version(MC_1_20_6, None).unwrap();
        assert_eq!(palette.play_in(0x79), PlayPacketIn::ProjectilePower);
        assert_eq!(palette.play_in(0x7A), PlayPacketIn::Unknown);
        assert_eq!(palette.configuration_in(0x0F), ConfigPacketIn::Unknown);
    }

    #[test]
    fn test_missing_palette_is_unsupported() {
        assert!(matches!(
            palette_for_version(MC_1_20_4, None),
            Err(ProtocolError::UnsupportedVersion(MC_1_20_4))
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_toml_palette() {
        let toml = r#"
            [play_in]
            KeepAlive = 0x24
            JoinGame = 0x29

            [play_out]
            KeepAlive = 0x14

            [configuration_in]
            FinishConfiguration = 0x02
        "#;
        let table = PaletteTable::from_toml(toml).unwrap();
        assert_eq!(table.play_in(0x24), PlayPacketIn::KeepAlive);
        assert_eq!(table.play_in(0x29), PlayPacketIn::JoinGame);
        assert_eq!(table.play_out(PlayPacketOut::KeepAlive), Some(0x14));
        assert_eq!(table.play_out(PlayPacketOut::Pong), None);
        assert_eq!(table.configuration_in(0x02), ConfigPacketIn::FinishConfiguration);

        let palette = palette_for_version(MC_1_20_4, Some(table)).unwrap();
        assert_eq!(palette.play_in(0x24), PlayPacketIn::KeepAlive);
    }

    #[test]
    fn test_toml_palette_rejects_unknown_names() {
        let result = PaletteTable::from_toml("[play_in]\nNotAPacket = 1\n");
        assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
    }
}
