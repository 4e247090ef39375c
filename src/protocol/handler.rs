//! # Handler Surface
//!
//! The protocol core reports every decoded event to a [`Handler`]. All methods
//! have empty default bodies so an embedder implements only what it consumes.
//!
//! Calls are made from the dispatch task in packet order. Implementations
//! should return quickly; anything slow belongs on the embedder's own task.

use crate::core::codec::BlockPos;
use crate::core::nbt::NbtCompound;
use crate::protocol::chat::{ChatMessage, TextComponent};
use crate::protocol::records::{EntityMetadata, EntitySpawn, ItemStack, Recipe, Trade};
use crate::protocol::state::ConnectionState;
use crate::terrain::{ChunkColumn, LightData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Kicked by the server while playing
    InGameKick,
    /// Refused during login
    LoginRejected,
    /// Link failure or stream end
    ConnectionLost,
    /// Closed by the local user
    UserLogout,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisconnectReason::InGameKick => "in-game kick",
            DisconnectReason::LoginRejected => "login rejected",
            DisconnectReason::ConnectionLost => "connection lost",
            DisconnectReason::UserLogout => "user logout",
        };
        f.write_str(name)
    }
}

/// Signed profile property (skin textures and the like)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

/// A remembered death position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathLocation {
    pub dimension: String,
    pub position: BlockPos,
}

/// Join Game contents
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameJoin {
    pub entity_id: i32,
    pub hardcore: bool,
    pub gamemode: u8,
    pub previous_gamemode: i8,
    pub worlds: Vec<String>,
    pub dimension_type: String,
    pub world_name: String,
    pub hashed_seed: i64,
    pub max_players: i32,
    pub view_distance: i32,
    pub simulation_distance: i32,
    pub reduced_debug_info: bool,
    pub respawn_screen: bool,
    pub limited_crafting: bool,
    pub debug: bool,
    pub flat: bool,
    pub death_location: Option<DeathLocation>,
    pub portal_cooldown: i32,
    pub enforces_secure_chat: bool,
}

/// Respawn contents
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Respawn {
    pub dimension_type: String,
    pub world_name: String,
    pub hashed_seed: i64,
    pub gamemode: u8,
    pub previous_gamemode: i8,
    pub debug: bool,
    pub flat: bool,
    pub death_location: Option<DeathLocation>,
    pub portal_cooldown: i32,
    /// Bit 0 keeps attributes, bit 1 keeps metadata
    pub data_kept: u8,
}

/// Server-set player position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    /// Bits 0-4 mark x, y, z, yaw and pitch as relative
    pub relative: u8,
    pub teleport_id: i32,
}

impl PlayerPosition {
    pub const RELATIVE_X: u8 = 0x01;
    pub const RELATIVE_Y: u8 = 0x02;
    pub const RELATIVE_Z: u8 = 0x04;
    pub const RELATIVE_YAW: u8 = 0x08;
    pub const RELATIVE_PITCH: u8 = 0x10;

    pub fn is_relative(&self, flag: u8) -> bool {
        self.relative & flag != 0
    }

    /// Resolve against the current position and rotation
    pub fn apply(&self, current: (f64, f64, f64), rotation: (f32, f32)) -> ((f64, f64, f64), (f32, f32)) {
        let axis = |flag, delta: f64, base: f64| if self.is_relative(flag) { base + delta } else { delta };
        let angle = |flag, delta: f32, base: f32| if self.is_relative(flag) { base + delta } else { delta };
        (
            (
                axis(Self::RELATIVE_X, self.x, current.0),
                axis(Self::RELATIVE_Y, self.y, current.1),
                axis(Self::RELATIVE_Z, self.z, current.2),
            ),
            (
                angle(Self::RELATIVE_YAW, self.yaw, rotation.0),
                angle(Self::RELATIVE_PITCH, self.pitch, rotation.1),
            ),
        )
    }
}

/// Status effect applied to an entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityEffect {
    pub entity_id: i32,
    pub effect_id: i32,
    pub amplifier: i32,
    /// Ticks, -1 for infinite
    pub duration: i32,
    pub flags: u8,
    /// Factor calculation data (1.19 - 1.20.4)
    pub factor_data: Option<NbtCompound>,
}

/// Explosion contents
#[derive(Debug, Clone, PartialEq)]
pub struct Explosion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub strength: f32,
    /// Destroyed block offsets relative to the centre
    pub affected_blocks: Vec<(i8, i8, i8)>,
    pub player_motion: (f32, f32, f32),
}

/// One row of the player list
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerInfo {
    pub uuid: Uuid,
    pub name: String,
    pub properties: Vec<ProfileProperty>,
    pub gamemode: i32,
    pub latency: i32,
    pub display_name: Option<TextComponent>,
    pub listed: bool,
    /// 1.19.3+ chat session id
    pub chat_session: Option<Uuid>,
}

/// Resource pack offered by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePackOffer {
    /// Pack id, from 1.20.3
    pub id: Option<Uuid>,
    pub url: String,
    pub hash: String,
    pub forced: bool,
    pub prompt: Option<TextComponent>,
}

/// Villager state sent after a trade list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VillagerInfo {
    pub level: i32,
    pub experience: i32,
    pub regular_villager: bool,
    pub can_restock: bool,
}

/// Callbacks for decoded protocol events
#[allow(unused_variables)]
pub trait Handler: Send + Sync {
    /// Copy of every frame when packet capture is enabled
    fn on_network_packet(&self, packet_id: i32, payload: &[u8], state: ConnectionState, inbound: bool) {}

    fn on_state_changed(&self, state: ConnectionState) {}

    fn on_login_success(&self, uuid: Uuid, name: &str, properties: &[ProfileProperty]) {}

    fn on_game_joined(&self, join: &GameJoin) {}

    fn on_respawn(&self, respawn: &Respawn) {}

    /// The connection ended; `message` is the rendered server text or error
    fn on_connection_lost(&self, reason: DisconnectReason, message: &str) {}

    /// Frames waiting in the dispatch queue
    fn on_queue_depth(&self, depth: usize) {}

    fn on_keep_alive(&self, id: i64) {}

    /// A chat or system message, with the text as the player would see it
    fn on_text_received(&self, message: &ChatMessage, rendered: &str) {}

    fn on_message_hidden(&self, signature: &[u8]) {}

    fn on_chunk_column(&self, column: ChunkColumn) {}

    fn on_light_updated(&self, x: i32, z: i32, light: LightData) {}

    fn on_chunk_unloaded(&self, x: i32, z: i32) {}

    fn on_block_change(&self, position: BlockPos, state: u32) {}

    fn on_multi_block_change(&self, changes: &[(BlockPos, u32)]) {}

    /// Per-section biome cells for a loaded column
    fn on_biomes_updated(&self, x: i32, z: i32, biomes: Vec<u32>) {}

    fn on_chunk_batch_finished(&self, batch_size: i32) {}

    fn on_player_position(&self, position: &PlayerPosition) {}

    fn on_time_update(&self, world_age: i64, time_of_day: i64) {}

    fn on_update_health(&self, health: f32, food: i32, saturation: f32) {}

    fn on_set_experience(&self, bar: f32, level: i32, total: i32) {}

    fn on_player_killed(&self, killer_entity_id: Option<i32>, message: &TextComponent) {}

    fn on_explosion(&self, explosion: &Explosion) {}

    fn on_spawn_entity(&self, entity: &EntitySpawn) {}

    fn on_destroy_entities(&self, entity_ids: &[i32]) {}

    /// Relative move in blocks
    fn on_entity_position(&self, entity_id: i32, dx: f64, dy: f64, dz: f64, on_ground: bool) {}

    fn on_entity_rotation(&self, entity_id: i32, yaw: u8, pitch: u8, on_ground: bool) {}

    fn on_entity_head_look(&self, entity_id: i32, head_yaw: u8) {}

    #[allow(clippy::too_many_arguments)]
    fn on_entity_teleport(&self, entity_id: i32, x: f64, y: f64, z: f64, yaw: u8, pitch: u8, on_ground: bool) {}

    fn on_entity_metadata(&self, entity_id: i32, metadata: &EntityMetadata) {}

    fn on_entity_status(&self, entity_id: i32, status: i8) {}

    fn on_entity_equipment(&self, entity_id: i32, slot: u8, item: Option<&ItemStack>) {}

    fn on_entity_effect(&self, effect: &EntityEffect) {}

    fn on_inventory_open(&self, window_id: i32, window_type: i32, title: &TextComponent) {}

    fn on_inventory_close(&self, window_id: u8) {}

    fn on_inventory_items(
        &self,
        window_id: u8,
        state_id: i32,
        items: &BTreeMap<usize, ItemStack>,
        carried: Option<&ItemStack>,
    ) {
    }

    fn on_inventory_slot(&self, window_id: i8, state_id: i32, slot: i16, item: Option<&ItemStack>) {}

    fn on_inventory_property(&self, window_id: u8, property: i16, value: i16) {}

    fn on_trade_list(&self, window_id: i32, trades: &[Trade], villager: &VillagerInfo) {}

    fn on_recipes(&self, recipes: &[Recipe]) {}

    fn on_player_join(&self, player: &PlayerInfo) {}

    fn on_player_leave(&self, uuid: Uuid) {}

    fn on_gamemode_update(&self, uuid: Uuid, gamemode: i32) {}

    fn on_latency_update(&self, uuid: Uuid, latency: i32) {}

    fn on_display_name_update(&self, uuid: Uuid, display_name: Option<&TextComponent>) {}

    /// Stored cookie for `key`, if any
    fn get_cookie(&self, key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set_cookie(&self, key: &str, value: Vec<u8>) {}

    /// The server asked the client to reconnect elsewhere
    fn on_transfer(&self, host: &str, port: i32) {}

    /// Whether to accept an offered pack
    fn accept_resource_pack(&self, offer: &ResourcePackOffer) -> bool {
        true
    }

    fn on_resource_pack_removed(&self, id: Option<Uuid>) {}
}

/// Handler that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl Handler for NoopHandler {}
