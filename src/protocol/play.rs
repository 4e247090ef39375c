//! # Play Interpreter
//!
//! Decodes Play-state packets into handler events and keeps the per-world
//! state (dimension, loaded columns, player list) current.
//!
//! Chat packets are decoded in [`crate::protocol::messaging`]; everything else
//! the client understands is handled here. Packets the client has no use for
//! are counted as ignored and skipped.

use crate::core::codec::{BlockPos, PacketReader, WriteExt};
use crate::core::nbt;
use crate::core::packet::RawPacket;
use crate::error::{ProtocolError, Result};
use crate::protocol::chat::TextComponent;
use crate::protocol::dispatcher::{ClientProtocol, Transition};
use crate::protocol::handler::{
    DeathLocation, DisconnectReason, EntityEffect, Explosion, GameJoin, PlayerInfo, PlayerPosition, Respawn,
    VillagerInfo,
};
use crate::protocol::login::read_properties;
use crate::protocol::palette::{PlayPacketIn, PlayPacketOut};
use crate::protocol::records::{read_entity, read_metadata, read_particle, read_recipe, read_slot, read_trade};
use crate::protocol::signing::{require_signer, SenderKey};
use crate::protocol::state::ConnectionState;
use crate::protocol::version::{
    WireProfile, MC_1_16, MC_1_16_2, MC_1_17, MC_1_17_1, MC_1_18_1, MC_1_18_2, MC_1_19, MC_1_19_3, MC_1_19_4,
    MC_1_20, MC_1_20_2, MC_1_20_4, MC_1_20_6,
};
use crate::terrain::container::read_biomes;
use crate::terrain::{read_chunk_column, LightData};
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

// 1.19.3+ player info action bits
const ADD_PLAYER: u8 = 0x01;
const INITIALIZE_CHAT: u8 = 0x02;
const UPDATE_GAMEMODE: u8 = 0x04;
const UPDATE_LISTED: u8 = 0x08;
const UPDATE_LATENCY: u8 = 0x10;
const UPDATE_DISPLAY_NAME: u8 = 0x20;

/// Equipment entries carry this bit when another entry follows
const EQUIPMENT_CONTINUES: u8 = 0x80;

/// Dimension names for the numeric ids used before 1.16
fn legacy_dimension_name(id: i32) -> &'static str {
    match id {
        -1 => "minecraft:the_nether",
        1 => "minecraft:the_end",
        _ => "minecraft:overworld",
    }
}

fn read_death_location(reader: &mut PacketReader<'_>) -> Result<Option<DeathLocation>> {
    reader.read_optional(|r| {
        Ok(DeathLocation {
            dimension: r.read_string()?,
            position: r.read_position()?,
        })
    })
}

fn read_worlds(reader: &mut PacketReader<'_>) -> Result<Vec<String>> {
    let count = reader.read_len()?;
    let mut worlds = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        worlds.push(reader.read_string()?);
    }
    Ok(worlds)
}

/// Section coordinates packed into a 1.16.2+ multi block change
fn unpack_section_position(value: i64) -> (i32, i32, i32) {
    let x = (value >> 42) as i32;
    let y = ((value << 44) >> 44) as i32;
    let z = ((value << 22) >> 42) as i32;
    (x, y, z)
}

/// One 1.16.2+ block record: state id and offsets within the section
fn unpack_block_record(value: i64) -> (u32, i32, i32, i32) {
    let state = (value >> 12) as u32;
    let x = ((value >> 8) & 0xF) as i32;
    let z = ((value >> 4) & 0xF) as i32;
    let y = (value & 0xF) as i32;
    (state, x, y, z)
}

impl ClientProtocol {
    /// Play-state interpreter
    pub(super) async fn handle_play(&mut self, packet: &RawPacket) -> Result<Transition> {
        let mut reader = packet.reader();
        let packet_type = self.palette.play_in(packet.id);
        trace!(packet_id = packet.id, ?packet_type, "Play packet");

        let profile = Arc::clone(&self.profile);
        let profile = profile.as_ref();

        match packet_type {
            PlayPacketIn::KeepAlive => {
                let id = reader.read_i64()?;
                let mut buf = BytesMut::with_capacity(8);
                buf.put_i64(id);
                self.send_play(PlayPacketOut::KeepAlive, buf).await?;
                self.handler.on_keep_alive(id);
            }
            PlayPacketIn::Ping => {
                let id = reader.read_i32()?;
                let mut buf = BytesMut::with_capacity(4);
                buf.put_i32(id);
                self.send_play(PlayPacketOut::Pong, buf).await?;
            }
            PlayPacketIn::Disconnect => {
                let reason = TextComponent::read(&mut reader, profile)?;
                let message = self.translations.render(&reason);
                return Ok(Transition::Disconnect(DisconnectReason::InGameKick, message));
            }
            PlayPacketIn::JoinGame => self.handle_join_game(&mut reader).await?,
            PlayPacketIn::Respawn => self.handle_respawn(&mut reader)?,
            PlayPacketIn::StartConfiguration => {
                self.send_play(PlayPacketOut::AcknowledgeConfiguration, BytesMut::new())
                    .await?;
                self.enter_state(ConnectionState::Configuration).await?;
            }
            PlayPacketIn::PlayerPositionAndLook => {
                let position = PlayerPosition {
                    x: reader.read_f64()?,
                    y: reader.read_f64()?,
                    z: reader.read_f64()?,
                    yaw: reader.read_f32()?,
                    pitch: reader.read_f32()?,
                    relative: reader.read_u8()?,
                    teleport_id: reader.read_varint()?,
                };
                if (MC_1_17..MC_1_19_4).contains(&profile.protocol_version()) {
                    let _dismount = reader.read_bool()?;
                }

                let mut buf = BytesMut::new();
                buf.put_varint(position.teleport_id);
                self.send_play(PlayPacketOut::TeleportConfirm, buf).await?;
                self.handler.on_player_position(&position);
            }

            PlayPacketIn::ChatMessage => self.handle_player_chat(&mut reader).await?,
            PlayPacketIn::MessageHeader => self.handle_message_header(&mut reader).await?,
            PlayPacketIn::SystemChat => self.handle_system_chat(&mut reader)?,
            PlayPacketIn::ProfilelessChatMessage => self.handle_profileless_chat(&mut reader)?,
            PlayPacketIn::HideMessage => self.handle_hide_message(&mut reader)?,
            PlayPacketIn::DeathCombatEvent => {
                let _player = reader.read_varint()?;
                let killer = if profile.at_least(MC_1_20) {
                    None
                } else {
                    Some(reader.read_i32()?).filter(|id| *id >= 0)
                };
                let message = TextComponent::read(&mut reader, profile)?;
                self.handler.on_player_killed(killer, &message);
            }

            PlayPacketIn::ChunkData => {
                let mut column = read_chunk_column(&mut reader, profile, self.registries.dimension())?;
                self.terrain.column_loaded(&mut column);
                debug!(x = column.x, z = column.z, sections = column.sections.len(), "Chunk column loaded");
                self.handler.on_chunk_column(column);
            }
            PlayPacketIn::UpdateLight => {
                let x = reader.read_varint()?;
                let z = reader.read_varint()?;
                let light = LightData::read(&mut reader, profile)?;
                match self.terrain.light_update(x, z, light) {
                    Some(light) => self.handler.on_light_updated(x, z, light),
                    None => trace!(x, z, "Light cached until its column arrives"),
                }
            }
            PlayPacketIn::UnloadChunk => {
                let (x, z) = if profile.at_least(MC_1_20_2) {
                    let z = reader.read_i32()?;
                    (reader.read_i32()?, z)
                } else {
                    (reader.read_i32()?, reader.read_i32()?)
                };
                if !self.terrain.unload(x, z) {
                    trace!(x, z, "Unload for a column that was never loaded");
                }
                self.handler.on_chunk_unloaded(x, z);
            }
            PlayPacketIn::BlockChange => {
                let position = reader.read_position()?;
                let state = reader.read_varint()?;
                self.handler.on_block_change(position, state as u32);
            }
            PlayPacketIn::MultiBlockChange => {
                let changes = read_multi_block_change(&mut reader, profile)?;
                self.handler.on_multi_block_change(&changes);
            }
            PlayPacketIn::ChunksBiomes => {
                let count = reader.read_len()?;
                for _ in 0..count {
                    let z = reader.read_i32()?;
                    let x = reader.read_i32()?;
                    let data = reader.read_byte_array()?;

                    let mut column = PacketReader::new(&data);
                    let sections = self.registries.dimension().section_count();
                    let mut biomes = Vec::new();
                    for _ in 0..sections {
                        biomes.extend(read_biomes(&mut column)?);
                    }
                    self.handler.on_biomes_updated(x, z, biomes);
                }
            }
            PlayPacketIn::ChunkBatchStarted => self.chunk_batch.started(),
            PlayPacketIn::ChunkBatchFinished => {
                let batch_size = reader.read_varint()?;
                let chunks_per_tick = self.chunk_batch.finished(batch_size);
                let mut buf = BytesMut::with_capacity(4);
                buf.put_f32(chunks_per_tick);
                self.send_play(PlayPacketOut::ChunkBatchReceived, buf).await?;
                self.handler.on_chunk_batch_finished(batch_size);
            }

            PlayPacketIn::PlayerInfo => {
                if profile.at_least(MC_1_19_3) {
                    self.handle_player_info(&mut reader)?;
                } else {
                    self.handle_legacy_player_info(&mut reader)?;
                }
            }
            PlayPacketIn::PlayerRemove => {
                let count = reader.read_len()?;
                for _ in 0..count {
                    let uuid = reader.read_uuid()?;
                    self.remove_player(uuid);
                }
            }

            PlayPacketIn::WindowItems => {
                let window_id = reader.read_u8()?;
                let (state_id, count) = if profile.at_least(MC_1_17_1) {
                    (reader.read_varint()?, reader.read_len()?)
                } else {
                    (-1, reader.read_i16()?.max(0) as usize)
                };
                let mut items = BTreeMap::new();
                for slot in 0..count {
                    if let Some(item) = read_slot(&mut reader, profile)? {
                        items.insert(slot, item);
                    }
                }
                let carried = if profile.at_least(MC_1_17_1) {
                    read_slot(&mut reader, profile)?
                } else {
                    None
                };
                self.handler
                    .on_inventory_items(window_id, state_id, &items, carried.as_ref());
            }
            PlayPacketIn::SetSlot => {
                let window_id = reader.read_i8()?;
                let state_id = if profile.at_least(MC_1_17_1) {
                    reader.read_varint()?
                } else {
                    -1
                };
                let slot = reader.read_i16()?;
                let item = read_slot(&mut reader, profile)?;
                self.handler
                    .on_inventory_slot(window_id, state_id, slot, item.as_ref());
            }
            PlayPacketIn::OpenWindow => {
                let window_id = reader.read_varint()?;
                let window_type = reader.read_varint()?;
                let title = TextComponent::read(&mut reader, profile)?;
                self.handler.on_inventory_open(window_id, window_type, &title);
            }
            PlayPacketIn::CloseWindow => {
                let window_id = reader.read_u8()?;
                self.handler.on_inventory_close(window_id);
            }
            PlayPacketIn::WindowProperty => {
                let window_id = reader.read_u8()?;
                let property = reader.read_i16()?;
                let value = reader.read_i16()?;
                self.handler.on_inventory_property(window_id, property, value);
            }
            PlayPacketIn::TradeList => {
                let window_id = reader.read_varint()?;
                let count = if profile.at_least(MC_1_20_6) {
                    reader.read_len()?
                } else {
                    usize::from(reader.read_u8()?)
                };
                let mut trades = Vec::with_capacity(count);
                for _ in 0..count {
                    trades.push(read_trade(&mut reader, profile)?);
                }
                let villager = VillagerInfo {
                    level: reader.read_varint()?,
                    experience: reader.read_varint()?,
                    regular_villager: reader.read_bool()?,
                    can_restock: reader.read_bool()?,
                };
                self.handler.on_trade_list(window_id, &trades, &villager);
            }
            PlayPacketIn::DeclareRecipes => {
                let count = reader.read_len()?;
                let mut recipes = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    recipes.push(read_recipe(&mut reader, profile, &self.registries)?);
                }
                debug!(count = recipes.len(), "Recipes declared");
                self.handler.on_recipes(&recipes);
            }

            PlayPacketIn::SpawnEntity => {
                let entity = read_entity(&mut reader, profile, false)?;
                self.handler.on_spawn_entity(&entity);
            }
            PlayPacketIn::DestroyEntities => {
                // 1.17 briefly sent one entity per packet
                let count = if profile.protocol_version() == MC_1_17 {
                    1
                } else {
                    reader.read_len()?
                };
                let mut ids = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    ids.push(reader.read_varint()?);
                }
                self.handler.on_destroy_entities(&ids);
            }
            PlayPacketIn::EntityPosition => {
                let entity_id = reader.read_varint()?;
                let (dx, dy, dz) = read_delta(&mut reader)?;
                let on_ground = reader.read_bool()?;
                self.handler.on_entity_position(entity_id, dx, dy, dz, on_ground);
            }
            PlayPacketIn::EntityPositionAndRotation => {
                let entity_id = reader.read_varint()?;
                let (dx, dy, dz) = read_delta(&mut reader)?;
                let yaw = reader.read_u8()?;
                let pitch = reader.read_u8()?;
                let on_ground = reader.read_bool()?;
                self.handler.on_entity_position(entity_id, dx, dy, dz, on_ground);
                self.handler.on_entity_rotation(entity_id, yaw, pitch, on_ground);
            }
            PlayPacketIn::EntityRotation => {
                let entity_id = reader.read_varint()?;
                let yaw = reader.read_u8()?;
                let pitch = reader.read_u8()?;
                let on_ground = reader.read_bool()?;
                self.handler.on_entity_rotation(entity_id, yaw, pitch, on_ground);
            }
            PlayPacketIn::EntityHeadLook => {
                let entity_id = reader.read_varint()?;
                let head_yaw = reader.read_u8()?;
                self.handler.on_entity_head_look(entity_id, head_yaw);
            }
            PlayPacketIn::EntityTeleport => {
                let entity_id = reader.read_varint()?;
                let (x, y, z) = (reader.read_f64()?, reader.read_f64()?, reader.read_f64()?);
                let yaw = reader.read_u8()?;
                let pitch = reader.read_u8()?;
                let on_ground = reader.read_bool()?;
                self.handler
                    .on_entity_teleport(entity_id, x, y, z, yaw, pitch, on_ground);
            }
            PlayPacketIn::EntityMetadata => {
                let entity_id = reader.read_varint()?;
                let metadata = read_metadata(&mut reader, profile)?;
                self.handler.on_entity_metadata(entity_id, &metadata);
            }
            PlayPacketIn::EntityStatus => {
                let entity_id = reader.read_i32()?;
                let status = reader.read_i8()?;
                self.handler.on_entity_status(entity_id, status);
            }
            PlayPacketIn::EntityEquipment => {
                let entity_id = reader.read_varint()?;
                if profile.at_least(MC_1_16) {
                    loop {
                        let slot = reader.read_u8()?;
                        let item = read_slot(&mut reader, profile)?;
                        self.handler
                            .on_entity_equipment(entity_id, slot & !EQUIPMENT_CONTINUES, item.as_ref());
                        if slot & EQUIPMENT_CONTINUES == 0 {
                            break;
                        }
                    }
                } else {
                    let slot = reader.read_varint()?;
                    let item = read_slot(&mut reader, profile)?;
                    self.handler
                        .on_entity_equipment(entity_id, slot as u8, item.as_ref());
                }
            }
            PlayPacketIn::EntityEffect => {
                let effect = read_entity_effect(&mut reader, profile)?;
                self.handler.on_entity_effect(&effect);
            }

            PlayPacketIn::TimeUpdate => {
                let world_age = reader.read_i64()?;
                let time_of_day = reader.read_i64()?;
                self.handler.on_time_update(world_age, time_of_day);
            }
            PlayPacketIn::UpdateHealth => {
                let health = reader.read_f32()?;
                let food = reader.read_varint()?;
                let saturation = reader.read_f32()?;
                self.handler.on_update_health(health, food, saturation);
            }
            PlayPacketIn::SetExperience => {
                let bar = reader.read_f32()?;
                let level = reader.read_varint()?;
                let total = reader.read_varint()?;
                self.handler.on_set_experience(bar, level, total);
            }
            PlayPacketIn::Explosion => {
                let explosion = read_explosion(&mut reader, profile)?;
                self.handler.on_explosion(&explosion);
            }

            PlayPacketIn::ResourcePackSend => self.handle_resource_pack(&mut reader, true).await?,
            PlayPacketIn::RemoveResourcePack => {
                let id = reader.read_optional(|r| r.read_uuid())?;
                self.handler.on_resource_pack_removed(id);
            }
            PlayPacketIn::CookieRequest => self.handle_cookie_request(&mut reader, true).await?,
            PlayPacketIn::StoreCookie => {
                let key = reader.read_string()?;
                let value = reader.read_byte_array()?;
                self.handler.set_cookie(&key, value);
            }
            PlayPacketIn::Transfer => {
                let host = reader.read_string()?;
                let port = reader.read_varint()?;
                self.handler.on_transfer(&host, port);
            }

            _ => self.metrics.packet_ignored(),
        }
        Ok(Transition::None)
    }

    async fn handle_join_game(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        let join = if profile.at_least(MC_1_20_2) {
            self.read_join_game(reader)?
        } else if profile.at_least(MC_1_16) {
            self.read_join_game_1_16(reader)?
        } else {
            self.read_join_game_1_15(reader)?
        };

        info!(
            entity_id = join.entity_id,
            world = %join.world_name,
            dimension = %self.registries.dimension().name,
            "Joined game"
        );
        self.signing.reset();
        self.terrain.clear();
        self.handler.on_game_joined(&join);

        if !profile.at_least(MC_1_20_2) {
            let mut buf = BytesMut::new();
            self.client_information.encode(&mut buf, profile.as_ref());
            self.send_play(PlayPacketOut::ClientSettings, buf).await?;
        }
        if profile.at_least(MC_1_19_3) && self.signing.is_online() && self.signer.is_some() {
            self.send_player_session().await?;
        }
        Ok(())
    }

    /// 1.20.2+: the registry codec moved to the configuration phase
    fn read_join_game(&mut self, reader: &mut PacketReader<'_>) -> Result<GameJoin> {
        let mut join = GameJoin {
            entity_id: reader.read_i32()?,
            hardcore: reader.read_bool()?,
            worlds: read_worlds(reader)?,
            max_players: reader.read_varint()?,
            view_distance: reader.read_varint()?,
            simulation_distance: reader.read_varint()?,
            reduced_debug_info: reader.read_bool()?,
            respawn_screen: reader.read_bool()?,
            limited_crafting: reader.read_bool()?,
            ..GameJoin::default()
        };

        if self.profile.at_least(MC_1_20_6) {
            let id = reader.read_varint()?;
            self.registries.set_dimension_by_id(id);
        } else {
            let name = reader.read_string()?;
            self.registries.set_dimension_by_name(&name);
        }
        join.dimension_type = self.registries.dimension().name.clone();

        join.world_name = reader.read_string()?;
        join.hashed_seed = reader.read_i64()?;
        join.gamemode = reader.read_u8()?;
        join.previous_gamemode = reader.read_i8()?;
        join.debug = reader.read_bool()?;
        join.flat = reader.read_bool()?;
        join.death_location = read_death_location(reader)?;
        join.portal_cooldown = reader.read_varint()?;
        if self.profile.at_least(MC_1_20_6) {
            join.enforces_secure_chat = reader.read_bool()?;
        }
        Ok(join)
    }

    /// 1.16 - 1.20.1: the registry codec travels inside Join Game
    fn read_join_game_1_16(&mut self, reader: &mut PacketReader<'_>) -> Result<GameJoin> {
        let profile = Arc::clone(&self.profile);
        let mut join = GameJoin {
            entity_id: reader.read_i32()?,
            ..GameJoin::default()
        };

        if profile.at_least(MC_1_16_2) {
            join.hardcore = reader.read_bool()?;
            join.gamemode = reader.read_u8()?;
        } else {
            let gamemode = reader.read_u8()?;
            join.hardcore = gamemode & 0x08 != 0;
            join.gamemode = gamemode & 0x07;
        }
        join.previous_gamemode = reader.read_i8()?;
        join.worlds = read_worlds(reader)?;

        let codec = nbt::read_nbt(reader, profile.anonymous_nbt())?;
        self.registries.apply_registry_codec(&codec)?;

        if profile.at_least(MC_1_19) || !profile.at_least(MC_1_16_2) {
            join.dimension_type = reader.read_string()?;
            join.world_name = reader.read_string()?;
            self.registries.set_dimension_by_name(&join.dimension_type);
        } else {
            // 1.16.2 - 1.18.2 send the dimension type inline
            let element = nbt::read_nbt(reader, profile.anonymous_nbt())?;
            join.world_name = reader.read_string()?;
            join.dimension_type = join.world_name.clone();
            self.registries.set_dimension_from_nbt(&join.world_name, &element);
        }

        join.hashed_seed = reader.read_i64()?;
        join.max_players = if profile.at_least(MC_1_16_2) {
            reader.read_varint()?
        } else {
            i32::from(reader.read_u8()?)
        };
        join.view_distance = reader.read_varint()?;
        join.simulation_distance = if profile.at_least(MC_1_18_1) {
            reader.read_varint()?
        } else {
            join.view_distance
        };
        join.reduced_debug_info = reader.read_bool()?;
        join.respawn_screen = reader.read_bool()?;
        join.debug = reader.read_bool()?;
        join.flat = reader.read_bool()?;
        if profile.at_least(MC_1_19) {
            join.death_location = read_death_location(reader)?;
        }
        if profile.at_least(MC_1_20) {
            join.portal_cooldown = reader.read_varint()?;
        }
        Ok(join)
    }

    fn read_join_game_1_15(&mut self, reader: &mut PacketReader<'_>) -> Result<GameJoin> {
        let entity_id = reader.read_i32()?;
        let gamemode = reader.read_u8()?;
        let dimension = legacy_dimension_name(reader.read_i32()?);
        let hashed_seed = reader.read_i64()?;
        let max_players = i32::from(reader.read_u8()?);
        let level_type = reader.read_string()?;
        let view_distance = reader.read_varint()?;

        self.registries.set_dimension_by_name(dimension);
        Ok(GameJoin {
            entity_id,
            hardcore: gamemode & 0x08 != 0,
            gamemode: gamemode & 0x07,
            previous_gamemode: -1,
            dimension_type: dimension.to_string(),
            world_name: dimension.to_string(),
            hashed_seed,
            max_players,
            view_distance,
            simulation_distance: view_distance,
            reduced_debug_info: reader.read_bool()?,
            respawn_screen: reader.read_bool()?,
            flat: level_type == "flat",
            ..GameJoin::default()
        })
    }

    fn handle_respawn(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        let mut respawn = Respawn::default();

        if !profile.at_least(MC_1_16) {
            let dimension = legacy_dimension_name(reader.read_i32()?);
            respawn.hashed_seed = reader.read_i64()?;
            respawn.gamemode = reader.read_u8()?;
            respawn.flat = reader.read_string()? == "flat";
            respawn.previous_gamemode = -1;
            respawn.dimension_type = dimension.to_string();
            respawn.world_name = dimension.to_string();
            self.registries.set_dimension_by_name(dimension);
        } else {
            if profile.at_least(MC_1_20_6) {
                let id = reader.read_varint()?;
                self.registries.set_dimension_by_id(id);
                respawn.dimension_type = self.registries.dimension().name.clone();
                respawn.world_name = reader.read_string()?;
            } else if profile.at_least(MC_1_16_2) && !profile.at_least(MC_1_19) {
                let element = nbt::read_nbt(reader, profile.anonymous_nbt())?;
                respawn.world_name = reader.read_string()?;
                respawn.dimension_type = respawn.world_name.clone();
                self.registries.set_dimension_from_nbt(&respawn.world_name, &element);
            } else {
                respawn.dimension_type = reader.read_string()?;
                respawn.world_name = reader.read_string()?;
                self.registries.set_dimension_by_name(&respawn.dimension_type);
            }

            respawn.hashed_seed = reader.read_i64()?;
            respawn.gamemode = reader.read_u8()?;
            respawn.previous_gamemode = reader.read_i8()?;
            respawn.debug = reader.read_bool()?;
            respawn.flat = reader.read_bool()?;
            if !profile.at_least(MC_1_20_2) {
                respawn.data_kept = reader.read_u8()?;
            }
            if profile.at_least(MC_1_19) {
                respawn.death_location = read_death_location(reader)?;
            }
            if profile.at_least(MC_1_20) {
                respawn.portal_cooldown = reader.read_varint()?;
            }
            if profile.at_least(MC_1_20_2) {
                respawn.data_kept = reader.read_u8()?;
            }
        }

        info!(world = %respawn.world_name, dimension = %self.registries.dimension().name, "Respawned");
        self.terrain.clear();
        self.handler.on_respawn(&respawn);
        Ok(())
    }

    /// 1.19.3+ player info: an action bitset applied to every listed entry
    fn handle_player_info(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        let actions = reader.read_u8()?;
        let count = reader.read_len()?;

        for _ in 0..count {
            let uuid = reader.read_uuid()?;
            let added = actions & ADD_PLAYER != 0;
            if added {
                let name = reader.read_string()?;
                let properties = read_properties(reader)?;
                self.players.insert(
                    uuid,
                    PlayerInfo {
                        uuid,
                        name,
                        properties,
                        ..PlayerInfo::default()
                    },
                );
            }
            let player = self.players.entry(uuid).or_insert_with(|| PlayerInfo {
                uuid,
                ..PlayerInfo::default()
            });

            if actions & INITIALIZE_CHAT != 0 {
                let session = reader.read_optional(|r| {
                    let session_id = r.read_uuid()?;
                    let expires_at = r.read_i64()?;
                    let key = r.read_byte_array()?;
                    let _key_signature = r.read_byte_array()?;
                    Ok((session_id, expires_at, key))
                })?;
                match session {
                    Some((session_id, expires_at, key)) => {
                        self.signing
                            .set_sender_key(uuid, SenderKey::new(&key, expires_at, Some(session_id)));
                        player.chat_session = Some(session_id);
                    }
                    None => {
                        self.signing.remove_sender(&uuid);
                        player.chat_session = None;
                    }
                }
            }
            if actions & UPDATE_GAMEMODE != 0 {
                player.gamemode = reader.read_varint()?;
                if !added {
                    self.handler.on_gamemode_update(uuid, player.gamemode);
                }
            }
            if actions & UPDATE_LISTED != 0 {
                player.listed = reader.read_bool()?;
            }
            if actions & UPDATE_LATENCY != 0 {
                player.latency = reader.read_varint()?;
                if !added {
                    self.handler.on_latency_update(uuid, player.latency);
                }
            }
            if actions & UPDATE_DISPLAY_NAME != 0 {
                player.display_name = reader.read_optional(|r| TextComponent::read(r, profile.as_ref()))?;
                if !added {
                    self.handler
                        .on_display_name_update(uuid, player.display_name.as_ref());
                }
            }

            if added {
                debug!(%uuid, name = %player.name, "Player joined");
                self.handler.on_player_join(player);
            }
        }
        Ok(())
    }

    /// Player info before 1.19.3: one action for all entries
    fn handle_legacy_player_info(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        let action = reader.read_varint()?;
        let count = reader.read_len()?;

        for _ in 0..count {
            let uuid = reader.read_uuid()?;
            match action {
                0 => {
                    let player = PlayerInfo {
                        uuid,
                        name: reader.read_string()?,
                        properties: read_properties(reader)?,
                        gamemode: reader.read_varint()?,
                        latency: reader.read_varint()?,
                        display_name: reader.read_optional(|r| TextComponent::read(r, profile.as_ref()))?,
                        listed: true,
                        chat_session: None,
                    };
                    if profile.at_least(MC_1_19) {
                        let key = reader.read_optional(|r| {
                            let expires_at = r.read_i64()?;
                            let key = r.read_byte_array()?;
                            let _key_signature = r.read_byte_array()?;
                            Ok((expires_at, key))
                        })?;
                        if let Some((expires_at, key)) = key {
                            self.signing.set_sender_key(uuid, SenderKey::new(&key, expires_at, None));
                        }
                    }
                    debug!(%uuid, name = %player.name, "Player joined");
                    self.handler.on_player_join(&player);
                    self.players.insert(uuid, player);
                }
                1 => {
                    let gamemode = reader.read_varint()?;
                    if let Some(player) = self.players.get_mut(&uuid) {
                        player.gamemode = gamemode;
                    }
                    self.handler.on_gamemode_update(uuid, gamemode);
                }
                2 => {
                    let latency = reader.read_varint()?;
                    if let Some(player) = self.players.get_mut(&uuid) {
                        player.latency = latency;
                    }
                    self.handler.on_latency_update(uuid, latency);
                }
                3 => {
                    let display_name = reader.read_optional(|r| TextComponent::read(r, profile.as_ref()))?;
                    self.handler.on_display_name_update(uuid, display_name.as_ref());
                    if let Some(player) = self.players.get_mut(&uuid) {
                        player.display_name = display_name;
                    }
                }
                4 => self.remove_player(uuid),
                other => {
                    return Err(ProtocolError::Custom(format!("unknown player info action {other}")));
                }
            }
        }
        Ok(())
    }

    fn remove_player(&mut self, uuid: Uuid) {
        if let Some(player) = self.players.remove(&uuid) {
            debug!(%uuid, name = %player.name, "Player left");
        }
        self.signing.remove_sender(&uuid);
        self.handler.on_player_leave(uuid);
    }

    /// Start a 1.19.3+ chat session and announce the player's key
    pub async fn send_player_session(&mut self) -> Result<()> {
        let key = require_signer(self.signer.as_deref())?.public_key().clone();
        let session_id = self.signing.start_session(Uuid::new_v4()).session_id;

        let mut buf = BytesMut::new();
        buf.put_uuid(&session_id);
        buf.put_i64(key.expires_at);
        buf.put_byte_array(&key.der);
        buf.put_byte_array(&key.signature_v2);
        info!(%session_id, "Chat session started");
        self.send_play(PlayPacketOut::PlayerSession, buf).await
    }
}

/// Relative entity move, in blocks
fn read_delta(reader: &mut PacketReader<'_>) -> Result<(f64, f64, f64)> {
    let mut axis = || reader.read_i16().map(|v| f64::from(v) / 4096.0);
    Ok((axis()?, axis()?, axis()?))
}

fn read_multi_block_change(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Vec<(BlockPos, u32)>> {
    if profile.at_least(MC_1_16_2) {
        let (sx, sy, sz) = unpack_section_position(reader.read_i64()?);
        if !profile.at_least(MC_1_20) {
            let _suppress_light_updates = reader.read_bool()?;
        }
        let count = reader.read_len()?;
        let mut changes = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let (state, x, y, z) = unpack_block_record(reader.read_varlong()?);
            changes.push((BlockPos::new(sx * 16 + x, sy * 16 + y, sz * 16 + z), state));
        }
        Ok(changes)
    } else {
        let chunk_x = reader.read_i32()?;
        let chunk_z = reader.read_i32()?;
        let count = reader.read_len()?;
        let mut changes = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let xz = reader.read_u8()?;
            let y = reader.read_u8()?;
            let state = reader.read_varint()?;
            let position = BlockPos::new(
                chunk_x * 16 + i32::from(xz >> 4),
                i32::from(y),
                chunk_z * 16 + i32::from(xz & 0x0F),
            );
            changes.push((position, state as u32));
        }
        Ok(changes)
    }
}

fn read_entity_effect(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<EntityEffect> {
    let entity_id = reader.read_varint()?;
    let effect_id = if profile.at_least(MC_1_18_2) {
        reader.read_varint()?
    } else {
        i32::from(reader.read_u8()?)
    };
    let amplifier = if profile.at_least(MC_1_20_6) {
        reader.read_varint()?
    } else {
        i32::from(reader.read_i8()?)
    };
    let duration = reader.read_varint()?;
    let flags = reader.read_u8()?;
    let factor_data = if (MC_1_19..MC_1_20_6).contains(&profile.protocol_version()) {
        reader.read_optional(|r| nbt::read_nbt(r, profile.anonymous_nbt()))?
    } else {
        None
    };

    Ok(EntityEffect {
        entity_id,
        effect_id,
        amplifier,
        duration,
        flags,
        factor_data,
    })
}

fn read_explosion(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Explosion> {
    let (x, y, z) = if profile.at_least(MC_1_19_3) {
        (reader.read_f64()?, reader.read_f64()?, reader.read_f64()?)
    } else {
        (
            f64::from(reader.read_f32()?),
            f64::from(reader.read_f32()?),
            f64::from(reader.read_f32()?),
        )
    };
    let strength = reader.read_f32()?;

    let count = if profile.at_least(MC_1_17) {
        reader.read_len()?
    } else {
        reader.read_i32()?.max(0) as usize
    };
    let mut affected_blocks = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        affected_blocks.push((reader.read_i8()?, reader.read_i8()?, reader.read_i8()?));
    }
    let player_motion = (reader.read_f32()?, reader.read_f32()?, reader.read_f32()?);

    if profile.at_least(MC_1_20_4) {
        let _block_interaction = reader.read_varint()?;
        let small = read_particle(reader, profile)?;
        let large = read_particle(reader, profile)?;
        trace!(?small, ?large, "Explosion particles");

        // sound holder: registry id + 1, or 0 followed by an inline event
        if reader.read_varint()? == 0 {
            let sound = reader.read_string()?;
            let range = reader.read_optional(|r| r.read_f32())?;
            trace!(%sound, ?range, "Inline explosion sound");
        }
    }

    if reader.remaining() > 0 {
        warn!(remaining = reader.remaining(), "Trailing bytes after explosion");
    }
    Ok(Explosion {
        x,
        y,
        z,
        strength,
        affected_blocks,
        player_motion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::core::frame::FrameCodec;
    use crate::protocol::dispatcher::PacketWriter;
    use crate::protocol::handler::Handler;
    use crate::protocol::version::MC_1_21;
    use futures::StreamExt;
    use std::sync::Mutex;
    use tokio::io::DuplexStream;
    use tokio_util::codec::FramedRead;

    #[derive(Default)]
    struct Recorder {
        joins: Mutex<Vec<GameJoin>>,
        positions: Mutex<Vec<PlayerPosition>>,
        unloaded: Mutex<Vec<(i32, i32)>>,
        players: Mutex<Vec<String>>,
        left: Mutex<Vec<Uuid>>,
        blocks: Mutex<Vec<(BlockPos, u32)>>,
    }

    impl Handler for Recorder {
        fn on_game_joined(&self, join: &GameJoin) {
            if let Ok(mut joins) = self.joins.lock() {
                joins.push(join.clone());
            }
        }

        fn on_player_position(&self, position: &PlayerPosition) {
            if let Ok(mut positions) = self.positions.lock() {
                positions.push(*position);
            }
        }

        fn on_chunk_unloaded(&self, x: i32, z: i32) {
            if let Ok(mut unloaded) = self.unloaded.lock() {
                unloaded.push((x, z));
            }
        }

        fn on_player_join(&self, player: &PlayerInfo) {
            if let Ok(mut players) = self.players.lock() {
                players.push(player.name.clone());
            }
        }

        fn on_player_leave(&self, uuid: Uuid) {
            if let Ok(mut left) = self.left.lock() {
                left.push(uuid);
            }
        }

        fn on_multi_block_change(&self, changes: &[(BlockPos, u32)]) {
            if let Ok(mut blocks) = self.blocks.lock() {
                blocks.extend_from_slice(changes);
            }
        }
    }

    #[allow(clippy::unwrap_used)]
    fn play_protocol(handler: Arc<dyn Handler>) -> (ClientProtocol, FramedRead<DuplexStream, FrameCodec>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let writer = Arc::new(PacketWriter::new(client, FrameCodec::default()));
        let config = ClientConfig::default_with_overrides(|c| c.connection.protocol_version = MC_1_21);
        let mut protocol = ClientProtocol::new(&config, handler, writer).unwrap();
        protocol.state = ConnectionState::Play;
        (protocol, FramedRead::new(server, FrameCodec::default()))
    }

    #[allow(clippy::unwrap_used)]
    fn play_id(protocol: &ClientProtocol, packet: PlayPacketIn) -> i32 {
        (0..0x80).find(|&id| protocol.palette.play_in(id) == packet).unwrap()
    }

    #[test]
    fn test_section_position_unpacking() {
        let packed: i64 = (3_i64 << 42) | ((-2_i64 & 0x3F_FFFF) << 20) | (-4_i64 & 0xFFFFF);
        assert_eq!(unpack_section_position(packed), (3, -4, -2));

        let record: i64 = (9 << 12) | (1 << 8) | (2 << 4) | 3;
        assert_eq!(unpack_block_record(record), (9, 1, 3, 2));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_keep_alive_is_echoed_in_play() {
        let (mut protocol, mut server) = play_protocol(Arc::new(Recorder::default()));
        let mut payload = BytesMut::new();
        payload.put_i64(-7);

        protocol
            .handle_packet(RawPacket::new(0x26, payload.clone()))
            .await
            .unwrap();
        let echoed = server.next().await.unwrap().unwrap();
        assert_eq!(echoed.id, 0x18);
        assert_eq!(&echoed.payload[..], &payload[..]);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_join_game_enters_dimension_by_id() {
        let recorder = Arc::new(Recorder::default());
        let (mut protocol, _server) = play_protocol(recorder.clone());
        let mut element = nbt::NbtCompound::new();
        element.insert("min_y".into(), nbt::NbtTag::Int(-32));
        element.insert("height".into(), nbt::NbtTag::Int(256));
        protocol.registries.apply_registry_entries(
            "dimension_type",
            vec![crate::protocol::registry::RegistryEntry {
                name: "minecraft:the_nether".into(),
                id: 0,
                element: Some(element),
            }],
        );

        let mut payload = BytesMut::new();
        payload.put_i32(42); // entity id
        payload.put_bool(false);
        payload.put_varint(1);
        payload.put_string("minecraft:the_nether");
        payload.put_varint(20); // max players
        payload.put_varint(10);
        payload.put_varint(8);
        payload.put_bool(false);
        payload.put_bool(true);
        payload.put_bool(false);
        payload.put_varint(0); // dimension type id
        payload.put_string("minecraft:the_nether");
        payload.put_i64(99);
        payload.put_u8(1);
        payload.put_i8(-1);
        payload.put_bool(false);
        payload.put_bool(false);
        payload.put_bool(false); // no death location
        payload.put_varint(0);
        payload.put_bool(true);

        let id = play_id(&protocol, PlayPacketIn::JoinGame);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        let joins = recorder.joins.lock().unwrap();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].entity_id, 42);
        assert_eq!(joins[0].dimension_type, "minecraft:the_nether");
        assert!(joins[0].enforces_secure_chat);
        assert_eq!(protocol.registries().dimension().min_y, -32);
        assert_eq!(protocol.registries().dimension().section_count(), 16);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_position_is_confirmed() {
        let recorder = Arc::new(Recorder::default());
        let (mut protocol, mut server) = play_protocol(recorder.clone());

        let mut payload = BytesMut::new();
        payload.put_f64(1.5);
        payload.put_f64(64.0);
        payload.put_f64(-3.5);
        payload.put_f32(90.0);
        payload.put_f32(0.0);
        payload.put_u8(PlayerPosition::RELATIVE_YAW);
        payload.put_varint(17);

        let id = play_id(&protocol, PlayPacketIn::PlayerPositionAndLook);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        let confirm = server.next().await.unwrap().unwrap();
        assert_eq!(Some(confirm.id), protocol.palette.play_out(PlayPacketOut::TeleportConfirm));
        assert_eq!(&confirm.payload[..], &[17]);

        let positions = recorder.positions.lock().unwrap();
        assert_eq!(positions[0].teleport_id, 17);
        assert!(positions[0].is_relative(PlayerPosition::RELATIVE_YAW));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_unload_reads_z_before_x() {
        let recorder = Arc::new(Recorder::default());
        let (mut protocol, _server) = play_protocol(recorder.clone());

        let mut payload = BytesMut::new();
        payload.put_i32(-5); // z
        payload.put_i32(7); // x
        let id = play_id(&protocol, PlayPacketIn::UnloadChunk);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        assert_eq!(*recorder.unloaded.lock().unwrap(), vec![(7, -5)]);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_multi_block_change_positions() {
        let recorder = Arc::new(Recorder::default());
        let (mut protocol, _server) = play_protocol(recorder.clone());

        let mut payload = BytesMut::new();
        payload.put_i64((1_i64 << 42) | (2_i64 << 20) | 4);
        payload.put_varint(1);
        payload.put_varlong((33 << 12) | (5 << 8) | (6 << 4) | 7);
        let id = play_id(&protocol, PlayPacketIn::MultiBlockChange);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        assert_eq!(*recorder.blocks.lock().unwrap(), vec![(BlockPos::new(21, 71, 38), 33)]);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_player_list_add_and_remove() {
        let recorder = Arc::new(Recorder::default());
        let (mut protocol, _server) = play_protocol(recorder.clone());
        let uuid = Uuid::from_u128(0xABCD);

        let mut payload = BytesMut::new();
        payload.put_u8(ADD_PLAYER | UPDATE_GAMEMODE | UPDATE_LISTED | UPDATE_LATENCY);
        payload.put_varint(1);
        payload.put_uuid(&uuid);
        payload.put_string("Alex");
        payload.put_varint(0); // no properties
        payload.put_varint(1);
        payload.put_bool(true);
        payload.put_varint(35);
        let id = play_id(&protocol, PlayPacketIn::PlayerInfo);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        let player = protocol.players().get(&uuid).cloned().unwrap();
        assert_eq!(player.name, "Alex");
        assert_eq!(player.gamemode, 1);
        assert_eq!(player.latency, 35);
        assert!(player.listed);
        assert_eq!(*recorder.players.lock().unwrap(), vec!["Alex".to_string()]);

        let mut payload = BytesMut::new();
        payload.put_varint(1);
        payload.put_uuid(&uuid);
        let id = play_id(&protocol, PlayPacketIn::PlayerRemove);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        assert!(protocol.players().is_empty());
        assert_eq!(*recorder.left.lock().unwrap(), vec![uuid]);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_play_disconnect_is_a_kick() {
        let (mut protocol, _server) = play_protocol(Arc::new(Recorder::default()));

        // anonymous NBT string root
        let mut payload = BytesMut::new();
        payload.put_u8(8);
        payload.put_u16(6);
        payload.put_slice(b"Banned");
        let id = play_id(&protocol, PlayPacketIn::Disconnect);
        let transition = protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        assert_eq!(
            transition,
            Transition::Disconnect(DisconnectReason::InGameKick, "Banned".into())
        );
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_chunk_batch_reports_rate() {
        let (mut protocol, mut server) = play_protocol(Arc::new(Recorder::default()));

        let mut payload = BytesMut::new();
        payload.put_varint(0);
        let id = play_id(&protocol, PlayPacketIn::ChunkBatchFinished);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        let received = server.next().await.unwrap().unwrap();
        assert_eq!(Some(received.id), protocol.palette.play_out(PlayPacketOut::ChunkBatchReceived));
        assert_eq!(&received.payload[..], &3.5_f32.to_be_bytes());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_unhandled_play_packet_is_counted() {
        let (mut protocol, _server) = play_protocol(Arc::new(Recorder::default()));
        let id = play_id(&protocol, PlayPacketIn::BossBar);
        protocol
            .handle_packet(RawPacket::new(id, vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(protocol.metrics().snapshot().ignored_packets, 1);
    }
}
